use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow, types::Json};

use crate::{
    CompensationRecord, Payload, Result, RunState, SagaId, SagaStatus, StepFailure,
    store::RunStore,
};

/// PostgreSQL-backed run store implementation.
///
/// Each run is a single row in `saga_runs`; `save` is an upsert, so the
/// record for one saga identifier is always written atomically.
#[derive(Clone)]
pub struct PostgresRunStore {
    pool: PgPool,
}

impl PostgresRunStore {
    /// Creates a new PostgreSQL run store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_run(row: PgRow) -> Result<(SagaId, RunState)> {
        let saga_id: String = row.try_get("saga_id")?;
        let status: String = row.try_get("status")?;
        let Json(payload): Json<Payload> = row.try_get("payload")?;
        let Json(executed_steps): Json<Vec<String>> = row.try_get("executed_steps")?;
        let failure: Option<Json<StepFailure>> = row.try_get("failure")?;
        let Json(compensations): Json<Vec<CompensationRecord>> = row.try_get("compensations")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

        Ok((
            SagaId::from(saga_id),
            RunState {
                status: status.parse::<SagaStatus>()?,
                payload,
                executed_steps,
                failure: failure.map(|Json(f)| f),
                compensations,
                created_at,
                updated_at,
            },
        ))
    }
}

#[async_trait]
impl RunStore for PostgresRunStore {
    async fn get(&self, saga_id: &SagaId) -> Result<Option<RunState>> {
        let row = sqlx::query(
            r#"
            SELECT saga_id, status, payload, executed_steps, failure, compensations, created_at, updated_at
            FROM saga_runs
            WHERE saga_id = $1
            "#,
        )
        .bind(saga_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_run)
            .transpose()
            .map(|found| found.map(|(_, run)| run))
    }

    async fn save(&self, saga_id: &SagaId, state: &RunState) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO saga_runs (saga_id, status, payload, executed_steps, failure, compensations, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            ON CONFLICT (saga_id) DO UPDATE SET
                status = EXCLUDED.status,
                payload = EXCLUDED.payload,
                executed_steps = EXCLUDED.executed_steps,
                failure = EXCLUDED.failure,
                compensations = EXCLUDED.compensations,
                updated_at = NOW()
            "#,
        )
        .bind(saga_id.as_str())
        .bind(state.status.as_str())
        .bind(Json(&state.payload))
        .bind(Json(&state.executed_steps))
        .bind(state.failure.as_ref().map(Json))
        .bind(Json(&state.compensations))
        .bind(state.created_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!(%saga_id, status = %state.status, "run state saved");
        Ok(())
    }

    async fn list_by_status(&self, status: SagaStatus) -> Result<Vec<(SagaId, RunState)>> {
        let rows = sqlx::query(
            r#"
            SELECT saga_id, status, payload, executed_steps, failure, compensations, created_at, updated_at
            FROM saga_runs
            WHERE status = $1
            ORDER BY updated_at ASC, saga_id ASC
            "#,
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_run).collect()
    }
}
