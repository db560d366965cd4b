//! Saga runner entry point.

use run_store::{InMemoryRunStore, PostgresRunStore};
use runner::Config;
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    runner::telemetry::init_tracing(&config);

    // 2. Install Prometheus metrics recorder when a listener address is configured
    if let Some(addr) = config.metrics_addr {
        runner::telemetry::install_metrics(addr).expect("failed to install Prometheus recorder");
        tracing::info!(%addr, "metrics listener started");
    }

    // 3. Pick the run store and drive the order saga
    let result = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(url)
                .await
                .expect("failed to connect to database");
            let store = PostgresRunStore::new(pool);
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using postgres run store");
            runner::run(store, &config).await
        }
        None => {
            tracing::info!("using in-memory run store");
            runner::run(InMemoryRunStore::new(), &config).await
        }
    };

    match result {
        Ok(report) => {
            tracing::info!(
                recovered = report.recovered,
                status = ?report.final_status,
                "runner finished"
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "runner failed");
            std::process::exit(1);
        }
    }
}
