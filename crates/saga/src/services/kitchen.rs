//! Kitchen service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::ServiceError;
use crate::order_workflow::OrderItem;

/// Estimated preparation time assigned to new tickets.
pub const DEFAULT_ESTIMATED_MINUTES: u32 = 30;

/// Status of a kitchen ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KitchenTicketStatus {
    Preparing,
    Cancelled,
}

/// Trait for kitchen operations.
#[async_trait]
pub trait KitchenService: Send + Sync {
    /// Opens a ticket for the order's items and returns its ID.
    async fn create_ticket(&self, order_id: &str, items: &[OrderItem])
    -> Result<String, ServiceError>;

    /// Cancels a ticket.
    async fn cancel(&self, kitchen_order_id: &str) -> Result<(), ServiceError>;
}

#[derive(Debug, Clone)]
struct KitchenTicket {
    items: Vec<OrderItem>,
    status: KitchenTicketStatus,
    estimated_minutes: u32,
}

#[derive(Debug, Default)]
struct InMemoryKitchenState {
    tickets: HashMap<String, KitchenTicket>,
    next_id: u32,
    fail_on_prepare: bool,
}

/// In-memory kitchen service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryKitchenService {
    state: Arc<RwLock<InMemoryKitchenState>>,
}

impl InMemoryKitchenService {
    /// Creates a new in-memory kitchen service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the service to report the kitchen as unavailable.
    pub async fn set_fail_on_prepare(&self, fail: bool) {
        self.state.write().await.fail_on_prepare = fail;
    }

    /// Returns the number of tickets being prepared.
    pub async fn active_ticket_count(&self) -> usize {
        self.state
            .read()
            .await
            .tickets
            .values()
            .filter(|t| t.status == KitchenTicketStatus::Preparing)
            .count()
    }

    /// Returns the status of a ticket.
    pub async fn ticket_status(&self, kitchen_order_id: &str) -> Option<KitchenTicketStatus> {
        self.state
            .read()
            .await
            .tickets
            .get(kitchen_order_id)
            .map(|t| t.status)
    }

    /// Returns the number of item lines and the estimate for a ticket.
    pub async fn ticket_summary(&self, kitchen_order_id: &str) -> Option<(usize, u32)> {
        self.state
            .read()
            .await
            .tickets
            .get(kitchen_order_id)
            .map(|t| (t.items.len(), t.estimated_minutes))
    }
}

#[async_trait]
impl KitchenService for InMemoryKitchenService {
    async fn create_ticket(
        &self,
        order_id: &str,
        items: &[OrderItem],
    ) -> Result<String, ServiceError> {
        let mut state = self.state.write().await;

        if state.fail_on_prepare {
            tracing::warn!(%order_id, "kitchen unavailable");
            return Err(ServiceError::Rejected("Kitchen unavailable".to_string()));
        }

        state.next_id += 1;
        let kitchen_order_id = format!("KIT-{:04}", state.next_id);
        state.tickets.insert(
            kitchen_order_id.clone(),
            KitchenTicket {
                items: items.to_vec(),
                status: KitchenTicketStatus::Preparing,
                estimated_minutes: DEFAULT_ESTIMATED_MINUTES,
            },
        );

        Ok(kitchen_order_id)
    }

    async fn cancel(&self, kitchen_order_id: &str) -> Result<(), ServiceError> {
        let mut state = self.state.write().await;
        let ticket = state
            .tickets
            .get_mut(kitchen_order_id)
            .ok_or_else(|| ServiceError::NotFound {
                kind: "Kitchen order",
                id: kitchen_order_id.to_string(),
            })?;
        ticket.status = KitchenTicketStatus::Cancelled;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items() -> Vec<OrderItem> {
        vec![OrderItem::new("Ramen", 2, 1200), OrderItem::new("Gyoza", 1, 600)]
    }

    #[tokio::test]
    async fn test_create_and_cancel_ticket() {
        let service = InMemoryKitchenService::new();

        let id = service.create_ticket("ORD-1", &items()).await.unwrap();
        assert_eq!(id, "KIT-0001");
        assert_eq!(service.active_ticket_count().await, 1);
        assert_eq!(
            service.ticket_summary(&id).await,
            Some((2, DEFAULT_ESTIMATED_MINUTES))
        );

        service.cancel(&id).await.unwrap();
        assert_eq!(
            service.ticket_status(&id).await,
            Some(KitchenTicketStatus::Cancelled)
        );
        assert_eq!(service.active_ticket_count().await, 0);
    }

    #[tokio::test]
    async fn test_unavailable_kitchen() {
        let service = InMemoryKitchenService::new();
        service.set_fail_on_prepare(true).await;

        let err = service.create_ticket("ORD-1", &items()).await.unwrap_err();
        assert_eq!(err.to_string(), "Kitchen unavailable");
        assert_eq!(service.active_ticket_count().await, 0);
    }

    #[tokio::test]
    async fn test_cancel_unknown_ticket() {
        let service = InMemoryKitchenService::new();
        assert!(matches!(
            service.cancel("KIT-0042").await,
            Err(ServiceError::NotFound { .. })
        ));
    }
}
