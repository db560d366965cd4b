//! Delivery service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::ServiceError;

/// Number of drivers the in-memory service rotates through.
const DRIVER_POOL_SIZE: u32 = 10;

/// A delivery booked for an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryAssignment {
    pub delivery_id: String,
    pub driver_id: String,
}

/// Status of a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Assigned,
    Cancelled,
}

/// Trait for delivery operations.
#[async_trait]
pub trait DeliveryService: Send + Sync {
    /// Books a driver for the order.
    async fn arrange(&self, order_id: &str, address: &str)
    -> Result<DeliveryAssignment, ServiceError>;

    /// Cancels a booked delivery.
    async fn cancel(&self, delivery_id: &str) -> Result<(), ServiceError>;
}

#[derive(Debug, Clone)]
struct DeliveryRecord {
    address: String,
    status: DeliveryStatus,
}

#[derive(Debug, Default)]
struct InMemoryDeliveryState {
    deliveries: HashMap<String, DeliveryRecord>,
    next_id: u32,
    fail_on_arrange: bool,
}

/// In-memory delivery service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDeliveryService {
    state: Arc<RwLock<InMemoryDeliveryState>>,
}

impl InMemoryDeliveryService {
    /// Creates a new in-memory delivery service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the service to fail on arrange.
    pub async fn set_fail_on_arrange(&self, fail: bool) {
        self.state.write().await.fail_on_arrange = fail;
    }

    /// Returns the number of assigned deliveries.
    pub async fn active_delivery_count(&self) -> usize {
        self.state
            .read()
            .await
            .deliveries
            .values()
            .filter(|d| d.status == DeliveryStatus::Assigned)
            .count()
    }

    /// Returns the status and address of a delivery.
    pub async fn delivery(&self, delivery_id: &str) -> Option<(DeliveryStatus, String)> {
        self.state
            .read()
            .await
            .deliveries
            .get(delivery_id)
            .map(|d| (d.status, d.address.clone()))
    }
}

#[async_trait]
impl DeliveryService for InMemoryDeliveryService {
    async fn arrange(
        &self,
        order_id: &str,
        address: &str,
    ) -> Result<DeliveryAssignment, ServiceError> {
        let mut state = self.state.write().await;

        if state.fail_on_arrange {
            tracing::warn!(%order_id, "no driver available");
            return Err(ServiceError::Rejected("No driver available".to_string()));
        }

        state.next_id += 1;
        let delivery_id = format!("DEL-{:04}", state.next_id);
        let driver_id = format!("driver_{}", (state.next_id - 1) % DRIVER_POOL_SIZE + 1);
        state.deliveries.insert(
            delivery_id.clone(),
            DeliveryRecord {
                address: address.to_string(),
                status: DeliveryStatus::Assigned,
            },
        );

        Ok(DeliveryAssignment {
            delivery_id,
            driver_id,
        })
    }

    async fn cancel(&self, delivery_id: &str) -> Result<(), ServiceError> {
        let mut state = self.state.write().await;
        let delivery = state
            .deliveries
            .get_mut(delivery_id)
            .ok_or_else(|| ServiceError::NotFound {
                kind: "Delivery",
                id: delivery_id.to_string(),
            })?;
        delivery.status = DeliveryStatus::Cancelled;
        Ok(())
    }
}
