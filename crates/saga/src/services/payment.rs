//! Payment service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::ServiceError;

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Cash,
    CreditCard,
}

/// Lifecycle of a payment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Created, waiting for manual confirmation.
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        };
        f.write_str(s)
    }
}

/// Trait for payment processing operations.
#[async_trait]
pub trait PaymentService: Send + Sync {
    /// Records a pending payment for an order and returns its ID.
    async fn create_pending(
        &self,
        order_id: &str,
        amount_cents: u64,
        method: PaymentMethod,
    ) -> Result<String, ServiceError>;

    /// Marks a pending payment as completed.
    async fn confirm(&self, payment_id: &str) -> Result<(), ServiceError>;

    /// Marks a pending payment as failed.
    async fn mark_failed(&self, payment_id: &str) -> Result<(), ServiceError>;

    /// Refunds a pending or completed payment.
    ///
    /// Payments in any other status are left alone. Returns the status after
    /// the call.
    async fn refund(&self, payment_id: &str) -> Result<PaymentStatus, ServiceError>;

    /// Returns the status of a payment.
    async fn status(&self, payment_id: &str) -> Result<Option<PaymentStatus>, ServiceError>;
}

#[derive(Debug, Clone)]
struct PaymentRecord {
    order_id: String,
    amount_cents: u64,
    method: PaymentMethod,
    status: PaymentStatus,
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    payments: HashMap<String, PaymentRecord>,
    next_id: u32,
    fail_on_create: bool,
}

/// In-memory payment service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentService {
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentService {
    /// Creates a new in-memory payment service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the service to reject new payments.
    pub async fn set_fail_on_create(&self, fail: bool) {
        self.state.write().await.fail_on_create = fail;
    }

    /// Returns the number of payments in `status`.
    pub async fn count_with_status(&self, status: PaymentStatus) -> usize {
        self.state
            .read()
            .await
            .payments
            .values()
            .filter(|p| p.status == status)
            .count()
    }

    /// Returns the order, amount and method recorded for a payment.
    pub async fn details(&self, payment_id: &str) -> Option<(String, u64, PaymentMethod)> {
        self.state
            .read()
            .await
            .payments
            .get(payment_id)
            .map(|p| (p.order_id.clone(), p.amount_cents, p.method))
    }

    async fn transition(
        &self,
        payment_id: &str,
        to: PaymentStatus,
    ) -> Result<(), ServiceError> {
        let mut state = self.state.write().await;
        let payment = state
            .payments
            .get_mut(payment_id)
            .ok_or_else(|| ServiceError::NotFound {
                kind: "Payment",
                id: payment_id.to_string(),
            })?;

        if payment.status != PaymentStatus::Pending {
            return Err(ServiceError::InvalidState {
                kind: "Payment",
                id: payment_id.to_string(),
                status: payment.status.to_string(),
                expected: "pending",
            });
        }
        payment.status = to;
        Ok(())
    }
}

#[async_trait]
impl PaymentService for InMemoryPaymentService {
    async fn create_pending(
        &self,
        order_id: &str,
        amount_cents: u64,
        method: PaymentMethod,
    ) -> Result<String, ServiceError> {
        let mut state = self.state.write().await;

        if state.fail_on_create {
            return Err(ServiceError::Rejected("Payment declined".to_string()));
        }

        state.next_id += 1;
        let payment_id = format!("PAY-{:04}", state.next_id);
        state.payments.insert(
            payment_id.clone(),
            PaymentRecord {
                order_id: order_id.to_string(),
                amount_cents,
                method,
                status: PaymentStatus::Pending,
            },
        );

        Ok(payment_id)
    }

    async fn confirm(&self, payment_id: &str) -> Result<(), ServiceError> {
        self.transition(payment_id, PaymentStatus::Completed).await
    }

    async fn mark_failed(&self, payment_id: &str) -> Result<(), ServiceError> {
        self.transition(payment_id, PaymentStatus::Failed).await
    }

    async fn refund(&self, payment_id: &str) -> Result<PaymentStatus, ServiceError> {
        let mut state = self.state.write().await;
        let payment = state
            .payments
            .get_mut(payment_id)
            .ok_or_else(|| ServiceError::NotFound {
                kind: "Payment",
                id: payment_id.to_string(),
            })?;

        if matches!(
            payment.status,
            PaymentStatus::Pending | PaymentStatus::Completed
        ) {
            payment.status = PaymentStatus::Refunded;
        }
        Ok(payment.status)
    }

    async fn status(&self, payment_id: &str) -> Result<Option<PaymentStatus>, ServiceError> {
        Ok(self
            .state
            .read()
            .await
            .payments
            .get(payment_id)
            .map(|p| p.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_confirm_and_refund() {
        let service = InMemoryPaymentService::new();

        let payment_id = service
            .create_pending("ORD-1", 4500, PaymentMethod::CreditCard)
            .await
            .unwrap();
        assert!(payment_id.starts_with("PAY-"));
        assert_eq!(
            service.status(&payment_id).await.unwrap(),
            Some(PaymentStatus::Pending)
        );

        service.confirm(&payment_id).await.unwrap();
        assert_eq!(
            service.refund(&payment_id).await.unwrap(),
            PaymentStatus::Refunded
        );
        assert_eq!(service.count_with_status(PaymentStatus::Refunded).await, 1);
    }

    #[tokio::test]
    async fn test_fail_on_create() {
        let service = InMemoryPaymentService::new();
        service.set_fail_on_create(true).await;

        let result = service
            .create_pending("ORD-1", 4500, PaymentMethod::Cash)
            .await;
        assert_eq!(
            result,
            Err(ServiceError::Rejected("Payment declined".to_string()))
        );
    }

    #[tokio::test]
    async fn test_refund_leaves_failed_payment_alone() {
        let service = InMemoryPaymentService::new();
        let payment_id = service
            .create_pending("ORD-1", 1000, PaymentMethod::Cash)
            .await
            .unwrap();

        service.mark_failed(&payment_id).await.unwrap();
        assert_eq!(
            service.refund(&payment_id).await.unwrap(),
            PaymentStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_confirm_requires_pending() {
        let service = InMemoryPaymentService::new();
        let payment_id = service
            .create_pending("ORD-1", 1000, PaymentMethod::Cash)
            .await
            .unwrap();

        service.confirm(&payment_id).await.unwrap();
        assert!(matches!(
            service.confirm(&payment_id).await,
            Err(ServiceError::InvalidState { .. })
        ));
        assert!(matches!(
            service.confirm("PAY-9999").await,
            Err(ServiceError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_sequential_payment_ids() {
        let service = InMemoryPaymentService::new();

        let p1 = service
            .create_pending("ORD-1", 1000, PaymentMethod::Cash)
            .await
            .unwrap();
        let p2 = service
            .create_pending("ORD-2", 1000, PaymentMethod::Cash)
            .await
            .unwrap();

        assert_eq!(p1, "PAY-0001");
        assert_eq!(p2, "PAY-0002");
        assert_eq!(
            service.details(&p2).await,
            Some(("ORD-2".to_string(), 1000, PaymentMethod::Cash))
        );
    }
}
