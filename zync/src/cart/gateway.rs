//! Payment gateway seam used by checkout.

use crate::types::{CheckoutAttemptId, OrderId};
use rand::Rng;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Message used when the simulated bank refuses a charge
pub const DECLINED_BY_BANK: &str = "Payment declined by bank";

/// Approval probability used when none, or a non-finite one, is configured
pub const DEFAULT_APPROVAL_RATE: f64 = 0.9;

/// First ticket number issued by [`SimulatedGateway`]
const FIRST_TICKET: u32 = 1000;

/// Count of four-digit ticket numbers
const TICKET_SPAN: u32 = 9000;

/// Why a charge did not go through
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PaymentError {
    /// Refused by the issuer
    #[error("{reason}")]
    Declined {
        /// Decline reason
        reason: String,
    },
    /// Processor could not be reached
    #[error("Payment service unavailable: {message}")]
    Unavailable {
        /// Error message
        message: String,
    },
}

/// An approved charge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReceipt {
    /// Order number assigned to the purchase
    pub order_id: OrderId,
    /// Amount charged
    pub amount: u64,
}

/// Boxed future returned by [`PaymentGateway::charge`]
pub type ChargeFuture = Pin<Box<dyn Future<Output = Result<PaymentReceipt, PaymentError>> + Send>>;

/// Payment gateway trait
pub trait PaymentGateway: Send + Sync {
    /// Charge `amount` for one checkout attempt
    fn charge(&self, attempt: CheckoutAttemptId, amount: u64) -> ChargeFuture;
}

/// Gateway that waits a fixed latency, then approves with a fixed probability
///
/// Ticket numbers are four digits. They are handed out sequentially from a
/// random start, so the next 9000 orders from one gateway never repeat.
#[derive(Clone, Debug)]
pub struct SimulatedGateway {
    latency: Duration,
    approval_rate: f64,
    next_ticket: Arc<AtomicU32>,
}

impl SimulatedGateway {
    /// Creates a gateway; see [`approval_probability`] for how the rate is read
    #[must_use]
    pub fn new(latency: Duration, approval_rate: f64) -> Self {
        Self {
            latency,
            approval_rate: approval_probability(approval_rate),
            next_ticket: Arc::new(AtomicU32::new(rand::thread_rng().gen_range(0..TICKET_SPAN))),
        }
    }

    /// Gateway that approves every charge after `latency`
    #[must_use]
    pub fn approving(latency: Duration) -> Self {
        Self::new(latency, 1.0)
    }

    /// Gateway that declines every charge after `latency`
    #[must_use]
    pub fn declining(latency: Duration) -> Self {
        Self::new(latency, 0.0)
    }

    /// Creates an Arc-wrapped instance for sharing
    #[must_use]
    pub fn shared(self) -> Arc<dyn PaymentGateway> {
        Arc::new(self)
    }

    fn next_order_id(&self) -> OrderId {
        let n = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        OrderId::new((FIRST_TICKET + n % TICKET_SPAN).to_string())
    }
}

/// Clamp a configured approval rate to `[0, 1]`
///
/// `NaN` and infinities fall back to [`DEFAULT_APPROVAL_RATE`].
#[must_use]
pub fn approval_probability(rate: f64) -> f64 {
    if rate.is_finite() {
        rate.clamp(0.0, 1.0)
    } else {
        DEFAULT_APPROVAL_RATE
    }
}

impl PaymentGateway for SimulatedGateway {
    fn charge(&self, attempt: CheckoutAttemptId, amount: u64) -> ChargeFuture {
        let gateway = self.clone();
        Box::pin(async move {
            tokio::time::sleep(gateway.latency).await;

            let approved = rand::thread_rng().gen_bool(gateway.approval_rate);
            if !approved {
                tracing::info!(%attempt, amount, "Simulated charge declined");
                return Err(PaymentError::Declined {
                    reason: DECLINED_BY_BANK.to_string(),
                });
            }

            let order_id = gateway.next_order_id();
            tracing::info!(%attempt, amount, order_id = %order_id, "Simulated charge approved");
            Ok(PaymentReceipt { order_id, amount })
        })
    }
}
