//! Cart store: cart lines, totals, and the checkout state machine.
//!
//! ```text
//!            checkout            approved
//!   Idle ───────────► Processing ────────► Success ──finish──► Idle (cart cleared)
//!    ▲                   │   │ declined
//!    │       cancel      │   └───────────► Failed ──reset / checkout──► Idle / Processing
//!    └───────────────────┘
//! ```
//!
//! One checkout may be in flight per cart. The gateway call runs as a
//! cancellable effect; its result is applied only if it answers the attempt
//! that is still processing, so results of cancelled or superseded attempts
//! never touch state.

mod gateway;

pub use gateway::{
    approval_probability, ChargeFuture, PaymentError, PaymentGateway, PaymentReceipt, SimulatedGateway,
    DECLINED_BY_BANK, DEFAULT_APPROVAL_RATE,
};

use crate::ledger::OrderLedger;
use crate::types::{ActiveOrder, CartItem, CheckoutAttemptId, OrderId, OrderStatus, Product, ProductId};
use std::sync::Arc;
use zync_core::effect::{Effect, EffectId};
use zync_core::environment::Clock;
use zync_core::reducer::Reducer;
use zync_core::{smallvec, SmallVec};

/// Cancellation key of the in-flight gateway call
const CHECKOUT_EFFECT: &str = "cart-checkout";

/// Discount from redeeming loyalty points against a cart
///
/// Points redeem 1:1, so `discount = min(cart_total, points)` and the final
/// total can never go below zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RedemptionQuote {
    /// Cart total before discount
    pub cart_total: u64,
    /// Points applied
    pub discount: u64,
    /// Amount to charge
    pub final_total: u64,
}

impl RedemptionQuote {
    /// Quote for redeeming up to `points` against `cart_total`
    #[must_use]
    pub const fn new(cart_total: u64, points: u64) -> Self {
        let discount = if points < cart_total { points } else { cart_total };
        Self {
            cart_total,
            discount,
            final_total: cart_total - discount,
        }
    }

    /// Quote with redemption switched off
    #[must_use]
    pub const fn without_redemption(cart_total: u64) -> Self {
        Self::new(cart_total, 0)
    }
}

/// A checkout waiting for the gateway
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingCheckout {
    /// Attempt id
    pub attempt: CheckoutAttemptId,
    /// Pricing at the moment checkout started
    pub quote: RedemptionQuote,
    /// Cart lines at the moment checkout started
    pub items: Vec<CartItem>,
    /// Venue the order is for
    pub establishment_name: Option<String>,
}

/// Checkout phase
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum CheckoutPhase {
    /// Nothing happening
    #[default]
    Idle,
    /// Waiting for the gateway
    Processing(PendingCheckout),
    /// Charge approved; the order is in the ledger
    Success {
        /// Order number
        order_id: OrderId,
    },
    /// Charge refused; cart and ledger untouched
    Failed {
        /// Decline reason
        reason: String,
    },
}

/// Cart state
#[derive(Clone, Debug, Default)]
pub struct CartState {
    items: Vec<CartItem>,
    /// Checkout progress
    pub phase: CheckoutPhase,
    /// Orders placed from this cart
    pub ledger: OrderLedger,
    /// Reason the last command was rejected
    pub last_error: Option<String>,
}

impl CartState {
    /// Empty cart
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cart lines in insertion order
    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// `Σ price × quantity`
    #[must_use]
    pub fn total_amount(&self) -> u64 {
        self.items.iter().map(CartItem::subtotal).sum()
    }

    /// `Σ quantity`
    #[must_use]
    pub fn total_items(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.quantity())).sum()
    }

    /// Units of `product_id` in the cart
    #[must_use]
    pub fn quantity_of(&self, product_id: &ProductId) -> u32 {
        self.items
            .iter()
            .find(|i| &i.product().id == product_id)
            .map_or(0, CartItem::quantity)
    }

    /// `true` when the cart has no lines
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// `true` while a checkout waits for the gateway
    #[must_use]
    pub const fn is_processing(&self) -> bool {
        matches!(self.phase, CheckoutPhase::Processing(_))
    }
}

/// How a checkout ended, as seen by the caller that started it
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckoutOutcome {
    /// Approved; the order is in the ledger
    Succeeded {
        /// Order number
        order_id: OrderId,
    },
    /// Declined by the gateway
    Failed {
        /// Decline reason
        reason: String,
    },
    /// Never reached the gateway
    Rejected {
        /// Why
        reason: String,
    },
    /// Cancelled while processing
    Cancelled,
}

impl CheckoutOutcome {
    /// The outcome `action` reports for `attempt`, if any
    #[must_use]
    pub fn for_attempt(action: &CartAction, attempt: CheckoutAttemptId) -> Option<Self> {
        match action {
            CartAction::PaymentApproved { attempt: a, receipt } if *a == attempt => Some(Self::Succeeded {
                order_id: receipt.order_id.clone(),
            }),
            CartAction::PaymentDeclined { attempt: a, reason } if *a == attempt => {
                Some(Self::Failed { reason: reason.clone() })
            },
            CartAction::CheckoutRejected { attempt: a, reason } if *a == attempt => {
                Some(Self::Rejected { reason: reason.clone() })
            },
            CartAction::CheckoutCancelled { attempt: a } if *a == attempt => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Cart actions
#[derive(Clone, Debug)]
pub enum CartAction {
    // Commands
    /// Add one unit of `product`
    AddToCart {
        /// Product
        product: Product,
    },
    /// Remove one unit; the line disappears at zero
    RemoveItemQuantity {
        /// Product id
        product_id: ProductId,
    },
    /// Remove the whole line
    RemoveFromCart {
        /// Product id
        product_id: ProductId,
    },
    /// Empty the cart
    ClearCart,
    /// Start a checkout
    Checkout {
        /// Correlates the outcome
        attempt: CheckoutAttemptId,
        /// Points the user agreed to redeem; 0 disables redemption
        redeemable_points: u64,
        /// Venue the order is for
        establishment_name: Option<String>,
    },
    /// Abort the checkout that is processing
    CancelCheckout,
    /// Leave `Failed` for `Idle`
    ResetCheckout,
    /// Leave `Success`, clearing the cart
    FinishCheckout,
    /// Fulfilment says the order can be picked up
    MarkOrderReady {
        /// Order number
        order_id: OrderId,
    },

    // Events
    /// Gateway approved the charge
    PaymentApproved {
        /// Attempt being answered
        attempt: CheckoutAttemptId,
        /// Receipt
        receipt: PaymentReceipt,
    },
    /// Gateway refused the charge
    PaymentDeclined {
        /// Attempt being answered
        attempt: CheckoutAttemptId,
        /// Reason
        reason: String,
    },
    /// Checkout refused before reaching the gateway
    CheckoutRejected {
        /// Attempt refused
        attempt: CheckoutAttemptId,
        /// Reason
        reason: String,
    },
    /// Processing attempt was cancelled
    CheckoutCancelled {
        /// Attempt cancelled
        attempt: CheckoutAttemptId,
    },
}

/// Cart environment
#[derive(Clone)]
pub struct CartEnvironment {
    /// Charges checkouts
    pub gateway: Arc<dyn PaymentGateway>,
    /// Order timestamps
    pub clock: Arc<dyn Clock>,
}

impl CartEnvironment {
    /// Creates a new cart environment
    #[must_use]
    pub fn new(gateway: Arc<dyn PaymentGateway>, clock: Arc<dyn Clock>) -> Self {
        Self { gateway, clock }
    }
}

/// Cart reducer
#[derive(Clone, Debug, Default)]
pub struct CartReducer;

impl CartReducer {
    /// Creates a new cart reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn reject(state: &mut CartState, attempt: CheckoutAttemptId, reason: &str) -> SmallVec<[Effect<CartAction>; 4]> {
        tracing::debug!(%attempt, reason, "Checkout rejected");
        state.last_error = Some(reason.to_string());
        let reason = reason.to_string();
        smallvec![Effect::future(async move {
            Some(CartAction::CheckoutRejected { attempt, reason })
        })]
    }

    fn charge_effect(env: &CartEnvironment, attempt: CheckoutAttemptId, amount: u64) -> Effect<CartAction> {
        let gateway = Arc::clone(&env.gateway);
        Effect::future(async move {
            Some(match gateway.charge(attempt, amount).await {
                Ok(receipt) => CartAction::PaymentApproved { attempt, receipt },
                Err(e) => CartAction::PaymentDeclined {
                    attempt,
                    reason: e.to_string(),
                },
            })
        })
        .cancellable(EffectId::new(CHECKOUT_EFFECT))
    }

    /// Take the pending checkout if `attempt` is the one processing
    fn take_pending(state: &mut CartState, attempt: CheckoutAttemptId) -> Option<PendingCheckout> {
        match &state.phase {
            CheckoutPhase::Processing(pending) if pending.attempt == attempt => {
                match std::mem::take(&mut state.phase) {
                    CheckoutPhase::Processing(pending) => Some(pending),
                    _ => None,
                }
            },
            _ => {
                tracing::debug!(%attempt, "Ignoring gateway result for a stale checkout");
                None
            },
        }
    }
}

impl Reducer for CartReducer {
    type State = CartState;
    type Action = CartAction;
    type Environment = CartEnvironment;

    #[allow(clippy::too_many_lines)] // One arm per action
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ========== Cart lines ==========
            CartAction::AddToCart { product } => {
                state.last_error = None;
                match state.items.iter_mut().find(|i| i.product().id == product.id) {
                    Some(item) => item.increment(),
                    None => state.items.push(CartItem::new(product)),
                }
                smallvec![Effect::None]
            },

            CartAction::RemoveItemQuantity { product_id } => {
                state.last_error = None;
                if let Some(index) = state.items.iter().position(|i| i.product().id == product_id) {
                    let item = state.items.remove(index);
                    if let Some(item) = item.decrement() {
                        state.items.insert(index, item);
                    }
                }
                smallvec![Effect::None]
            },

            CartAction::RemoveFromCart { product_id } => {
                state.last_error = None;
                state.items.retain(|i| i.product().id != product_id);
                smallvec![Effect::None]
            },

            CartAction::ClearCart => {
                state.last_error = None;
                state.items.clear();
                smallvec![Effect::None]
            },

            // ========== Checkout ==========
            CartAction::Checkout {
                attempt,
                redeemable_points,
                establishment_name,
            } => {
                state.last_error = None;
                match state.phase {
                    CheckoutPhase::Processing(_) => {
                        return Self::reject(state, attempt, "A checkout is already in progress");
                    },
                    CheckoutPhase::Success { .. } => {
                        return Self::reject(state, attempt, "Finish the completed checkout first");
                    },
                    CheckoutPhase::Idle | CheckoutPhase::Failed { .. } => {},
                }
                if state.items.is_empty() {
                    return Self::reject(state, attempt, "Cart is empty");
                }

                let quote = RedemptionQuote::new(state.total_amount(), redeemable_points);
                tracing::info!(
                    %attempt,
                    cart_total = quote.cart_total,
                    discount = quote.discount,
                    final_total = quote.final_total,
                    "Checkout started"
                );
                state.phase = CheckoutPhase::Processing(PendingCheckout {
                    attempt,
                    quote,
                    items: state.items.clone(),
                    establishment_name,
                });
                smallvec![Self::charge_effect(env, attempt, quote.final_total)]
            },

            CartAction::PaymentApproved { attempt, receipt } => {
                let Some(pending) = Self::take_pending(state, attempt) else {
                    return smallvec![Effect::None];
                };

                metrics::counter!("zync.checkout.completed", "outcome" => "approved").increment(1);
                tracing::info!(order_id = %receipt.order_id, total = pending.quote.final_total, "Order placed");
                state.ledger.record(ActiveOrder {
                    id: receipt.order_id.clone(),
                    items: pending.items,
                    total: pending.quote.final_total,
                    savings: pending.quote.discount,
                    status: OrderStatus::Pending,
                    establishment_name: pending.establishment_name,
                    placed_at: env.clock.now(),
                });
                state.phase = CheckoutPhase::Success {
                    order_id: receipt.order_id,
                };
                smallvec![Effect::None]
            },

            CartAction::PaymentDeclined { attempt, reason } => {
                if Self::take_pending(state, attempt).is_some() {
                    metrics::counter!("zync.checkout.completed", "outcome" => "declined").increment(1);
                    tracing::info!(%attempt, %reason, "Checkout declined");
                    state.phase = CheckoutPhase::Failed { reason };
                }
                smallvec![Effect::None]
            },

            CartAction::CancelCheckout => match std::mem::take(&mut state.phase) {
                CheckoutPhase::Processing(pending) => {
                    metrics::counter!("zync.checkout.completed", "outcome" => "cancelled").increment(1);
                    tracing::info!(attempt = %pending.attempt, "Checkout cancelled");
                    let attempt = pending.attempt;
                    smallvec![
                        Effect::Cancel(EffectId::new(CHECKOUT_EFFECT)),
                        Effect::future(async move { Some(CartAction::CheckoutCancelled { attempt }) }),
                    ]
                },
                other => {
                    state.phase = other;
                    smallvec![Effect::None]
                },
            },

            CartAction::ResetCheckout => {
                if matches!(state.phase, CheckoutPhase::Failed { .. }) {
                    state.phase = CheckoutPhase::Idle;
                }
                smallvec![Effect::None]
            },

            CartAction::FinishCheckout => {
                state.last_error = None;
                if matches!(state.phase, CheckoutPhase::Success { .. }) {
                    state.items.clear();
                    state.phase = CheckoutPhase::Idle;
                } else {
                    state.last_error = Some("No completed checkout to finish".to_string());
                }
                smallvec![Effect::None]
            },

            CartAction::MarkOrderReady { order_id } => {
                state.last_error = None;
                if !state.ledger.mark_ready(&order_id) {
                    state.last_error = Some(format!("Unknown order {order_id}"));
                }
                smallvec![Effect::None]
            },

            CartAction::CheckoutRejected { .. } | CartAction::CheckoutCancelled { .. } => {
                smallvec![Effect::None]
            },
        }
    }
}
