//! Order ledger: orders produced by successful checkouts, newest first.

use crate::types::{ActiveOrder, OrderId, OrderStatus};

/// Append-only list of orders
///
/// The only in-place change is a status move from `Pending` to `Ready`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrderLedger {
    orders: Vec<ActiveOrder>,
}

impl OrderLedger {
    /// Empty ledger
    #[must_use]
    pub const fn new() -> Self {
        Self { orders: Vec::new() }
    }

    /// Add an order in front of the older ones
    pub fn record(&mut self, order: ActiveOrder) {
        self.orders.insert(0, order);
    }

    /// Move an order from `Pending` to `Ready`
    ///
    /// Returns `false` if no order has this id. Marking a ready order again is
    /// a no-op that still returns `true`.
    pub fn mark_ready(&mut self, order_id: &OrderId) -> bool {
        match self.orders.iter_mut().find(|o| &o.id == order_id) {
            Some(order) => {
                order.status = OrderStatus::Ready;
                true
            },
            None => false,
        }
    }

    /// All orders, newest first
    #[must_use]
    pub fn orders(&self) -> &[ActiveOrder] {
        &self.orders
    }

    /// Look up an order
    #[must_use]
    pub fn get(&self, order_id: &OrderId) -> Option<&ActiveOrder> {
        self.orders.iter().find(|o| &o.id == order_id)
    }

    /// Orders still being prepared, newest first
    pub fn pending(&self) -> impl Iterator<Item = &ActiveOrder> {
        self.orders
            .iter()
            .filter(|o| o.status == OrderStatus::Pending)
    }

    /// Number of orders
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    /// `true` if no order was ever recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zync_testing::test_clock;
    use zync_core::environment::Clock;

    fn order(id: &str) -> ActiveOrder {
        ActiveOrder {
            id: OrderId::new(id),
            items: Vec::new(),
            total: 1000,
            savings: 0,
            status: OrderStatus::Pending,
            establishment_name: None,
            placed_at: test_clock().now(),
        }
    }

    #[test]
    fn newest_order_comes_first() {
        let mut ledger = OrderLedger::new();
        ledger.record(order("1001"));
        ledger.record(order("1002"));

        let ids: Vec<_> = ledger.orders().iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, ["1002", "1001"]);
    }

    #[test]
    fn mark_ready_moves_only_the_named_order() {
        let mut ledger = OrderLedger::new();
        ledger.record(order("1001"));
        ledger.record(order("1002"));

        assert!(ledger.mark_ready(&OrderId::new("1001")));
        assert!(!ledger.mark_ready(&OrderId::new("9999")));

        let pending: Vec<_> = ledger.pending().map(|o| o.id.as_str()).collect();
        assert_eq!(pending, ["1002"]);
        assert_eq!(
            ledger.get(&OrderId::new("1001")).map(|o| o.status),
            Some(OrderStatus::Ready)
        );
    }
}
