//! Property tests for cart arithmetic and point redemption.

#![allow(clippy::unwrap_used)]

use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use zync::cart::{CartAction, CartEnvironment, CartReducer, CartState, RedemptionQuote, SimulatedGateway};
use zync::fixtures;
use zync::types::{Product, ProductId};
use zync_core::reducer::Reducer;
use zync_testing::test_clock;

#[derive(Clone, Debug)]
enum Op {
    Add(usize),
    RemoveOne(usize),
    RemoveLine(usize),
    Clear,
}

fn arb_op(products: usize) -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (0..products).prop_map(Op::Add),
        3 => (0..products).prop_map(Op::RemoveOne),
        1 => (0..products).prop_map(Op::RemoveLine),
        1 => Just(Op::Clear),
    ]
}

fn environment() -> CartEnvironment {
    CartEnvironment::new(
        SimulatedGateway::approving(Duration::ZERO).shared(),
        Arc::new(test_clock()),
    )
}

fn action(op: &Op, menu: &[Product]) -> CartAction {
    match op {
        Op::Add(i) => CartAction::AddToCart {
            product: menu[*i].clone(),
        },
        Op::RemoveOne(i) => CartAction::RemoveItemQuantity {
            product_id: menu[*i].id.clone(),
        },
        Op::RemoveLine(i) => CartAction::RemoveFromCart {
            product_id: menu[*i].id.clone(),
        },
        Op::Clear => CartAction::ClearCart,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Cart lines always agree with a plain per-product count.
    #[test]
    fn prop_cart_matches_a_counting_model(ops in prop::collection::vec(arb_op(fixtures::menu().len()), 0..60)) {
        let menu = fixtures::menu();
        let env = environment();
        let reducer = CartReducer::new();
        let mut state = CartState::new();
        let mut model: HashMap<ProductId, u32> = HashMap::new();

        for op in &ops {
            let _ = reducer.reduce(&mut state, action(op, &menu), &env);
            match op {
                Op::Add(i) => *model.entry(menu[*i].id.clone()).or_default() += 1,
                Op::RemoveOne(i) => {
                    if let Some(count) = model.get_mut(&menu[*i].id) {
                        *count -= 1;
                        if *count == 0 {
                            model.remove(&menu[*i].id);
                        }
                    }
                },
                Op::RemoveLine(i) => {
                    model.remove(&menu[*i].id);
                },
                Op::Clear => model.clear(),
            }
        }

        prop_assert_eq!(state.items().len(), model.len());
        for item in state.items() {
            prop_assert!(item.quantity() > 0);
            prop_assert_eq!(Some(&item.quantity()), model.get(&item.product().id));
        }

        let expected_items: u64 = model.values().map(|q| u64::from(*q)).sum();
        let expected_amount: u64 = menu
            .iter()
            .map(|p| p.price * u64::from(model.get(&p.id).copied().unwrap_or(0)))
            .sum();
        prop_assert_eq!(state.total_items(), expected_items);
        prop_assert_eq!(state.total_amount(), expected_amount);
    }

    /// Redemption never discounts more than the cart or the points cover.
    #[test]
    fn prop_redemption_is_bounded(total in 0u64..1_000_000, points in 0u64..1_000_000) {
        let quote = RedemptionQuote::new(total, points);

        prop_assert_eq!(quote.discount, total.min(points));
        prop_assert_eq!(quote.final_total + quote.discount, total);
        prop_assert!(quote.final_total <= total);
    }

    /// Lines keep the position of their first insertion.
    #[test]
    fn prop_adding_preserves_line_order(picks in prop::collection::vec(0usize..8, 1..30)) {
        let menu = fixtures::menu();
        let env = environment();
        let reducer = CartReducer::new();
        let mut state = CartState::new();
        let mut first_seen: Vec<usize> = Vec::new();

        for i in &picks {
            let _ = reducer.reduce(&mut state, CartAction::AddToCart { product: menu[*i].clone() }, &env);
            if !first_seen.contains(i) {
                first_seen.push(*i);
            }
        }

        let ids: Vec<_> = state.items().iter().map(|item| item.product().id.clone()).collect();
        let expected: Vec<_> = first_seen.iter().map(|i| menu[*i].id.clone()).collect();
        prop_assert_eq!(ids, expected);
    }
}
