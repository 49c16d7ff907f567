//! Quantity folding.
//!
//! Current stock is never stored; it is always the fold of the full movement
//! history for the requested scope.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use stockledger_core::{ItemId, LocationId};

use crate::movement::StockMovement;

/// Σ INCOME + Σ ADJUSTMENT − Σ ISSUE over `movements`.
///
/// Movement quantities are bounded by `MAX_QUANTITY`, so a balance only nears
/// the `Decimal` range after an unrealistic number of movements; the sum
/// saturates there instead of overflowing.
pub fn fold_quantity<'a>(movements: impl IntoIterator<Item = &'a StockMovement>) -> Decimal {
    movements
        .into_iter()
        .fold(Decimal::ZERO, |acc, m| accumulate(acc, m))
}

pub(crate) fn accumulate(balance: Decimal, movement: &StockMovement) -> Decimal {
    balance.saturating_add(movement.kind.signed_effect(movement.quantity))
}

/// Quantity of `item_id`, either across all locations or at one location.
pub fn resolve<'a>(
    movements: impl IntoIterator<Item = &'a StockMovement>,
    item_id: ItemId,
    location_id: Option<LocationId>,
) -> Decimal {
    fold_quantity(movements.into_iter().filter(|m| {
        m.item_id == item_id && location_id.is_none_or(|l| m.location_id == Some(l))
    }))
}

/// Per-item quantities at one location (items with a zero balance included).
pub fn stock_by_item<'a>(
    movements: impl IntoIterator<Item = &'a StockMovement>,
    location_id: LocationId,
) -> BTreeMap<ItemId, Decimal> {
    let mut out: BTreeMap<ItemId, Decimal> = BTreeMap::new();
    for m in movements {
        if m.location_id != Some(location_id) {
            continue;
        }
        let balance = out.entry(m.item_id).or_insert(Decimal::ZERO);
        *balance = accumulate(*balance, m);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use stockledger_core::MovementId;

    use crate::movement::{AppendMovement, MovementKind};

    fn movement(
        item: ItemId,
        location: Option<LocationId>,
        kind: MovementKind,
        qty: i64,
    ) -> StockMovement {
        let mut cmd = AppendMovement::new(item, kind, Decimal::from(qty));
        cmd.location_id = location;
        cmd.stamp(MovementId::new(), Utc::now()).commit(1)
    }

    #[test]
    fn fold_adds_income_and_adjustment_and_subtracts_issue() {
        let item = ItemId::new();
        let history = vec![
            movement(item, None, MovementKind::Income, 10),
            movement(item, None, MovementKind::Issue, 4),
            movement(item, None, MovementKind::Adjustment, -1),
            movement(item, None, MovementKind::Adjustment, 3),
        ];
        assert_eq!(fold_quantity(&history), Decimal::from(8));
    }

    #[test]
    fn resolve_scopes_by_item_and_location() {
        let item = ItemId::new();
        let other = ItemId::new();
        let a = LocationId::new();
        let b = LocationId::new();
        let history = vec![
            movement(item, Some(a), MovementKind::Income, 10),
            movement(item, Some(b), MovementKind::Income, 5),
            movement(item, None, MovementKind::Issue, 2),
            movement(other, Some(a), MovementKind::Income, 100),
        ];

        assert_eq!(resolve(&history, item, Some(a)), Decimal::from(10));
        assert_eq!(resolve(&history, item, Some(b)), Decimal::from(5));
        assert_eq!(resolve(&history, item, None), Decimal::from(13));
    }

    #[test]
    fn balances_near_the_decimal_range_saturate() {
        let item = ItemId::new();
        let location = LocationId::new();
        let mut huge = movement(item, Some(location), MovementKind::Income, 1);
        huge.quantity = Decimal::MAX;
        let history = vec![huge.clone(), huge];

        assert_eq!(resolve(&history, item, Some(location)), Decimal::MAX);
        assert_eq!(stock_by_item(&history, location)[&item], Decimal::MAX);
    }

    #[test]
    fn stock_by_item_groups_one_location() {
        let x = ItemId::new();
        let y = ItemId::new();
        let a = LocationId::new();
        let history = vec![
            movement(x, Some(a), MovementKind::Income, 3),
            movement(y, Some(a), MovementKind::Income, 7),
            movement(y, Some(a), MovementKind::Issue, 7),
            movement(x, None, MovementKind::Income, 50),
        ];
        let grouped = stock_by_item(&history, a);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[&x], Decimal::from(3));
        assert_eq!(grouped[&y], Decimal::ZERO);
    }

    fn kind_strategy() -> impl Strategy<Value = MovementKind> {
        prop_oneof![
            Just(MovementKind::Income),
            Just(MovementKind::Issue),
            Just(MovementKind::Adjustment),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: the fold equals the algebraic sum regardless of the order
        /// in which movements were appended.
        #[test]
        fn fold_is_order_independent(
            entries in prop::collection::vec((kind_strategy(), 1i64..10_000i64, any::<bool>()), 0..40)
                .prop_shuffle()
        ) {
            let item = ItemId::new();
            let location = LocationId::new();

            let history: Vec<StockMovement> = entries
                .iter()
                .map(|(kind, qty, negative)| {
                    let qty = if *kind == MovementKind::Adjustment && *negative { -qty } else { *qty };
                    movement(item, Some(location), *kind, qty)
                })
                .collect();

            let mut expected = Decimal::ZERO;
            for m in &history {
                match m.kind {
                    MovementKind::Income => expected += m.quantity,
                    MovementKind::Adjustment => expected += m.quantity,
                    MovementKind::Issue => expected -= m.quantity,
                }
            }

            let mut reversed = history.clone();
            reversed.reverse();

            prop_assert_eq!(resolve(&history, item, Some(location)), expected);
            prop_assert_eq!(resolve(&reversed, item, Some(location)), expected);
        }
    }
}
