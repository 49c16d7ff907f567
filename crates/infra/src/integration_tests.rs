//! Integration tests for the service pipeline over the in-memory store.
//!
//! Tests: request → StockLedger / ReceivingCoordinator → LedgerStore → QuantityResolver
//!
//! Verifies:
//! - Idempotent appends and receipts
//! - The issue guard under concurrent load
//! - Receiving atomicity and discrepancy signalling

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;
    use tokio::task::JoinSet;

    use stockledger_core::{DomainError, ItemId, LocationId};
    use stockledger_inventory::{
        parse_quantity, AlertKind, AppendMovement, DiscrepancyStatus, IssuePolicy, Item, Location,
        MovementKind, OpenDiscrepancy, OperationId, Reference, MAX_QUANTITY,
    };
    use stockledger_purchasing::{
        CreatePurchaseOrder, NewOrderLine, PurchaseOrder, PurchaseOrderStatus, ReceiveGoods,
        ReceiveLine,
    };

    use crate::catalog::InMemoryCatalog;
    use crate::discrepancies::{CountLine, DiscrepancyTracker, RecordCount};
    use crate::error::LedgerError;
    use crate::ledger::{LedgerOptions, StockLedger, TransferStock};
    use crate::orders::PurchaseOrders;
    use crate::receiving::ReceivingCoordinator;
    use crate::resolver::QuantityResolver;
    use crate::store::{InMemoryLedgerStore, LedgerStore, MovementFilter, Pagination};

    type Store = Arc<InMemoryLedgerStore>;
    type Cat = Arc<InMemoryCatalog>;

    struct Harness {
        store: Store,
        ledger: Arc<StockLedger<Store, Cat>>,
        resolver: QuantityResolver<Store, Cat>,
        receiving: ReceivingCoordinator<Store, Cat>,
        discrepancies: DiscrepancyTracker<Store, Cat>,
        orders: PurchaseOrders<Store, Cat>,
        bolts: ItemId,
        nuts: ItemId,
        bin_a: LocationId,
        bin_b: LocationId,
    }

    fn setup() -> Harness {
        setup_with(LedgerOptions::default())
    }

    fn setup_with(options: LedgerOptions) -> Harness {
        let store: Store = Arc::new(InMemoryLedgerStore::new());
        let catalog: Cat = Arc::new(InMemoryCatalog::new());

        let bolts = ItemId::new();
        let nuts = ItemId::new();
        catalog
            .insert_item(
                Item::new(bolts, "Bolt M6", "pcs")
                    .with_sku("BLT-M6")
                    .with_thresholds(Some(qty(5)), Some(qty(100))),
            )
            .unwrap();
        catalog.insert_item(Item::new(nuts, "Acorn nut M6", "pcs")).unwrap();

        let bin_a = LocationId::new();
        let bin_b = LocationId::new();
        catalog.insert_location(Location::new(bin_a, "A-01")).unwrap();
        catalog.insert_location(Location::new(bin_b, "B-07")).unwrap();

        let attempts = options.max_append_attempts;
        Harness {
            ledger: Arc::new(StockLedger::new(store.clone(), catalog.clone(), options)),
            resolver: QuantityResolver::new(store.clone(), catalog.clone()),
            receiving: ReceivingCoordinator::new(store.clone(), catalog.clone(), attempts),
            discrepancies: DiscrepancyTracker::new(store.clone(), catalog.clone(), attempts),
            orders: PurchaseOrders::new(store.clone(), catalog.clone(), attempts),
            store,
            bolts,
            nuts,
            bin_a,
            bin_b,
        }
    }

    fn qty(n: i64) -> Decimal {
        Decimal::from(n)
    }

    fn domain(err: LedgerError) -> DomainError {
        match err {
            LedgerError::Domain(e) => e,
            other => panic!("expected a domain error, got {other:?}"),
        }
    }

    async fn stock(h: &Harness, item: ItemId, location: LocationId, n: i64) {
        h.ledger
            .append(AppendMovement::new(item, MovementKind::Income, qty(n)).at(location))
            .await
            .unwrap();
    }

    async fn create_order(h: &Harness, lines: &[(ItemId, i64)]) -> PurchaseOrder {
        let order = h
            .orders
            .create(CreatePurchaseOrder {
                number: "PO-7".to_string(),
                supplier: Some("Acme".to_string()),
                lines: lines
                    .iter()
                    .map(|(item_id, q)| NewOrderLine {
                        item_id: *item_id,
                        quantity: qty(*q),
                    })
                    .collect(),
            })
            .await
            .unwrap();
        h.orders.send(order.id).await.unwrap()
    }

    fn receipt(order: &PurchaseOrder, received: &[i64], location: LocationId) -> ReceiveGoods {
        ReceiveGoods {
            lines: order
                .lines
                .iter()
                .zip(received)
                .map(|(line, q)| ReceiveLine {
                    order_item_id: line.id,
                    received_quantity: qty(*q),
                })
                .collect(),
            location_id: Some(location),
            operation_id: None,
            received_by: None,
        }
    }

    #[tokio::test]
    async fn same_operation_id_twice_stores_one_movement() {
        let h = setup();
        let cmd = AppendMovement::new(h.bolts, MovementKind::Income, qty(12))
            .at(h.bin_a)
            .with_operation_id(OperationId::new("delivery-991").unwrap());

        let first = h.ledger.append(cmd.clone()).await.unwrap();
        let second = h.ledger.append(cmd).await.unwrap();

        assert!(!first.replayed);
        assert!(second.replayed);
        assert_eq!(first.movement.id, second.movement.id);
        assert_eq!(
            h.resolver.quantity(h.bolts, Some(h.bin_a)).await.unwrap(),
            qty(12)
        );
    }

    #[tokio::test]
    async fn issuing_the_balance_succeeds_and_one_more_is_rejected() {
        let h = setup();
        stock(&h, h.bolts, h.bin_a, 7).await;

        let over = h
            .ledger
            .append(AppendMovement::new(h.bolts, MovementKind::Issue, qty(8)).at(h.bin_a))
            .await
            .unwrap_err();
        assert_eq!(domain(over), DomainError::insufficient(qty(8), qty(7)));
        assert_eq!(h.resolver.quantity(h.bolts, Some(h.bin_a)).await.unwrap(), qty(7));

        h.ledger
            .append(AppendMovement::new(h.bolts, MovementKind::Issue, qty(7)).at(h.bin_a))
            .await
            .unwrap();
        assert_eq!(h.resolver.quantity(h.bolts, Some(h.bin_a)).await.unwrap(), qty(0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn fifty_concurrent_issues_against_thirty_never_oversell() {
        let h = setup();
        stock(&h, h.bolts, h.bin_a, 30).await;

        let mut tasks = JoinSet::new();
        for _ in 0..50 {
            let ledger = h.ledger.clone();
            let cmd = AppendMovement::new(h.bolts, MovementKind::Issue, qty(1)).at(h.bin_a);
            tasks.spawn(async move { ledger.append(cmd).await });
        }

        let (mut ok, mut insufficient) = (0, 0);
        while let Some(result) = tasks.join_next().await {
            match result.unwrap() {
                Ok(_) => ok += 1,
                Err(e) => {
                    assert_eq!(e.code(), "INSUFFICIENT_QTY");
                    insufficient += 1;
                }
            }
        }

        assert_eq!(ok, 30);
        assert_eq!(insufficient, 20);
        assert_eq!(h.resolver.quantity(h.bolts, Some(h.bin_a)).await.unwrap(), qty(0));
    }

    #[tokio::test]
    async fn unlocated_issue_depends_on_policy() {
        let h = setup();
        let cmd = AppendMovement::new(h.nuts, MovementKind::Issue, qty(3));
        h.ledger.append(cmd.clone()).await.unwrap();
        assert_eq!(h.resolver.quantity(h.nuts, None).await.unwrap(), qty(-3));

        let strict = setup_with(LedgerOptions {
            issue_policy: IssuePolicy::RequireLocation,
            ..LedgerOptions::default()
        });
        let cmd = AppendMovement::new(strict.nuts, MovementKind::Issue, qty(3));
        let err = strict.ledger.append(cmd).await.unwrap_err();
        assert_eq!(err.code(), "BAD_REQUEST");
    }

    #[tokio::test]
    async fn unknown_references_and_bad_quantities_are_rejected() {
        let h = setup();

        let err = h
            .ledger
            .append(AppendMovement::new(ItemId::new(), MovementKind::Income, qty(1)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION");

        let err = h
            .ledger
            .append(AppendMovement::new(h.bolts, MovementKind::Income, qty(1)).at(LocationId::new()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION");

        let err = h
            .ledger
            .append(AppendMovement::new(h.bolts, MovementKind::Adjustment, Decimal::ZERO))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "BAD_QTY");

        let page = h
            .store
            .query_movements(MovementFilter::default(), Pagination::default())
            .await
            .unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn oversized_quantities_are_rejected_before_they_reach_the_ledger() {
        let h = setup();
        let huge = parse_quantity("50000000000000000000000000000").unwrap();

        let err = h
            .ledger
            .append(AppendMovement::new(h.bolts, MovementKind::Income, huge).at(h.bin_a))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "BAD_QTY");

        for _ in 0..2 {
            h.ledger
                .append(AppendMovement::new(h.bolts, MovementKind::Income, MAX_QUANTITY).at(h.bin_a))
                .await
                .unwrap();
        }
        let doubled = MAX_QUANTITY * Decimal::from(2);
        assert_eq!(h.resolver.quantity(h.bolts, Some(h.bin_a)).await.unwrap(), doubled);
        assert_eq!(h.resolver.location_stock(h.bin_a).await.unwrap()[0].qty, doubled);

        h.ledger
            .append(AppendMovement::new(h.bolts, MovementKind::Issue, MAX_QUANTITY).at(h.bin_a))
            .await
            .unwrap();
        assert_eq!(
            h.resolver.quantity(h.bolts, Some(h.bin_a)).await.unwrap(),
            MAX_QUANTITY
        );
    }

    #[tokio::test]
    async fn adjustments_are_signed() {
        let h = setup();
        stock(&h, h.bolts, h.bin_a, 10).await;
        h.ledger
            .append(AppendMovement::new(h.bolts, MovementKind::Adjustment, qty(-4)).at(h.bin_a))
            .await
            .unwrap();
        assert_eq!(h.resolver.quantity(h.bolts, Some(h.bin_a)).await.unwrap(), qty(6));
    }

    #[tokio::test]
    async fn full_receipt_posts_incomes_and_marks_order_received() {
        let h = setup();
        let order = create_order(&h, &[(h.bolts, 10), (h.nuts, 5)]).await;

        let outcome = h
            .receiving
            .receive(order.id, receipt(&order, &[10, 5], h.bin_a))
            .await
            .unwrap();

        assert_eq!(outcome.order.status, PurchaseOrderStatus::Received);
        assert_eq!(outcome.movements.len(), 2);
        assert!(outcome.discrepancies.is_empty());
        let total: Decimal = outcome.movements.iter().map(|m| m.quantity).sum();
        assert_eq!(total, qty(15));
        assert!(outcome.movements.iter().all(|m| {
            m.kind == MovementKind::Income
                && m.reference == Some(Reference::purchase_order(order.id))
        }));
        assert_eq!(
            h.orders.get(order.id).await.unwrap().status,
            PurchaseOrderStatus::Received
        );
    }

    #[tokio::test]
    async fn short_receipt_is_partial_and_opens_a_discrepancy() {
        let h = setup();
        let order = create_order(&h, &[(h.bolts, 10), (h.nuts, 5)]).await;

        let outcome = h
            .receiving
            .receive(order.id, receipt(&order, &[8, 5], h.bin_a))
            .await
            .unwrap();

        assert_eq!(outcome.order.status, PurchaseOrderStatus::Partial);
        assert_eq!(outcome.discrepancies.len(), 1);
        let d = &outcome.discrepancies[0];
        assert_eq!(d.delta, qty(-2));
        assert_eq!(d.item_id, h.bolts);
        assert_eq!(d.reference, Some(Reference::purchase_order(order.id)));

        let open = h
            .discrepancies
            .list(Some(DiscrepancyStatus::Open))
            .await
            .unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(h.resolver.quantity(h.bolts, Some(h.bin_a)).await.unwrap(), qty(8));
    }

    #[tokio::test]
    async fn over_receipt_stays_partial_and_records_the_surplus() {
        let h = setup();
        let order = create_order(&h, &[(h.bolts, 10), (h.nuts, 5)]).await;

        let outcome = h
            .receiving
            .receive(order.id, receipt(&order, &[12, 5], h.bin_a))
            .await
            .unwrap();

        assert_eq!(outcome.order.status, PurchaseOrderStatus::Partial);
        assert_eq!(outcome.movements.len(), 2);
        assert_eq!(outcome.discrepancies.len(), 1);
        assert_eq!(outcome.discrepancies[0].item_id, h.bolts);
        assert_eq!(outcome.discrepancies[0].delta, qty(2));
        assert_eq!(h.resolver.quantity(h.bolts, Some(h.bin_a)).await.unwrap(), qty(12));
        assert_eq!(
            h.orders.get(order.id).await.unwrap().status,
            PurchaseOrderStatus::Partial
        );
    }

    #[tokio::test]
    async fn draft_orders_are_not_received() {
        let h = setup();
        let draft = h
            .orders
            .create(CreatePurchaseOrder {
                number: "PO-8".to_string(),
                supplier: None,
                lines: vec![NewOrderLine {
                    item_id: h.bolts,
                    quantity: qty(3),
                }],
            })
            .await
            .unwrap();

        let err = h
            .receiving
            .receive(draft.id, receipt(&draft, &[3], h.bin_a))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONFLICT");
        assert_eq!(h.resolver.quantity(h.bolts, None).await.unwrap(), qty(0));
        assert_eq!(h.orders.get(draft.id).await.unwrap(), draft);
    }

    #[tokio::test]
    async fn invalid_receipt_line_posts_nothing() {
        let h = setup();
        let order = create_order(&h, &[(h.bolts, 10), (h.nuts, 5)]).await;

        let mut cmd = receipt(&order, &[10, 5], h.bin_a);
        cmd.lines[1].order_item_id = cmd.lines[0].order_item_id;
        let err = h.receiving.receive(order.id, cmd).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_LINE");

        assert_eq!(h.orders.get(order.id).await.unwrap(), order);
        assert_eq!(h.resolver.quantity(h.bolts, None).await.unwrap(), qty(0));
        assert!(h.discrepancies.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn receipt_replay_returns_the_original_postings() {
        let h = setup();
        let order = create_order(&h, &[(h.bolts, 10), (h.nuts, 5)]).await;
        let mut cmd = receipt(&order, &[8, 5], h.bin_a);
        cmd.operation_id = Some(OperationId::new("grn-2024-001").unwrap());

        let first = h.receiving.receive(order.id, cmd.clone()).await.unwrap();
        let second = h.receiving.receive(order.id, cmd).await.unwrap();

        assert!(second.replayed);
        let mut first_ids: Vec<_> = first.movements.iter().map(|m| m.id).collect();
        let mut second_ids: Vec<_> = second.movements.iter().map(|m| m.id).collect();
        first_ids.sort();
        second_ids.sort();
        assert_eq!(first_ids, second_ids);
        assert_eq!(second.discrepancies.len(), 1);
        assert_eq!(h.resolver.quantity(h.bolts, None).await.unwrap(), qty(8));
    }

    #[tokio::test]
    async fn receiving_unknown_or_closed_orders_fails() {
        let h = setup();
        let order = create_order(&h, &[(h.bolts, 1)]).await;

        let err = h
            .receiving
            .receive(stockledger_core::PurchaseOrderId::new(), receipt(&order, &[1], h.bin_a))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ORDER_NOT_FOUND");

        h.orders.close(order.id).await.unwrap();
        let err = h
            .receiving
            .receive(order.id, receipt(&order, &[1], h.bin_a))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ORDER_ALREADY_CLOSED");
    }

    #[tokio::test]
    async fn closing_a_discrepancy_twice_keeps_the_first_note() {
        let h = setup();
        let d = h
            .discrepancies
            .open(OpenDiscrepancy {
                location_id: Some(h.bin_a),
                item_id: h.bolts,
                expected_qty: qty(10),
                counted_qty: qty(9),
                session_id: Some("cycle-count-3".to_string()),
                reference: None,
                created_by: None,
            })
            .await
            .unwrap();
        assert_eq!(d.delta, qty(-1));

        h.discrepancies
            .close(d.id, Some("miscount".to_string()), None)
            .await
            .unwrap();
        let err = h
            .discrepancies
            .close(d.id, Some("second".to_string()), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ALREADY_CLOSED");

        let stored = h.discrepancies.get(d.id).await.unwrap();
        assert_eq!(stored.close_note.as_deref(), Some("miscount"));
        // Closing never corrects the books.
        assert_eq!(h.resolver.quantity(h.bolts, None).await.unwrap(), qty(0));
    }

    #[tokio::test]
    async fn transfer_moves_stock_between_locations() {
        let h = setup();
        stock(&h, h.bolts, h.bin_a, 10).await;

        let cmd = TransferStock {
            item_id: h.bolts,
            from_location_id: h.bin_a,
            to_location_id: h.bin_b,
            quantity: qty(4),
            comment: None,
            author_id: None,
            operation_id: Some(OperationId::new("move-1").unwrap()),
        };
        let outcome = h.ledger.transfer(cmd.clone()).await.unwrap();
        assert_eq!(outcome.issue.reference, outcome.income.reference);
        assert!(h.ledger.transfer(cmd).await.unwrap().replayed);

        assert_eq!(h.resolver.quantity(h.bolts, Some(h.bin_a)).await.unwrap(), qty(6));
        assert_eq!(h.resolver.quantity(h.bolts, Some(h.bin_b)).await.unwrap(), qty(4));
        assert_eq!(h.resolver.quantity(h.bolts, None).await.unwrap(), qty(10));

        let err = h
            .ledger
            .transfer(TransferStock {
                item_id: h.bolts,
                from_location_id: h.bin_b,
                to_location_id: h.bin_a,
                quantity: qty(5),
                comment: None,
                author_id: None,
                operation_id: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_QTY");
    }

    #[tokio::test]
    async fn counts_open_discrepancies_only_for_differences() {
        let h = setup();
        stock(&h, h.bolts, h.bin_a, 10).await;
        stock(&h, h.nuts, h.bin_a, 4).await;

        let opened = h
            .discrepancies
            .record_count(RecordCount {
                location_id: h.bin_a,
                session_id: Some("count-7".to_string()),
                lines: vec![
                    CountLine {
                        item_id: h.bolts,
                        counted_qty: qty(9),
                    },
                    CountLine {
                        item_id: h.nuts,
                        counted_qty: qty(4),
                    },
                ],
                counted_by: None,
            })
            .await
            .unwrap();

        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0].expected_qty, qty(10));
        assert_eq!(opened[0].counted_qty, qty(9));
        assert_eq!(opened[0].session_id.as_deref(), Some("count-7"));
    }

    #[tokio::test]
    async fn location_stock_is_sorted_by_item_name() {
        let h = setup();
        stock(&h, h.bolts, h.bin_a, 2).await;
        stock(&h, h.nuts, h.bin_a, 3).await;
        stock(&h, h.nuts, h.bin_b, 9).await;

        let lines = h.resolver.location_stock(h.bin_a).await.unwrap();
        let names: Vec<_> = lines.iter().map(|l| l.item.name.as_str()).collect();
        assert_eq!(names, ["Acorn nut M6", "Bolt M6"]);
        assert_eq!(lines[0].qty, qty(3));
        assert_eq!(lines[1].item.sku.as_deref(), Some("BLT-M6"));
    }

    #[tokio::test]
    async fn alerts_flag_items_outside_thresholds() {
        let h = setup();
        stock(&h, h.bolts, h.bin_a, 2).await;

        let alerts = h.resolver.alerts().await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].item_id, h.bolts);
        assert_eq!(alerts[0].kind, AlertKind::BelowMin);
    }

    #[tokio::test]
    async fn history_is_paginated_newest_first() {
        let h = setup();
        for n in 1..=3 {
            stock(&h, h.bolts, h.bin_a, n).await;
        }
        stock(&h, h.nuts, h.bin_a, 1).await;

        let page = h
            .store
            .query_movements(
                MovementFilter {
                    item_id: Some(h.bolts),
                    ..MovementFilter::default()
                },
                Pagination::new(Some(2), None),
            )
            .await
            .unwrap();

        assert_eq!(page.total, 3);
        assert!(page.has_more);
        assert_eq!(page.movements.len(), 2);
        assert_eq!(page.movements[0].quantity, qty(3));
    }
}
