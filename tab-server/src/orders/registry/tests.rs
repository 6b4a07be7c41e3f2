use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use shared::order::{LineItem, Money, OrderStatus};

use super::*;

fn item(product: &str, price_minor: i64, quantity: u32) -> LineItem {
    LineItem {
        product_id: product.to_string(),
        name: product.to_string(),
        unit_price: Money::from_minor(price_minor),
        quantity,
    }
}

fn starter_items() -> Vec<LineItem> {
    vec![item("paella", 1550, 2), item("sangria", 1200, 1)]
}

fn drain(rx: &mut mpsc::UnboundedReceiver<RegistryEvent>) -> Vec<RegistryEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[test]
fn test_create_and_get() {
    let (registry, mut rx) = TableRegistry::new();
    let order = registry.create(1, starter_items(), Utc::now()).unwrap();

    assert_eq!(order.total, Money::from_minor(4300));
    assert_eq!(order.sequence, 1);
    assert_eq!(registry.get(1), Some(order.clone()));
    assert_eq!(registry.get(2), None);
    assert_eq!(drain(&mut rx), vec![RegistryEvent::Created(order)]);
}

#[test]
fn test_second_create_is_rejected() {
    let (registry, mut rx) = TableRegistry::new();
    registry.create(1, starter_items(), Utc::now()).unwrap();
    let err = registry.create(1, vec![], Utc::now()).unwrap_err();

    assert_eq!(err, OrderError::AlreadyOpen(1));
    assert_eq!(drain(&mut rx).len(), 1);
    assert_eq!(registry.get(1).unwrap().total, Money::from_minor(4300));
}

#[test]
fn test_update_missing_table() {
    let (registry, mut rx) = TableRegistry::new();
    assert_eq!(
        registry.update(9, starter_items(), None).unwrap_err(),
        OrderError::NotFound(9)
    );
    assert!(drain(&mut rx).is_empty());
}

#[test]
fn test_stale_update_is_rejected_each_time() {
    let (registry, _rx) = TableRegistry::new();
    registry.create(1, starter_items(), Utc::now()).unwrap();
    registry.update(1, vec![item("paella", 1550, 1)], Some(1)).unwrap();

    for _ in 0..2 {
        let err = registry.update(1, vec![item("paella", 1550, 5)], Some(1)).unwrap_err();
        assert_eq!(
            err,
            OrderError::StaleSequence {
                table: 1,
                expected: 1,
                current: 2
            }
        );
    }
    let current = registry.get(1).unwrap();
    assert_eq!(current.sequence, 2);
    assert_eq!(current.total, Money::from_minor(1550));
}

#[test]
fn test_dining_scenario() {
    let (registry, mut rx) = TableRegistry::new();

    let created = registry.create(1, starter_items(), Utc::now()).unwrap();
    assert_eq!(created.total.to_string(), "43.00");

    let updated = registry
        .update(
            1,
            vec![
                item("paella", 1550, 3),
                item("sangria", 1200, 2),
                item("flan", 850, 1),
            ],
            None,
        )
        .unwrap();
    assert_eq!(updated.total.to_string(), "79.00");
    assert_eq!(updated.sequence, 2);
    assert_eq!(updated.start_time, created.start_time);

    let outcome = registry.transfer(1, 2).unwrap();
    assert_eq!(outcome.vacated, 1);
    assert_eq!(outcome.order.total, updated.total);
    assert_eq!(outcome.order.sequence, 1);
    assert_eq!(registry.get(1), None);
    assert_eq!(registry.get(2).unwrap().total, updated.total);

    let confirmation = registry.close(2).unwrap();
    assert_eq!(confirmation.table_number, 2);
    assert_eq!(registry.get(2), None);
    assert_eq!(
        registry.update(2, starter_items(), None).unwrap_err(),
        OrderError::NotFound(2)
    );

    let events = drain(&mut rx);
    let names: Vec<&str> = events
        .into_iter()
        .map(|e| ServerEvent::from(e).name())
        .collect();
    assert_eq!(
        names,
        vec![
            "table_order_created",
            "table_order_updated",
            "table_transferred",
            "table_order_closed"
        ]
    );
}

#[test]
fn test_transfer_rejections() {
    let (registry, _rx) = TableRegistry::new();
    registry.create(1, starter_items(), Utc::now()).unwrap();
    registry.create(2, vec![item("flan", 850, 1)], Utc::now()).unwrap();

    assert_eq!(registry.transfer(1, 2).unwrap_err(), OrderError::TargetOccupied(2));
    assert_eq!(registry.transfer(5, 6).unwrap_err(), OrderError::NotFound(5));
    assert!(matches!(registry.transfer(1, 1), Err(OrderError::Malformed(_))));

    // 失败的 transfer 不改变任何一边
    assert_eq!(registry.get(1).unwrap().total, Money::from_minor(4300));
    assert_eq!(registry.get(2).unwrap().total, Money::from_minor(850));
}

#[test]
fn test_reopen_after_close_starts_fresh() {
    let (registry, _rx) = TableRegistry::new();
    registry.create(4, starter_items(), Utc::now()).unwrap();
    registry.update(4, starter_items(), None).unwrap();
    registry.close(4).unwrap();

    let reopened = registry.create(4, vec![], Utc::now()).unwrap();
    assert_eq!(reopened.sequence, 1);
    assert_eq!(reopened.total, Money::ZERO);
}

#[test]
fn test_closed_event_carries_next_sequence() {
    let (registry, mut rx) = TableRegistry::new();
    registry.create(3, starter_items(), Utc::now()).unwrap();
    registry.update(3, starter_items(), None).unwrap();
    registry.close(3).unwrap();

    let events = drain(&mut rx);
    assert_eq!(
        events.last(),
        Some(&RegistryEvent::Closed {
            table: 3,
            sequence: 3
        })
    );
}

#[test]
fn test_list_open_sorted() {
    let (registry, _rx) = TableRegistry::new();
    for table in [7, 2, 5] {
        registry.create(table, starter_items(), Utc::now()).unwrap();
    }
    registry.close(5).unwrap();

    let tables: Vec<_> = registry.list_open().iter().map(|o| o.table_number).collect();
    assert_eq!(tables, vec![2, 7]);
    assert_eq!(registry.open_count(), 2);
}

#[test]
fn test_concurrent_creates_single_winner() {
    let (registry, mut rx) = TableRegistry::new();
    let registry = Arc::new(registry);

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let registry = registry.clone();
            std::thread::spawn(move || registry.create(1, starter_items(), Utc::now()).is_ok())
        })
        .collect();
    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(winners, 1);
    assert_eq!(drain(&mut rx).len(), 1);
}

#[test]
fn test_concurrent_updates_have_distinct_sequences() {
    let (registry, mut rx) = TableRegistry::new();
    let registry = Arc::new(registry);
    registry.create(1, starter_items(), Utc::now()).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let registry = registry.clone();
            std::thread::spawn(move || {
                for _ in 0..25 {
                    registry
                        .update(1, vec![item("paella", 100 + i, 1)], None)
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(registry.get(1).unwrap().sequence, 1 + 8 * 25);

    // 事件顺序与提交顺序一致：sequence 严格递增
    let sequences: Vec<u64> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            RegistryEvent::Updated(order) => Some(order.sequence),
            _ => None,
        })
        .collect();
    assert_eq!(sequences.len(), 200);
    assert!(sequences.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_transfer_is_atomic_for_readers() {
    let (registry, _rx) = TableRegistry::new();
    let registry = Arc::new(registry);
    registry.create(1, starter_items(), Utc::now()).unwrap();
    let stop = Arc::new(AtomicBool::new(false));

    let reader = {
        let registry = registry.clone();
        let stop = stop.clone();
        std::thread::spawn(move || {
            let mut observations = 0;
            while !stop.load(Ordering::Relaxed) {
                let open = registry.list_open();
                assert_eq!(open.len(), 1, "transfer observed half applied: {open:?}");
                observations += 1;
            }
            observations
        })
    };

    let mover = {
        let registry = registry.clone();
        std::thread::spawn(move || {
            // 1 → 2 → 3 → ... → 40，每次都移到新桌台
            for table in 1..40 {
                registry.transfer(table, table + 1).unwrap();
            }
        })
    };

    mover.join().unwrap();
    stop.store(true, Ordering::Relaxed);
    assert!(reader.join().unwrap() > 0);
    assert_eq!(registry.get(40).unwrap().total, Money::from_minor(4300));
}

#[test]
fn test_opposite_transfers_do_not_deadlock() {
    let (registry, _rx) = TableRegistry::new();
    let registry = Arc::new(registry);
    registry.create(1, starter_items(), Utc::now()).unwrap();

    let handles: Vec<_> = [(1, 2), (2, 1)]
        .into_iter()
        .map(|(from, to)| {
            let registry = registry.clone();
            std::thread::spawn(move || {
                for _ in 0..500 {
                    let _ = registry.transfer(from, to);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let open = registry.list_open();
    assert_eq!(open.len(), 1);
    assert!(open[0].table_number == 1 || open[0].table_number == 2);
}

#[test]
fn test_export_restore() {
    let (source, _rx) = TableRegistry::new();
    source.create(1, starter_items(), Utc::now()).unwrap();
    source.update(1, starter_items(), None).unwrap();
    source.create(6, vec![item("flan", 850, 2)], Utc::now()).unwrap();
    let snapshot = source.export();

    let (target, mut rx) = TableRegistry::new();
    assert_eq!(target.restore(snapshot.clone()).unwrap(), 2);
    assert_eq!(target.list_open(), snapshot);
    assert!(drain(&mut rx).is_empty());

    // sequence 从快照继续
    assert_eq!(target.update(1, starter_items(), Some(2)).unwrap().sequence, 3);
    assert_eq!(
        target.restore(snapshot).unwrap_err(),
        OrderError::AlreadyOpen(1)
    );
}

#[test]
fn test_restore_recomputes_total_and_skips_closed() {
    let (registry, _rx) = TableRegistry::new();
    let tampered = TableOrder {
        table_number: 3,
        items: starter_items(),
        total: Money::from_minor(1),
        start_time: Utc::now(),
        sequence: 4,
        status: OrderStatus::Open,
    };
    let mut closed = tampered.clone();
    closed.table_number = 8;
    closed.status = OrderStatus::Closed;

    assert_eq!(registry.restore(vec![tampered, closed]).unwrap(), 1);
    assert_eq!(registry.get(3).unwrap().total, Money::from_minor(4300));
    assert_eq!(registry.get(8), None);
}

#[test]
fn test_closed_tables_release_their_slots() {
    let (registry, _rx) = TableRegistry::new();
    for table in 1..=2_000 {
        registry.create(table, starter_items(), Utc::now()).unwrap();
        registry.close(table).unwrap();
    }
    assert_eq!(registry.open_count(), 0);
    assert_eq!(registry.slots.len(), 0);
}

#[test]
fn test_transfer_releases_source_slot() {
    let (registry, _rx) = TableRegistry::new();
    registry.create(1, starter_items(), Utc::now()).unwrap();
    registry.transfer(1, 2).unwrap();

    assert!(registry.slots.get(&1).is_none());
    assert!(registry.slots.get(&2).is_some());

    // 源桌台不存在时不为目标桌台创建 slot
    assert_eq!(registry.transfer(7, 8).unwrap_err(), OrderError::NotFound(7));
    assert!(registry.slots.get(&8).is_none());
    assert_eq!(registry.slots.len(), 1);
}

#[test]
fn test_reopen_races_with_close() {
    let (registry, mut rx) = TableRegistry::new();
    let registry = Arc::new(registry);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let registry = registry.clone();
            std::thread::spawn(move || {
                for _ in 0..500 {
                    let _ = registry.create(1, starter_items(), Utc::now());
                    let _ = registry.update(1, starter_items(), None);
                    let _ = registry.close(1);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // 每个 Created 都有对应的 Closed，或者桌台仍然开着
    let events = drain(&mut rx);
    let created = events.iter().filter(|e| matches!(e, RegistryEvent::Created(_))).count();
    let closed = events.iter().filter(|e| matches!(e, RegistryEvent::Closed { .. })).count();
    let still_open = usize::from(registry.get(1).is_some());
    assert_eq!(created, closed + still_open);
    assert_eq!(registry.slots.len(), still_open);
}

#[test]
fn test_list_open_stays_consistent_under_slot_churn() {
    let (registry, _rx) = TableRegistry::new();
    let registry = Arc::new(registry);
    registry.create(1, starter_items(), Utc::now()).unwrap();
    let stop = Arc::new(AtomicBool::new(false));

    let churn = {
        let registry = registry.clone();
        let stop = stop.clone();
        std::thread::spawn(move || {
            let mut table = 10_000;
            while !stop.load(Ordering::Relaxed) {
                table += 1;
                registry.create(table, vec![], Utc::now()).unwrap();
                registry.close(table).unwrap();
            }
        })
    };
    let mover = {
        let registry = registry.clone();
        std::thread::spawn(move || {
            for table in 1..200 {
                registry.transfer(table, table + 1).unwrap();
            }
        })
    };

    let mut cuts = 0;
    while !mover.is_finished() {
        let open: Vec<_> = registry
            .list_open()
            .into_iter()
            .filter(|o| o.table_number < 10_000)
            .collect();
        assert_eq!(open.len(), 1, "transfer observed half applied: {open:?}");
        cuts += 1;
    }
    mover.join().unwrap();
    stop.store(true, Ordering::Relaxed);
    churn.join().unwrap();

    assert!(cuts > 0);
    assert_eq!(registry.get(200).unwrap().total, Money::from_minor(4300));
}

#[test]
fn test_restore_rejects_invalid_batch_without_partial_apply() {
    let (registry, _rx) = TableRegistry::new();
    let order = |table: TableNumber, items: Vec<LineItem>| TableOrder {
        table_number: table,
        total: Money::ZERO,
        items,
        start_time: Utc::now(),
        sequence: 1,
        status: OrderStatus::Open,
    };

    let bad_batches = [
        vec![order(1, starter_items()), order(2, vec![item("flan", 850, 0)])],
        vec![order(1, starter_items()), order(2, vec![item("flan", -850, 1)])],
        vec![order(1, starter_items()), order(1, vec![item("flan", 850, 1)])],
    ];
    for batch in bad_batches {
        assert!(matches!(registry.restore(batch), Err(OrderError::Malformed(_))));
        assert!(registry.list_open().is_empty());
        assert_eq!(registry.slots.len(), 0);
    }
}
