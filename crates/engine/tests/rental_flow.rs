//! Black-box run through the engine's public surface: stock intake,
//! booking, payment, pickup, extension, staggered returns, inspection,
//! settlement, and contended bookings from multiple threads.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, TimeZone, Utc};

use rentflow_audit::{AuditJournal, EntityRef, InMemoryAuditJournal};
use rentflow_catalog::{InMemoryCatalog, SkuId, SkuRecord};
use rentflow_core::{Aggregate, AggregateId, Clock, CustomerId, DomainError, LocationId, UserId};
use rentflow_engine::{OrderItem, ReceiveStock, RentalEngine, RentalPolicy, ReturnItem};
use rentflow_inventory::{ConditionGrade, UnitStatus};
use rentflow_rentals::{BookingWindow, PaymentMethod, PaymentStatus, TransactionStatus};
use rentflow_returns::{
    AssessmentEntry, ConditionAssessment, FindingKind, FindingSeverity, InspectionFinding,
    ReturnKind,
};

/// A clock the test can wind forward between steps.
struct TurningClock(RwLock<DateTime<Utc>>);

impl TurningClock {
    fn starting_at(at: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self(RwLock::new(at)))
    }

    fn set(&self, to: DateTime<Utc>) {
        *self.0.write().unwrap() = to;
    }
}

impl Clock for TurningClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.read().unwrap()
    }
}

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, day, hour, 0, 0).unwrap()
}

fn drill_sku() -> SkuRecord {
    SkuRecord {
        id: SkuId::new(AggregateId::new()),
        name: "Rotary hammer drill".to_string(),
        is_serialized: true,
        is_rentable: true,
        is_saleable: false,
        unit_price: 0,
        daily_rate: 4500,
        min_rental_days: 1,
        max_rental_days: 14,
        reorder_point: 1,
        reorder_quantity: 5,
        maximum_stock: 12,
    }
}

fn helmet_sku() -> SkuRecord {
    SkuRecord {
        id: SkuId::new(AggregateId::new()),
        name: "Climbing helmet".to_string(),
        is_serialized: false,
        is_rentable: false,
        is_saleable: true,
        unit_price: 3000,
        daily_rate: 0,
        min_rental_days: 0,
        max_rental_days: 0,
        reorder_point: 2,
        reorder_quantity: 6,
        maximum_stock: 10,
    }
}

fn engine_with(
    skus: &[SkuRecord],
    clock: Arc<TurningClock>,
) -> RentalEngine<InMemoryCatalog, InMemoryAuditJournal> {
    rentflow_observability::init_with_default("warn");
    let catalog = InMemoryCatalog::new();
    for sku in skus {
        catalog.upsert(sku.clone()).unwrap();
    }
    RentalEngine::new(
        catalog,
        InMemoryAuditJournal::new(),
        clock,
        RentalPolicy::default(),
    )
}

fn receive_drills(
    engine: &RentalEngine<InMemoryCatalog, InMemoryAuditJournal>,
    sku_id: SkuId,
    location: LocationId,
    serials: &[&str],
    actor: UserId,
) {
    engine
        .receive_stock(ReceiveStock {
            sku_id,
            location,
            quantity: serials.len() as u32,
            serials: serials.iter().map(|s| s.to_string()).collect(),
            sku_is_serialized: true,
            initial_status: UnitStatus::AvailableRent,
            condition: ConditionGrade::A,
            unit_cost: 80000,
            actor,
            occurred_at: at(1, 8),
        })
        .unwrap();
}

#[test]
fn rental_lifecycle_from_intake_to_settlement() {
    let clock = TurningClock::starting_at(at(1, 8));
    let drill = drill_sku();
    let engine = engine_with(std::slice::from_ref(&drill), clock.clone());
    let location = LocationId::new();
    let actor = UserId::new();

    receive_drills(&engine, drill.id, location, &["DRL-0", "DRL-1", "DRL-2"], actor);
    engine.expect_inbound(drill.id, location, 2).unwrap();

    let level = engine.registry().stock_level(drill.id, location).unwrap();
    assert_eq!(level.available, 3);
    assert_eq!(level.in_transit, 2);

    let window = BookingWindow::new(at(2, 9), at(4, 17)).unwrap();
    let report = engine.check_availability(drill.id, location, window).unwrap();
    assert_eq!(report.available, 3);
    assert_eq!(report.candidates.len(), 3);

    // Two drills for three billable days: 27000 rent, 2227 tax, 8768 deposit.
    let transaction_id = engine
        .create_booking(
            CustomerId::new(),
            location,
            vec![OrderItem {
                sku_id: drill.id,
                quantity: 2,
                price_override: None,
                discount: 0,
            }],
            window,
            actor,
        )
        .unwrap();

    let txn = engine.transactions().get(transaction_id).unwrap();
    assert_eq!(txn.status(), TransactionStatus::Pending);
    assert_eq!(txn.subtotal(), 27000);
    assert_eq!(txn.tax(), 2227);
    assert_eq!(txn.deposit_held(), 8768);
    assert_eq!(txn.amount_due(), 37995);

    let level = engine.registry().stock_level(drill.id, location).unwrap();
    assert_eq!(level.reserved, 2);
    assert_eq!(level.available, 1);

    engine
        .checkout(transaction_id, 37995, PaymentMethod::Card, None, actor)
        .unwrap();
    let txn = engine.transactions().get(transaction_id).unwrap();
    assert_eq!(txn.status(), TransactionStatus::Confirmed);
    assert_eq!(txn.payment_status(), PaymentStatus::Paid);

    clock.set(at(2, 9));
    engine.pickup(transaction_id, actor).unwrap();
    let level = engine.registry().stock_level(drill.id, location).unwrap();
    assert_eq!(level.out, 2);
    assert_eq!(level.reserved, 0);

    // Two more billable days on both units.
    clock.set(at(3, 10));
    let added = engine
        .extend_rental(transaction_id, at(6, 17), actor)
        .unwrap();
    assert_eq!(added, 18000);
    engine
        .record_payment(transaction_id, added, PaymentMethod::Card, None, actor)
        .unwrap();
    let txn = engine.transactions().get(transaction_id).unwrap();
    assert_eq!(txn.payment_status(), PaymentStatus::Paid);

    // First drill comes back a day early.
    clock.set(at(5, 15));
    let first_return = engine
        .initiate_return(
            transaction_id,
            &[ReturnItem {
                line_no: 1,
                quantity: 1,
            }],
            actor,
        )
        .unwrap();
    let ret = engine.returns().get(first_return).unwrap();
    assert_eq!(ret.kind(), ReturnKind::Partial);
    assert_eq!(ret.late_fees(), 0);

    engine
        .assess_damage(
            first_return,
            vec![AssessmentEntry {
                line_no: 1,
                assessment: ConditionAssessment::clean(ConditionGrade::A),
                findings: vec![],
            }],
            actor,
        )
        .unwrap();
    engine.finalize_return(first_return, false, actor).unwrap();

    let txn = engine.transactions().get(transaction_id).unwrap();
    assert_eq!(txn.status(), TransactionStatus::InProgress);
    assert_eq!(txn.outstanding_quantity(), 1);

    // Second drill is two days late and comes back dented.
    clock.set(at(8, 11));
    let second_return = engine
        .initiate_return(
            transaction_id,
            &[ReturnItem {
                line_no: 1,
                quantity: 1,
            }],
            actor,
        )
        .unwrap();
    let ret = engine.returns().get(second_return).unwrap();
    assert_eq!(ret.kind(), ReturnKind::Full);
    assert_eq!(ret.lines()[0].days_late, 2);
    assert_eq!(ret.late_fees(), 9000);

    engine
        .assess_damage(
            second_return,
            vec![AssessmentEntry {
                line_no: 1,
                assessment: ConditionAssessment {
                    grade: ConditionGrade::B,
                    cleaning_required: true,
                    cleaning_fee: 2500,
                    replacement_required: false,
                    note: Some("mud in the chuck".to_string()),
                },
                findings: vec![InspectionFinding::new(
                    FindingKind::Damage,
                    FindingSeverity::Minor,
                    "dented housing",
                    15000,
                    50,
                )
                .unwrap()],
            }],
            actor,
        )
        .unwrap();
    engine.finalize_return(second_return, false, actor).unwrap();

    let txn = engine.transactions().get(transaction_id).unwrap();
    assert_eq!(txn.status(), TransactionStatus::Completed);
    assert!(engine.book().is_empty());

    // Both units carry the five billable days of the extended window.
    let late_unit = engine.returns().get(second_return).unwrap().lines()[0].unit_ids[0];
    let unit = engine.registry().unit(late_unit).unwrap();
    assert_eq!(unit.status(), UnitStatus::CleaningRequired);
    assert_eq!(unit.condition(), ConditionGrade::B);
    assert_eq!(unit.rental_count(), 1);
    assert_eq!(unit.total_rental_days(), 5);

    // 9000 late + 7500 damage + 2500 cleaning against an 8768 deposit.
    let settlement = engine.release_deposit(transaction_id, None, actor).unwrap();
    assert_eq!(settlement.late_fees, 9000);
    assert_eq!(settlement.damage_fees, 7500);
    assert_eq!(settlement.cleaning_fees, 2500);
    assert_eq!(settlement.release_amount, 0);
    assert_eq!(settlement.outstanding_balance, 19000 - 8768);

    engine.complete_cleaning(&[late_unit], actor).unwrap();

    // Inbound pair arrives; everything is back on the shelf.
    receive_drills(&engine, drill.id, location, &["DRL-3", "DRL-4"], actor);
    let level = engine.registry().stock_level(drill.id, location).unwrap();
    assert_eq!(level.available, 5);
    assert_eq!(level.in_transit, 0);
    assert_eq!(level.out, 0);
    assert_eq!(level.maintenance, 0);

    let trail = engine
        .journal()
        .entries_for(EntityRef::transaction(transaction_id.0));
    assert!(!trail.is_empty());
    assert!(trail.iter().any(|e| e.action == "rentals.transaction.completed"));
}

#[test]
fn sale_lifecycle_moves_units_out_and_flags_reorder() {
    let clock = TurningClock::starting_at(at(1, 8));
    let helmet = helmet_sku();
    let engine = engine_with(std::slice::from_ref(&helmet), clock);
    let location = LocationId::new();
    let actor = UserId::new();

    engine
        .receive_stock(ReceiveStock {
            sku_id: helmet.id,
            location,
            quantity: 4,
            serials: vec![],
            sku_is_serialized: false,
            initial_status: UnitStatus::AvailableSale,
            condition: ConditionGrade::A,
            unit_cost: 1800,
            actor,
            occurred_at: at(1, 8),
        })
        .unwrap();

    let transaction_id = engine
        .create_sale(
            CustomerId::new(),
            location,
            vec![OrderItem {
                sku_id: helmet.id,
                quantity: 2,
                price_override: None,
                discount: 0,
            }],
            actor,
        )
        .unwrap();

    let txn = engine.transactions().get(transaction_id).unwrap();
    assert_eq!(txn.subtotal(), 6000);
    assert_eq!(txn.tax(), 495);
    assert_eq!(txn.deposit_held(), 0);

    engine
        .checkout(transaction_id, 6495, PaymentMethod::Cash, None, actor)
        .unwrap();
    engine.complete_sale(transaction_id, actor).unwrap();

    let txn = engine.transactions().get(transaction_id).unwrap();
    assert_eq!(txn.status(), TransactionStatus::Completed);
    assert!(engine.book().is_empty());

    let level = engine.registry().stock_level(helmet.id, location).unwrap();
    assert_eq!(level.available, 2);
    assert_eq!(level.out, 2);

    let sold = engine
        .registry()
        .units_for_sku(helmet.id, location)
        .into_iter()
        .filter(|u| u.status() == UnitStatus::Sold)
        .count();
    assert_eq!(sold, 2);

    // Two left on the shelf is at the reorder point; headroom caps the
    // suggestion at maximum stock.
    let alert = engine.reorder_alert(helmet.id, location).unwrap().unwrap();
    assert_eq!(alert.available, 2);
    assert_eq!(alert.suggested_quantity, 6);

    let report = engine.low_stock_report();
    assert_eq!(report.len(), 1);
    assert_eq!(report[0].sku_id, helmet.id);
}

#[test]
fn contended_booking_has_exactly_one_winner() {
    let clock = TurningClock::starting_at(at(1, 8));
    let drill = drill_sku();
    let engine = engine_with(std::slice::from_ref(&drill), clock);
    let location = LocationId::new();
    let actor = UserId::new();
    receive_drills(&engine, drill.id, location, &["DRL-0", "DRL-1", "DRL-2"], actor);

    let window = BookingWindow::new(at(2, 9), at(4, 17)).unwrap();
    let book_two = || {
        engine.create_booking(
            CustomerId::new(),
            location,
            vec![OrderItem {
                sku_id: drill.id,
                quantity: 2,
                price_override: None,
                discount: 0,
            }],
            window,
            actor,
        )
    };

    let (first, second) = std::thread::scope(|s| {
        let a = s.spawn(book_two);
        let b = s.spawn(book_two);
        (a.join().unwrap(), b.join().unwrap())
    });

    let (winner, loss) = match (first, second) {
        (Ok(id), Err(err)) | (Err(err), Ok(id)) => (id, err),
        (Ok(_), Ok(_)) => panic!("both bookings claimed the last drills"),
        (Err(a), Err(b)) => panic!("no booking won: {a}, {b}"),
    };

    // The loser saw the shelf after the winner took two of three.
    assert!(loss.is_retryable());
    assert!(matches!(
        loss,
        DomainError::InsufficientStock {
            requested: 2,
            available: 1
        } | DomainError::ClaimConflict(_)
    ));

    let level = engine.registry().stock_level(drill.id, location).unwrap();
    assert_eq!(level.reserved, 2);
    assert_eq!(level.available, 1);

    let claims = engine.book().claims_for_transaction(winner);
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0].quantity, 2);

    // The losing draft was retired by compensation.
    let live: Vec<_> = engine
        .transactions()
        .list()
        .into_iter()
        .filter(|t| t.is_active())
        .collect();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].id(), winner);
}
