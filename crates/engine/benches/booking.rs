use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rentflow_audit::InMemoryAuditJournal;
use rentflow_catalog::{InMemoryCatalog, SkuId, SkuRecord};
use rentflow_core::{AggregateId, CustomerId, FixedClock, LocationId, UserId};
use rentflow_engine::{OrderItem, ReceiveStock, RentalEngine, RentalPolicy};
use rentflow_inventory::{ConditionGrade, UnitStatus};
use rentflow_rentals::BookingWindow;

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
        max_rental_days: 30,
        reorder_point: 0,
        reorder_quantity: 0,
        maximum_stock: u32::MAX,
    }
}

fn setup_engine(
    units: u32,
) -> (
    RentalEngine<InMemoryCatalog, InMemoryAuditJournal>,
    SkuId,
    LocationId,
    UserId,
) {
    let sku = drill_sku();
    let sku_id = sku.id;
    let catalog = InMemoryCatalog::new();
    catalog.upsert(sku).unwrap();
    let engine = RentalEngine::new(
        catalog,
        InMemoryAuditJournal::new(),
        Arc::new(FixedClock(at(1, 8))),
        RentalPolicy::default(),
    );
    let location = LocationId::new();
    let actor = UserId::new();
    engine
        .receive_stock(ReceiveStock {
            sku_id,
            location,
            quantity: units,
            serials: (0..units).map(|i| format!("DRL-{i}")).collect(),
            sku_is_serialized: true,
            initial_status: UnitStatus::AvailableRent,
            condition: ConditionGrade::A,
            unit_cost: 80000,
            actor,
            occurred_at: at(1, 8),
        })
        .unwrap();
    (engine, sku_id, location, actor)
}

fn order(sku_id: SkuId, quantity: u32) -> Vec<OrderItem> {
    vec![OrderItem {
        sku_id,
        quantity,
        price_override: None,
        discount: 0,
    }]
}

/// Booking followed by cancellation, leaving the pool as it was. Covers
/// the full pipeline: validation, pricing, unit selection, the claim and
/// its release, and the audit writes.
fn bench_booking_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("booking_cycle");
    group.sample_size(200);

    let window = BookingWindow::new(at(2, 9), at(4, 17)).unwrap();
    for pool in [10u32, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("book_two_cancel", pool), &pool, |b, &pool| {
            let (engine, sku_id, location, actor) = setup_engine(pool);
            b.iter(|| {
                let id = engine
                    .create_booking(
                        CustomerId::new(),
                        location,
                        black_box(order(sku_id, 2)),
                        window,
                        actor,
                    )
                    .unwrap();
                engine.cancel_transaction(id, None, actor).unwrap();
            });
        });
    }

    group.finish();
}

/// Availability scan cost against pool size, with half the pool claimed so
/// the window-overlap path is exercised.
fn bench_availability(c: &mut Criterion) {
    let mut group = c.benchmark_group("availability");

    let window = BookingWindow::new(at(2, 9), at(4, 17)).unwrap();
    let disjoint = BookingWindow::new(at(10, 9), at(12, 17)).unwrap();
    for pool in [10u32, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("check_availability", pool), &pool, |b, &pool| {
            let (engine, sku_id, location, actor) = setup_engine(pool);
            engine
                .create_booking(
                    CustomerId::new(),
                    location,
                    order(sku_id, pool / 2),
                    window,
                    actor,
                )
                .unwrap();
            b.iter(|| {
                black_box(
                    engine
                        .check_availability(sku_id, location, black_box(disjoint))
                        .unwrap(),
                )
            });
        });
    }

    group.finish();
}

/// Intake throughput for non-serialized stock.
fn bench_stock_intake(c: &mut Criterion) {
    let mut group = c.benchmark_group("stock_intake");

    for batch in [1u32, 10, 100] {
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::new("receive", batch), &batch, |b, &batch| {
            let sku = SkuRecord {
                is_serialized: false,
                is_rentable: false,
                is_saleable: true,
                unit_price: 3000,
                ..drill_sku()
            };
            let sku_id = sku.id;
            let catalog = InMemoryCatalog::new();
            catalog.upsert(sku).unwrap();
            let engine = RentalEngine::new(
                catalog,
                InMemoryAuditJournal::new(),
                Arc::new(FixedClock(at(1, 8))),
                RentalPolicy::default(),
            );
            let location = LocationId::new();
            let actor = UserId::new();
            b.iter(|| {
                black_box(
                    engine
                        .receive_stock(ReceiveStock {
                            sku_id,
                            location,
                            quantity: batch,
                            serials: vec![],
                            sku_is_serialized: false,
                            initial_status: UnitStatus::AvailableSale,
                            condition: ConditionGrade::A,
                            unit_cost: 1800,
                            actor,
                            occurred_at: at(1, 8),
                        })
                        .unwrap(),
                )
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_booking_cycle,
    bench_availability,
    bench_stock_intake
);
criterion_main!(benches);
