use common::{OrderId, ProductId, Sku};
use criterion::{Criterion, criterion_group, criterion_main};
use inventory::{InventoryLedger, ReleaseReason};

fn bench_reserve_single_sku(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("inventory/reserve_single_sku", |b| {
        b.iter(|| {
            rt.block_on(async {
                let ledger = InventoryLedger::new();
                ledger
                    .stock(Sku::new("SKU-001"), ProductId::new(), 1_000_000, 0)
                    .await
                    .unwrap();
                ledger
                    .reserve(OrderId::new(), Sku::new("SKU-001"), 1)
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_reserve_release_roundtrip(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let ledger = rt.block_on(async {
        let ledger = InventoryLedger::new();
        ledger
            .stock(Sku::new("SKU-001"), ProductId::new(), 1_000_000, 0)
            .await
            .unwrap();
        ledger
    });

    c.bench_function("inventory/reserve_release_roundtrip", |b| {
        b.iter(|| {
            rt.block_on(async {
                let reservation = ledger
                    .reserve(OrderId::new(), Sku::new("SKU-001"), 1)
                    .await
                    .unwrap();
                ledger
                    .release(reservation.id, ReleaseReason::Manual)
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_reserve_across_skus(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let ledger = rt.block_on(async {
        let ledger = InventoryLedger::new();
        for i in 0..16 {
            ledger
                .stock(Sku::new(format!("SKU-{i:03}")), ProductId::new(), 1_000_000, 0)
                .await
                .unwrap();
        }
        ledger
    });

    c.bench_function("inventory/reserve_across_16_skus", |b| {
        let mut i = 0u32;
        b.iter(|| {
            i = (i + 1) % 16;
            rt.block_on(async {
                ledger
                    .reserve(OrderId::new(), Sku::new(format!("SKU-{i:03}")), 1)
                    .await
                    .unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_reserve_single_sku,
    bench_reserve_release_roundtrip,
    bench_reserve_across_skus
);
criterion_main!(benches);
