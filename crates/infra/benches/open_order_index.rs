use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use chrono::Utc;
use medchain_core::{OrderId, Priority, ProductId};
use medchain_events::BindingPattern;
use medchain_infra::store::{OpenOrderIndex, scan_open_order};
use medchain_purchasing::{GenerateOrder, NewOrderItem, PurchaseOrder};

/// `count` open orders, each for three distinct products.
fn open_orders(count: usize) -> Vec<PurchaseOrder> {
    (0..count)
        .map(|i| {
            let items = (0..3)
                .map(|j| NewOrderItem {
                    product_id: ProductId::new(format!("sku-{i}-{j}")).unwrap(),
                    quantity: 10,
                    unit_price: 2.5,
                    required_temperature: 0.0,
                })
                .collect();
            PurchaseOrder::generate(
                GenerateOrder {
                    order_id: OrderId::new(),
                    supplier_id: None,
                    reason: "restock".into(),
                    priority: Priority::Medium,
                    items,
                    tag: None,
                },
                Utc::now(),
            )
            .unwrap()
            .0
        })
        .collect()
}

/// Duplicate-order lookup: maintained index vs scanning every order.
fn bench_open_order_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("open_order_lookup");

    for size in [100usize, 1_000, 10_000] {
        let orders = open_orders(size);
        let index = OpenOrderIndex::new();
        index.rebuild(&orders).unwrap();
        // Worst case for the scan: the product of the last order.
        let target = ProductId::new(format!("sku-{}-2", size - 1)).unwrap();
        let missing = ProductId::new("sku-missing").unwrap();

        group.bench_with_input(BenchmarkId::new("index_hit", size), &target, |b, product| {
            b.iter(|| black_box(index.open_order_for(black_box(product)).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("scan_hit", size), &target, |b, product| {
            b.iter(|| black_box(scan_open_order(&orders, black_box(product))));
        });
        group.bench_with_input(BenchmarkId::new("index_miss", size), &missing, |b, product| {
            b.iter(|| black_box(index.open_order_for(black_box(product)).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("scan_miss", size), &missing, |b, product| {
            b.iter(|| black_box(scan_open_order(&orders, black_box(product))));
        });
    }

    group.finish();
}

fn bench_index_rebuild(c: &mut Criterion) {
    let orders = open_orders(10_000);
    c.bench_function("open_order_rebuild_10k", |b| {
        b.iter(|| {
            let index = OpenOrderIndex::new();
            black_box(index.rebuild(black_box(&orders)).unwrap())
        });
    });
}

/// Topic binding match on the consumer side, per delivery.
fn bench_binding_match(c: &mut Criterion) {
    let exact = BindingPattern::new("orden.generada").unwrap();
    let wildcard = BindingPattern::new("external.#").unwrap();
    let mut group = c.benchmark_group("binding_match");
    group.bench_function("exact", |b| {
        b.iter(|| black_box(exact.matches(black_box("orden.generada"))));
    });
    group.bench_function("hash_wildcard", |b| {
        b.iter(|| black_box(wildcard.matches(black_box("external.alerta.inventario"))));
    });
    group.finish();
}

criterion_group!(benches, bench_open_order_lookup, bench_index_rebuild, bench_binding_match);
criterion_main!(benches);
