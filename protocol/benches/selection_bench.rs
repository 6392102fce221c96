// Coin selection and reservation benchmarks.
//
// Covers pure selection over pools of increasing size and a full
// reserve/cancel cycle through the keeper.

use std::sync::Arc;

use chrono::{Duration, Utc};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use vela_protocol::account::{
    select_utxos, AccountStore, MemoryAccountStore, Owner, ReserveRequest, UtxoKeeper, Utxo,
};
use vela_protocol::chain::StaticChain;
use vela_protocol::transaction::{AssetId, Hash};

const ASSET: AssetId = AssetId::new([1; 32]);

fn pool(size: usize) -> Vec<Utxo> {
    (0..size)
        .map(|i| {
            let mut id = [0u8; 32];
            id[..8].copy_from_slice(&(i as u64).to_be_bytes());
            Utxo {
                output_id: Hash::new(id),
                asset_id: ASSET,
                amount: (i as u64 * 7919) % 10_000 + 1,
                account_id: "bench".into(),
                ..Default::default()
            }
        })
        .collect()
}

fn bench_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("selection/select_utxos");
    for size in [16usize, 256, 4096] {
        let utxos = pool(size);
        let target = utxos.iter().map(|u| u.amount).sum::<u64>() / 3;
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &utxos, |b, utxos| {
            b.iter(|| select_utxos(utxos.clone(), target, |_| false));
        });
    }
    group.finish();
}

fn bench_reserve_cancel(c: &mut Criterion) {
    let store = Arc::new(MemoryAccountStore::new());
    for utxo in pool(1024) {
        store.set_standard_utxo(&utxo).unwrap();
    }
    let keeper = UtxoKeeper::new(store, Arc::new(StaticChain::default()));
    let req = ReserveRequest::new(
        Owner::Account("bench".into()),
        ASSET,
        50_000,
        Utc::now() + Duration::hours(1),
    );

    c.bench_function("selection/reserve_cancel_1024", |b| {
        b.iter(|| {
            let r = keeper.reserve(&req).unwrap();
            keeper.cancel(r.id);
        });
    });
}

criterion_group!(benches, bench_select, bench_reserve_cancel);
criterion_main!(benches);
