//! Property tests for the reservation keeper and coin selection.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use vela_protocol::account::{
    select_utxos, AccountStore, MemoryAccountStore, Owner, ReserveRequest, UtxoKeeper, Utxo,
};
use vela_protocol::chain::StaticChain;
use vela_protocol::transaction::{AssetId, Hash};
use vela_protocol::txbuilder::{Compensation, TemplateBuilder};

const ASSET: AssetId = AssetId::new([3; 32]);
const OWNER: &str = "acct";

fn utxo(i: usize, amount: u64) -> Utxo {
    let mut id = [0u8; 32];
    id[..8].copy_from_slice(&(i as u64 + 1).to_be_bytes());
    Utxo {
        output_id: Hash::new(id),
        asset_id: ASSET,
        amount,
        account_id: OWNER.into(),
        ..Default::default()
    }
}

fn keeper_with(amounts: &[u64]) -> UtxoKeeper {
    let store = Arc::new(MemoryAccountStore::new());
    for (i, amount) in amounts.iter().enumerate() {
        store.set_standard_utxo(&utxo(i, *amount)).unwrap();
    }
    UtxoKeeper::new(store, Arc::new(StaticChain::default()))
}

fn request(amount: u64) -> ReserveRequest {
    ReserveRequest::new(
        Owner::Account(OWNER.into()),
        ASSET,
        amount,
        Utc::now() + Duration::minutes(1),
    )
}

proptest! {
    #[test]
    fn selection_covers_target_with_distinct_unreserved(
        amounts in prop::collection::vec(1u64..1_000, 1..30),
        target in 1u64..5_000,
        reserved_mask in prop::collection::vec(any::<bool>(), 30),
    ) {
        let pool: Vec<Utxo> = amounts.iter().enumerate().map(|(i, a)| utxo(i, *a)).collect();
        let reserved: HashSet<Hash> = pool
            .iter()
            .zip(&reserved_mask)
            .filter(|(_, r)| **r)
            .map(|(u, _)| u.output_id)
            .collect();

        let sel = select_utxos(pool.clone(), target, |id| reserved.contains(id));

        let ids: HashSet<Hash> = sel.utxos.iter().map(|u| u.output_id).collect();
        prop_assert_eq!(ids.len(), sel.utxos.len());
        prop_assert!(ids.is_disjoint(&reserved));
        prop_assert_eq!(sel.opt_amount, sel.utxos.iter().map(|u| u.amount).sum::<u64>());

        let free: u64 = pool.iter().filter(|u| !reserved.contains(&u.output_id)).map(|u| u.amount).sum();
        if free >= target {
            prop_assert!(sel.opt_amount >= target);
        }
    }

    #[test]
    fn no_output_is_reserved_twice(
        amounts in prop::collection::vec(1u64..100, 1..20),
        requests in prop::collection::vec(1u64..150, 1..10),
    ) {
        let keeper = keeper_with(&amounts);
        let mut held = HashSet::new();
        for amount in requests {
            if let Ok(r) = keeper.reserve(&request(amount)) {
                prop_assert!(r.utxos.iter().map(|u| u.amount).sum::<u64>() == amount + r.change);
                for u in &r.utxos {
                    prop_assert!(held.insert(u.output_id), "output reserved twice");
                }
            }
        }
    }

    #[test]
    fn cancel_makes_funds_reservable_again(
        amounts in prop::collection::vec(1u64..100, 1..20),
        fraction in 1u64..=100,
    ) {
        let total: u64 = amounts.iter().sum();
        let amount = (total * fraction / 100).max(1);
        let keeper = keeper_with(&amounts);

        let first = keeper.reserve(&request(amount)).unwrap();
        prop_assert!(keeper.cancel(first.id));
        prop_assert!(!keeper.cancel(first.id));
        let second = keeper.reserve(&request(amount)).unwrap();
        prop_assert_eq!(
            first.utxos.iter().map(|u| u.output_id).collect::<Vec<_>>(),
            second.utxos.iter().map(|u| u.output_id).collect::<Vec<_>>()
        );
    }

    #[test]
    fn expiry_releases_exactly_the_expired(
        offsets in prop::collection::vec(0i64..100, 1..15),
        cutoff in 0i64..100,
    ) {
        let amounts = vec![1u64; offsets.len()];
        let keeper = keeper_with(&amounts);
        let base = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

        let mut ids = Vec::new();
        for offset in &offsets {
            let req = ReserveRequest::new(
                Owner::Account(OWNER.into()),
                ASSET,
                1,
                base + Duration::seconds(*offset),
            );
            ids.push(keeper.reserve(&req).unwrap().id);
        }

        let expected = offsets.iter().filter(|o| **o < cutoff).count();
        prop_assert_eq!(keeper.expire_reservations(base + Duration::seconds(cutoff)), expected);
        for (id, offset) in ids.iter().zip(&offsets) {
            prop_assert_eq!(keeper.reservation(*id).is_some(), *offset >= cutoff);
        }
    }

    #[test]
    fn add_unconfirmed_is_idempotent(amounts in prop::collection::vec(1u64..100, 1..10)) {
        let keeper = keeper_with(&[]);
        let utxos: Vec<Utxo> = amounts.iter().enumerate().map(|(i, a)| utxo(i, *a)).collect();
        keeper.add_unconfirmed_utxo(&utxos);
        let mut once = keeper.list_unconfirmed(OWNER);
        keeper.add_unconfirmed_utxo(&utxos);
        let mut twice = keeper.list_unconfirmed(OWNER);

        once.sort_by_key(|u| u.output_id);
        twice.sort_by_key(|u| u.output_id);
        prop_assert_eq!(once.len(), utxos.len());
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn rollback_is_idempotent(count in 1usize..8) {
        let keeper = keeper_with(&vec![5u64; count]);
        let mut builder = TemplateBuilder::new(Utc::now() + Duration::minutes(1), 0);
        for _ in 0..count {
            let r = keeper.reserve(&request(5)).unwrap();
            builder.on_rollback(Compensation::CancelReservation(r.id));
        }
        builder.rollback(&keeper);
        prop_assert_eq!(keeper.reservation_count(), 0);

        let survivor = keeper.reserve(&request(5)).unwrap();
        builder.rollback(&keeper);
        prop_assert!(keeper.reservation(survivor.id).is_some());
    }
}
