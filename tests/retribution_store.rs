// Copyright 2021-2022 Farcaster Devs
//
// This library is free software; you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public
// License as published by the Free Software Foundation; either
// version 3 of the License, or (at your option) any later version.
//
// This library is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this library; if not, write to the Free Software
// Foundation, Inc., 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301, USA

use retribution_core::backend::{Backend, MemoryBackend};
use retribution_core::breach::{BreachedOutput, SignDescriptor, WitnessType};
use retribution_core::retribution::RetributionInfo;
use retribution_core::store::{Error as StoreError, RetributionStore, RetributionStorer};

#[cfg(feature = "sqlite")]
use retribution_core::backend::SqliteBackend;

use bitcoin::blockdata::script::Script;
use bitcoin::blockdata::transaction::{EcdsaSighashType, OutPoint, TxOut};
use bitcoin::hashes::Hash;
use bitcoin::{Amount, Txid};

use thiserror::Error;

#[derive(Error, Debug)]
enum VisitError {
    #[error("Visitor gave up")]
    GaveUp,
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn witness_script() -> Script {
    Script::from(hex::decode("0014ee91417e856cde10a2911edcbdbd69e2efb57148").unwrap())
}

fn sign_descriptor() -> SignDescriptor {
    SignDescriptor::from_raw_pubkey(
        &hex::decode("02ce0b14fb842b1ba549fdd675c98075f12e9c510f8ef52bd021a9a1f4809d3b4d")
            .unwrap(),
        witness_script(),
        TxOut {
            value: 5_000_000_000,
            script_pubkey: witness_script(),
        },
        EcdsaSighashType::All,
    )
    .unwrap()
    .with_private_tweak(vec![0x02; 32])
}

fn breached_output(txid: Txid, vout: u32, witness_type: WitnessType) -> BreachedOutput {
    BreachedOutput::new(
        Amount::from_sat(10_000 * (vout as u64 + 1)),
        OutPoint::new(txid, vout),
        witness_type,
        witness_type == WitnessType::CommitmentNoDelay,
        sign_descriptor(),
    )
}

/// A retribution on channel `chan` with `htlcs` breached HTLC outputs.
fn retribution(chan: u8, htlcs: u32) -> RetributionInfo {
    let commit_hash = Txid::from_inner([chan ^ 0xff; 32]);
    RetributionInfo::new(
        commit_hash,
        OutPoint::new(Txid::from_inner([chan; 32]), chan as u32),
        Some(breached_output(commit_hash, 0, WitnessType::CommitmentNoDelay)),
        Some(breached_output(commit_hash, 1, WitnessType::CommitmentRevoke)),
        (0..htlcs)
            .map(|i| breached_output(commit_hash, i + 2, WitnessType::HtlcOfferedRevoke))
            .collect(),
    )
}

fn collect<S: RetributionStorer>(store: &S) -> Vec<RetributionInfo> {
    let mut all = vec![];
    store
        .for_all(|ret| {
            all.push(ret);
            Ok::<(), StoreError>(())
        })
        .unwrap();
    all
}

fn count<S: RetributionStorer>(store: &S) -> usize {
    collect(store).len()
}

fn check_empty_store<B: Backend>(db: &B) {
    let store = RetributionStore::new(db);
    assert_eq!(count(&store), 0);
    assert!(store.is_empty().unwrap());
    // removing an absent channel is not an error
    store.remove(&retribution(1, 0).chan_point).unwrap();
    assert_eq!(count(&store), 0);
}

fn check_add_and_remove<B: Backend>(db: &B) {
    let store = RetributionStore::new(db);
    let (a, b) = (retribution(1, 0), retribution(2, 2));

    store.add(&a).unwrap();
    store.add(&b).unwrap();
    assert_eq!(count(&store), 2);
    assert!(store.is_breached(&a.chan_point).unwrap());

    store.remove(&a.chan_point).unwrap();
    assert!(!store.is_breached(&a.chan_point).unwrap());
    assert_eq!(collect(&store), vec![b.clone()]);

    store.remove(&b.chan_point).unwrap();
    assert!(store.is_empty().unwrap());
}

fn check_add_overwrites<B: Backend>(db: &B) {
    let store = RetributionStore::new(db);
    let first = retribution(7, 0);
    let mut second = retribution(7, 3);
    second.self_output = None;
    assert_eq!(first.chan_point, second.chan_point);

    store.add(&first).unwrap();
    store.add(&second).unwrap();
    assert_eq!(count(&store), 1);
    assert_eq!(store.fetch(&first.chan_point).unwrap(), Some(second));
}

fn check_survivor_is_intact<B: Backend>(db: &B) {
    let store = RetributionStore::new(db);
    let rets = vec![retribution(1, 0), retribution(2, 1), retribution(3, 4)];
    for ret in rets.iter() {
        store.add(ret).unwrap();
    }
    assert_eq!(store.len().unwrap(), 3);

    store.remove(&rets[0].chan_point).unwrap();
    store.remove(&rets[2].chan_point).unwrap();

    let survivors = collect(&store);
    assert_eq!(survivors.len(), 1);
    let survivor = &survivors[0];
    assert_eq!(survivor, &rets[1]);
    assert_eq!(survivor.htlc_outputs.len(), 1);
    assert_eq!(survivor.total_amount(), rets[1].total_amount());
}

fn check_visitor_error_stops_traversal<B: Backend>(db: &B) {
    let store = RetributionStore::new(db);
    for chan in 1..=3 {
        store.add(&retribution(chan, 0)).unwrap();
    }
    let mut visited = 0;
    let res = store.for_all(|_| {
        visited += 1;
        Err(VisitError::GaveUp)
    });
    assert!(matches!(res, Err(VisitError::GaveUp)));
    assert_eq!(visited, 1);
}

fn check_visitor_can_remove<B: Backend>(db: &B) {
    let store = RetributionStore::new(db);
    for chan in 1..=3 {
        store.add(&retribution(chan, 1)).unwrap();
    }
    store
        .for_all(|ret| store.remove(&ret.chan_point).map_err(VisitError::from))
        .unwrap();
    assert!(store.is_empty().unwrap());
}

fn check_concurrent_adds<B: Backend + Sync>(db: &B) {
    let store = RetributionStore::new(db);
    std::thread::scope(|s| {
        for chan in 1..=8 {
            let store = store.clone();
            s.spawn(move || store.add(&retribution(chan, chan as u32 % 3)).unwrap());
        }
    });
    let mut all = collect(&store);
    all.sort_by_key(|ret| ret.chan_point.vout);
    assert_eq!(
        all,
        (1..=8)
            .map(|chan| retribution(chan, chan as u32 % 3))
            .collect::<Vec<_>>()
    );
}

macro_rules! backend_tests {
    ($name:ident, $backend:expr) => {
        mod $name {
            use super::*;

            #[test]
            fn empty_store() {
                check_empty_store(&$backend);
            }

            #[test]
            fn add_and_remove() {
                check_add_and_remove(&$backend);
            }

            #[test]
            fn add_overwrites() {
                check_add_overwrites(&$backend);
            }

            #[test]
            fn survivor_is_intact() {
                check_survivor_is_intact(&$backend);
            }

            #[test]
            fn visitor_error_stops_traversal() {
                check_visitor_error_stops_traversal(&$backend);
            }

            #[test]
            fn visitor_can_remove() {
                check_visitor_can_remove(&$backend);
            }

            #[test]
            fn concurrent_adds() {
                check_concurrent_adds(&$backend);
            }
        }
    };
}

backend_tests!(memory, MemoryBackend::new());
#[cfg(feature = "sqlite")]
backend_tests!(sqlite, SqliteBackend::open_in_memory().unwrap());

#[cfg(feature = "sqlite")]
#[test]
fn retributions_survive_reopening() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("breach.db");
    let (a, b) = (retribution(1, 2), retribution(2, 0));
    {
        let db = SqliteBackend::open(&path).unwrap();
        let store = RetributionStore::new(&db);
        store.add(&a).unwrap();
        store.add(&b).unwrap();
        store.remove(&b.chan_point).unwrap();
    }
    let db = SqliteBackend::open(&path).unwrap();
    let store = RetributionStore::new(&db);
    assert_eq!(collect(&store), vec![a.clone()]);
    assert_eq!(store.fetch(&a.chan_point).unwrap(), Some(a));
    assert_eq!(store.fetch(&b.chan_point).unwrap(), None);
}

#[test]
fn store_on_shared_backend_sees_writes() {
    let db = MemoryBackend::new();
    let writer = RetributionStore::new(&db);
    let reader = RetributionStore::new(&db);
    let ret = retribution(5, 1);
    writer.add(&ret).unwrap();
    assert_eq!(reader.fetch(&ret.chan_point).unwrap(), Some(ret));
}
