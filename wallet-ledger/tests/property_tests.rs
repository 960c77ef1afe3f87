//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify:
//! - Balance-as-sum: every balance equals the signed sum of its transactions
//! - Conservation: transfers never change the total across wallets
//! - Netting: entry order inside a batch does not change the outcome
//! - Validation: negative amounts never reach the store

use proptest::prelude::*;
use std::collections::HashMap;
use wallet_ledger::{
    workflows::Transfer, Entry, Error, Ledger, MemoryStore, OwnerId, TransactionDetails,
};

const OWNERS: [&str; 4] = ["u1", "u2", "u3", "u4"];

/// Strategy for generating valid entries over a small set of wallets
fn entry_strategy() -> impl Strategy<Value = Entry> {
    (0..OWNERS.len(), 0i64..10_000, any::<bool>()).prop_map(|(owner, amount, credit)| {
        let details = TransactionDetails::named("prop");
        if credit {
            Entry::credit(OWNERS[owner], amount, details)
        } else {
            Entry::debit(OWNERS[owner], amount, details)
        }
    })
}

fn batches_strategy() -> impl Strategy<Value = Vec<Vec<Entry>>> {
    prop::collection::vec(prop::collection::vec(entry_strategy(), 1..6), 1..12)
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn test_ledger() -> Ledger<MemoryStore> {
    Ledger::with_store(MemoryStore::new()).unwrap()
}

fn balances(ledger: &Ledger<MemoryStore>) -> HashMap<String, i64> {
    OWNERS
        .iter()
        .filter_map(|owner| {
            ledger
                .get_balance(&OwnerId::new(*owner))
                .unwrap()
                .map(|wallet| (owner.to_string(), wallet.balance))
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: balances always equal the sum of their transactions
    #[test]
    fn prop_balance_is_sum_of_transactions(batches in batches_strategy()) {
        let rt = runtime();
        rt.block_on(async {
            let ledger = test_ledger();
            let mut expected: HashMap<String, i64> = HashMap::new();

            for batch in batches {
                for entry in &batch {
                    *expected.entry(entry.wallet_owner_id.to_string()).or_insert(0) += entry.signed_amount();
                }
                ledger.commit_batch(batch).await.unwrap();
            }

            prop_assert_eq!(balances(&ledger), expected);

            let audits = ledger.audit_all().await.unwrap();
            prop_assert!(audits.iter().all(|a| a.is_consistent()));
            Ok(())
        })?;
    }

    /// Property: transfers conserve the total balance across wallets
    #[test]
    fn prop_transfers_conserve_total(
        seed in prop::collection::vec(0i64..100_000, OWNERS.len()),
        transfers in prop::collection::vec((0..OWNERS.len(), 0..OWNERS.len(), 0i64..50_000), 1..20),
    ) {
        let rt = runtime();
        rt.block_on(async {
            let ledger = test_ledger();
            let seed_entries = OWNERS
                .iter()
                .zip(&seed)
                .map(|(owner, amount)| Entry::credit(*owner, *amount, TransactionDetails::named("seed")))
                .collect();
            ledger.commit_batch(seed_entries).await.unwrap();
            let total: i64 = seed.iter().sum();

            for (from, to, amount) in transfers {
                let transfer = Transfer {
                    source: OwnerId::new(OWNERS[from]),
                    destination: OwnerId::new(OWNERS[to]),
                    amount,
                    details: TransactionDetails::named("transfer"),
                };
                let batch = ledger.commit_batch(transfer.into_entries()).await.unwrap();
                prop_assert_eq!(batch.transactions.iter().map(|t| t.signed_amount()).sum::<i64>(), 0);
                prop_assert_eq!(balances(&ledger).values().sum::<i64>(), total);
            }
            Ok(())
        })?;
    }

    /// Property: shuffling entries within a batch yields the same balances
    #[test]
    fn prop_netting_order_independent(
        (entries, shuffled) in prop::collection::vec(entry_strategy(), 1..10)
            .prop_flat_map(|entries| (Just(entries.clone()), Just(entries).prop_shuffle()))
    ) {
        let rt = runtime();
        rt.block_on(async {
            let a = test_ledger();
            let b = test_ledger();
            a.commit_batch(entries).await.unwrap();
            b.commit_batch(shuffled).await.unwrap();

            prop_assert_eq!(balances(&a), balances(&b));
            Ok(())
        })?;
    }

    /// Property: a negative amount anywhere rejects the whole batch
    #[test]
    fn prop_negative_amount_rejected(
        valid in prop::collection::vec(entry_strategy(), 0..5),
        amount in i64::MIN..0,
        position in any::<prop::sample::Index>(),
    ) {
        let rt = runtime();
        rt.block_on(async {
            let ledger = test_ledger();
            let mut entries = valid;
            let at = position.index(entries.len() + 1);
            entries.insert(at, Entry::debit("u1", amount, TransactionDetails::named("bad")));

            let result = ledger.commit_batch(entries).await;
            prop_assert!(matches!(result, Err(Error::InvalidEntry(_))));
            prop_assert!(balances(&ledger).is_empty());
            Ok(())
        })?;
    }
}
