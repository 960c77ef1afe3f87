//! Wallet and transaction stores
//!
//! A store exposes point reads and ordered listing, plus a [`CommitUnit`]:
//! the store's native atomic-write primitive. The posting engine stages every
//! balance delta and transaction insert of a batch into one unit and then
//! commits it. Dropping a unit without committing discards everything staged.
//!
//! - [`RocksStore`] - RocksDB pessimistic transactions, durable
//! - [`MemoryStore`] - in-process, with fault injection for tests

use crate::{
    types::{BatchId, OwnerId, Transaction, TransactionId, Wallet},
    Result,
};
use chrono::{DateTime, Utc};
use std::time::Duration;

mod memory;
mod rocks;

pub use memory::MemoryStore;
pub use rocks::RocksStore;

/// Lazy, finite sequence of transactions; call the listing again to restart
pub type TransactionIter<'a> = Box<dyn Iterator<Item = Result<Transaction>> + 'a>;

/// Per-commit options passed down to the store
#[derive(Debug, Clone, Default)]
pub struct CommitOptions {
    /// Maximum time to wait for a contended wallet lock
    pub lock_timeout: Option<Duration>,
}

/// Backing store for wallets and transactions
pub trait LedgerStore: Send + Sync + 'static {
    /// Atomic write unit
    type Unit<'a>: CommitUnit
    where
        Self: 'a;

    /// Start an atomic write unit
    fn begin(&self, options: &CommitOptions) -> Result<Self::Unit<'_>>;

    /// Point read of a wallet
    fn get_wallet(&self, owner: &OwnerId) -> Result<Option<Wallet>>;

    /// Point read of a transaction, scoped to its wallet
    fn get_transaction(&self, owner: &OwnerId, id: &TransactionId) -> Result<Option<Transaction>>;

    /// All transactions of a wallet, optionally restricted to one batch,
    /// ordered by `created_at` and then by position within the batch
    fn list_transactions(
        &self,
        owner: &OwnerId,
        batch: Option<&BatchId>,
    ) -> Result<TransactionIter<'_>>;

    /// Every wallet that has been written at least once
    fn wallet_owners(&self) -> Result<Vec<OwnerId>>;
}

/// Staged writes that apply all together or not at all
pub trait CommitUnit {
    /// Add `delta` to the owner's balance, creating the wallet when absent.
    ///
    /// Returns the wallet as it will read after commit.
    fn apply_delta(&mut self, owner: &OwnerId, delta: i64, at: DateTime<Utc>) -> Result<Wallet>;

    /// Insert an immutable transaction record; `seq` is its position in the batch.
    ///
    /// Fails if a record with the same ID exists.
    fn insert(&mut self, transaction: &Transaction, seq: u32) -> Result<()>;

    /// Make every staged write durable and visible at once
    fn commit(self) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod tests {
    //! Behaviour every store must share

    use super::*;
    use crate::types::{Direction, TransactionDetails};
    use crate::Error;

    pub fn transaction(id: &str, owner: &str, batch: &str, amount: i64, direction: Direction) -> Transaction {
        Transaction {
            id: TransactionId::new(id),
            wallet_owner_id: OwnerId::new(owner),
            amount,
            direction,
            batch_id: BatchId::new(batch),
            details: TransactionDetails::named("test"),
            created_at: Utc::now(),
        }
    }

    pub fn commit_one<S: LedgerStore>(store: &S, tx: &Transaction) {
        let mut unit = store.begin(&CommitOptions::default()).unwrap();
        unit.apply_delta(&tx.wallet_owner_id, tx.signed_amount(), tx.created_at)
            .unwrap();
        unit.insert(tx, 0).unwrap();
        unit.commit().unwrap();
    }

    pub fn check_upsert_and_increment<S: LedgerStore>(store: &S) {
        let owner = OwnerId::new("u1");
        assert!(store.get_wallet(&owner).unwrap().is_none());

        commit_one(store, &transaction("t1", "u1", "b1", 500, Direction::Credit));
        let wallet = store.get_wallet(&owner).unwrap().unwrap();
        assert_eq!(wallet.balance, 500);
        let created_at = wallet.created_at;

        commit_one(store, &transaction("t2", "u1", "b2", 200, Direction::Debit));
        let wallet = store.get_wallet(&owner).unwrap().unwrap();
        assert_eq!(wallet.balance, 300);
        assert_eq!(wallet.created_at, created_at);
        assert!(wallet.updated_at >= created_at);
    }

    pub fn check_uncommitted_unit_is_discarded<S: LedgerStore>(store: &S) {
        {
            let mut unit = store.begin(&CommitOptions::default()).unwrap();
            let tx = transaction("t1", "u1", "b1", 100, Direction::Credit);
            unit.apply_delta(&tx.wallet_owner_id, 100, tx.created_at).unwrap();
            unit.insert(&tx, 0).unwrap();
        }

        let owner = OwnerId::new("u1");
        assert!(store.get_wallet(&owner).unwrap().is_none());
        assert!(store
            .get_transaction(&owner, &TransactionId::new("t1"))
            .unwrap()
            .is_none());
        assert_eq!(store.list_transactions(&owner, None).unwrap().count(), 0);
    }

    pub fn check_duplicate_id_rejected<S: LedgerStore>(store: &S) {
        commit_one(store, &transaction("dup", "u1", "b1", 100, Direction::Credit));

        let mut unit = store.begin(&CommitOptions::default()).unwrap();
        let tx = transaction("dup", "u2", "b2", 50, Direction::Credit);
        unit.apply_delta(&tx.wallet_owner_id, 50, tx.created_at).unwrap();
        let err = unit.insert(&tx, 0).unwrap_err();
        assert!(matches!(err, Error::Commit(_)));
        drop(unit);

        assert!(store.get_wallet(&OwnerId::new("u2")).unwrap().is_none());
    }

    pub fn check_scoped_get<S: LedgerStore>(store: &S) {
        commit_one(store, &transaction("t1", "u1", "b1", 100, Direction::Credit));

        let id = TransactionId::new("t1");
        assert!(store.get_transaction(&OwnerId::new("u1"), &id).unwrap().is_some());
        assert!(store.get_transaction(&OwnerId::new("u2"), &id).unwrap().is_none());
        assert!(store
            .get_transaction(&OwnerId::new("u1"), &TransactionId::new("missing"))
            .unwrap()
            .is_none());
    }

    pub fn check_listing<S: LedgerStore>(store: &S) {
        let at = Utc::now();
        let mut unit = store.begin(&CommitOptions::default()).unwrap();
        unit.apply_delta(&OwnerId::new("u1"), 60, at).unwrap();
        unit.apply_delta(&OwnerId::new("u10"), 5, at).unwrap();
        // Ids deliberately out of lexical order to prove listing follows seq.
        for (seq, (id, owner, amount)) in [("zz", "u1", 10), ("aa", "u1", 20), ("mm", "u1", 30), ("u10tx", "u10", 5)]
            .into_iter()
            .enumerate()
        {
            let mut tx = transaction(id, owner, "b1", amount, Direction::Credit);
            tx.created_at = at;
            unit.insert(&tx, seq as u32).unwrap();
        }
        unit.commit().unwrap();

        let mut later = transaction("later", "u1", "b2", 1, Direction::Debit);
        later.created_at = at + chrono::Duration::seconds(1);
        let mut unit = store.begin(&CommitOptions::default()).unwrap();
        unit.apply_delta(&later.wallet_owner_id, -1, later.created_at).unwrap();
        unit.insert(&later, 0).unwrap();
        unit.commit().unwrap();

        let owner = OwnerId::new("u1");
        let ids: Vec<String> = store
            .list_transactions(&owner, None)
            .unwrap()
            .map(|tx| tx.unwrap().id.to_string())
            .collect();
        assert_eq!(ids, vec!["zz", "aa", "mm", "later"]);

        let batch: Vec<String> = store
            .list_transactions(&owner, Some(&BatchId::new("b1")))
            .unwrap()
            .map(|tx| tx.unwrap().id.to_string())
            .collect();
        assert_eq!(batch, vec!["zz", "aa", "mm"]);

        // Owner "u1" must not pick up "u10" rows.
        assert!(store
            .list_transactions(&owner, None)
            .unwrap()
            .all(|tx| tx.unwrap().wallet_owner_id == owner));

        assert_eq!(
            store
                .list_transactions(&owner, Some(&BatchId::new("nope")))
                .unwrap()
                .count(),
            0
        );

        let mut owners = store.wallet_owners().unwrap();
        owners.sort();
        assert_eq!(owners, vec![OwnerId::new("u1"), OwnerId::new("u10")]);
    }
}
