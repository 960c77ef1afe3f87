//! In-process store
//!
//! Writers are serialized by a single commit lock; staged writes live in the
//! unit until `commit`, which publishes them under the state write lock.

use super::{CommitOptions, CommitUnit, LedgerStore, TransactionIter};
use crate::{
    types::{BatchId, OwnerId, Transaction, TransactionId, Wallet},
    Error, Result,
};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
struct MemoryState {
    wallets: BTreeMap<OwnerId, Wallet>,
    transactions: HashMap<TransactionId, Transaction>,
    // (transaction, seq) in commit order
    by_wallet: HashMap<OwnerId, Vec<(TransactionId, u32)>>,
}

/// In-memory wallet and transaction store
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    writer: Mutex<()>,
    fail_after: Mutex<Option<usize>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next commit fail once `writes` staged writes have succeeded.
    ///
    /// Simulates a store fault partway through a batch.
    pub fn fail_after(&self, writes: usize) {
        *self.fail_after.lock() = Some(writes);
    }

    fn tick_fault(&self) -> Result<()> {
        let mut fail_after = self.fail_after.lock();
        match *fail_after {
            Some(0) => {
                *fail_after = None;
                Err(Error::Storage("injected store fault".to_string()))
            }
            Some(ref mut remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl LedgerStore for MemoryStore {
    type Unit<'a> = MemoryUnit<'a>;

    fn begin(&self, _options: &CommitOptions) -> Result<MemoryUnit<'_>> {
        Ok(MemoryUnit {
            store: self,
            _writer: self.writer.lock(),
            wallets: BTreeMap::new(),
            inserts: Vec::new(),
        })
    }

    fn get_wallet(&self, owner: &OwnerId) -> Result<Option<Wallet>> {
        Ok(self.state.read().wallets.get(owner).cloned())
    }

    fn get_transaction(&self, owner: &OwnerId, id: &TransactionId) -> Result<Option<Transaction>> {
        Ok(self
            .state
            .read()
            .transactions
            .get(id)
            .filter(|tx| &tx.wallet_owner_id == owner)
            .cloned())
    }

    fn list_transactions(
        &self,
        owner: &OwnerId,
        batch: Option<&BatchId>,
    ) -> Result<TransactionIter<'_>> {
        let state = self.state.read();
        let mut rows: Vec<(Transaction, u32)> = state
            .by_wallet
            .get(owner)
            .into_iter()
            .flatten()
            .filter_map(|(id, seq)| state.transactions.get(id).map(|tx| (tx.clone(), *seq)))
            .filter(|(tx, _)| batch.map_or(true, |b| &tx.batch_id == b))
            .collect();
        rows.sort_by(|(a, a_seq), (b, b_seq)| {
            (a.created_at, a_seq, &a.id).cmp(&(b.created_at, b_seq, &b.id))
        });

        Ok(Box::new(rows.into_iter().map(|(tx, _)| Ok(tx))))
    }

    fn wallet_owners(&self) -> Result<Vec<OwnerId>> {
        Ok(self.state.read().wallets.keys().cloned().collect())
    }
}

/// Pending in-memory commit; discarded on drop unless committed
#[derive(Debug)]
pub struct MemoryUnit<'a> {
    store: &'a MemoryStore,
    _writer: MutexGuard<'a, ()>,
    wallets: BTreeMap<OwnerId, Wallet>,
    inserts: Vec<(Transaction, u32)>,
}

impl CommitUnit for MemoryUnit<'_> {
    fn apply_delta(&mut self, owner: &OwnerId, delta: i64, at: DateTime<Utc>) -> Result<Wallet> {
        self.store.tick_fault()?;

        let current = match self.wallets.get(owner) {
            Some(staged) => Some(staged.clone()),
            None => self.store.state.read().wallets.get(owner).cloned(),
        };

        let wallet = match current {
            Some(mut wallet) => {
                wallet.balance = wallet.balance.checked_add(delta).ok_or_else(|| {
                    Error::Commit(format!("balance of wallet {} would overflow", owner))
                })?;
                wallet.updated_at = at;
                wallet
            }
            None => Wallet {
                owner_id: owner.clone(),
                balance: delta,
                created_at: at,
                updated_at: at,
            },
        };

        self.wallets.insert(owner.clone(), wallet.clone());
        Ok(wallet)
    }

    fn insert(&mut self, transaction: &Transaction, seq: u32) -> Result<()> {
        self.store.tick_fault()?;

        let exists = self.store.state.read().transactions.contains_key(&transaction.id)
            || self.inserts.iter().any(|(tx, _)| tx.id == transaction.id);
        if exists {
            return Err(Error::Commit(format!(
                "transaction id {} already exists",
                transaction.id
            )));
        }

        self.inserts.push((transaction.clone(), seq));
        Ok(())
    }

    fn commit(self) -> Result<()> {
        let mut state = self.store.state.write();
        state.wallets.extend(self.wallets);
        for (tx, seq) in self.inserts {
            state
                .by_wallet
                .entry(tx.wallet_owner_id.clone())
                .or_default()
                .push((tx.id.clone(), seq));
            state.transactions.insert(tx.id.clone(), tx);
        }
        Ok(())
    }
}
