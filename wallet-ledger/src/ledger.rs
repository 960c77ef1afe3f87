//! Ledger posting engine
//!
//! Turns a batch of entries into transactions and commits them, together with
//! the wallet balance changes they imply, as one atomic store write.
//!
//! # Example
//!
//! ```no_run
//! use wallet_ledger::{types::{Entry, TransactionDetails}, Config, Ledger};
//!
//! #[tokio::main]
//! async fn main() -> wallet_ledger::Result<()> {
//!     let ledger = Ledger::open(&Config::default())?;
//!
//!     let batch = ledger
//!         .commit_batch(vec![Entry::credit("u1", 500, TransactionDetails::named("Recharge"))])
//!         .await?;
//!     println!("committed {}", batch.batch_id);
//!
//!     Ok(())
//! }
//! ```

use crate::{
    ids::{IdSource, RandomIds},
    metrics::Metrics,
    storage::{CommitOptions, CommitUnit, LedgerStore, RocksStore, TransactionIter},
    types::{BatchId, CommittedBatch, Entry, OwnerId, Transaction, TransactionId, Wallet},
    Config, Error, Result,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Validated batch, ready to write
#[derive(Debug, Clone)]
pub struct PostingBatch {
    /// Batch ID shared by every transaction
    pub batch_id: BatchId,

    /// Commit timestamp, identical for every record in the batch
    pub created_at: DateTime<Utc>,

    /// Transactions in entry order
    pub transactions: Vec<Transaction>,

    /// Net balance change per wallet, in lock order
    pub deltas: BTreeMap<OwnerId, i64>,
}

/// Balance-as-sum check for one wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletAudit {
    /// Audited wallet
    pub owner_id: OwnerId,

    /// Stored balance
    pub balance: i64,

    /// Sum of signed amounts over the wallet's transactions
    pub ledger_sum: i128,

    /// Number of transactions summed
    pub transaction_count: usize,
}

impl WalletAudit {
    /// Whether the stored balance equals the transaction sum
    pub fn is_consistent(&self) -> bool {
        i128::from(self.balance) == self.ledger_sum
    }
}

/// Main ledger interface
pub struct Ledger<S: LedgerStore = RocksStore> {
    store: Arc<S>,
    ids: Arc<dyn IdSource>,
    metrics: Metrics,
    lock_timeout: Duration,
    default_timeout: Option<Duration>,
}

impl Ledger<RocksStore> {
    /// Open a RocksDB-backed ledger
    pub fn open(config: &Config) -> Result<Self> {
        let store = RocksStore::open(config)?;
        Ok(Ledger::with_store(store)?.with_commit_config(&config.commit))
    }
}

impl<S: LedgerStore> Ledger<S> {
    /// Assemble a ledger from explicit dependencies
    pub fn new(store: Arc<S>, ids: Arc<dyn IdSource>, metrics: Metrics) -> Self {
        let defaults = crate::config::CommitConfig::default();
        Self {
            store,
            ids,
            metrics,
            lock_timeout: defaults.lock_timeout(),
            default_timeout: defaults.default_timeout(),
        }
    }

    /// Ledger over `store` with random IDs and fresh metrics
    pub fn with_store(store: S) -> Result<Self> {
        Ok(Self::new(Arc::new(store), Arc::new(RandomIds), Metrics::new()?))
    }

    /// Apply lock and deadline settings
    pub fn with_commit_config(mut self, commit: &crate::config::CommitConfig) -> Self {
        self.lock_timeout = commit.lock_timeout();
        self.default_timeout = commit.default_timeout();
        self
    }

    /// Backing store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Validate entries and assign IDs without touching the store.
    ///
    /// Deltas targeting the same wallet are summed, so only the net change
    /// of each wallet is ever written.
    pub fn stage(&self, entries: Vec<Entry>) -> Result<PostingBatch> {
        if entries.is_empty() {
            return Err(Error::InvalidEntry("batch has no entries".to_string()));
        }

        let mut deltas: BTreeMap<OwnerId, i64> = BTreeMap::new();
        for (i, entry) in entries.iter().enumerate() {
            entry
                .validate()
                .map_err(|e| Error::InvalidEntry(format!("entry {}: {}", i, inner_message(e))))?;

            let net = deltas.entry(entry.wallet_owner_id.clone()).or_insert(0);
            *net = net.checked_add(entry.signed_amount()).ok_or_else(|| {
                Error::InvalidEntry(format!(
                    "net change to wallet {} overflows",
                    entry.wallet_owner_id
                ))
            })?;
        }

        let batch_id = BatchId::new(self.ids.new_id());
        let created_at = Utc::now();
        let transactions = entries
            .into_iter()
            .map(|entry| Transaction {
                id: TransactionId::new(self.ids.new_id()),
                wallet_owner_id: entry.wallet_owner_id,
                amount: entry.amount,
                direction: entry.direction,
                batch_id: batch_id.clone(),
                details: entry.details,
                created_at,
            })
            .collect();

        Ok(PostingBatch {
            batch_id,
            created_at,
            transactions,
            deltas,
        })
    }

    /// Commit a batch under the configured default deadline
    pub async fn commit_batch(&self, entries: Vec<Entry>) -> Result<CommittedBatch> {
        let deadline = self.default_timeout.map(|timeout| Instant::now() + timeout);
        self.commit(entries, deadline).await
    }

    /// Commit a batch, giving up waiting at `deadline`.
    ///
    /// On [`Error::DeadlineExceeded`] the write may still land; read the
    /// batch back to find out.
    pub async fn commit_batch_until(
        &self,
        entries: Vec<Entry>,
        deadline: Instant,
    ) -> Result<CommittedBatch> {
        self.commit(entries, Some(deadline)).await
    }

    async fn commit(&self, entries: Vec<Entry>, deadline: Option<Instant>) -> Result<CommittedBatch> {
        let batch = match self.stage(entries) {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = %e, "Rejected batch");
                self.metrics.record_invalid_batch();
                return Err(e);
            }
        };

        let batch_id = batch.batch_id.clone();
        let size = batch.transactions.len();
        debug!(
            batch_id = %batch_id,
            transactions = size,
            wallets = batch.deltas.len(),
            "Staged batch"
        );

        let mut options = CommitOptions {
            lock_timeout: Some(self.lock_timeout),
        };
        if let Some(deadline) = deadline {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(batch_id = %batch_id, "Deadline passed before commit started");
                self.metrics.record_commit_failure();
                return Err(Error::DeadlineExceeded);
            }
            options.lock_timeout = Some(remaining.min(self.lock_timeout));
        }

        let started = std::time::Instant::now();
        let store = self.store.clone();
        let task = tokio::task::spawn_blocking(move || {
            apply_batch(&*store, &batch, &options).map(|()| batch)
        });

        let joined = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, task).await,
            None => Ok(task.await),
        };

        let result = match joined {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(Error::from(join_error)),
            Err(_) => Err(Error::DeadlineExceeded),
        };

        match result {
            Ok(batch) => {
                let elapsed = started.elapsed();
                self.metrics.record_commit(size, elapsed.as_secs_f64());
                info!(
                    batch_id = %batch_id,
                    transactions = size,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Committed batch"
                );
                Ok(CommittedBatch {
                    batch_id: batch.batch_id,
                    transactions: batch.transactions,
                })
            }
            Err(e) => {
                warn!(batch_id = %batch_id, error = %e, "Batch commit failed");
                self.metrics.record_commit_failure();
                Err(e)
            }
        }
    }

    /// Current wallet, if it has ever been written
    pub fn get_balance(&self, owner: &OwnerId) -> Result<Option<Wallet>> {
        self.store.get_wallet(owner)
    }

    /// One transaction of one wallet
    pub fn get_transaction(&self, owner: &OwnerId, id: &TransactionId) -> Result<Option<Transaction>> {
        self.store.get_transaction(owner, id)
    }

    /// Transactions of a wallet in commit order, optionally for one batch
    pub fn list_transactions(
        &self,
        owner: &OwnerId,
        batch: Option<&BatchId>,
    ) -> Result<TransactionIter<'_>> {
        self.store.list_transactions(owner, batch)
    }

    /// Recompute one wallet's balance from its transactions.
    ///
    /// Not isolated from concurrent commits; audit a quiescent ledger.
    pub async fn audit_wallet(&self, owner: &OwnerId) -> Result<WalletAudit> {
        let store = self.store.clone();
        let owner = owner.clone();
        tokio::task::spawn_blocking(move || audit(&*store, &owner)).await?
    }

    /// Audit every wallet in the store
    pub async fn audit_all(&self) -> Result<Vec<WalletAudit>> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<WalletAudit>> {
            store
                .wallet_owners()?
                .iter()
                .map(|owner| audit(&*store, owner))
                .collect()
        })
        .await?
    }
}

impl<S: LedgerStore> Clone for Ledger<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            ids: self.ids.clone(),
            metrics: self.metrics.clone(),
            lock_timeout: self.lock_timeout,
            default_timeout: self.default_timeout,
        }
    }
}

impl<S: LedgerStore> std::fmt::Debug for Ledger<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("lock_timeout", &self.lock_timeout)
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

/// Write a staged batch as one atomic unit.
///
/// Wallets are locked in owner order. Any failure drops the unit, which
/// discards every staged write, and is reported as [`Error::Commit`].
pub fn apply_batch<S: LedgerStore>(
    store: &S,
    batch: &PostingBatch,
    options: &CommitOptions,
) -> Result<()> {
    let write = || -> Result<()> {
        let mut unit = store.begin(options)?;
        for (owner, delta) in &batch.deltas {
            unit.apply_delta(owner, *delta, batch.created_at)?;
        }
        for (seq, transaction) in batch.transactions.iter().enumerate() {
            unit.insert(transaction, seq as u32)?;
        }
        unit.commit()
    };

    write().map_err(|e| match e {
        Error::Commit(_) | Error::CorruptRecord(_) => e,
        other => Error::Commit(other.to_string()),
    })
}

fn audit<S: LedgerStore>(store: &S, owner: &OwnerId) -> Result<WalletAudit> {
    let balance = store.get_wallet(owner)?.map_or(0, |wallet| wallet.balance);

    let mut ledger_sum = 0i128;
    let mut transaction_count = 0;
    for transaction in store.list_transactions(owner, None)? {
        ledger_sum += i128::from(transaction?.signed_amount());
        transaction_count += 1;
    }

    let audit = WalletAudit {
        owner_id: owner.clone(),
        balance,
        ledger_sum,
        transaction_count,
    };
    if !audit.is_consistent() {
        warn!(owner = %owner, balance, ledger_sum = %ledger_sum, "Wallet balance does not match its transactions");
    }
    Ok(audit)
}

fn inner_message(err: Error) -> String {
    match err {
        Error::InvalidEntry(message) => message,
        other => other.to_string(),
    }
}
