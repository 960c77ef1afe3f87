//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `wallets` - Wallet rows (key: owner_id)
//! - `transactions` - Immutable transaction records (key: transaction_id)
//! - `wallet_index` - owner || 0x00 || created_at || seq || transaction_id -> empty
//! - `batch_index` - owner || 0x00 || batch_id || 0x00 || seq -> transaction_id
//!
//! Commits run inside a pessimistic `TransactionDB` transaction. Wallet rows and
//! transaction keys are read with `get_for_update`, so two batches touching the
//! same wallet serialize on its row lock and an ID collision aborts the batch.

use super::{CommitOptions, CommitUnit, LedgerStore, TransactionIter};
use crate::{
    codec,
    error::{Error, Result},
    types::{BatchId, OwnerId, Transaction, TransactionId, Wallet},
    Config,
};
use chrono::{DateTime, Utc};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, DBIteratorWithThreadMode, Direction,
    ErrorKind, IteratorMode, Options, SingleThreaded, TransactionDB, TransactionDBOptions,
    TransactionOptions, WriteOptions,
};
use std::path::PathBuf;

type Db = TransactionDB<SingleThreaded>;

/// Column family names
const CF_WALLETS: &str = "wallets";
const CF_TRANSACTIONS: &str = "transactions";
const CF_WALLET_INDEX: &str = "wallet_index";
const CF_BATCH_INDEX: &str = "batch_index";

/// Separator after variable-length key components
const SEP: u8 = 0x00;

/// Storage wrapper for RocksDB
pub struct RocksStore {
    db: Db,
    path: PathBuf,
    sync_writes: bool,
}

impl std::fmt::Debug for RocksStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksStore")
            .field("path", &self.path)
            .field("sync_writes", &self.sync_writes)
            .finish()
    }
}

impl RocksStore {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        // Database options
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);
        db_opts.set_compaction_style(DBCompactionStyle::Level);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let mut txn_db_opts = TransactionDBOptions::default();
        txn_db_opts.set_txn_lock_timeout(millis(config.commit.lock_timeout()));

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_WALLETS, Self::cf_options_rows()),
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_WALLET_INDEX, Self::cf_options_indices()),
            ColumnFamilyDescriptor::new(CF_BATCH_INDEX, Self::cf_options_indices()),
        ];

        let db = Db::open_cf_descriptors(&db_opts, &txn_db_opts, path, cf_descriptors)?;

        tracing::info!(
            path = %path.display(),
            sync_writes = config.commit.sync_writes,
            "Opened RocksDB wallet store"
        );

        Ok(Self {
            db,
            path: path.clone(),
            sync_writes: config.commit.sync_writes,
        })
    }

    // Column family options

    fn cf_options_rows() -> Options {
        let mut opts = Options::default();
        // Wallet rows are hot, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_records() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    // Helper: get column family handle

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    fn fetch_transaction(&self, id: &[u8]) -> Result<Option<Transaction>> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        match self.db.get_cf(cf, id)? {
            Some(value) => Ok(Some(codec::decode_transaction(id, &value)?)),
            None => Ok(None),
        }
    }

    fn scan(&self, cf_name: &str, prefix: Vec<u8>, layout: IndexLayout) -> Result<TransactionIter<'_>> {
        let cf = self.cf_handle(cf_name)?;
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));

        Ok(Box::new(IndexScan {
            store: self,
            iter,
            prefix,
            layout,
            done: false,
        }))
    }

    /// Close database (graceful shutdown)
    pub fn close(self) -> Result<()> {
        drop(self.db);
        tracing::info!("RocksDB closed gracefully");
        Ok(())
    }
}

impl LedgerStore for RocksStore {
    type Unit<'a> = RocksUnit<'a>;

    fn begin(&self, options: &CommitOptions) -> Result<RocksUnit<'_>> {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);

        let mut txn_opts = TransactionOptions::default();
        if let Some(timeout) = options.lock_timeout {
            txn_opts.set_lock_timeout(millis(timeout));
        }

        Ok(RocksUnit {
            wallets: self.cf_handle(CF_WALLETS)?,
            transactions: self.cf_handle(CF_TRANSACTIONS)?,
            wallet_index: self.cf_handle(CF_WALLET_INDEX)?,
            batch_index: self.cf_handle(CF_BATCH_INDEX)?,
            txn: self.db.transaction_opt(&write_opts, &txn_opts),
        })
    }

    fn get_wallet(&self, owner: &OwnerId) -> Result<Option<Wallet>> {
        let cf = self.cf_handle(CF_WALLETS)?;
        let key = owner.as_str().as_bytes();
        match self.db.get_cf(cf, key)? {
            Some(value) => Ok(Some(codec::decode_wallet(key, &value)?)),
            None => Ok(None),
        }
    }

    fn get_transaction(&self, owner: &OwnerId, id: &TransactionId) -> Result<Option<Transaction>> {
        Ok(self
            .fetch_transaction(id.as_str().as_bytes())?
            .filter(|tx| &tx.wallet_owner_id == owner))
    }

    fn list_transactions(
        &self,
        owner: &OwnerId,
        batch: Option<&BatchId>,
    ) -> Result<TransactionIter<'_>> {
        match batch {
            Some(batch) => self.scan(CF_BATCH_INDEX, batch_prefix(owner, batch), IndexLayout::IdInValue),
            None => self.scan(CF_WALLET_INDEX, owner_prefix(owner), IndexLayout::IdInKey),
        }
    }

    fn wallet_owners(&self) -> Result<Vec<OwnerId>> {
        let cf = self.cf_handle(CF_WALLETS)?;
        let mut owners = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item?;
            let owner = std::str::from_utf8(&key)
                .map_err(|e| Error::CorruptRecord(format!("wallet key is not UTF-8: {}", e)))?;
            owners.push(OwnerId::new(owner));
        }
        Ok(owners)
    }
}

/// Pending RocksDB transaction; rolled back on drop unless committed
pub struct RocksUnit<'a> {
    txn: rocksdb::Transaction<'a, Db>,
    wallets: &'a ColumnFamily,
    transactions: &'a ColumnFamily,
    wallet_index: &'a ColumnFamily,
    batch_index: &'a ColumnFamily,
}

impl CommitUnit for RocksUnit<'_> {
    fn apply_delta(&mut self, owner: &OwnerId, delta: i64, at: DateTime<Utc>) -> Result<Wallet> {
        let key = owner.as_str().as_bytes();
        let current = self
            .txn
            .get_for_update_cf(self.wallets, key, true)
            .map_err(commit_error)?;

        let wallet = match current {
            Some(value) => {
                let mut wallet = codec::decode_wallet(key, &value)?;
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

        self.txn
            .put_cf(self.wallets, key, codec::encode_wallet(&wallet)?)
            .map_err(commit_error)?;

        tracing::debug!(owner = %owner, delta, balance = wallet.balance, "Staged wallet delta");
        Ok(wallet)
    }

    fn insert(&mut self, transaction: &Transaction, seq: u32) -> Result<()> {
        let key = transaction.id.as_str().as_bytes();
        let existing = self
            .txn
            .get_for_update_cf(self.transactions, key, true)
            .map_err(commit_error)?;
        if existing.is_some() {
            return Err(Error::Commit(format!(
                "transaction id {} already exists",
                transaction.id
            )));
        }

        self.txn
            .put_cf(self.transactions, key, codec::encode_transaction(transaction)?)
            .map_err(commit_error)?;
        self.txn
            .put_cf(self.wallet_index, wallet_index_key(transaction, seq), b"")
            .map_err(commit_error)?;
        self.txn
            .put_cf(
                self.batch_index,
                batch_index_key(&transaction.wallet_owner_id, &transaction.batch_id, seq),
                key,
            )
            .map_err(commit_error)?;

        tracing::debug!(
            transaction_id = %transaction.id,
            owner = %transaction.wallet_owner_id,
            "Staged transaction insert"
        );
        Ok(())
    }

    fn commit(self) -> Result<()> {
        self.txn.commit().map_err(commit_error)
    }
}

/// Where an index entry keeps the transaction ID
#[derive(Debug, Clone, Copy)]
enum IndexLayout {
    /// Trailing bytes of the key, after timestamp and seq
    IdInKey,
    /// The entry's value
    IdInValue,
}

struct IndexScan<'a> {
    store: &'a RocksStore,
    iter: DBIteratorWithThreadMode<'a, Db>,
    prefix: Vec<u8>,
    layout: IndexLayout,
    done: bool,
}

impl Iterator for IndexScan<'_> {
    type Item = Result<Transaction>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let (key, value) = match self.iter.next()? {
            Ok(item) => item,
            Err(e) => {
                self.done = true;
                return Some(Err(e.into()));
            }
        };

        if !key.starts_with(&self.prefix) {
            self.done = true;
            return None;
        }

        let id: &[u8] = match self.layout {
            // prefix || created_at (8) || seq (4) || id
            IndexLayout::IdInKey => key.get(self.prefix.len() + 12..).unwrap_or_default(),
            IndexLayout::IdInValue => &value,
        };

        let result = match self.store.fetch_transaction(id) {
            Ok(Some(tx)) => Ok(tx),
            Ok(None) => Err(Error::CorruptRecord(format!(
                "index entry points at missing transaction {}",
                String::from_utf8_lossy(id)
            ))),
            Err(e) => Err(e),
        };
        if result.is_err() {
            self.done = true;
        }
        Some(result)
    }
}

// Index key helpers

fn owner_prefix(owner: &OwnerId) -> Vec<u8> {
    let mut key = owner.as_str().as_bytes().to_vec();
    key.push(SEP);
    key
}

fn wallet_index_key(transaction: &Transaction, seq: u32) -> Vec<u8> {
    let mut key = owner_prefix(&transaction.wallet_owner_id);
    key.extend_from_slice(&sortable_nanos(transaction.created_at));
    key.extend_from_slice(&seq.to_be_bytes());
    key.extend_from_slice(transaction.id.as_str().as_bytes());
    key
}

fn batch_prefix(owner: &OwnerId, batch: &BatchId) -> Vec<u8> {
    let mut key = owner_prefix(owner);
    key.extend_from_slice(batch.as_str().as_bytes());
    key.push(SEP);
    key
}

fn batch_index_key(owner: &OwnerId, batch: &BatchId, seq: u32) -> Vec<u8> {
    let mut key = batch_prefix(owner, batch);
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

/// Big-endian timestamp whose byte order matches chronological order
fn sortable_nanos(at: DateTime<Utc>) -> [u8; 8] {
    let nanos = at.timestamp_nanos_opt().unwrap_or(i64::MAX);
    ((nanos as u64) ^ (1 << 63)).to_be_bytes()
}

fn millis(duration: std::time::Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

fn commit_error(err: rocksdb::Error) -> Error {
    match err.kind() {
        ErrorKind::Busy | ErrorKind::TimedOut | ErrorKind::TryAgain => {
            tracing::warn!(error = %err, "Wallet lock contention");
            Error::Commit(format!("contention: {}", err))
        }
        _ => Error::Commit(err.to_string()),
    }
}
