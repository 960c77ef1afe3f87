//! Wallet Ledger
//!
//! Atomic batch posting of wallet credits and debits.
//!
//! # Architecture
//!
//! - **Batch Commit**: Every entry of a batch lands, with its balance change, or none do
//! - **Store Locking**: Concurrent commits on a wallet are serialized by the store
//! - **Typed Records**: Versioned encoding, decode failures surface as errors
//!
//! # Invariants
//!
//! - Balance-as-sum: a wallet's balance equals the signed sum of its transactions
//! - Conservation: a transfer batch leaves the total across wallets unchanged
//! - Immutability: transactions are never modified or deleted

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod types;
pub mod ids;
pub mod codec;
pub mod storage;
pub mod ledger;
pub mod workflows;
pub mod error;
pub mod config;
pub mod metrics;

// Re-exports
pub use error::{Error, ErrorCategory, Result};
pub use types::{
    BatchId, CommittedBatch, Direction, Entry, OwnerId, Transaction, TransactionDetails,
    TransactionId, Wallet,
};
pub use ledger::{Ledger, WalletAudit};
pub use storage::{LedgerStore, MemoryStore, RocksStore};
pub use config::Config;
pub use metrics::Metrics;
