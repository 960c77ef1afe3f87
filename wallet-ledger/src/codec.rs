//! Persisted record schema
//!
//! Every value is `[version][bincode payload]`. Decoding never panics: an
//! unknown version or malformed payload becomes [`Error::CorruptRecord`].

use crate::{
    types::{Transaction, Wallet},
    Error, Result,
};
use serde::{de::DeserializeOwned, Serialize};

/// Current schema version
pub const SCHEMA_VERSION: u8 = 1;

/// Kind of persisted record, used in error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// Wallet row
    Wallet,
    /// Transaction record
    Transaction,
}

impl RecordKind {
    fn as_str(self) -> &'static str {
        match self {
            RecordKind::Wallet => "wallet",
            RecordKind::Transaction => "transaction",
        }
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut bytes = vec![SCHEMA_VERSION];
    bincode::serialize_into(&mut bytes, value)?;
    Ok(bytes)
}

fn decode<T: DeserializeOwned>(kind: RecordKind, key: &[u8], bytes: &[u8]) -> Result<T> {
    let corrupt = |reason: String| {
        Error::CorruptRecord(format!(
            "{} {}: {}",
            kind.as_str(),
            String::from_utf8_lossy(key),
            reason
        ))
    };

    match bytes.split_first() {
        Some((&SCHEMA_VERSION, payload)) => {
            bincode::deserialize(payload).map_err(|e| corrupt(e.to_string()))
        }
        Some((version, _)) => Err(corrupt(format!("unknown schema version {}", version))),
        None => Err(corrupt("empty value".to_string())),
    }
}

/// Encode a wallet row
pub fn encode_wallet(wallet: &Wallet) -> Result<Vec<u8>> {
    encode(wallet)
}

/// Decode a wallet row stored under `key`
pub fn decode_wallet(key: &[u8], bytes: &[u8]) -> Result<Wallet> {
    decode(RecordKind::Wallet, key, bytes)
}

/// Encode a transaction record
pub fn encode_transaction(transaction: &Transaction) -> Result<Vec<u8>> {
    encode(transaction)
}

/// Decode a transaction record stored under `key`
pub fn decode_transaction(key: &[u8], bytes: &[u8]) -> Result<Transaction> {
    decode(RecordKind::Transaction, key, bytes)
}
