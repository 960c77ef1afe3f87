//! Core types for the wallet ledger
//!
//! Amounts and balances are integer minor currency units (paise, cents).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Wallet owner identifier; also the wallet's primary key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OwnerId(String);

impl OwnerId {
    /// Create new owner ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check that the ID can address a wallet.
    ///
    /// Owner IDs appear in resource names and storage keys, so they must be
    /// non-empty and free of `/` and control characters.
    pub fn validate(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(Error::InvalidEntry("wallet owner id is empty".to_string()));
        }
        if self.0.chars().any(|c| c == '/' || c.is_control()) {
            return Err(Error::InvalidEntry(format!(
                "wallet owner id {:?} contains '/' or control characters",
                self.0
            )));
        }
        Ok(())
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Transaction identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId(String);

impl TransactionId {
    /// Create new transaction ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier shared by every transaction committed in one batch
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BatchId(String);

impl BatchId {
    /// Create new batch ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Direction {
    /// Adds to the balance
    Credit = 1,
    /// Subtracts from the balance
    Debit = 2,
}

impl Direction {
    /// Signed effect of `amount` on a balance
    pub fn signed(self, amount: i64) -> i64 {
        match self {
            Direction::Credit => amount,
            Direction::Debit => -amount,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Credit => write!(f, "CREDIT"),
            Direction::Debit => write!(f, "DEBIT"),
        }
    }
}

/// Free-form attribution attached to a transaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDetails {
    /// Name shown to the wallet owner
    pub display_name: String,

    /// Optional longer description
    pub description: Option<String>,

    /// External reference, e.g. a payment gateway order ID
    pub reference: Option<String>,
}

impl TransactionDetails {
    /// Details with only a display name
    pub fn named(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            ..Default::default()
        }
    }

    /// Attach a description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach an external reference
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

/// Caller-constructed instruction to credit or debit one wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Wallet the entry affects
    pub wallet_owner_id: OwnerId,

    /// Magnitude in minor units; must be non-negative
    pub amount: i64,

    /// Credit or debit
    pub direction: Direction,

    /// Attribution copied onto the transaction
    pub details: TransactionDetails,
}

impl Entry {
    /// Credit `amount` to `owner`
    pub fn credit(owner: impl Into<OwnerId>, amount: i64, details: TransactionDetails) -> Self {
        Self {
            wallet_owner_id: owner.into(),
            amount,
            direction: Direction::Credit,
            details,
        }
    }

    /// Debit `amount` from `owner`
    pub fn debit(owner: impl Into<OwnerId>, amount: i64, details: TransactionDetails) -> Self {
        Self {
            wallet_owner_id: owner.into(),
            amount,
            direction: Direction::Debit,
            details,
        }
    }

    /// Signed balance delta of this entry
    pub fn signed_amount(&self) -> i64 {
        self.direction.signed(self.amount)
    }

    /// Reject malformed entries
    pub fn validate(&self) -> Result<()> {
        self.wallet_owner_id.validate()?;
        if self.amount < 0 {
            return Err(Error::InvalidEntry(format!(
                "amount must be non-negative, got {}",
                self.amount
            )));
        }
        Ok(())
    }
}

/// Immutable committed transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction ID
    pub id: TransactionId,

    /// Wallet this transaction affects
    pub wallet_owner_id: OwnerId,

    /// Magnitude in minor units
    pub amount: i64,

    /// Credit or debit
    pub direction: Direction,

    /// Batch this transaction was committed in
    pub batch_id: BatchId,

    /// Attribution
    pub details: TransactionDetails,

    /// Commit timestamp
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Signed balance effect
    pub fn signed_amount(&self) -> i64 {
        self.direction.signed(self.amount)
    }

    /// Resource name, `users/{owner}/wallet/transactions/{id}`
    pub fn name(&self) -> String {
        format!("{}/transactions/{}", wallet_name(&self.wallet_owner_id), self.id)
    }
}

/// Wallet balance row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    /// Owner and primary key
    pub owner_id: OwnerId,

    /// Current balance in minor units
    pub balance: i64,

    /// First balance-affecting write
    pub created_at: DateTime<Utc>,

    /// Latest balance-affecting write
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Resource name, `users/{owner}/wallet`
    pub fn name(&self) -> String {
        wallet_name(&self.owner_id)
    }
}

/// Result of a successful batch commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedBatch {
    /// Batch ID shared by every transaction
    pub batch_id: BatchId,

    /// Finalized records, in entry order
    pub transactions: Vec<Transaction>,
}

/// Resource name of an owner's wallet
pub fn wallet_name(owner: &OwnerId) -> String {
    format!("users/{}/wallet", owner)
}

/// Parse `users/{owner}/wallet`
pub fn parse_wallet_name(name: &str) -> Option<OwnerId> {
    let mut parts = name.split('/');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("users"), Some(owner), Some("wallet"), None) if !owner.is_empty() => {
            Some(OwnerId::new(owner))
        }
        _ => None,
    }
}

/// Parse `users/{owner}/wallet/transactions/{id}`
pub fn parse_transaction_name(name: &str) -> Option<(OwnerId, TransactionId)> {
    let parts: Vec<&str> = name.split('/').collect();
    match parts.as_slice() {
        ["users", owner, "wallet", "transactions", id] if !owner.is_empty() && !id.is_empty() => {
            Some((OwnerId::new(*owner), TransactionId::new(*id)))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_amount() {
        assert_eq!(Direction::Credit.signed(500), 500);
        assert_eq!(Direction::Debit.signed(500), -500);
        assert_eq!(Direction::Debit.signed(0), 0);
    }

    #[test]
    fn test_entry_validation() {
        let ok = Entry::credit("u1", 0, TransactionDetails::named("zero"));
        assert!(ok.validate().is_ok());

        let negative = Entry::debit("u1", -5, TransactionDetails::default());
        assert!(matches!(negative.validate(), Err(Error::InvalidEntry(_))));

        let no_wallet = Entry::credit("", 10, TransactionDetails::default());
        assert!(matches!(no_wallet.validate(), Err(Error::InvalidEntry(_))));

        let slash = Entry::credit("u1/x", 10, TransactionDetails::default());
        assert!(matches!(slash.validate(), Err(Error::InvalidEntry(_))));

        let nul = Entry::credit("u\01", 10, TransactionDetails::default());
        assert!(matches!(nul.validate(), Err(Error::InvalidEntry(_))));
    }

    #[test]
    fn test_resource_names() {
        let owner = OwnerId::new("u1");
        assert_eq!(wallet_name(&owner), "users/u1/wallet");
        assert_eq!(parse_wallet_name("users/u1/wallet"), Some(owner.clone()));
        assert_eq!(parse_wallet_name("users//wallet"), None);
        assert_eq!(parse_wallet_name("users/u1/wallet/extra"), None);

        let tx = Transaction {
            id: TransactionId::new("abc"),
            wallet_owner_id: owner.clone(),
            amount: 10,
            direction: Direction::Credit,
            batch_id: BatchId::new("b1"),
            details: TransactionDetails::default(),
            created_at: Utc::now(),
        };
        assert_eq!(tx.name(), "users/u1/wallet/transactions/abc");
        assert_eq!(
            parse_transaction_name(&tx.name()),
            Some((owner, TransactionId::new("abc")))
        );
        assert_eq!(parse_transaction_name("users/u1/wallet/payouts/abc"), None);
    }

    #[test]
    fn test_details_builder() {
        let details = TransactionDetails::named("Recharge")
            .with_description("UPI top-up")
            .with_reference("order_123");
        assert_eq!(details.display_name, "Recharge");
        assert_eq!(details.description.as_deref(), Some("UPI top-up"));
        assert_eq!(details.reference.as_deref(), Some("order_123"));
    }
}
