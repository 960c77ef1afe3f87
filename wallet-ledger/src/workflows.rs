//! Calling workflows
//!
//! Builders for the entry lists that transfers, recharges and payouts submit,
//! and the balance preconditions checked before submitting them. The engine
//! itself knows nothing about these workflows.
//!
//! Preconditions are checked against a balance read before the commit, so
//! two concurrent payouts can both pass. Callers that need a hard floor must
//! serialize payouts per wallet.

use crate::{
    ledger::Ledger,
    storage::LedgerStore,
    types::{CommittedBatch, Entry, OwnerId, TransactionDetails, Wallet},
    Error, Result,
};
use tracing::info;

/// Move `amount` from one wallet to another
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    /// Debited wallet
    pub source: OwnerId,
    /// Credited wallet
    pub destination: OwnerId,
    /// Amount in minor units
    pub amount: i64,
    /// Copied onto both legs
    pub details: TransactionDetails,
}

impl Transfer {
    /// Debit leg then credit leg, with identical details
    pub fn into_entries(self) -> Vec<Entry> {
        vec![
            Entry::debit(self.source, self.amount, self.details.clone()),
            Entry::credit(self.destination, self.amount, self.details),
        ]
    }
}

/// Entries for topping up a wallet
pub fn recharge_entries(owner: OwnerId, amount: i64, details: TransactionDetails) -> Vec<Entry> {
    vec![Entry::credit(owner, amount, details)]
}

/// Entries for paying out of a wallet
pub fn payout_entries(owner: OwnerId, amount: i64, details: TransactionDetails) -> Vec<Entry> {
    vec![Entry::debit(owner, amount, details)]
}

fn balance(wallet: Option<&Wallet>) -> i64 {
    wallet.map_or(0, |w| w.balance)
}

/// A recharge into a wallet in debt must at least clear the debt
pub fn check_recharge(wallet: Option<&Wallet>, amount: i64) -> Result<()> {
    let balance = balance(wallet);
    if balance < 0 && i128::from(amount) < -i128::from(balance) {
        return Err(Error::Precondition(format!(
            "recharge of {} does not cover balance due of {}",
            amount, -i128::from(balance)
        )));
    }
    Ok(())
}

/// A payout may not exceed the wallet balance
pub fn check_payout(wallet: Option<&Wallet>, amount: i64) -> Result<()> {
    let balance = balance(wallet);
    if amount > balance {
        return Err(Error::Precondition(format!(
            "payout of {} exceeds wallet balance of {}",
            amount, balance
        )));
    }
    Ok(())
}

/// Check the recharge precondition and commit the credit
pub async fn recharge<S: LedgerStore>(
    ledger: &Ledger<S>,
    owner: OwnerId,
    amount: i64,
    details: TransactionDetails,
) -> Result<CommittedBatch> {
    check_recharge(ledger.get_balance(&owner)?.as_ref(), amount)?;
    let batch = ledger
        .commit_batch(recharge_entries(owner.clone(), amount, details))
        .await?;
    info!(owner = %owner, amount, batch_id = %batch.batch_id, "Recharged wallet");
    Ok(batch)
}

/// Check the payout precondition and commit the debit
pub async fn payout<S: LedgerStore>(
    ledger: &Ledger<S>,
    owner: OwnerId,
    amount: i64,
    details: TransactionDetails,
) -> Result<CommittedBatch> {
    check_payout(ledger.get_balance(&owner)?.as_ref(), amount)?;
    let batch = ledger
        .commit_batch(payout_entries(owner.clone(), amount, details))
        .await?;
    info!(owner = %owner, amount, batch_id = %batch.batch_id, "Paid out of wallet");
    Ok(batch)
}

/// Commit both legs of a transfer as one batch
pub async fn transfer<S: LedgerStore>(ledger: &Ledger<S>, transfer: Transfer) -> Result<CommittedBatch> {
    ledger.commit_batch(transfer.into_entries()).await
}
