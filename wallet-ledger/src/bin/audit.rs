//! Ledger audit binary
//!
//! Checks that every wallet's balance equals the sum of its transactions.
//!
//! Usage: `ledger-audit [config.toml]`. Without a path, configuration comes
//! from `WALLET_LEDGER_*` environment variables.

use anyhow::{bail, Context};
use wallet_ledger::{Config, Ledger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path).with_context(|| format!("loading {}", path))?,
        None => Config::from_env().context("loading configuration from environment")?,
    };

    tracing::info!(data_dir = %config.data_dir.display(), "Auditing wallet ledger");

    let ledger = Ledger::open(&config).context("opening ledger")?;
    let audits = ledger.audit_all().await.context("auditing wallets")?;

    let broken: Vec<_> = audits.iter().filter(|a| !a.is_consistent()).collect();
    for audit in &broken {
        tracing::error!(
            owner = %audit.owner_id,
            balance = audit.balance,
            ledger_sum = %audit.ledger_sum,
            transactions = audit.transaction_count,
            "Balance mismatch"
        );
    }

    tracing::info!(
        wallets = audits.len(),
        mismatched = broken.len(),
        "Audit finished"
    );

    if !broken.is_empty() {
        bail!("{} of {} wallets failed the audit", broken.len(), audits.len());
    }
    Ok(())
}
