use async_trait::async_trait;
use lpg_common::Amount;
use thiserror::Error;

use crate::ledger_types::LedgerTransaction;

/// Queries against the ledger node. Every call is a network round trip and may fail or take a while.
#[async_trait]
pub trait LedgerClient: Clone + Send + Sync + 'static {
    /// Current balances, in the same order as `addresses`.
    async fn get_balances(&self, addresses: &[String]) -> Result<Vec<Amount>, LedgerError>;

    /// Every known transaction touching any of the given addresses.
    async fn find_transactions_by_address(&self, addresses: &[String]) -> Result<Vec<LedgerTransaction>, LedgerError>;

    /// Every known entry of the given bundle, in no particular order.
    async fn find_transactions_by_bundle(&self, bundle: &str) -> Result<Vec<LedgerTransaction>, LedgerError>;

    /// Validates the aggregate signature of a bundle. The entries must be ordered head first.
    async fn validate_bundle_signature(&self, bundle: &[LedgerTransaction]) -> Result<bool, LedgerError>;
}

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("The ledger node could not be reached. {0}")]
    Unreachable(String),
    #[error("The ledger node sent a malformed response. {0}")]
    MalformedResponse(String),
    #[error("The ledger node rejected the request. {0}")]
    Rejected(String),
}
