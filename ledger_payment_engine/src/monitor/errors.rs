use lpg_common::Amount;
use thiserror::Error;

use crate::traits::{AllocationError, LedgerError, PaymentStoreError};

/// Errors raised by the polling monitor and scheduler. None of them change payment state beyond what was already
/// persisted when they occurred.
#[derive(Debug, Clone, Error)]
pub enum MonitorError {
    #[error("Ledger query failed. {0}")]
    Query(#[from] LedgerError),
    #[error("Could not persist payment state. {0}")]
    Persistence(#[from] PaymentStoreError),
    #[error("Address allocator failure. {0}")]
    Allocation(#[from] AllocationError),
}

/// The reasons a candidate unconfirmed transfer is discarded by the fraud checks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationFailure {
    #[error("Transfer of {received} does not cover the required {required}")]
    InsufficientAmount { required: Amount, received: Amount },
    #[error("Bundle {0} has no inputs")]
    NoInputs(String),
    #[error("Insufficient backing funds on input {address}: balance {balance}, debited {debited}")]
    InsufficientInputBalance { address: String, balance: Amount, debited: Amount },
    #[error("Bundle {0} could not be reconstructed from the ledger")]
    IncompleteBundle(String),
    #[error("Invalid signature on bundle {0}")]
    InvalidSignature(String),
    #[error("Competing outgoing transfer detected from {address} in bundle {bundle}")]
    CompetingSpend { address: String, bundle: String },
}

#[derive(Debug, Clone, Error)]
pub enum ZeroConfError {
    #[error("Transfer rejected. {0}")]
    Rejected(#[from] ValidationFailure),
    #[error("Ledger query failed. {0}")]
    Query(#[from] LedgerError),
    #[error("Could not persist early acceptance. {0}")]
    Persistence(#[from] PaymentStoreError),
}

impl ZeroConfError {
    /// True if the transfer failed a fraud check, as opposed to the checks being unable to run.
    pub fn is_rejection(&self) -> bool {
        matches!(self, ZeroConfError::Rejected(_))
    }
}
