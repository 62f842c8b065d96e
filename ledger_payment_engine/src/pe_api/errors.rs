use thiserror::Error;

use crate::traits::{AllocationError, LedgerError, PaymentStoreError};

#[derive(Debug, Clone, Error)]
pub enum PaymentApiError {
    #[error("Invalid payment request. {0}")]
    InvalidPaymentRequest(String),
    #[error("Could not allocate a receiving address. {0}")]
    Allocation(#[from] AllocationError),
    #[error("Payment store error. {0}")]
    Persistence(#[from] PaymentStoreError),
}

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("Configuration error. {0}")]
    ConfigurationError(String),
    #[error("Ledger query failed. {0}")]
    Query(#[from] LedgerError),
    #[error("Payment store error. {0}")]
    Persistence(#[from] PaymentStoreError),
}
