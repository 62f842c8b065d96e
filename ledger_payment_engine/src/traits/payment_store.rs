use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db_types::{NewPayment, Payment, PaymentId, SettlementResult, TxInfo};

/// The persistence contract for payments.
///
/// Backends must make each method atomic with respect to the record(s) it touches. Status transitions are conditional
/// on the payment still being `Open`, so that concurrent callers can never move a settled or timed-out payment back,
/// and never settle the same payment twice.
#[async_trait]
pub trait PaymentStore: Clone + Send + Sync + 'static {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores a brand-new payment. Fails with [`PaymentStoreError::PaymentAlreadyExists`] if the id is taken.
    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, PaymentStoreError>;

    async fn fetch_payment(&self, id: &PaymentId) -> Result<Option<Payment>, PaymentStoreError>;

    /// Fetches the most recent payment using the given receiving address.
    async fn fetch_payment_by_address(&self, address: &str) -> Result<Option<Payment>, PaymentStoreError>;

    /// All payments, oldest first.
    async fn fetch_payments(&self) -> Result<Vec<Payment>, PaymentStoreError>;

    /// All payments with `Open` status, oldest first.
    async fn fetch_open_payments(&self) -> Result<Vec<Payment>, PaymentStoreError>;

    /// Moves an `Open` payment to `Paid`. When `early_accepted` is true, the early-acceptance flag is set in the same
    /// update. Payments that are no longer open are returned unchanged in the matching [`SettlementResult`] variant.
    async fn mark_payment_paid(
        &self,
        id: &PaymentId,
        early_accepted: bool,
    ) -> Result<SettlementResult, PaymentStoreError>;

    /// Moves an `Open` payment to `Timeout`. Returns the updated payment, or `None` if it was no longer open.
    async fn mark_payment_timed_out(&self, id: &PaymentId) -> Result<Option<Payment>, PaymentStoreError>;

    /// Records the funding transfer of an `Open` payment. Returns the updated payment if anything changed, or `None`
    /// if the payment is no longer open or already carries this transfer.
    async fn record_tx_info(&self, id: &PaymentId, tx_info: &TxInfo) -> Result<Option<Payment>, PaymentStoreError>;

    /// Stamps the last-checked time on the given payments. Returns the number of records touched.
    async fn touch_last_checked(&self, ids: &[PaymentId], at: DateTime<Utc>) -> Result<u64, PaymentStoreError>;

    /// Adds an address index to the spent-index recycle set. Returns false if the index was already present.
    async fn add_recycled_index(&self, index: u64) -> Result<bool, PaymentStoreError>;

    /// The spent-index recycle set, in insertion order.
    async fn fetch_recycled_indices(&self) -> Result<Vec<u64>, PaymentStoreError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), PaymentStoreError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum PaymentStoreError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("Payment {0} does not exist")]
    PaymentNotFound(PaymentId),
    #[error("Cannot insert payment, since it already exists with id {0}")]
    PaymentAlreadyExists(PaymentId),
    #[error("The stored record for payment {0} is corrupt. {1}")]
    CorruptRecord(String, String),
}

impl From<sqlx::Error> for PaymentStoreError {
    fn from(e: sqlx::Error) -> Self {
        PaymentStoreError::DatabaseError(e.to_string())
    }
}
