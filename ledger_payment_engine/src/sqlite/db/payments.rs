use chrono::{DateTime, Utc};
use log::{debug, trace};
use lpg_common::Amount;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection};

use crate::{
    db_types::{NewPayment, Payment, PaymentId, PaymentKind, PaymentStatus, SettlementResult, TxInfo},
    traits::PaymentStoreError,
};

/// The raw `payments` table row. Converted into a [`Payment`] with [`TryFrom`].
#[derive(Debug, Clone, FromRow)]
pub struct PaymentRow {
    pub id: String,
    pub address: String,
    pub address_index: i64,
    pub kind: String,
    pub value: Option<i64>,
    pub confirmation_time: Option<DateTime<Utc>>,
    pub data: String,
    pub status: String,
    pub tx_message: Option<String>,
    pub tx_timestamp: Option<DateTime<Utc>>,
    pub tx_hash: Option<String>,
    pub last_checked: Option<DateTime<Utc>>,
    pub early_accepted: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = PaymentStoreError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let corrupt = |msg: String| PaymentStoreError::CorruptRecord(row.id.clone(), msg);
        let kind = match (row.kind.as_str(), row.value, row.confirmation_time) {
            ("value", Some(v), _) => PaymentKind::Value { value: Amount::from(v) },
            ("time", _, Some(t)) => PaymentKind::Time { confirmation_time: t },
            (k, _, _) => return Err(corrupt(format!("Payment kind '{k}' is missing its settlement condition"))),
        };
        let status = row.status.parse::<PaymentStatus>().map_err(|e| corrupt(e.to_string()))?;
        let data = serde_json::from_str(&row.data).map_err(|e| corrupt(format!("Invalid payment data. {e}")))?;
        let index = u64::try_from(row.address_index).map_err(|e| corrupt(format!("Invalid address index. {e}")))?;
        let tx_info = match (row.tx_message, row.tx_timestamp, row.tx_hash) {
            (Some(message), Some(timestamp), Some(hash)) => Some(TxInfo { message, timestamp, hash }),
            _ => None,
        };
        Ok(Payment {
            id: PaymentId::from(row.id),
            address: row.address,
            index,
            kind,
            data,
            status,
            tx_info,
            last_checked: row.last_checked,
            early_accepted: row.early_accepted,
            created_at: row.created_at,
        })
    }
}

fn to_payment(row: PaymentRow) -> Result<Payment, PaymentStoreError> {
    Payment::try_from(row)
}

fn to_payments(rows: Vec<PaymentRow>) -> Result<Vec<Payment>, PaymentStoreError> {
    rows.into_iter().map(to_payment).collect()
}

/// Inserts a new payment. This is not atomic. You can embed this call inside a transaction if you need to ensure
/// atomicity, and pass `&mut *tx` as the connection argument.
pub async fn insert_payment(payment: NewPayment, conn: &mut SqliteConnection) -> Result<Payment, PaymentStoreError> {
    let id = payment.id.clone();
    let (value, confirmation_time) = match payment.kind {
        PaymentKind::Value { value } => (Some(value.value()), None),
        PaymentKind::Time { confirmation_time } => (None, Some(confirmation_time)),
    };
    let index = i64::try_from(payment.index)
        .map_err(|e| PaymentStoreError::DatabaseError(format!("Address index out of range. {e}")))?;
    let row: PaymentRow = sqlx::query_as(
        r#"
            INSERT INTO payments (id, address, address_index, kind, value, confirmation_time, data, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *;
        "#,
    )
    .bind(payment.id.as_str())
    .bind(payment.address)
    .bind(index)
    .bind(payment.kind.type_name())
    .bind(value)
    .bind(confirmation_time)
    .bind(payment.data.to_string())
    .bind(payment.created_at)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => PaymentStoreError::PaymentAlreadyExists(id),
        _ => PaymentStoreError::from(e),
    })?;
    debug!("🗃️ Payment {} inserted for address {}", row.id, row.address);
    to_payment(row)
}

pub async fn fetch_payment(id: &PaymentId, conn: &mut SqliteConnection) -> Result<Option<Payment>, PaymentStoreError> {
    let row: Option<PaymentRow> =
        sqlx::query_as("SELECT * FROM payments WHERE id = $1").bind(id.as_str()).fetch_optional(conn).await?;
    row.map(to_payment).transpose()
}

/// Returns the most recently created payment for the given address.
pub async fn fetch_payment_by_address(
    address: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, PaymentStoreError> {
    let row: Option<PaymentRow> =
        sqlx::query_as("SELECT * FROM payments WHERE address = $1 ORDER BY created_at DESC LIMIT 1")
            .bind(address)
            .fetch_optional(conn)
            .await?;
    row.map(to_payment).transpose()
}

pub async fn fetch_payments(conn: &mut SqliteConnection) -> Result<Vec<Payment>, PaymentStoreError> {
    let rows: Vec<PaymentRow> = sqlx::query_as("SELECT * FROM payments ORDER BY created_at ASC").fetch_all(conn).await?;
    to_payments(rows)
}

pub async fn fetch_payments_with_status(
    status: PaymentStatus,
    conn: &mut SqliteConnection,
) -> Result<Vec<Payment>, PaymentStoreError> {
    let rows: Vec<PaymentRow> = sqlx::query_as("SELECT * FROM payments WHERE status = $1 ORDER BY created_at ASC")
        .bind(status.to_string())
        .fetch_all(conn)
        .await?;
    to_payments(rows)
}

/// The single conditional update behind every `Open` → `Paid` transition. Not atomic on its own: the caller wraps it in
/// a transaction together with the follow-up read.
async fn settle_open_payment(
    id: &PaymentId,
    early_accepted: bool,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, PaymentStoreError> {
    let row: Option<PaymentRow> = sqlx::query_as(
        r#"
            UPDATE payments SET status = 'Paid', early_accepted = (early_accepted OR $2), updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND status = 'Open'
            RETURNING *;
        "#,
    )
    .bind(id.as_str())
    .bind(early_accepted)
    .fetch_optional(conn)
    .await?;
    row.map(to_payment).transpose()
}

pub async fn mark_payment_paid(
    id: &PaymentId,
    early_accepted: bool,
    conn: &mut SqliteConnection,
) -> Result<SettlementResult, PaymentStoreError> {
    if let Some(payment) = settle_open_payment(id, early_accepted, conn).await? {
        trace!("🗃️ Payment {id} marked as paid (early: {early_accepted})");
        return Ok(SettlementResult::Settled(payment));
    }
    let current = fetch_payment(id, conn).await?.ok_or_else(|| PaymentStoreError::PaymentNotFound(id.clone()))?;
    match current.status {
        PaymentStatus::Paid => Ok(SettlementResult::AlreadySettled(current)),
        PaymentStatus::Timeout => Ok(SettlementResult::TimedOut(current)),
        // Only reachable if the update above raced with an insert of the same id, which ids rule out.
        PaymentStatus::Open => Err(PaymentStoreError::DatabaseError(format!("Payment {id} could not be settled"))),
    }
}

pub async fn mark_payment_timed_out(
    id: &PaymentId,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, PaymentStoreError> {
    let row: Option<PaymentRow> = sqlx::query_as(
        r#"
            UPDATE payments SET status = 'Timeout', updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND status = 'Open'
            RETURNING *;
        "#,
    )
    .bind(id.as_str())
    .fetch_optional(conn)
    .await?;
    row.map(to_payment).transpose()
}

/// Attaches the funding transfer to an open payment, unless it already carries the same transfer.
pub async fn record_tx_info(
    id: &PaymentId,
    tx_info: &TxInfo,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, PaymentStoreError> {
    let row: Option<PaymentRow> = sqlx::query_as(
        r#"
            UPDATE payments SET tx_message = $2, tx_timestamp = $3, tx_hash = $4, updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND status = 'Open' AND (tx_hash IS NULL OR tx_hash <> $4)
            RETURNING *;
        "#,
    )
    .bind(id.as_str())
    .bind(tx_info.message.as_str())
    .bind(tx_info.timestamp)
    .bind(tx_info.hash.as_str())
    .fetch_optional(conn)
    .await?;
    row.map(to_payment).transpose()
}

pub async fn touch_last_checked(
    ids: &[PaymentId],
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<u64, PaymentStoreError> {
    if ids.is_empty() {
        return Ok(0);
    }
    let mut builder = QueryBuilder::<Sqlite>::new("UPDATE payments SET last_checked = ");
    builder.push_bind(at);
    builder.push(" WHERE id IN (");
    let mut in_clause = builder.separated(", ");
    for id in ids {
        in_clause.push_bind(id.as_str().to_string());
    }
    in_clause.push_unseparated(")");
    let result = builder.build().execute(conn).await?;
    trace!("🗃️ Last-checked time updated on {} payments", result.rows_affected());
    Ok(result.rows_affected())
}
