use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Duration, TimeZone, Utc};
use lpg_common::Amount;
use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Conversion error: {0}")]
pub struct ConversionError(String);

//--------------------------------------       PaymentId       ---------------------------------------------------------
/// An opaque payment identifier. It is derived from the creation time (milliseconds since the Unix epoch), so it also
/// serves as the creation timestamp for age-based policies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct PaymentId(String);

impl PaymentId {
    pub fn from_timestamp(timestamp: DateTime<Utc>) -> Self {
        Self(timestamp.timestamp_millis().to_string())
    }

    pub fn from_millis(millis: i64) -> Self {
        Self(millis.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn millis(&self) -> Option<i64> {
        self.0.parse::<i64>().ok()
    }

    /// The creation time encoded in the id. Returns `None` for ids that were not generated by this engine.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.millis().and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }
}

impl FromStr for PaymentId {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ConversionError("Payment id cannot be empty".into()));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<String> for PaymentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for PaymentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

//--------------------------------------     PaymentStatus     ---------------------------------------------------------
/// The settlement state of a payment. `Paid` and `Timeout` are terminal: a payment only ever moves out of `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// Waiting for funds.
    Open,
    /// Funds were observed (or accepted early) and the payment is settled.
    Paid,
    /// The payment outlived the maximum payment lifetime without being paid.
    Timeout,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Open)
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Open => write!(f, "Open"),
            PaymentStatus::Paid => write!(f, "Paid"),
            PaymentStatus::Timeout => write!(f, "Timeout"),
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Open" => Ok(Self::Open),
            "Paid" => Ok(Self::Paid),
            "Timeout" => Ok(Self::Timeout),
            s => Err(ConversionError(format!("Invalid payment status: {s}"))),
        }
    }
}

//--------------------------------------      PaymentKind      ---------------------------------------------------------
/// What it takes to settle a payment. Immutable once the payment is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PaymentKind {
    /// Settled once the address balance reaches the required amount.
    Value { value: Amount },
    /// Settled once the deadline has passed and funds have arrived, independent of the amount received.
    Time { confirmation_time: DateTime<Utc> },
}

impl PaymentKind {
    pub fn required_value(&self) -> Option<Amount> {
        match self {
            PaymentKind::Value { value } => Some(*value),
            PaymentKind::Time { .. } => None,
        }
    }

    pub fn is_value(&self) -> bool {
        matches!(self, PaymentKind::Value { .. })
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            PaymentKind::Value { .. } => "value",
            PaymentKind::Time { .. } => "time",
        }
    }
}

//--------------------------------------        TxInfo         ---------------------------------------------------------
/// Details of the inbound transfer that funded a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInfo {
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub hash: String,
}

//--------------------------------------        Payment        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub address: String,
    pub index: u64,
    #[serde(flatten)]
    pub kind: PaymentKind,
    pub data: serde_json::Value,
    pub status: PaymentStatus,
    pub tx_info: Option<TxInfo>,
    /// When the polling monitor last checked this payment. Only used for scheduling.
    pub last_checked: Option<DateTime<Utc>>,
    /// Set when the payment was settled by the zero-confirmation pipeline ahead of ledger finality.
    pub early_accepted: bool,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn is_open(&self) -> bool {
        self.status == PaymentStatus::Open
    }

    pub fn is_paid(&self) -> bool {
        self.status == PaymentStatus::Paid
    }

    /// Time since the payment was created. The id is authoritative; `created_at` is the fallback for foreign ids.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        let created = self.id.created_at().unwrap_or(self.created_at);
        now - created
    }

    pub fn since_last_checked(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.last_checked.map(|t| now - t)
    }
}

impl Display for Payment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            PaymentKind::Value { value } => {
                write!(f, "Payment {} [{}] of {value} to {} ({})", self.id, self.status, self.address, self.index)
            },
            PaymentKind::Time { confirmation_time } => write!(
                f,
                "Payment {} [{}] due {confirmation_time} to {} ({})",
                self.id, self.status, self.address, self.index
            ),
        }
    }
}

//--------------------------------------       NewPayment      ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub id: PaymentId,
    pub address: String,
    pub index: u64,
    pub kind: PaymentKind,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl NewPayment {
    pub fn new(address: String, index: u64, kind: PaymentKind, created_at: DateTime<Utc>) -> Self {
        Self {
            id: PaymentId::from_timestamp(created_at),
            address,
            index,
            kind,
            data: serde_json::Value::Null,
            created_at,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

//--------------------------------------    SettlementResult   ---------------------------------------------------------
/// The outcome of an attempt to move a payment to `Paid`.
#[derive(Debug, Clone)]
pub enum SettlementResult {
    /// This call moved the payment from `Open` to `Paid`. Contains the updated record.
    Settled(Payment),
    /// The payment was already paid. Contains the current record.
    AlreadySettled(Payment),
    /// The payment had already timed out and was left untouched.
    TimedOut(Payment),
}

impl SettlementResult {
    pub fn payment(&self) -> &Payment {
        match self {
            Self::Settled(p) | Self::AlreadySettled(p) | Self::TimedOut(p) => p,
        }
    }

    pub fn is_new_settlement(&self) -> bool {
        matches!(self, Self::Settled(_))
    }
}
