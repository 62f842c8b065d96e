use chrono::{DateTime, Duration, Utc};
use lpg_common::Amount;
use serde::{Deserialize, Serialize};

use crate::{db_types::PaymentKind, pe_api::errors::PaymentApiError};

/// About a century.
const MAX_TIME_UNTIL_CONFIRMATION: i64 = 100 * 365 * 24 * 3600;

/// A request for a new payment. Exactly one of `value` and `time_until_confirmation` must be given.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    /// The amount that settles the payment.
    #[serde(default)]
    pub value: Option<i64>,
    /// Seconds from now until a time payment can settle.
    #[serde(default)]
    pub time_until_confirmation: Option<i64>,
    /// Opaque caller data, stored with the payment.
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl PaymentRequest {
    pub fn for_value(value: i64) -> Self {
        Self { value: Some(value), ..Default::default() }
    }

    pub fn for_time(seconds: i64) -> Self {
        Self { time_until_confirmation: Some(seconds), ..Default::default() }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Validates the request and resolves it into the settlement condition of the new payment.
    pub fn payment_kind(&self, now: DateTime<Utc>) -> Result<PaymentKind, PaymentApiError> {
        match (self.value, self.time_until_confirmation) {
            (Some(_), Some(_)) => Err(PaymentApiError::InvalidPaymentRequest(
                "A payment takes either a value or a time until confirmation, not both".into(),
            )),
            (None, None) => Err(PaymentApiError::InvalidPaymentRequest(
                "A payment needs either a value or a time until confirmation".into(),
            )),
            (Some(v), None) if v < 0 => {
                Err(PaymentApiError::InvalidPaymentRequest(format!("Payment value cannot be negative: {v}")))
            },
            (Some(v), None) => Ok(PaymentKind::Value { value: Amount::from(v) }),
            (None, Some(t)) if t < 0 => {
                Err(PaymentApiError::InvalidPaymentRequest(format!("Time until confirmation cannot be negative: {t}")))
            },
            (None, Some(t)) if t > MAX_TIME_UNTIL_CONFIRMATION => {
                Err(PaymentApiError::InvalidPaymentRequest(format!("Time until confirmation is too large: {t}")))
            },
            (None, Some(t)) => Ok(PaymentKind::Time { confirmation_time: now + Duration::seconds(t) }),
        }
    }
}
