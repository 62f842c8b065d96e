use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::db_types::Payment;

/// A payment status notification. Each variant carries a snapshot of the payment at the time of the transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "payment")]
pub enum PaymentEvent {
    #[serde(rename = "paymentCreated")]
    Created(Payment),
    /// A sufficient inbound transfer was seen but the payment is not settled yet.
    #[serde(rename = "paymentIncoming")]
    Incoming(Payment),
    /// Informational: nothing has been received at the payment address yet.
    #[serde(rename = "paymentPending")]
    Pending(Payment),
    #[serde(rename = "paymentSuccess")]
    Success(Payment),
}

impl PaymentEvent {
    pub fn payment(&self) -> &Payment {
        match self {
            PaymentEvent::Created(p) | PaymentEvent::Incoming(p) | PaymentEvent::Pending(p) | PaymentEvent::Success(p) => p,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            PaymentEvent::Created(_) => "paymentCreated",
            PaymentEvent::Incoming(_) => "paymentIncoming",
            PaymentEvent::Pending(_) => "paymentPending",
            PaymentEvent::Success(_) => "paymentSuccess",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PaymentEvent::Success(_))
    }
}

impl Display for PaymentEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} for payment {}", self.status(), self.payment().id)
    }
}
