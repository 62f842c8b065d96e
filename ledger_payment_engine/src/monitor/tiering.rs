//! The check-frequency policy for open payments.
//!
//! Fresh payments are checked on every cycle, payments younger than the recent window roughly every
//! [`FRESH_WINDOW_MINUTES`], and older payments roughly every [`RECENT_WINDOW_MINUTES`]. Nothing is checked past the
//! maximum payment lifetime; such payments are expired instead.
use chrono::{DateTime, Duration, Utc};

use crate::db_types::Payment;

pub const FRESH_WINDOW_MINUTES: i64 = 9;
pub const RECENT_WINDOW_MINUTES: i64 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckDecision {
    /// The payment has outlived the maximum payment time and must be marked as timed out.
    Expire,
    /// Check the payment against the ledger on this cycle.
    Check,
    /// Leave the payment alone until a later cycle.
    Skip,
}

#[derive(Debug, Clone, Copy)]
pub struct TieringPolicy {
    max_payment_time: Duration,
    fresh_window: Duration,
    recent_window: Duration,
}

/// The open payments of one cycle, sorted by [`TieringPolicy::partition`].
#[derive(Debug, Clone, Default)]
pub struct TieredPayments {
    pub expired: Vec<Payment>,
    pub selected: Vec<Payment>,
    pub skipped: usize,
}

impl TieringPolicy {
    pub fn new(max_payment_time: Duration) -> Self {
        Self {
            max_payment_time,
            fresh_window: Duration::minutes(FRESH_WINDOW_MINUTES),
            recent_window: Duration::minutes(RECENT_WINDOW_MINUTES),
        }
    }

    pub fn max_payment_time(&self) -> Duration {
        self.max_payment_time
    }

    pub fn decide(&self, payment: &Payment, now: DateTime<Utc>) -> CheckDecision {
        let age = payment.age(now);
        if age > self.max_payment_time {
            return CheckDecision::Expire;
        }
        let since_checked = match payment.since_last_checked(now) {
            None => return CheckDecision::Check,
            Some(d) => d,
        };
        let due = age < self.fresh_window
            || (age < self.recent_window && since_checked > self.fresh_window)
            || (age < self.max_payment_time && since_checked > self.recent_window);
        if due {
            CheckDecision::Check
        } else {
            CheckDecision::Skip
        }
    }

    /// Splits the open payments into those to expire and those to check now. Expired payments are never selected.
    pub fn partition(&self, payments: Vec<Payment>, now: DateTime<Utc>) -> TieredPayments {
        let mut result = TieredPayments::default();
        for payment in payments {
            match self.decide(&payment, now) {
                CheckDecision::Expire => result.expired.push(payment),
                CheckDecision::Check => result.selected.push(payment),
                CheckDecision::Skip => result.skipped += 1,
            }
        }
        result
    }
}

impl Default for TieringPolicy {
    fn default() -> Self {
        Self::new(Duration::minutes(12_960))
    }
}
