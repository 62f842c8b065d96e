//! The confirmation engine's monitors.
//!
//! * [`Scheduler`] owns the recurring check cycle and applies the [`TieringPolicy`].
//! * [`PollingMonitor`] settles payments from ledger balances and transaction history.
//! * [`PushMonitor`] reacts to the ledger event bus, running unconfirmed transfers through the
//!   [`ZeroConfValidator`] and settling confirmed ones through the polling monitor.
//!
//! The scheduler and push monitor run concurrently. They only coordinate through the payment store, whose conditional
//! updates guarantee that a payment is settled or expired at most once.

/// Logs verbose per-payment diagnostics at `info` level in debug mode, and at `trace` level otherwise.
macro_rules! diagnostic {
    ($debug:expr, $($arg:tt)+) => {
        if $debug {
            log::info!($($arg)+);
        } else {
            log::trace!($($arg)+);
        }
    };
}

pub mod errors;
mod polling;
mod push_monitor;
mod scheduler;
mod tiering;
mod zero_conf;

pub use errors::{MonitorError, ValidationFailure, ZeroConfError};
pub use polling::{PollReport, PollingMonitor};
pub use push_monitor::{PushMonitor, WatchList};
pub use scheduler::{CycleOutcome, CycleReport, Scheduler};
pub use tiering::{CheckDecision, TieredPayments, TieringPolicy, FRESH_WINDOW_MINUTES, RECENT_WINDOW_MINUTES};
pub use zero_conf::{assemble_bundle, debited_inputs, ZeroConfStage, ZeroConfValidator};
