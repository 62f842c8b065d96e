//! Test doubles and database helpers shared by the unit, integration and cucumber tests.
mod event_recorder;
mod ledger;
pub mod prepare_env;

pub use event_recorder::EventRecorder;
pub use ledger::{transfer_bundle, ChannelEventSource, MockLedger, SequentialAllocator};
