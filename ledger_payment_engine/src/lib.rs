//! Ledger Payment Engine
//!
//! The Ledger Payment Engine tracks outstanding payment requests for a ledger-based payment gateway and decides when
//! each of them is paid. It is provider-agnostic: the ledger node, its event bus and the address allocator are
//! collaborators described by the traits in [`mod@traits`].
//!
//! The library is divided into these main sections:
//! 1. The payment store ([`PaymentStore`]) and its SQLite backend ([`SqliteDatabase`]). The data types are defined in
//!    [`mod@db_types`] and are public.
//! 2. The monitors ([`mod@monitor`]). A [`Scheduler`] polls open payments against ledger balances on a tiered
//!    schedule, while the [`PushMonitor`] reacts to ledger events, optionally accepting unconfirmed transfers after
//!    they pass the zero-confirmation fraud checks.
//! 3. The payment API ([`PaymentApi`]) and the [`ConfirmationEngine`] that wires everything together.
//!
//! Payment status changes are published as [`events::PaymentEvent`]s. Use [`events::EventHooks`] to subscribe to
//! them.
pub mod config;
pub mod db_types;
pub mod engine;
pub mod events;
pub mod helpers;
pub mod ledger_types;
pub mod monitor;
pub mod pe_api;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use config::EngineConfig;
pub use engine::{ConfirmationEngine, EngineHandles};
pub use monitor::{PollingMonitor, PushMonitor, Scheduler, TieringPolicy, ZeroConfValidator};
pub use pe_api::{EngineError, PaymentApi, PaymentApiError, PaymentRequest};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{AddressAllocator, LedgerClient, LedgerEventSource, PaymentStore};
