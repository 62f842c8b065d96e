//! # Collaborator contracts
//!
//! The confirmation engine talks to the outside world through the traits in this module. Concrete backends implement
//! them; the engine itself is generic over all of them.
//!
//! * [`PaymentStore`] persists payments and the spent-index recycle set. Every state transition is a single atomic,
//!   conditional update of one record, which is what the two monitoring flows synchronise on.
//! * [`LedgerClient`] answers balance and transaction-history queries against the ledger node.
//! * [`AddressAllocator`] hands out receiving addresses and reports the disbursement cursor.
//! * [`LedgerEventSource`] connects to the ledger node's event bus for push monitoring.
mod address_allocator;
mod event_source;
mod ledger_client;
mod payment_store;

pub use address_allocator::{AddressAllocator, AllocationError};
pub use event_source::LedgerEventSource;
pub use ledger_client::{LedgerClient, LedgerError};
pub use payment_store::{PaymentStore, PaymentStoreError};
