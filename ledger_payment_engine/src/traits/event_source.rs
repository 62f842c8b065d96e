use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    ledger_types::{EventTopic, LedgerEvent},
    traits::LedgerError,
};

/// The ledger node's event bus.
///
/// Delivery is at most once. The same transfer may be reported more than once; consumers must be idempotent.
#[async_trait]
pub trait LedgerEventSource: Send + Sync {
    /// Connects to `endpoint` and subscribes to `topics`. The stream ends when the returned receiver yields `None`.
    async fn subscribe(&self, endpoint: &str, topics: &[EventTopic]) -> Result<mpsc::Receiver<LedgerEvent>, LedgerError>;
}
