//! Data exchanged with the ledger node and its event bus.
use std::fmt::Display;

use chrono::{DateTime, Utc};
use lpg_common::Amount;
use serde::{Deserialize, Serialize};

use crate::db_types::TxInfo;

/// A single entry of a bundle, as reported by the ledger node.
///
/// Entries with a negative `value` debit `address` (bundle inputs); positive values credit it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub hash: String,
    pub address: String,
    pub value: Amount,
    pub bundle: String,
    /// Position of this entry inside its bundle. The head of the bundle has index 0.
    pub current_index: u64,
    /// Index of the last entry of the bundle.
    pub last_index: u64,
    /// Hash of the next entry of the bundle (for all but the tail entry).
    pub trunk_transaction: String,
    /// The decoded memo carried by the entry.
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl LedgerTransaction {
    pub fn is_debit(&self) -> bool {
        self.value.is_negative()
    }

    pub fn is_credit(&self) -> bool {
        self.value.is_positive()
    }

    pub fn tx_info(&self) -> TxInfo {
        TxInfo { message: self.message.trim_end_matches('\0').to_string(), timestamp: self.timestamp, hash: self.hash.clone() }
    }
}

/// A freshly allocated receiving address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressInfo {
    pub address: String,
    pub index: u64,
}

/// Topics offered by the ledger event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTopic {
    /// Unconfirmed transfers, as soon as the node sees them.
    PendingTransfers,
    /// Transfers that have reached finality.
    ConfirmedTransfers,
}

impl Display for EventTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventTopic::PendingTransfers => write!(f, "pending transfers"),
            EventTopic::ConfirmedTransfers => write!(f, "confirmed transfers"),
        }
    }
}

/// An unconfirmed transfer reported by the event bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransfer {
    pub tx_hash: String,
    pub input_address: String,
    /// The receiving address. This is what gets matched against tracked payments.
    pub output_address: String,
    pub amount: Amount,
    /// Identifies the bundle that encloses the transfer.
    pub bundle: String,
}

/// A transfer that the ledger has finalised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedTransfer {
    pub tx_hash: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    Pending(PendingTransfer),
    Confirmed(ConfirmedTransfer),
}

impl LedgerEvent {
    pub fn topic(&self) -> EventTopic {
        match self {
            LedgerEvent::Pending(_) => EventTopic::PendingTransfers,
            LedgerEvent::Confirmed(_) => EventTopic::ConfirmedTransfers,
        }
    }

    pub fn tx_hash(&self) -> &str {
        match self {
            LedgerEvent::Pending(t) => &t.tx_hash,
            LedgerEvent::Confirmed(t) => &t.tx_hash,
        }
    }

    pub fn address(&self) -> &str {
        match self {
            LedgerEvent::Pending(t) => &t.output_address,
            LedgerEvent::Confirmed(t) => &t.address,
        }
    }
}
