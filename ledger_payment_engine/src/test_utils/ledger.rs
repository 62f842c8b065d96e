use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
        Mutex,
        MutexGuard,
    },
};

use async_trait::async_trait;
use chrono::Utc;
use lpg_common::Amount;
use tokio::sync::mpsc;

use crate::{
    ledger_types::{AddressInfo, EventTopic, LedgerEvent, LedgerTransaction, PendingTransfer},
    traits::{AddressAllocator, AllocationError, LedgerClient, LedgerError, LedgerEventSource},
};

#[derive(Default)]
struct LedgerState {
    balances: HashMap<String, Amount>,
    transactions: Vec<LedgerTransaction>,
    invalid_signatures: HashSet<String>,
    offline: bool,
}

/// An in-memory ledger node with scripted balances, transactions and signature verdicts.
#[derive(Clone, Default)]
pub struct MockLedger {
    state: Arc<Mutex<LedgerState>>,
    balance_queries: Arc<AtomicUsize>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_balance(&self, address: &str, amount: i64) {
        self.state().balances.insert(address.to_string(), Amount::from(amount));
    }

    pub fn add_transactions(&self, txs: Vec<LedgerTransaction>) {
        self.state().transactions.extend(txs);
    }

    /// Records a single confirmed inbound transfer and credits the receiving address.
    pub fn receive(&self, address: &str, amount: i64, hash: &str, message: &str) {
        let tx = LedgerTransaction {
            hash: hash.to_string(),
            address: address.to_string(),
            value: Amount::from(amount),
            bundle: format!("{hash}_BUNDLE"),
            current_index: 0,
            last_index: 0,
            trunk_transaction: String::new(),
            message: message.to_string(),
            timestamp: Utc::now(),
        };
        let mut state = self.state();
        *state.balances.entry(address.to_string()).or_default() += Amount::from(amount);
        state.transactions.push(tx);
    }

    pub fn invalidate_signature(&self, bundle: &str) {
        self.state().invalid_signatures.insert(bundle.to_string());
    }

    /// While offline, every query fails with [`LedgerError::Unreachable`].
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    pub fn balance_queries(&self) -> usize {
        self.balance_queries.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<(), LedgerError> {
        if self.state().offline {
            Err(LedgerError::Unreachable("mock ledger is offline".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn get_balances(&self, addresses: &[String]) -> Result<Vec<Amount>, LedgerError> {
        self.check_online()?;
        self.balance_queries.fetch_add(1, Ordering::SeqCst);
        let state = self.state();
        Ok(addresses.iter().map(|a| state.balances.get(a).copied().unwrap_or_default()).collect())
    }

    async fn find_transactions_by_address(&self, addresses: &[String]) -> Result<Vec<LedgerTransaction>, LedgerError> {
        self.check_online()?;
        let state = self.state();
        Ok(state.transactions.iter().filter(|tx| addresses.contains(&tx.address)).cloned().collect())
    }

    async fn find_transactions_by_bundle(&self, bundle: &str) -> Result<Vec<LedgerTransaction>, LedgerError> {
        self.check_online()?;
        let state = self.state();
        Ok(state.transactions.iter().filter(|tx| tx.bundle == bundle).cloned().collect())
    }

    async fn validate_bundle_signature(&self, bundle: &[LedgerTransaction]) -> Result<bool, LedgerError> {
        self.check_online()?;
        let state = self.state();
        Ok(bundle.first().map(|head| !state.invalid_signatures.contains(&head.bundle)).unwrap_or(false))
    }
}

/// Builds a two-entry bundle moving `amount` from `from` to `to`, and the pending-transfer notification that the event
/// bus would send for it. The head entry credits `to`; the tail entry debits `from`.
pub fn transfer_bundle(bundle: &str, from: &str, to: &str, amount: i64) -> (Vec<LedgerTransaction>, PendingTransfer) {
    let now = Utc::now();
    let head_hash = format!("{bundle}_TX0");
    let tail_hash = format!("{bundle}_TX1");
    let head = LedgerTransaction {
        hash: head_hash.clone(),
        address: to.to_string(),
        value: Amount::from(amount),
        bundle: bundle.to_string(),
        current_index: 0,
        last_index: 1,
        trunk_transaction: tail_hash.clone(),
        message: format!("Payment to {to}"),
        timestamp: now,
    };
    let tail = LedgerTransaction {
        hash: tail_hash,
        address: from.to_string(),
        value: Amount::from(-amount),
        bundle: bundle.to_string(),
        current_index: 1,
        last_index: 1,
        trunk_transaction: String::new(),
        message: String::new(),
        timestamp: now,
    };
    let pending = PendingTransfer {
        tx_hash: head_hash,
        input_address: from.to_string(),
        output_address: to.to_string(),
        amount: Amount::from(amount),
        bundle: bundle.to_string(),
    };
    (vec![head, tail], pending)
}

/// Hands out addresses with consecutive indices, starting at 0.
#[derive(Clone, Default)]
pub struct SequentialAllocator {
    next_index: Arc<AtomicU64>,
    cursor: Arc<AtomicU64>,
}

impl SequentialAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn address_for(index: u64) -> String {
        format!("LPGADDRESS{index:06}")
    }

    pub fn set_disbursement_cursor(&self, cursor: u64) {
        self.cursor.store(cursor, Ordering::SeqCst);
    }
}

#[async_trait]
impl AddressAllocator for SequentialAllocator {
    async fn allocate_address(&self) -> Result<AddressInfo, AllocationError> {
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        Ok(AddressInfo { address: Self::address_for(index), index })
    }

    async fn current_disbursement_cursor(&self) -> Result<u64, AllocationError> {
        Ok(self.cursor.load(Ordering::SeqCst))
    }
}

/// An event bus backed by an in-process channel. Only the first subscription receives events.
pub struct ChannelEventSource {
    receiver: Mutex<Option<mpsc::Receiver<LedgerEvent>>>,
    subscriptions: Mutex<Vec<(String, Vec<EventTopic>)>>,
}

impl ChannelEventSource {
    pub fn new(buffer: usize) -> (Self, mpsc::Sender<LedgerEvent>) {
        let (sender, receiver) = mpsc::channel(buffer);
        let source = Self { receiver: Mutex::new(Some(receiver)), subscriptions: Mutex::new(Vec::new()) };
        (source, sender)
    }

    /// The endpoint and topics of every subscription made so far.
    pub fn subscriptions(&self) -> Vec<(String, Vec<EventTopic>)> {
        self.subscriptions.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl LedgerEventSource for ChannelEventSource {
    async fn subscribe(&self, endpoint: &str, topics: &[EventTopic]) -> Result<mpsc::Receiver<LedgerEvent>, LedgerError> {
        self.subscriptions.lock().unwrap_or_else(|e| e.into_inner()).push((endpoint.to_string(), topics.to_vec()));
        self.receiver
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| LedgerError::Rejected(format!("{endpoint} already has a subscriber")))
    }
}
