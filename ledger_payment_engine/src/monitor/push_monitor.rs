use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use chrono::Utc;
use log::*;
use tokio::{
    sync::{mpsc, Mutex, RwLock},
    task::{JoinHandle, JoinSet},
};

use crate::{
    db_types::{Payment, SettlementResult},
    ledger_types::{EventTopic, LedgerEvent, PendingTransfer},
    monitor::{errors::ZeroConfError, zero_conf::ZeroConfValidator, PollingMonitor},
    traits::{AddressAllocator, LedgerClient, PaymentStore, PaymentStoreError},
};

/// The set of receiving addresses the push monitor is interested in. Shared between the payment API, which adds
/// addresses, and the push monitor, which removes them once their payment is settled.
#[derive(Clone, Default)]
pub struct WatchList {
    addresses: Arc<RwLock<HashSet<String>>>,
}

impl WatchList {
    pub async fn add(&self, address: &str) -> bool {
        self.addresses.write().await.insert(address.to_string())
    }

    pub async fn remove(&self, address: &str) -> bool {
        self.addresses.write().await.remove(address)
    }

    pub async fn contains(&self, address: &str) -> bool {
        self.addresses.read().await.contains(address)
    }

    pub async fn len(&self) -> usize {
        self.addresses.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.addresses.read().await.is_empty()
    }
}

/// Consumes the ledger event bus.
///
/// Each accepted event is handled on its own task, so a slow ledger query or a failure while handling one transfer
/// never holds up the subscription or other transfers.
#[derive(Clone)]
pub struct PushMonitor<B, L, A> {
    monitor: PollingMonitor<B, L, A>,
    validator: ZeroConfValidator<L>,
    watch_list: WatchList,
    accept_unconfirmed: bool,
    track_confirmations: bool,
    last_seen: Arc<Mutex<HashMap<EventTopic, String>>>,
}

impl<B, L, A> PushMonitor<B, L, A>
where
    B: PaymentStore,
    L: LedgerClient,
    A: AddressAllocator,
{
    pub fn new(
        monitor: PollingMonitor<B, L, A>,
        validator: ZeroConfValidator<L>,
        watch_list: WatchList,
        accept_unconfirmed: bool,
        track_confirmations: bool,
    ) -> Self {
        Self {
            monitor,
            validator,
            watch_list,
            accept_unconfirmed,
            track_confirmations,
            last_seen: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn watch_list(&self) -> &WatchList {
        &self.watch_list
    }

    pub fn topic_enabled(&self, topic: EventTopic) -> bool {
        match topic {
            EventTopic::PendingTransfers => self.accept_unconfirmed,
            EventTopic::ConfirmedTransfers => self.track_confirmations,
        }
    }

    /// Adds the addresses of all open value payments to the watch list.
    pub async fn seed_watch_list(&self) -> Result<usize, PaymentStoreError> {
        let open = self.monitor.store().fetch_open_payments().await?;
        let mut count = 0;
        for payment in open.iter().filter(|p| p.kind.is_value()) {
            if self.watch_list.add(&payment.address).await {
                count += 1;
            }
        }
        info!("⚡️ Watching {count} addresses for incoming transfers");
        Ok(count)
    }

    /// Handles events until the event bus closes the stream. Waits for in-flight handlers before returning.
    pub fn start(self, mut events: mpsc::Receiver<LedgerEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("⚡️ Push monitor started");
            let mut jobs = JoinSet::new();
            while let Some(event) = events.recv().await {
                if let Some(job) = self.accept_event(event).await {
                    let monitor = self.clone();
                    jobs.spawn(async move { monitor.handle_event(job).await });
                }
                while let Some(done) = jobs.try_join_next() {
                    log_job_result(done);
                }
            }
            while let Some(done) = jobs.join_next().await {
                log_job_result(done);
            }
            info!("⚡️ Ledger event stream closed. Push monitor stopped");
        })
    }

    /// Filters out events for disabled topics, unwatched addresses, and repeats of the last event seen on the topic.
    pub async fn accept_event(&self, event: LedgerEvent) -> Option<LedgerEvent> {
        let topic = event.topic();
        if !self.topic_enabled(topic) {
            trace!("⚡️ Ignoring event on disabled topic: {topic}");
            return None;
        }
        if !self.watch_list.contains(event.address()).await {
            return None;
        }
        let mut last_seen = self.last_seen.lock().await;
        if last_seen.get(&topic).map(String::as_str) == Some(event.tx_hash()) {
            trace!("⚡️ Duplicate {topic} event for {}", event.tx_hash());
            return None;
        }
        last_seen.insert(topic, event.tx_hash().to_string());
        debug!("⚡️ New {topic} event for watched address {}: {}", event.address(), event.tx_hash());
        Some(event)
    }

    /// Handles an event that passed [`Self::accept_event`]. Never fails: every error is logged and ends the handling
    /// of this event only.
    pub async fn handle_event(&self, event: LedgerEvent) {
        match event {
            LedgerEvent::Pending(transfer) => match self.handle_pending(&transfer).await {
                Ok(Some(p)) => info!("⚡️ Payment {} was accepted early on transfer {}", p.id, transfer.tx_hash),
                Ok(None) => {},
                Err(ZeroConfError::Persistence(e)) => error!(
                    "🚨️ Transfer {} passed every check, but the payment could not be marked as paid. {e}",
                    transfer.tx_hash
                ),
                Err(ZeroConfError::Query(e)) => {
                    warn!("⚡️ Zero-confirmation checks on {} could not complete. {e}", transfer.tx_hash)
                },
                Err(ZeroConfError::Rejected(_)) => {},
            },
            LedgerEvent::Confirmed(confirmed) => {
                match self.monitor.settle_payment_now(&confirmed.address, Utc::now()).await {
                    Ok(Some(p)) if !p.is_open() => {
                        self.watch_list.remove(&p.address).await;
                        debug!("⚡️ Payment {} is {} after confirmation of {}", p.id, p.status, confirmed.tx_hash);
                    },
                    Ok(_) => trace!("⚡️ Confirmed transfer {} did not settle a payment", confirmed.tx_hash),
                    Err(e) => warn!("⚡️ Could not settle payment on confirmed transfer {}. {e}", confirmed.tx_hash),
                }
            },
        }
    }

    /// Runs a pending transfer through the zero-confirmation checks and settles its payment if they all pass. Returns
    /// the payment if this call settled it.
    pub async fn handle_pending(&self, transfer: &PendingTransfer) -> Result<Option<Payment>, ZeroConfError> {
        let payment = match self.monitor.store().fetch_payment_by_address(&transfer.output_address).await? {
            Some(p) if p.is_open() => p,
            Some(p) => {
                trace!("⚡️ Payment {} is already {}", p.id, p.status);
                self.watch_list.remove(&p.address).await;
                return Ok(None);
            },
            None => return Ok(None),
        };
        let required = match payment.kind.required_value() {
            Some(v) => v,
            None => return Ok(None),
        };
        self.validator.validate(required, transfer).await?;
        let result = self.monitor.settle(&payment, true).await?;
        self.watch_list.remove(&payment.address).await;
        match result {
            SettlementResult::Settled(p) => {
                // The confirmation is no longer watched, so the index is recycled here.
                if let Err(e) = self.monitor.recycle_settled(&p).await {
                    warn!("⚡️ Payment {} was accepted early, but its address index could not be recycled. {e}", p.id);
                }
                Ok(Some(p))
            },
            SettlementResult::AlreadySettled(_) | SettlementResult::TimedOut(_) => Ok(None),
        }
    }
}

fn log_job_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        error!("⚡️ A push event handler panicked. {e}");
    }
}
