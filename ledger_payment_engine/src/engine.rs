//! Wires the store, the ledger collaborators and the monitors together.
use log::*;
use tokio::task::JoinHandle;

use crate::{
    config::EngineConfig,
    events::EventProducers,
    ledger_types::EventTopic,
    monitor::{PollingMonitor, PushMonitor, Scheduler, TieringPolicy, WatchList, ZeroConfValidator},
    pe_api::{EngineError, PaymentApi},
    traits::{AddressAllocator, LedgerClient, LedgerEventSource, PaymentStore},
};

/// Handles to the background tasks spawned by [`ConfirmationEngine::start`].
#[derive(Debug, Default)]
pub struct EngineHandles {
    /// The check cycle, if there were open payments at start-up.
    pub scheduler: Option<JoinHandle<()>>,
    /// The push monitor, if push monitoring is enabled.
    pub push_monitor: Option<JoinHandle<()>>,
}

pub struct ConfirmationEngine<B, L, A> {
    config: EngineConfig,
    store: B,
    api: PaymentApi<B, L, A>,
    scheduler: Scheduler<B, L, A>,
    push_monitor: PushMonitor<B, L, A>,
}

impl<B, L, A> ConfirmationEngine<B, L, A>
where
    B: PaymentStore,
    L: LedgerClient,
    A: AddressAllocator,
{
    /// Builds the engine. Fails if the configuration is incoherent.
    pub fn new(
        config: EngineConfig,
        store: B,
        ledger: L,
        allocator: A,
        producers: EventProducers,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let monitor =
            PollingMonitor::new(store.clone(), ledger.clone(), allocator.clone(), producers.clone(), config.debug);
        let policy = TieringPolicy::new(config.max_payment_time);
        let scheduler = Scheduler::new(monitor.clone(), policy, config.check_interval);
        let watch_list = WatchList::default();
        let validator = ZeroConfValidator::new(ledger, config.debug);
        let push_monitor = PushMonitor::new(
            monitor,
            validator,
            watch_list.clone(),
            config.accept_unconfirmed,
            config.track_confirmations,
        );
        let mut api = PaymentApi::new(store.clone(), allocator, scheduler.clone(), producers);
        if config.push_enabled() {
            api = api.with_watch_list(watch_list);
        }
        Ok(Self { config, store, api, scheduler, push_monitor })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn api(&self) -> &PaymentApi<B, L, A> {
        &self.api
    }

    pub fn scheduler(&self) -> &Scheduler<B, L, A> {
        &self.scheduler
    }

    pub fn push_monitor(&self) -> &PushMonitor<B, L, A> {
        &self.push_monitor
    }

    /// Starts monitoring. Arms the check cycle if open payments remain from a previous run, and subscribes to the
    /// ledger event bus when push monitoring is enabled.
    pub async fn start<S: LedgerEventSource>(&self, source: &S) -> Result<EngineHandles, EngineError> {
        let mut handles = EngineHandles::default();
        let open = self.store.fetch_open_payments().await?;
        if !open.is_empty() {
            info!("💸️ {} open payments found at start-up", open.len());
            handles.scheduler = self.scheduler.arm();
        }
        if !self.config.push_enabled() {
            info!("⚡️ Push monitoring is disabled. Payments settle through polling only");
            return Ok(handles);
        }
        let endpoint = self.config.push_endpoint.as_deref().ok_or_else(|| {
            EngineError::ConfigurationError("Push monitoring is enabled, but no endpoint is configured".into())
        })?;
        self.push_monitor.seed_watch_list().await?;
        let topics = self.config.push_topics();
        let events = source.subscribe(endpoint, &topics).await?;
        info!("⚡️ Subscribed to {} at {endpoint}", topic_list(&topics));
        handles.push_monitor = Some(self.push_monitor.clone().start(events));
        Ok(handles)
    }
}

fn topic_list(topics: &[EventTopic]) -> String {
    topics.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(" and ")
}
