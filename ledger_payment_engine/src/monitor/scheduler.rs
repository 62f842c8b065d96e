use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use log::*;
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};

use crate::{
    db_types::PaymentId,
    helpers::with_retry,
    monitor::{errors::MonitorError, polling::PollReport, tiering::TieringPolicy, PollingMonitor},
    traits::{AddressAllocator, LedgerClient, PaymentStore},
};

/// The result of a single check cycle.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// There were no open payments. The recurring timer stops after an idle cycle.
    Idle,
    Checked(CycleReport),
}

#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub open: usize,
    pub expired: Vec<PaymentId>,
    pub skipped: usize,
    pub poll: PollReport,
}

/// Owns the recurring check cycle.
///
/// At most one cycle loop runs per scheduler. [`Scheduler::arm`] starts it if it is not running and does nothing
/// otherwise. The loop disarms itself as soon as a cycle finds no open payments, and is re-armed by the next payment
/// creation.
#[derive(Clone)]
pub struct Scheduler<B, L, A> {
    monitor: PollingMonitor<B, L, A>,
    policy: TieringPolicy,
    period: Duration,
    running: Arc<AtomicBool>,
    cycle_lock: Arc<Mutex<()>>,
}

impl<B, L, A> Scheduler<B, L, A>
where
    B: PaymentStore,
    L: LedgerClient,
    A: AddressAllocator,
{
    pub fn new(monitor: PollingMonitor<B, L, A>, policy: TieringPolicy, period: Duration) -> Self {
        Self {
            monitor,
            policy,
            period,
            running: Arc::new(AtomicBool::new(false)),
            cycle_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn policy(&self) -> &TieringPolicy {
        &self.policy
    }

    /// Starts the recurring check cycle. Returns `None` if it was already running.
    pub fn arm(&self) -> Option<JoinHandle<()>> {
        if self.running.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            trace!("🕰️ Check cycle is already running");
            return None;
        }
        info!("🕰️ Check cycle started. Checking open payments every {:?}", self.period);
        let scheduler = self.clone();
        Some(tokio::spawn(async move { scheduler.run_loop().await }))
    }

    async fn run_loop(self) {
        let mut timer = interval_at(Instant::now() + self.period, self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            timer.tick().await;
            match self.run_cycle(Utc::now()).await {
                Ok(CycleOutcome::Idle) => {
                    if !self.disarm().await {
                        break;
                    }
                },
                Ok(CycleOutcome::Checked(report)) => {
                    debug!(
                        "🕰️ Cycle complete. {} open, {} expired, {} checked, {} skipped, {} settled",
                        report.open,
                        report.expired.len(),
                        report.poll.checked,
                        report.skipped,
                        report.poll.settled_count()
                    );
                },
                Err(e) => warn!("🕰️ Check cycle failed. The payments will be retried on the next cycle. {e}"),
            }
        }
        info!("🕰️ No open payments remain. Check cycle stopped");
    }

    /// Clears the running flag. A payment created between the idle cycle and this call would have found the flag set
    /// and not armed the loop, so look again and take the flag back if there is work. Returns true if the loop should
    /// keep going.
    async fn disarm(&self) -> bool {
        self.running.store(false, Ordering::SeqCst);
        match self.monitor.store().fetch_open_payments().await {
            Ok(open) if !open.is_empty() => {
                self.running.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok()
            },
            Ok(_) => false,
            Err(e) => {
                warn!("🕰️ Could not re-check for open payments while stopping. {e}");
                false
            },
        }
    }

    /// Runs a single check cycle: expires payments past their lifetime, then polls the ones the tiering policy
    /// selects. Cycles never overlap.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleOutcome, MonitorError> {
        let _guard = self.cycle_lock.lock().await;
        let open = self.monitor.store().fetch_open_payments().await?;
        if open.is_empty() {
            return Ok(CycleOutcome::Idle);
        }
        let mut report = CycleReport { open: open.len(), ..Default::default() };
        let tiers = self.policy.partition(open, now);
        report.skipped = tiers.skipped;
        for payment in tiers.expired {
            let store = self.monitor.store();
            match with_retry("Expiring payment", || store.mark_payment_timed_out(&payment.id)).await {
                Ok(Some(p)) => {
                    info!("🕰️ Payment {} timed out after {} minutes", p.id, p.age(now).num_minutes());
                    report.expired.push(p.id);
                },
                Ok(None) => trace!("🕰️ Payment {} was settled before it could expire", payment.id),
                Err(e) => error!("🚨️ Could not mark payment {} as timed out. {e}", payment.id),
            }
        }
        report.poll = self.monitor.check_payments(&tiers.selected, now).await?;
        Ok(CycleOutcome::Checked(report))
    }
}
