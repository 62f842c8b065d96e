use chrono::{DateTime, Utc};
use log::*;
use lpg_common::Amount;

use crate::{
    db_types::{Payment, PaymentId, PaymentKind, SettlementResult, TxInfo},
    events::{EventProducers, PaymentEvent},
    helpers::with_retry,
    ledger_types::LedgerTransaction,
    monitor::errors::MonitorError,
    traits::{AddressAllocator, LedgerClient, LedgerError, PaymentStore, PaymentStoreError},
};

/// What happened to a batch of payments during one polling pass.
#[derive(Debug, Clone, Default)]
pub struct PollReport {
    pub checked: usize,
    /// Payments moved to `Paid` by this pass.
    pub settled: Vec<PaymentId>,
    /// Payments that received a `paymentIncoming` event.
    pub incoming: Vec<PaymentId>,
    /// Payments for which no funds have been observed yet.
    pub pending: Vec<PaymentId>,
    /// Address indices added to the recycle set.
    pub recycled: Vec<u64>,
    /// Payments whose update could not be completed. They stay open and are retried on a later cycle.
    pub failed: Vec<PaymentId>,
}

impl PollReport {
    pub fn settled_count(&self) -> usize {
        self.settled.len()
    }
}

/// Settles payments from the balances and transaction history reported by the ledger node.
///
/// Every state change goes through the payment store's conditional updates, so a result computed from a stale
/// snapshot (e.g. a payment that the push monitor accepted in the meantime) is never applied over a settled or expired
/// payment.
#[derive(Clone)]
pub struct PollingMonitor<B, L, A> {
    store: B,
    ledger: L,
    allocator: A,
    producers: EventProducers,
    debug: bool,
}

impl<B, L, A> PollingMonitor<B, L, A>
where
    B: PaymentStore,
    L: LedgerClient,
    A: AddressAllocator,
{
    pub fn new(store: B, ledger: L, allocator: A, producers: EventProducers, debug: bool) -> Self {
        Self { store, ledger, allocator, producers, debug }
    }

    pub fn store(&self) -> &B {
        &self.store
    }

    /// Checks the batch against the ledger.
    ///
    /// The balances, the transaction history and the disbursement cursor are all fetched before anything is written.
    /// If any of these queries fail, the error is returned and no payment in the batch is touched. Otherwise, each
    /// payment is processed independently: a failure on one payment is logged and recorded in the report, and does not
    /// stop the others. Finally, every payment in the batch has its last-checked time stamped.
    pub async fn check_payments(&self, batch: &[Payment], now: DateTime<Utc>) -> Result<PollReport, MonitorError> {
        let mut report = PollReport::default();
        if batch.is_empty() {
            return Ok(report);
        }
        let addresses = batch.iter().map(|p| p.address.clone()).collect::<Vec<_>>();
        let history_addresses =
            batch.iter().filter(|p| !p.early_accepted).map(|p| p.address.clone()).collect::<Vec<_>>();
        let (balances, history) =
            tokio::try_join!(self.ledger.get_balances(&addresses), self.fetch_history(&history_addresses))?;
        if balances.len() != batch.len() {
            return Err(LedgerError::MalformedResponse(format!(
                "Asked for {} balances but received {}",
                batch.len(),
                balances.len()
            ))
            .into());
        }
        let cursor = self.allocator.current_disbursement_cursor().await?;
        trace!("🔍️ Checking {} payments. Disbursement cursor is at {cursor}", batch.len());

        for (payment, balance) in batch.iter().zip(balances) {
            report.checked += 1;
            if let Err(e) = self.process_payment(payment, balance, &history, cursor, now, &mut report).await {
                match &e {
                    MonitorError::Persistence(_) => {
                        error!("🚨️ Payment {} could not be updated and stays open. {e}", payment.id)
                    },
                    _ => warn!("🔍️ Payment {} could not be checked. {e}", payment.id),
                }
                report.failed.push(payment.id.clone());
            }
        }

        let ids = batch.iter().map(|p| p.id.clone()).collect::<Vec<_>>();
        if let Err(e) = with_retry("Stamping last-checked time", || self.store.touch_last_checked(&ids, now)).await {
            error!("🚨️ Could not stamp the last-checked time on {} payments. {e}", ids.len());
        }
        debug!(
            "🔍️ Checked {} payments. {} settled, {} incoming, {} awaiting funds, {} failed",
            report.checked,
            report.settled.len(),
            report.incoming.len(),
            report.pending.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Re-runs the settlement check for the payment at `address` right away. Returns the payment as it stands after
    /// the check, or `None` if no payment uses the address.
    pub async fn settle_payment_now(
        &self,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Payment>, MonitorError> {
        let payment = match self.store.fetch_payment_by_address(address).await? {
            Some(p) => p,
            None => return Ok(None),
        };
        if payment.is_paid() {
            self.recycle_settled(&payment).await?;
            return Ok(Some(payment));
        }
        if !payment.is_open() {
            trace!("🔍️ Payment {} is already {}. Nothing to settle", payment.id, payment.status);
            return Ok(Some(payment));
        }
        let report = self.check_payments(std::slice::from_ref(&payment), now).await?;
        if !report.failed.is_empty() {
            return Err(MonitorError::Persistence(PaymentStoreError::DatabaseError(format!(
                "Payment {} could not be updated",
                payment.id
            ))));
        }
        let current = self.store.fetch_payment(&payment.id).await?;
        Ok(current)
    }

    /// Moves the payment to `Paid` and publishes `paymentSuccess` only if this call made the transition, so a payment
    /// that was accepted early never gets a second success event.
    pub(crate) async fn settle(
        &self,
        payment: &Payment,
        early_accepted: bool,
    ) -> Result<SettlementResult, PaymentStoreError> {
        let result =
            with_retry("Settling payment", || self.store.mark_payment_paid(&payment.id, early_accepted)).await?;
        match &result {
            SettlementResult::Settled(p) => {
                info!("💸️ Payment {} is paid", p.id);
                self.producers.publish(PaymentEvent::Success(p.clone())).await;
            },
            SettlementResult::AlreadySettled(p) => {
                trace!("💸️ Payment {} was already paid (early: {})", p.id, p.early_accepted);
            },
            SettlementResult::TimedOut(p) => {
                debug!("💸️ Payment {} timed out before it could be settled", p.id);
            },
        }
        Ok(result)
    }

    async fn fetch_history(&self, addresses: &[String]) -> Result<Vec<LedgerTransaction>, LedgerError> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }
        self.ledger.find_transactions_by_address(addresses).await
    }

    async fn process_payment(
        &self,
        payment: &Payment,
        balance: Amount,
        history: &[LedgerTransaction],
        cursor: u64,
        now: DateTime<Utc>,
        report: &mut PollReport,
    ) -> Result<(), MonitorError> {
        if payment.early_accepted {
            trace!("🔍️ Payment {} was accepted early. Not re-evaluating it", payment.id);
            return Ok(());
        }
        if let Some(tx_info) = funding_transfer(payment, history) {
            self.record_incoming(payment, &tx_info, report).await?;
        }
        if !self.is_settled_by(payment, balance, now) {
            if balance.is_zero() {
                self.producers.publish(PaymentEvent::Pending(payment.clone())).await;
                report.pending.push(payment.id.clone());
            }
            return Ok(());
        }
        let result = self.settle(payment, false).await?;
        if let SettlementResult::Settled(p) = &result {
            report.settled.push(p.id.clone());
        }
        if !matches!(result, SettlementResult::TimedOut(_)) && self.recycle_if_spent(payment.index, cursor).await? {
            report.recycled.push(payment.index);
        }
        Ok(())
    }

    /// Runs the recycle check for a payment settled outside a polling pass, against the current disbursement cursor.
    pub(crate) async fn recycle_settled(&self, payment: &Payment) -> Result<bool, MonitorError> {
        let cursor = self.allocator.current_disbursement_cursor().await?;
        let added = self.recycle_if_spent(payment.index, cursor).await?;
        Ok(added)
    }

    /// Adds a paid payment's address index to the recycle set if it is below the disbursement cursor.
    async fn recycle_if_spent(&self, index: u64, cursor: u64) -> Result<bool, PaymentStoreError> {
        if index >= cursor {
            return Ok(false);
        }
        let added = with_retry("Recycling address index", || self.store.add_recycled_index(index)).await?;
        if added {
            debug!("🔍️ Address index {index} is below the disbursement cursor and was recycled");
        }
        Ok(added)
    }

    fn is_settled_by(&self, payment: &Payment, balance: Amount, now: DateTime<Utc>) -> bool {
        match payment.kind {
            PaymentKind::Value { value } => {
                if balance > value {
                    diagnostic!(self.debug, "🔍️ Payment {} is overpaid: {balance} received, {value} required", payment.id);
                } else if balance < value && balance.is_positive() {
                    diagnostic!(self.debug, "🔍️ Payment {} is underfunded: {balance} of {value} received", payment.id);
                }
                balance >= value
            },
            PaymentKind::Time { confirmation_time } => balance.is_positive() && now >= confirmation_time,
        }
    }

    async fn record_incoming(
        &self,
        payment: &Payment,
        tx_info: &TxInfo,
        report: &mut PollReport,
    ) -> Result<(), MonitorError> {
        let updated = with_retry("Recording funding transfer", || self.store.record_tx_info(&payment.id, tx_info)).await?;
        if let Some(p) = updated {
            debug!("🔍️ Incoming transfer {} for payment {}", tx_info.hash, p.id);
            self.producers.publish(PaymentEvent::Incoming(p)).await;
            report.incoming.push(payment.id.clone());
        }
        Ok(())
    }
}

/// The most recent inbound transfer to the payment's address that qualifies as its funding transfer. For value
/// payments the transfer must cover the required value by itself; for time payments any positive transfer counts.
fn funding_transfer(payment: &Payment, history: &[LedgerTransaction]) -> Option<TxInfo> {
    history
        .iter()
        .filter(|tx| tx.address == payment.address && tx.is_credit())
        .filter(|tx| match payment.kind.required_value() {
            Some(required) => tx.value >= required,
            None => true,
        })
        .max_by_key(|tx| tx.timestamp)
        .map(LedgerTransaction::tx_info)
}
