use std::{
    fmt::Debug,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};

use chrono::Utc;
use log::*;

use crate::{
    db_types::{NewPayment, Payment, PaymentId},
    events::{EventProducers, PaymentEvent},
    monitor::{Scheduler, WatchList},
    pe_api::{errors::PaymentApiError, payment_objects::PaymentRequest},
    traits::{AddressAllocator, LedgerClient, PaymentStore},
};

/// `PaymentApi` is the entry point for creating and querying payments.
///
/// Creating a payment arms the check cycle, and puts value payments on the push monitor's watch list when push
/// monitoring is enabled.
#[derive(Clone)]
pub struct PaymentApi<B, L, A> {
    store: B,
    allocator: A,
    scheduler: Scheduler<B, L, A>,
    watch_list: Option<WatchList>,
    producers: EventProducers,
    last_id: Arc<AtomicI64>,
}

impl<B, L, A> Debug for PaymentApi<B, L, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentApi")
    }
}

impl<B, L, A> PaymentApi<B, L, A>
where
    B: PaymentStore,
    L: LedgerClient,
    A: AddressAllocator,
{
    pub fn new(store: B, allocator: A, scheduler: Scheduler<B, L, A>, producers: EventProducers) -> Self {
        Self { store, allocator, scheduler, watch_list: None, producers, last_id: Arc::new(AtomicI64::new(0)) }
    }

    /// New value payments are added to `watch_list`.
    pub fn with_watch_list(mut self, watch_list: WatchList) -> Self {
        self.watch_list = Some(watch_list);
        self
    }

    /// Creates a new payment on a freshly allocated address.
    pub async fn create_payment(&self, request: PaymentRequest) -> Result<Payment, PaymentApiError> {
        let now = Utc::now();
        let kind = request.payment_kind(now)?;
        let address = self.allocator.allocate_address().await?;
        let new_payment = NewPayment {
            id: self.next_id(now.timestamp_millis()),
            ..NewPayment::new(address.address, address.index, kind, now)
        };
        let new_payment = new_payment.with_data(request.data.unwrap_or(serde_json::Value::Null));
        let payment = self.store.insert_payment(new_payment).await?;
        info!("💸️ New payment created: {payment}");
        self.producers.publish(PaymentEvent::Created(payment.clone())).await;
        if payment.kind.is_value() {
            if let Some(watch_list) = &self.watch_list {
                watch_list.add(&payment.address).await;
            }
        }
        self.scheduler.arm();
        Ok(payment)
    }

    /// All payments, oldest first.
    pub async fn payments(&self) -> Result<Vec<Payment>, PaymentApiError> {
        let payments = self.store.fetch_payments().await?;
        Ok(payments)
    }

    pub async fn open_payments(&self) -> Result<Vec<Payment>, PaymentApiError> {
        let payments = self.store.fetch_open_payments().await?;
        Ok(payments)
    }

    pub async fn payment_by_id(&self, id: &PaymentId) -> Result<Option<Payment>, PaymentApiError> {
        let payment = self.store.fetch_payment(id).await?;
        Ok(payment)
    }

    /// Address indices that are free to be used as payout inputs.
    pub async fn recycled_indices(&self) -> Result<Vec<u64>, PaymentApiError> {
        let indices = self.store.fetch_recycled_indices().await?;
        Ok(indices)
    }

    /// A time-derived id that is strictly greater than every id handed out before by this API.
    fn next_id(&self, now_millis: i64) -> PaymentId {
        let advance = |last: i64| now_millis.max(last.saturating_add(1));
        // The closure always returns `Some`, so both arms hold the previous value.
        let previous = match self.last_id.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(advance(last))) {
            Ok(last) | Err(last) => last,
        };
        PaymentId::from_millis(advance(previous))
    }
}
