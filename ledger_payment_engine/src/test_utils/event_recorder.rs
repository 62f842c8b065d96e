use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use futures_util::FutureExt;

use crate::events::{EventHandlers, EventHooks, EventProducers, PaymentEvent};

/// Collects every payment event published through the producers it hands out.
#[derive(Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<PaymentEvent>>>,
}

impl EventRecorder {
    /// Starts an event handler that records into this recorder and returns the matching producers.
    pub async fn start(&self) -> EventProducers {
        self.start_with_buffer(64).await
    }

    pub async fn start_with_buffer(&self, buffer_size: usize) -> EventProducers {
        let mut hooks = EventHooks::default();
        let recorder = self.clone();
        hooks.on_payment_event(move |ev| {
            let recorder = recorder.clone();
            async move {
                recorder.lock().push(ev);
            }
            .boxed()
        });
        let handlers = EventHandlers::new(buffer_size, hooks);
        let producers = handlers.producers();
        handlers.start_handlers().await;
        producers
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PaymentEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn events(&self) -> Vec<PaymentEvent> {
        self.lock().clone()
    }

    /// The number of recorded events with the given status, e.g. `paymentSuccess`.
    pub fn count(&self, status: &str) -> usize {
        self.lock().iter().filter(|e| e.status() == status).count()
    }

    /// Waits up to `timeout` for at least `n` events with the given status. Returns the final count.
    pub async fn wait_for(&self, status: &str, n: usize, timeout: Duration) -> usize {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let count = self.count(status);
            if count >= n || tokio::time::Instant::now() >= deadline {
                return count;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
