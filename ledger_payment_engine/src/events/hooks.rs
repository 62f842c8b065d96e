use std::{future::Future, pin::Pin, sync::Arc};

use log::*;

use crate::events::{EventHandler, EventProducer, Handler, PaymentEvent};

type HookFn = dyn Fn(PaymentEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync + 'static;

/// Publishing side of the event hooks. Cloned into every component that emits payment events.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub payment_event_producer: Vec<EventProducer<PaymentEvent>>,
    pub payment_success_producer: Vec<EventProducer<PaymentEvent>>,
}

impl EventProducers {
    /// Routes the event to every subscriber interested in it.
    pub async fn publish(&self, event: PaymentEvent) {
        trace!("📬️ Publishing {event}");
        if event.is_success() {
            for emitter in &self.payment_success_producer {
                emitter.publish_event(event.clone()).await;
            }
        }
        for emitter in &self.payment_event_producer {
            emitter.publish_event(event.clone()).await;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.payment_event_producer.is_empty() && self.payment_success_producer.is_empty()
    }
}

pub struct EventHandlers {
    pub on_payment_event: Option<EventHandler<PaymentEvent>>,
    pub on_payment_success: Option<EventHandler<PaymentEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_payment_event = hooks.on_payment_event.map(|f| EventHandler::new(buffer_size, f));
        let on_payment_success = hooks.on_payment_success.map(|f| EventHandler::new(buffer_size, f));
        Self { on_payment_event, on_payment_success }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_payment_event {
            result.payment_event_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_payment_success {
            result.payment_success_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_payment_event {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_payment_success {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_payment_event: Option<Handler<PaymentEvent>>,
    pub on_payment_success: Option<Handler<PaymentEvent>>,
}

impl EventHooks {
    /// Called for every payment event, whatever its status.
    pub fn on_payment_event<F>(&mut self, f: F) -> &mut Self
    where F: Fn(PaymentEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync + 'static {
        let f: Arc<HookFn> = Arc::new(f);
        self.on_payment_event = Some(f);
        self
    }

    /// Called once for each payment that settles.
    pub fn on_payment_success<F>(&mut self, f: F) -> &mut Self
    where F: Fn(PaymentEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync + 'static {
        let f: Arc<HookFn> = Arc::new(f);
        self.on_payment_success = Some(f);
        self
    }
}
