#![allow(dead_code)]
use std::time::Duration;

use ledger_payment_engine::{
    db_types::Payment,
    test_utils::{
        prepare_env::{new_test_store, tear_down},
        EventRecorder,
        MockLedger,
        SequentialAllocator,
    },
    ConfirmationEngine,
    EngineConfig,
    PaymentRequest,
    PaymentStore,
    SqliteDatabase,
};

pub const PUSH_ENDPOINT: &str = "tcp://ledger.test:5556";

pub type TestEngine = ConfirmationEngine<SqliteDatabase, MockLedger, SequentialAllocator>;

/// A complete engine over a throw-away database, a scripted ledger and a sequential allocator.
pub struct TestSystem {
    pub store: SqliteDatabase,
    pub ledger: MockLedger,
    pub allocator: SequentialAllocator,
    pub recorder: EventRecorder,
    pub engine: TestEngine,
}

/// The check cycle never ticks on its own during a test. Tests drive it with `run_cycle`.
pub fn polling_config() -> EngineConfig {
    EngineConfig { check_interval: Duration::from_secs(3600), ..EngineConfig::default() }
}

pub fn push_config() -> EngineConfig {
    EngineConfig {
        accept_unconfirmed: true,
        track_confirmations: true,
        push_endpoint: Some(PUSH_ENDPOINT.to_string()),
        ..polling_config()
    }
}

impl TestSystem {
    pub async fn new(config: EngineConfig) -> Self {
        let store = new_test_store().await;
        let ledger = MockLedger::new();
        let allocator = SequentialAllocator::new();
        let recorder = EventRecorder::default();
        let producers = recorder.start_with_buffer(config.event_buffer).await;
        let engine = ConfirmationEngine::new(config, store.clone(), ledger.clone(), allocator.clone(), producers)
            .expect("Invalid engine configuration");
        Self { store, ledger, allocator, recorder, engine }
    }

    pub async fn create_value_payment(&self, value: i64) -> Payment {
        self.engine.api().create_payment(PaymentRequest::for_value(value)).await.expect("Error creating payment")
    }

    pub async fn payment(&self, payment: &Payment) -> Payment {
        self.store.fetch_payment(&payment.id).await.expect("Error fetching payment").expect("Payment not found")
    }

    /// Gives the event hooks a moment to deliver, then returns the number of events with the given status.
    pub async fn event_count(&self, status: &str, expected: usize) -> usize {
        let count = self.recorder.wait_for(status, expected, Duration::from_millis(500)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        count.max(self.recorder.count(status))
    }

    pub async fn tear_down(self) {
        tear_down(self.store).await;
    }
}
