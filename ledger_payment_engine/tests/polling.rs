use chrono::{Duration, Utc};
use ledger_payment_engine::{
    db_types::PaymentStatus,
    monitor::{CycleOutcome, CycleReport, MonitorError},
    EngineConfig,
    PaymentRequest,
    PaymentStore,
};

mod support;

use support::{polling_config, TestSystem};

fn checked(outcome: CycleOutcome) -> CycleReport {
    match outcome {
        CycleOutcome::Checked(report) => report,
        CycleOutcome::Idle => panic!("Expected a checked cycle, but it was idle"),
    }
}

#[tokio::test]
async fn payment_settles_when_balance_covers_value() {
    let sys = TestSystem::new(polling_config()).await;
    let payment = sys.create_value_payment(5).await;
    assert!(sys.engine.scheduler().is_running());
    sys.ledger.receive(&payment.address, 5, "HASH_A", "order 42");

    let report = checked(sys.engine.scheduler().run_cycle(Utc::now()).await.unwrap());
    assert_eq!(report.poll.settled, vec![payment.id.clone()]);
    assert_eq!(report.poll.incoming, vec![payment.id.clone()]);

    let current = sys.payment(&payment).await;
    assert_eq!(current.status, PaymentStatus::Paid);
    assert!(!current.early_accepted);
    let tx_info = current.tx_info.expect("tx info should be recorded");
    assert_eq!(tx_info.hash, "HASH_A");
    assert_eq!(tx_info.message, "order 42");
    assert!(current.last_checked.is_some());

    assert_eq!(sys.event_count("paymentCreated", 1).await, 1);
    assert_eq!(sys.event_count("paymentIncoming", 1).await, 1);
    assert_eq!(sys.event_count("paymentSuccess", 1).await, 1);

    // Nothing is left open, so the next cycle is idle and no further events fire
    let outcome = sys.engine.scheduler().run_cycle(Utc::now()).await.unwrap();
    assert!(matches!(outcome, CycleOutcome::Idle));
    assert_eq!(sys.event_count("paymentSuccess", 2).await, 1);
    sys.tear_down().await;
}

#[tokio::test]
async fn overpayment_is_accepted() {
    let sys = TestSystem::new(polling_config()).await;
    let payment = sys.create_value_payment(5).await;
    sys.ledger.receive(&payment.address, 8, "HASH_B", "");
    let report = checked(sys.engine.scheduler().run_cycle(Utc::now()).await.unwrap());
    assert_eq!(report.poll.settled_count(), 1);
    assert!(sys.payment(&payment).await.is_paid());
    sys.tear_down().await;
}

#[tokio::test]
async fn only_empty_addresses_report_pending() {
    let sys = TestSystem::new(polling_config()).await;
    let empty = sys.create_value_payment(5).await;
    let underfunded = sys.create_value_payment(5).await;
    sys.ledger.set_balance(&underfunded.address, 3);

    let report = checked(sys.engine.scheduler().run_cycle(Utc::now()).await.unwrap());
    assert_eq!(report.poll.checked, 2);
    assert!(report.poll.settled.is_empty());
    assert_eq!(report.poll.pending, vec![empty.id.clone()]);
    assert_eq!(sys.event_count("paymentPending", 1).await, 1);
    let pending = sys.recorder.events().into_iter().find(|e| e.status() == "paymentPending").unwrap();
    assert_eq!(pending.payment().id, empty.id);

    assert!(sys.payment(&empty).await.is_open());
    assert!(sys.payment(&underfunded).await.is_open());
    assert_eq!(sys.recorder.count("paymentSuccess"), 0);
    sys.tear_down().await;
}

#[tokio::test]
async fn ledger_failure_leaves_batch_untouched() {
    let sys = TestSystem::new(polling_config()).await;
    let payment = sys.create_value_payment(5).await;
    sys.ledger.set_balance(&payment.address, 5);
    sys.ledger.set_offline(true);

    let err = sys.engine.scheduler().run_cycle(Utc::now()).await.expect_err("The cycle should fail");
    assert!(matches!(err, MonitorError::Query(_)));
    let current = sys.payment(&payment).await;
    assert!(current.is_open());
    assert!(current.last_checked.is_none());

    // The payment is retried on the next cycle once the node is back
    sys.ledger.set_offline(false);
    let report = checked(sys.engine.scheduler().run_cycle(Utc::now()).await.unwrap());
    assert_eq!(report.poll.settled, vec![payment.id.clone()]);
    assert_eq!(sys.event_count("paymentSuccess", 1).await, 1);
    sys.tear_down().await;
}

#[tokio::test]
async fn paid_indices_below_cursor_are_recycled() {
    let sys = TestSystem::new(polling_config()).await;
    let below = sys.create_value_payment(5).await;
    let above = sys.create_value_payment(5).await;
    sys.allocator.set_disbursement_cursor(1);
    sys.ledger.set_balance(&below.address, 5);
    sys.ledger.set_balance(&above.address, 5);

    let report = checked(sys.engine.scheduler().run_cycle(Utc::now()).await.unwrap());
    assert_eq!(report.poll.settled_count(), 2);
    assert_eq!(report.poll.recycled, vec![below.index]);
    assert_eq!(sys.engine.api().recycled_indices().await.unwrap(), vec![below.index]);
    sys.tear_down().await;
}

#[tokio::test]
async fn payments_time_out_after_max_payment_time() {
    let config = EngineConfig { max_payment_time: Duration::minutes(10), ..polling_config() };
    let sys = TestSystem::new(config).await;
    let payment = sys.create_value_payment(5).await;
    let t0 = payment.created_at;

    let report = checked(sys.engine.scheduler().run_cycle(t0 + Duration::minutes(11)).await.unwrap());
    assert_eq!(report.expired, vec![payment.id.clone()]);
    assert_eq!(report.poll.checked, 0);
    assert_eq!(sys.payment(&payment).await.status, PaymentStatus::Timeout);

    // Funds arriving later change nothing
    sys.ledger.set_balance(&payment.address, 5);
    let outcome = sys.engine.scheduler().run_cycle(t0 + Duration::minutes(12)).await.unwrap();
    assert!(matches!(outcome, CycleOutcome::Idle));
    assert_eq!(sys.payment(&payment).await.status, PaymentStatus::Timeout);
    assert_eq!(sys.event_count("paymentSuccess", 1).await, 0);
    sys.tear_down().await;
}

#[tokio::test]
async fn recently_checked_payments_are_skipped() {
    let sys = TestSystem::new(polling_config()).await;
    let payment = sys.create_value_payment(5).await;
    let t0 = payment.created_at;
    let scheduler = sys.engine.scheduler();

    checked(scheduler.run_cycle(t0 + Duration::minutes(15)).await.unwrap());
    assert_eq!(sys.ledger.balance_queries(), 1);

    // 20 minutes old, checked 5 minutes ago
    let report = checked(scheduler.run_cycle(t0 + Duration::minutes(20)).await.unwrap());
    assert_eq!(report.skipped, 1);
    assert_eq!(report.poll.checked, 0);
    assert_eq!(sys.ledger.balance_queries(), 1);

    // 25 minutes old, checked 10 minutes ago
    let report = checked(scheduler.run_cycle(t0 + Duration::minutes(25)).await.unwrap());
    assert_eq!(report.poll.checked, 1);
    assert_eq!(sys.ledger.balance_queries(), 2);
    sys.tear_down().await;
}

#[tokio::test]
async fn time_payment_settles_after_deadline() {
    let sys = TestSystem::new(polling_config()).await;
    let payment = sys.engine.api().create_payment(PaymentRequest::for_time(60)).await.unwrap();
    sys.ledger.receive(&payment.address, 1, "HASH_T", "early bird");
    let now = Utc::now();

    let report = checked(sys.engine.scheduler().run_cycle(now).await.unwrap());
    assert!(report.poll.settled.is_empty());
    assert_eq!(report.poll.incoming, vec![payment.id.clone()]);
    assert!(sys.payment(&payment).await.is_open());

    let report = checked(sys.engine.scheduler().run_cycle(now + Duration::minutes(2)).await.unwrap());
    assert_eq!(report.poll.settled, vec![payment.id.clone()]);
    assert!(report.poll.incoming.is_empty());
    assert_eq!(sys.event_count("paymentSuccess", 1).await, 1);
    assert_eq!(sys.event_count("paymentIncoming", 1).await, 1);
    sys.tear_down().await;
}

#[tokio::test]
async fn check_cycle_stops_when_nothing_is_open() {
    let config = EngineConfig { check_interval: std::time::Duration::from_millis(20), ..polling_config() };
    let sys = TestSystem::new(config).await;
    let payment = sys.create_value_payment(5).await;
    sys.ledger.set_balance(&payment.address, 5);
    assert!(sys.engine.scheduler().is_running());
    // Arming again is a no-op
    assert!(sys.engine.scheduler().arm().is_none());

    assert_eq!(sys.event_count("paymentSuccess", 1).await, 1);
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
    while sys.engine.scheduler().is_running() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(!sys.engine.scheduler().is_running());
    assert!(sys.store.fetch_open_payments().await.unwrap().is_empty());

    // Creating a payment re-arms it
    let _second = sys.create_value_payment(5).await;
    assert!(sys.engine.scheduler().is_running());
    sys.tear_down().await;
}
