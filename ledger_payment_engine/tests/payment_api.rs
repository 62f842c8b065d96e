use async_trait::async_trait;
use ledger_payment_engine::{
    db_types::{PaymentKind, PaymentStatus},
    ledger_types::AddressInfo,
    test_utils::{
        prepare_env::{new_test_store, tear_down},
        MockLedger,
    },
    traits::{AddressAllocator, AllocationError},
    ConfirmationEngine,
    PaymentApiError,
    PaymentRequest,
};
use lpg_common::Amount;
use mockall::mock;

mod support;

use support::{polling_config, push_config, TestSystem};

mock! {
    pub Allocator {}
    impl Clone for Allocator {
        fn clone(&self) -> Self;
    }
    #[async_trait]
    impl AddressAllocator for Allocator {
        async fn allocate_address(&self) -> Result<AddressInfo, AllocationError>;
        async fn current_disbursement_cursor(&self) -> Result<u64, AllocationError>;
    }
}

fn exhausted_allocator() -> MockAllocator {
    let mut allocator = MockAllocator::new();
    allocator
        .expect_allocate_address()
        .returning(|| Err(AllocationError::Exhausted("No addresses left".into())));
    allocator.expect_current_disbursement_cursor().returning(|| Ok(0));
    allocator.expect_clone().returning(exhausted_allocator);
    allocator
}

#[tokio::test]
async fn create_value_and_time_payments() {
    let sys = TestSystem::new(polling_config()).await;
    let api = sys.engine.api();
    let request = PaymentRequest::for_value(1_500).with_data(serde_json::json!({"invoice": 17}));
    let value_payment = api.create_payment(request).await.expect("Error creating payment");
    assert_eq!(value_payment.kind, PaymentKind::Value { value: Amount::from(1_500) });
    assert_eq!(value_payment.data, serde_json::json!({"invoice": 17}));
    assert_eq!(value_payment.index, 0);
    assert_eq!(value_payment.status, PaymentStatus::Open);

    let time_payment = api.create_payment(PaymentRequest::for_time(600)).await.expect("Error creating payment");
    assert_eq!(time_payment.index, 1);
    assert_eq!(time_payment.data, serde_json::Value::Null);
    match time_payment.kind {
        PaymentKind::Time { confirmation_time } => {
            let delay = confirmation_time - time_payment.created_at;
            assert!((delay.num_seconds() - 600).abs() <= 1);
        },
        other => panic!("Expected a time payment, got {other:?}"),
    }

    let all = api.payments().await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(api.open_payments().await.unwrap().len(), 2);
    let fetched = api.payment_by_id(&value_payment.id).await.unwrap().expect("Payment not found");
    assert_eq!(fetched.id, value_payment.id);
    assert_eq!(fetched.kind, value_payment.kind);
    assert_eq!(fetched.address, value_payment.address);
    assert_eq!(sys.event_count("paymentCreated", 2).await, 2);
    sys.tear_down().await;
}

#[tokio::test]
async fn payment_ids_strictly_increase() {
    let sys = TestSystem::new(polling_config()).await;
    let mut ids = Vec::new();
    for _ in 0..20 {
        ids.push(sys.create_value_payment(1).await.id);
    }
    let millis = ids.iter().map(|id| id.millis().expect("Time-derived id")).collect::<Vec<_>>();
    assert!(millis.windows(2).all(|w| w[0] < w[1]), "Ids are not strictly increasing: {millis:?}");
    sys.tear_down().await;
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let sys = TestSystem::new(polling_config()).await;
    let api = sys.engine.api();
    let both = PaymentRequest { value: Some(5), time_until_confirmation: Some(5), data: None };
    for request in [both, PaymentRequest::default(), PaymentRequest::for_value(-5), PaymentRequest::for_time(-1)] {
        let err = api.create_payment(request).await.expect_err("Request should be rejected");
        assert!(matches!(err, PaymentApiError::InvalidPaymentRequest(_)));
    }
    assert!(api.payments().await.unwrap().is_empty());
    assert!(!sys.engine.scheduler().is_running());
    sys.tear_down().await;
}

#[tokio::test]
async fn value_payments_join_the_watch_list_when_push_is_enabled() {
    let sys = TestSystem::new(push_config()).await;
    let payment = sys.create_value_payment(5).await;
    assert!(sys.engine.push_monitor().watch_list().contains(&payment.address).await);
    sys.tear_down().await;

    let sys = TestSystem::new(polling_config()).await;
    let payment = sys.create_value_payment(5).await;
    assert!(!sys.engine.push_monitor().watch_list().contains(&payment.address).await);
    sys.tear_down().await;
}

#[tokio::test]
async fn allocation_failure_creates_nothing() {
    let store = new_test_store().await;
    let allocator = exhausted_allocator();
    let engine = ConfirmationEngine::new(polling_config(), store.clone(), MockLedger::new(), allocator, Default::default())
        .expect("Valid configuration");
    let err = engine.api().create_payment(PaymentRequest::for_value(5)).await.expect_err("Allocation should fail");
    assert!(matches!(err, PaymentApiError::Allocation(AllocationError::Exhausted(_))));
    assert!(engine.api().payments().await.unwrap().is_empty());
    assert!(!engine.scheduler().is_running());
    tear_down(store).await;
}
