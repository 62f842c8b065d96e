use chrono::{Duration, Utc};
use cucumber::{then, when};
use ledger_payment_engine::{
    db_types::PaymentStatus,
    ledger_types::{ConfirmedTransfer, LedgerEvent},
    test_utils::transfer_bundle,
};

use crate::cucumber::PaymentWorld;

#[when(expr = "I create a value payment {string} for {int}")]
async fn create_value_payment(world: &mut PaymentWorld, label: String, value: i64) {
    let payment = world.system().create_value_payment(value).await;
    world.payments.insert(label, payment);
}

#[when(expr = "{string} holds {int}")]
async fn address_holds(world: &mut PaymentWorld, address: String, amount: i64) {
    world.system().ledger.set_balance(&address, amount);
}

#[when(expr = "payment {string} receives {int} with memo {string}")]
async fn payment_receives(world: &mut PaymentWorld, label: String, amount: i64, memo: String) {
    let address = world.payment(&label).address.clone();
    let hash = format!("{label}_FUNDING");
    world.system().ledger.receive(&address, amount, &hash, &memo);
}

#[when(expr = "{string} sends {int} to {string} in bundle {string}")]
async fn competing_transfer(world: &mut PaymentWorld, from: String, amount: i64, to: String, bundle: String) {
    let (txs, _) = transfer_bundle(&bundle, &from, &to, amount);
    world.system().ledger.add_transactions(txs);
}

#[when(expr = "the ledger reports a pending transfer of {int} from {string} to payment {string} in bundle {string}")]
async fn pending_transfer(world: &mut PaymentWorld, amount: i64, from: String, label: String, bundle: String) {
    let address = world.payment(&label).address.clone();
    let (txs, pending) = transfer_bundle(&bundle, &from, &address, amount);
    let system = world.system();
    system.ledger.add_transactions(txs);
    let push = system.engine.push_monitor();
    if let Some(event) = push.accept_event(LedgerEvent::Pending(pending)).await {
        push.handle_event(event).await;
    }
}

#[when(expr = "the ledger confirms the transfer to payment {string}")]
async fn confirmed_transfer(world: &mut PaymentWorld, label: String) {
    let payment = world.payment(&label).clone();
    let system = world.system();
    let confirmed = ConfirmedTransfer { tx_hash: format!("{label}_CONFIRMED"), address: payment.address.clone() };
    system.ledger.set_balance(&payment.address, payment.kind.required_value().map(|v| v.value()).unwrap_or(1));
    system.engine.push_monitor().handle_event(LedgerEvent::Confirmed(confirmed)).await;
}

#[when("a check cycle runs")]
async fn check_cycle(world: &mut PaymentWorld) {
    world.system().engine.scheduler().run_cycle(Utc::now()).await.expect("Check cycle failed");
}

#[when(expr = "a check cycle runs {int} minutes after payment {string} was created")]
async fn check_cycle_later(world: &mut PaymentWorld, minutes: i64, label: String) {
    let at = world.payment(&label).created_at + Duration::minutes(minutes);
    world.system().engine.scheduler().run_cycle(at).await.expect("Check cycle failed");
}

async fn status_of(world: &PaymentWorld, label: &str) -> ledger_payment_engine::db_types::Payment {
    world.system().payment(world.payment(label)).await
}

#[then(expr = "payment {string} is paid")]
async fn payment_is_paid(world: &mut PaymentWorld, label: String) {
    assert_eq!(status_of(world, &label).await.status, PaymentStatus::Paid);
}

#[then(expr = "payment {string} is open")]
async fn payment_is_open(world: &mut PaymentWorld, label: String) {
    assert_eq!(status_of(world, &label).await.status, PaymentStatus::Open);
}

#[then(expr = "payment {string} has timed out")]
async fn payment_timed_out(world: &mut PaymentWorld, label: String) {
    assert_eq!(status_of(world, &label).await.status, PaymentStatus::Timeout);
}

#[then(expr = "payment {string} was accepted early")]
async fn accepted_early(world: &mut PaymentWorld, label: String) {
    assert!(status_of(world, &label).await.early_accepted);
}

#[then(expr = "payment {string} was not accepted early")]
async fn not_accepted_early(world: &mut PaymentWorld, label: String) {
    assert!(!status_of(world, &label).await.early_accepted);
}

#[then(expr = "payment {string} carries the memo {string}")]
async fn carries_memo(world: &mut PaymentWorld, label: String, memo: String) {
    let payment = status_of(world, &label).await;
    assert_eq!(payment.tx_info.map(|t| t.message), Some(memo));
}

#[then(expr = "there is/are {int} {word} event(s)")]
async fn event_count(world: &mut PaymentWorld, count: usize, status: String) {
    let actual = world.system().event_count(&status, count).await;
    assert_eq!(actual, count, "Expected {count} {status} events");
}
