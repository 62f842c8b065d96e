use chrono::Duration;
use cucumber::given;
use ledger_payment_engine::EngineConfig;

use crate::{
    cucumber::PaymentWorld,
    support::{polling_config, push_config, TestSystem},
};

#[given("a confirmation engine with polling only")]
async fn polling_engine(world: &mut PaymentWorld) {
    world.system = Some(TestSystem::new(polling_config()).await);
}

#[given("a confirmation engine with zero-confirmation acceptance")]
async fn push_engine(world: &mut PaymentWorld) {
    world.system = Some(TestSystem::new(push_config()).await);
}

#[given(expr = "a confirmation engine with a maximum payment time of {int} minutes")]
async fn engine_with_max_payment_time(world: &mut PaymentWorld, minutes: i64) {
    let config = EngineConfig { max_payment_time: Duration::minutes(minutes), ..polling_config() };
    world.system = Some(TestSystem::new(config).await);
}
