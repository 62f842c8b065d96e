use std::{env, time::Duration as StdDuration};

use chrono::Duration;
use log::*;
use lpg_common::helpers::parse_boolean_flag;

use crate::{
    events::{EventHandlers, EventHooks},
    ledger_types::EventTopic,
    pe_api::errors::EngineError,
};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/ledger_payments.db";
const DEFAULT_MAX_PAYMENT_MINUTES: i64 = 12_960;
const DEFAULT_CHECK_INTERVAL_SECS: u64 = 9;
const DEFAULT_EVENT_BUFFER: usize = 25;

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub database_url: String,
    /// Payments older than this are marked as timed out.
    pub max_payment_time: Duration,
    /// The period of the scheduler's recurring check cycle.
    pub check_interval: StdDuration,
    /// Emits the verbose per-payment diagnostics at `info` level rather than `trace`.
    pub debug: bool,
    /// Accept payments on unconfirmed transfers that pass the fraud checks. **Carries monetary risk.**
    pub accept_unconfirmed: bool,
    /// Settle payments as soon as the event bus reports a confirmed transfer to their address.
    pub track_confirmations: bool,
    /// The ledger event bus endpoint. Required if either push channel is enabled.
    pub push_endpoint: Option<String>,
    /// Channel capacity for the event hooks.
    pub event_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: String::default(),
            max_payment_time: Duration::minutes(DEFAULT_MAX_PAYMENT_MINUTES),
            check_interval: StdDuration::from_secs(DEFAULT_CHECK_INTERVAL_SECS),
            debug: false,
            accept_unconfirmed: false,
            track_confirmations: false,
            push_endpoint: None,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl EngineConfig {
    pub fn new(database_url: &str) -> Self {
        Self { database_url: database_url.to_string(), ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let database_url = database_url_from_env();
        let max_payment_time = parse_env_number("LPG_MAX_PAYMENT_TIME", DEFAULT_MAX_PAYMENT_MINUTES);
        if max_payment_time <= 0 {
            warn!("🪛️ LPG_MAX_PAYMENT_TIME must be positive. Every open payment will time out on the next cycle.");
        }
        let check_interval = parse_env_number("LPG_CHECK_INTERVAL", DEFAULT_CHECK_INTERVAL_SECS);
        let check_interval = if check_interval == 0 {
            warn!("🪛️ LPG_CHECK_INTERVAL cannot be zero. Using the default, {DEFAULT_CHECK_INTERVAL_SECS}s, instead.");
            DEFAULT_CHECK_INTERVAL_SECS
        } else {
            check_interval
        };
        let debug = parse_boolean_flag(env::var("LPG_DEBUG").ok(), false);
        let accept_unconfirmed = parse_boolean_flag(env::var("LPG_ACCEPT_UNCONFIRMED").ok(), false);
        if accept_unconfirmed {
            warn!("🪛️ Zero-confirmation acceptance is enabled. Unconfirmed transfers can settle payments.");
        }
        let track_confirmations = parse_boolean_flag(env::var("LPG_TRACK_CONFIRMATIONS").ok(), false);
        let push_endpoint = env::var("LPG_PUSH_ENDPOINT").ok().filter(|s| !s.trim().is_empty());
        let event_buffer = parse_env_number("LPG_EVENT_BUFFER", DEFAULT_EVENT_BUFFER).max(1);
        Self {
            database_url,
            max_payment_time: Duration::minutes(max_payment_time),
            check_interval: StdDuration::from_secs(check_interval),
            debug,
            accept_unconfirmed,
            track_confirmations,
            push_endpoint,
            event_buffer,
        }
    }

    pub fn push_enabled(&self) -> bool {
        self.accept_unconfirmed || self.track_confirmations
    }

    /// The event bus topics to subscribe to, given the push channel toggles.
    pub fn push_topics(&self) -> Vec<EventTopic> {
        let mut topics = Vec::with_capacity(2);
        if self.accept_unconfirmed {
            topics.push(EventTopic::PendingTransfers);
        }
        if self.track_confirmations {
            topics.push(EventTopic::ConfirmedTransfers);
        }
        topics
    }

    /// Builds the event handlers for `hooks`, with channels sized by `event_buffer`.
    pub fn event_handlers(&self, hooks: EventHooks) -> EventHandlers {
        EventHandlers::new(self.event_buffer, hooks)
    }

    /// Checks that the configuration is coherent. A push channel without an endpoint is fatal.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.push_enabled() && self.push_endpoint.is_none() {
            return Err(EngineError::ConfigurationError(
                "Push monitoring is enabled, but LPG_PUSH_ENDPOINT is not set".into(),
            ));
        }
        Ok(())
    }
}

/// Reads the payment store URL from `LPG_DATABASE_URL`, falling back to the default.
pub fn database_url_from_env() -> String {
    let result = env::var("LPG_DATABASE_URL").unwrap_or_else(|_| {
        info!("🪛️ LPG_DATABASE_URL is not set. Using the default.");
        DEFAULT_DATABASE_URL.to_string()
    });
    info!("🪛️ Using database URL: {result}");
    result
}

fn parse_env_number<T>(var: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display + Copy,
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            warn!("🪛️ {s} is not a valid value for {var}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => {
            info!("🪛️ {var} is not set. Using the default, {default}.");
            default
        },
    }
}
