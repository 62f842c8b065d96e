//! The public payment API.
pub mod errors;
mod payment_api;
mod payment_objects;

pub use errors::{EngineError, PaymentApiError};
pub use payment_api::PaymentApi;
pub use payment_objects::PaymentRequest;
