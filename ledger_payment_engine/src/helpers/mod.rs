mod retry;

pub use retry::{with_retry, RETRY_ATTEMPTS};
