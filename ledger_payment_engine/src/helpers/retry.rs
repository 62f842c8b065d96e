use std::{fmt::Display, future::Future, time::Duration};

use log::*;

/// The number of times [`with_retry`] will attempt an operation before giving up.
pub const RETRY_ATTEMPTS: usize = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(50);

/// Runs `op` until it succeeds or [`RETRY_ATTEMPTS`] attempts have failed, doubling the back-off between attempts.
/// The last error is returned if every attempt fails.
pub async fn with_retry<T, E, F, Fut>(label: &str, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut backoff = INITIAL_BACKOFF;
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < RETRY_ATTEMPTS => {
                warn!("🗃️ {label} failed on attempt {attempt}/{RETRY_ATTEMPTS}. {e}. Retrying in {backoff:?}");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
                attempt += 1;
            },
            Err(e) => return Err(e),
        }
    }
}
