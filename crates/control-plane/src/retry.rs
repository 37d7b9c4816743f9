//! Fixed-count, fixed-interval retry for asynchronous actions

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time;
use tracing::{info, warn};

/// Outcome of a retried action that eventually succeeded
#[derive(Debug)]
pub struct Attempted<T> {
    /// The value produced by the successful attempt
    pub value: T,
    /// How many attempts were made, counting the successful one
    pub attempts: u32,
}

/// Invoke `action` until it succeeds, up to `max_attempts` times, sleeping
/// `interval` between attempts. There is no backoff growth.
///
/// Stops on the first success. If every attempt fails, the last failure is
/// propagated unchanged. `max_attempts` below 1 still runs the action once.
pub async fn attempt<T, E, F, Fut>(
    mut action: F,
    max_attempts: u32,
    interval: Duration,
) -> std::result::Result<Attempted<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Display,
{
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match action().await {
            Ok(value) => {
                if attempts > 1 {
                    info!(attempts, "action succeeded after retry");
                }
                return Ok(Attempted { value, attempts });
            }
            Err(e) if attempts < max_attempts => {
                warn!(attempt = attempts, max_attempts, error = %e, "attempt failed, retrying");
                time::sleep(interval).await;
            }
            Err(e) => {
                warn!(attempts, error = %e, "action failed on final attempt");
                return Err(e);
            }
        }
    }
}
