//! Poll-with-timeout helper for eventually-consistent conditions: gossip
//! convergence, ring membership updates, replication settling.

use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Poll `condition` every `interval` until it returns `true` or `timeout`
/// elapses. Returns whether it converged.
pub async fn wait_until<F, Fut>(timeout: Duration, interval: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(interval).await;
    }
}
