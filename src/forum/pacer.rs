use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Process-wide gate enforcing a minimum gap between any two outbound requests,
/// independent of how many callers are fetching concurrently.
#[derive(Debug)]
pub struct Pacer {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(None),
        }
    }

    /// Waits for the next free slot. The lock is held while sleeping so waiters
    /// are released one interval apart.
    pub async fn wait(&self) {
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.min_interval;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}
