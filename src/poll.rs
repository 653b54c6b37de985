use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info};

/// Explicit description of a recurring keyed query: whether it may run at
/// all, its cadence, and the parameter tuple its results belong to. A result
/// computed under a key that no longer matches the live inputs is discarded
/// rather than published.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec<K> {
    pub enabled: bool,
    pub interval: Duration,
    pub key: K,
}

/// A running poller. Dropping the handle releases the timer and stops the
/// task.
pub struct PollHandle {
    name: &'static str,
    handle: JoinHandle<()>,
}

/// Spawn a task that re-runs `tick` at a fixed period. The first tick fires
/// immediately.
pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> PollHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let handle = tokio::spawn(async move {
        info!("{} poller started ({}s interval)", name, period.as_secs());
        let mut timer = interval(period);
        loop {
            timer.tick().await;
            tick().await;
        }
    });
    PollHandle { name, handle }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        debug!("{} poller stopped", self.name);
        self.handle.abort();
    }
}
