//! Periodic purge of expired sessions

use super::StoreResult;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Handle to a background purge loop. Dropping it stops the loop.
#[derive(Debug)]
pub struct Sweeper {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the loop and wait for it to exit
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Run `task` every `interval` until the returned [`Sweeper`] is dropped.
///
/// `task` returns the number of sessions it removed. Failures are logged and
/// the loop keeps going.
pub fn spawn_sweeper<F, Fut>(name: &'static str, interval: Duration, mut task: F) -> Sweeper
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = StoreResult<usize>> + Send + 'static,
{
    let interval = interval.max(MIN_INTERVAL);
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => match task().await {
                    Ok(0) => {}
                    Ok(removed) => tracing::debug!(store = name, removed, "Expired sessions purged"),
                    Err(e) => tracing::warn!(store = name, error = %e, "Session purge failed"),
                },
            }
        }
        tracing::debug!(store = name, "Sweeper stopped");
    });

    Sweeper {
        cancel,
        handle: Some(handle),
    }
}
