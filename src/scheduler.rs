//! Fixed-interval polling with deterministic cancellation.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Handle to a running poll loop.
///
/// Dropping the handle cancels the loop; [`PollHandle::cancel`] additionally
/// waits for the loop task to finish.
#[derive(Debug)]
pub struct PollHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    /// Stop polling. Once this returns, the callback is not running and will
    /// never be invoked again. A callback interrupted mid-flight is dropped
    /// at its current suspension point.
    pub async fn cancel(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take()
            && let Err(err) = task.await
            && err.is_panic()
        {
            crate::logging::warn(format!("poll task panicked: {err}"));
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Run `callback` immediately, then once per `interval` until cancelled.
///
/// Invocations never overlap: the next tick waits for the previous callback,
/// and ticks missed while it ran are skipped rather than replayed.
pub fn start_polling<F, Fut>(interval: Duration, mut callback: F) -> PollHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let token = CancellationToken::new();
    let cancel = token.clone();
    let period = interval.max(Duration::from_millis(1));

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = callback() => {}
            }
        }
    });

    PollHandle {
        token,
        task: Some(task),
    }
}
