//! Runtime supervision: keeps a cached copy of the backend run state in sync
//! and issues user-requested pause/resume transitions.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio_util::sync::CancellationToken;

use crate::audit::log_sensitive_event;
use crate::backend::{BackendResult, RuntimeState, SharedBackend};
use crate::error_taxonomy;
use crate::logging;
use crate::scheduler::{PollHandle, start_polling};

pub const UNMOUNTED_MESSAGE: &str = "Runtime supervisor is unmounted.";

/// Transition command issued by [`RuntimeSupervisor::toggle_pause`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleCommand {
    Pause,
    Resume,
}

impl ToggleCommand {
    /// Pause only a runtime known to be running; anything else is resumed,
    /// including a state that has not been observed yet.
    #[must_use]
    pub fn for_state(state: &RuntimeState) -> Self {
        if *state == RuntimeState::Running {
            Self::Pause
        } else {
            Self::Resume
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Pause => "pause",
            Self::Resume => "resume",
        }
    }

    fn operation(self) -> &'static str {
        match self {
            Self::Pause => "pause_runtime",
            Self::Resume => "resume_runtime",
        }
    }
}

/// Result of a toggle: the command sent, its failure text if any, and the
/// state the backend reported afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub command: ToggleCommand,
    pub error: Option<String>,
    pub state: RuntimeState,
}

/// Fold a state query result into the cached state. Failures keep the last
/// known value.
#[must_use]
pub fn reconcile(current: &RuntimeState, result: &BackendResult<RuntimeState>) -> RuntimeState {
    match result {
        Ok(reported) => reported.clone(),
        Err(_) => current.clone(),
    }
}

struct Inner {
    backend: SharedBackend,
    state: watch::Sender<RuntimeState>,
    // Held for the duration of every state query.
    query_gate: AsyncMutex<()>,
    unmounted: CancellationToken,
}

impl Inner {
    async fn poll_tick(&self) {
        let Ok(_gate) = self.query_gate.try_lock() else {
            logging::debug("state query already pending; skipping tick");
            return;
        };
        self.query_locked().await;
    }

    async fn refresh(&self) -> RuntimeState {
        let _gate = self.query_gate.lock().await;
        // Unmount may land while waiting on the gate.
        if self.unmounted.is_cancelled() {
            return self.state.borrow().clone();
        }
        self.query_locked().await
    }

    async fn query_locked(&self) -> RuntimeState {
        let result = self.backend.runtime_state().await;
        if let Err(err) = &result {
            error_taxonomy::report("runtime_state", err);
        }
        if self.unmounted.is_cancelled() {
            return self.state.borrow().clone();
        }
        let next = reconcile(&self.state.borrow(), &result);
        self.state.send_if_modified(|cached| {
            if *cached == next {
                false
            } else {
                logging::debug(format!("runtime state {cached} -> {next}"));
                *cached = next.clone();
                true
            }
        });
        next
    }
}

/// Polls the backend run state while mounted and exposes a pause toggle.
pub struct RuntimeSupervisor {
    inner: Arc<Inner>,
    poll: Mutex<Option<PollHandle>>,
}

impl RuntimeSupervisor {
    /// Start supervising: one state query now, then one per `interval`.
    #[must_use]
    pub fn mount(backend: SharedBackend, interval: Duration) -> Self {
        let (state, _) = watch::channel(RuntimeState::Unknown);
        let inner = Arc::new(Inner {
            backend,
            state,
            query_gate: AsyncMutex::new(()),
            unmounted: CancellationToken::new(),
        });

        let poller = Arc::clone(&inner);
        let handle = start_polling(interval, move || {
            let inner = Arc::clone(&poller);
            async move { inner.poll_tick().await }
        });

        Self {
            inner,
            poll: Mutex::new(Some(handle)),
        }
    }

    /// Last state the backend reported.
    #[must_use]
    pub fn state(&self) -> RuntimeState {
        self.inner.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RuntimeState> {
        self.inner.state.subscribe()
    }

    /// Query the backend now, waiting behind any query already in flight.
    /// Once unmounted this returns the cached state without a query.
    pub async fn refresh(&self) -> RuntimeState {
        self.inner.refresh().await
    }

    /// Pause a running runtime or resume anything else, then re-query the
    /// backend for the resulting state.
    ///
    /// An unmounted supervisor sends nothing and reports [`UNMOUNTED_MESSAGE`].
    pub async fn toggle_pause(&self) -> ToggleOutcome {
        let from = self.state();
        let command = ToggleCommand::for_state(&from);
        if !self.is_mounted() {
            logging::debug(format!("Ignoring runtime {} after unmount", command.label()));
            return ToggleOutcome {
                command,
                error: Some(UNMOUNTED_MESSAGE.to_string()),
                state: from,
            };
        }
        logging::info(format!("Requesting runtime {} (was {from})", command.label()));

        let result = match command {
            ToggleCommand::Pause => self.inner.backend.pause_runtime().await,
            ToggleCommand::Resume => self.inner.backend.resume_runtime().await,
        };
        let error = result
            .err()
            .map(|err| error_taxonomy::report(command.operation(), &err));
        log_sensitive_event(
            &format!("runtime.{}", command.label()),
            json!({
                "from": from.label(),
                "accepted": error.is_none(),
            }),
        );

        let state = self.refresh().await;
        // Torn down mid-toggle: the cached state is not a confirmed read.
        let error = match error {
            None if !self.is_mounted() => Some(UNMOUNTED_MESSAGE.to_string()),
            other => other,
        };
        ToggleOutcome {
            command,
            error,
            state,
        }
    }

    /// Stop polling. No state update is applied after this returns, including
    /// from a query that was already in flight.
    pub async fn unmount(&self) {
        self.inner.unmounted.cancel();
        let handle = match self.poll.lock() {
            Ok(mut poll) => poll.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.cancel().await;
        }
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        !self.inner.unmounted.is_cancelled()
    }
}

impl Drop for RuntimeSupervisor {
    fn drop(&mut self) {
        self.inner.unmounted.cancel();
    }
}
