//! Top-level view routing: onboarding until the backend reports consent,
//! then the supervised main view.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::backend::{Provider, SharedBackend};
use crate::chat::PromptChannel;
use crate::config::Config;
use crate::error_taxonomy;
use crate::logging;
use crate::onboarding::{OnboardingGate, OnboardingStatus};
use crate::settings::ProviderSettings;
use crate::supervisor::RuntimeSupervisor;
use crate::usage::{LookbackWindow, UsageDashboard};

/// Knobs the shell passes down to the views it builds.
#[derive(Debug, Clone, Copy)]
pub struct ShellOptions {
    pub poll_interval: Duration,
    pub default_provider: Provider,
    pub usage_window: LookbackWindow,
}

impl Default for ShellOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            default_provider: Provider::default(),
            usage_window: LookbackWindow::default(),
        }
    }
}

impl From<&Config> for ShellOptions {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            default_provider: config.default_provider(),
            usage_window: config.usage_window(),
        }
    }
}

/// Components shown once onboarding is complete. The supervisor and the
/// prompt channel run independently of each other.
pub struct MainView {
    pub supervisor: RuntimeSupervisor,
    pub channel: PromptChannel,
    pub settings: ProviderSettings,
    pub usage: UsageDashboard,
}

impl MainView {
    /// Stop runtime polling before the view goes away.
    pub async fn shutdown(self) {
        self.supervisor.unmount().await;
    }
}

pub enum ShellView {
    /// Status not known yet; `error` carries the failed status query.
    Loading { error: Option<String> },
    Onboarding(OnboardingGate),
    Main(MainView),
}

impl ShellView {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Loading { .. } => "loading",
            Self::Onboarding(_) => "onboarding",
            Self::Main(_) => "main",
        }
    }
}

/// Shown on the contract step when a sign-off was accepted but the backend
/// still reports onboarding incomplete.
pub const NOT_RECORDED_MESSAGE: &str = "runtime has not recorded the sign-off; please sign again";

pub struct AppShell {
    backend: SharedBackend,
    options: ShellOptions,
    status: OnboardingStatus,
    onboarding_done: Arc<Notify>,
    // Gate from a previous onboarding view, reused so entered fields survive.
    gate: Option<OnboardingGate>,
}

impl AppShell {
    #[must_use]
    pub fn new(backend: SharedBackend, options: ShellOptions) -> Self {
        Self {
            backend,
            options,
            status: OnboardingStatus::Unknown,
            onboarding_done: Arc::new(Notify::new()),
            gate: None,
        }
    }

    #[must_use]
    pub fn status(&self) -> OnboardingStatus {
        self.status
    }

    /// Ask the backend whether onboarding is complete and build the matching
    /// view. Entering the main view also starts the runtime.
    pub async fn bootstrap(&mut self) -> ShellView {
        let previous = self.gate.take();
        match self.backend.onboarding_status().await {
            Ok(complete) => self.status = self.status.observe(complete),
            Err(err) => {
                let message = error_taxonomy::report("onboarding_status", &err);
                self.gate = previous;
                return ShellView::Loading {
                    error: Some(message),
                };
            }
        }

        match self.status {
            OnboardingStatus::Complete => {
                self.start_runtime().await;
                ShellView::Main(self.main_view())
            }
            OnboardingStatus::Incomplete => {
                let gate = match previous {
                    Some(gate) => {
                        gate.reopen(NOT_RECORDED_MESSAGE);
                        gate
                    }
                    None => self.onboarding_gate(),
                };
                ShellView::Onboarding(gate)
            }
            OnboardingStatus::Unknown => {
                self.gate = previous;
                ShellView::Loading { error: None }
            }
        }
    }

    /// Wait for the onboarding gate's completion hook, then re-derive the
    /// view from the backend. If onboarding is still incomplete the same gate
    /// comes back with its fields intact.
    pub async fn resume_after_onboarding(&mut self, gate: OnboardingGate) -> ShellView {
        self.onboarding_done.notified().await;
        self.gate = Some(gate);
        logging::info("Onboarding signed; re-checking status");
        self.bootstrap().await
    }

    fn onboarding_gate(&self) -> OnboardingGate {
        let done = Arc::clone(&self.onboarding_done);
        OnboardingGate::new(
            Arc::clone(&self.backend),
            Provider::Gemini.credential_id(),
            move || done.notify_one(),
        )
    }

    fn main_view(&self) -> MainView {
        MainView {
            supervisor: RuntimeSupervisor::mount(
                Arc::clone(&self.backend),
                self.options.poll_interval,
            ),
            channel: PromptChannel::new(Arc::clone(&self.backend)),
            settings: ProviderSettings::new(
                Arc::clone(&self.backend),
                self.options.default_provider,
            ),
            usage: UsageDashboard::new(Arc::clone(&self.backend), self.options.usage_window),
        }
    }

    /// Start the runtime, treating "already running" as success. Other
    /// failures are logged and the main view is shown regardless.
    async fn start_runtime(&self) {
        match self.backend.start_runtime().await {
            Ok(()) => logging::info("Runtime started"),
            Err(err) if err.is_conflict() => logging::debug("Runtime already running"),
            Err(err) => {
                error_taxonomy::report("start_runtime", &err);
            }
        }
    }
}
