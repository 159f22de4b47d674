//! Shared test-only helpers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};

use crate::backend::{Backend, BackendError, BackendResult, Provider, RuntimeState, UsageStats};
use crate::onboarding::ConsentRecord;

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

/// Acquire the process-wide env-var mutex.
///
/// If a prior test panicked while holding the lock, recover the guard instead
/// of cascading failures across unrelated tests.
pub(crate) fn lock_test_env() -> MutexGuard<'static, ()> {
    lock(env_lock())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// A command observed by [`FakeBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    OnboardingStatus,
    StartRuntime,
    CompleteOnboarding {
        contract_version: String,
        contract_hash: String,
        credential_id: String,
        credential_value: String,
        network_egress_consent: bool,
    },
    RuntimeState,
    PauseRuntime,
    ResumeRuntime,
    SubmitPrompt(String),
    SaveCredential {
        provider: Provider,
        credential: String,
    },
    UpdateModel {
        provider: Provider,
        model: String,
    },
    TestCredentialStorage,
    ResetProvider(Provider),
    UsageStats(u32),
    TotalCost(u32),
}

/// Scriptable in-memory backend that records every call.
#[derive(Default)]
pub(crate) struct FakeBackend {
    calls: Mutex<Vec<Call>>,
    onboarding_complete: AtomicBool,
    status_error: Mutex<Option<BackendError>>,
    onboarding_failures: Mutex<VecDeque<String>>,
    discard_consent: AtomicBool,
    start_error: Mutex<Option<BackendError>>,
    runtime: Mutex<RuntimeState>,
    state_error: Mutex<Option<BackendError>>,
    state_delay: Mutex<Option<Duration>>,
    active_state_queries: AtomicUsize,
    peak_state_queries: AtomicUsize,
    ignore_transitions: AtomicBool,
    prompt_replies: Mutex<VecDeque<BackendResult<String>>>,
    prompt_gate: Mutex<Option<Arc<Semaphore>>>,
    prompt_started: Notify,
    settings_error: Mutex<Option<BackendError>>,
    usage: Mutex<Vec<UsageStats>>,
    cost: Mutex<f64>,
    usage_error: Mutex<Option<BackendError>>,
}

impl FakeBackend {
    pub(crate) fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    pub(crate) fn count(&self, call: &Call) -> usize {
        lock(&self.calls).iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: Call) {
        lock(&self.calls).push(call);
    }

    pub(crate) fn set_onboarding_complete(&self, complete: bool) {
        self.onboarding_complete.store(complete, Ordering::SeqCst);
    }

    pub(crate) fn fail_onboarding_status(&self, error: BackendError) {
        *lock(&self.status_error) = Some(error);
    }

    pub(crate) fn clear_onboarding_status_error(&self) {
        *lock(&self.status_error) = None;
    }

    pub(crate) fn fail_next_onboarding(&self, message: &str) {
        lock(&self.onboarding_failures).push_back(message.to_string());
    }

    /// Accept consent submissions without recording onboarding as complete.
    pub(crate) fn discard_consent(&self) {
        self.discard_consent.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_start(&self, error: BackendError) {
        *lock(&self.start_error) = Some(error);
    }

    pub(crate) fn set_runtime_state(&self, state: RuntimeState) {
        *lock(&self.runtime) = state;
    }

    pub(crate) fn fail_state_queries(&self, error: Option<BackendError>) {
        *lock(&self.state_error) = error;
    }

    pub(crate) fn delay_state_queries(&self, delay: Duration) {
        *lock(&self.state_delay) = Some(delay);
    }

    /// Highest number of state queries observed in flight at once.
    pub(crate) fn peak_state_queries(&self) -> usize {
        self.peak_state_queries.load(Ordering::SeqCst)
    }

    /// Accept pause/resume without changing the reported state.
    pub(crate) fn ignore_transitions(&self) {
        self.ignore_transitions.store(true, Ordering::SeqCst);
    }

    pub(crate) fn reply(&self, reply: BackendResult<String>) {
        lock(&self.prompt_replies).push_back(reply);
    }

    /// Block prompt submissions until [`FakeBackend::release_prompts`].
    pub(crate) fn hold_prompts(&self) {
        *lock(&self.prompt_gate) = Some(Arc::new(Semaphore::new(0)));
    }

    pub(crate) fn release_prompts(&self, count: usize) {
        if let Some(gate) = lock(&self.prompt_gate).as_ref() {
            gate.add_permits(count);
        }
    }

    pub(crate) async fn prompt_started(&self) {
        self.prompt_started.notified().await;
    }

    pub(crate) fn fail_settings(&self, error: BackendError) {
        *lock(&self.settings_error) = Some(error);
    }

    pub(crate) fn set_usage(&self, stats: Vec<UsageStats>, cost: f64) {
        *lock(&self.usage) = stats;
        *lock(&self.cost) = cost;
    }

    pub(crate) fn fail_usage(&self, error: Option<BackendError>) {
        *lock(&self.usage_error) = error;
    }

    fn settings_result(&self) -> BackendResult<()> {
        match lock(&self.settings_error).clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn transition(&self, from: RuntimeState, to: RuntimeState, verb: &str) -> BackendResult<()> {
        let mut runtime = lock(&self.runtime);
        if *runtime != from {
            return Err(BackendError::rejected(format!(
                "Invalid transition: cannot {verb} while {runtime}"
            )));
        }
        if !self.ignore_transitions.load(Ordering::SeqCst) {
            *runtime = to;
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn onboarding_status(&self) -> BackendResult<bool> {
        self.record(Call::OnboardingStatus);
        if let Some(err) = lock(&self.status_error).clone() {
            return Err(err);
        }
        Ok(self.onboarding_complete.load(Ordering::SeqCst))
    }

    async fn start_runtime(&self) -> BackendResult<()> {
        self.record(Call::StartRuntime);
        if let Some(err) = lock(&self.start_error).clone() {
            return Err(err);
        }
        let mut runtime = lock(&self.runtime);
        if *runtime == RuntimeState::Unknown {
            *runtime = RuntimeState::Running;
        }
        Ok(())
    }

    async fn complete_onboarding(&self, record: &ConsentRecord) -> BackendResult<()> {
        self.record(Call::CompleteOnboarding {
            contract_version: record.contract_version().to_string(),
            contract_hash: record.contract_hash().to_string(),
            credential_id: record.credential_id().to_string(),
            credential_value: record.credential_value().to_string(),
            network_egress_consent: record.network_egress_consent(),
        });
        if let Some(message) = lock(&self.onboarding_failures).pop_front() {
            return Err(BackendError::rejected(message));
        }
        if !self.discard_consent.load(Ordering::SeqCst) {
            self.set_onboarding_complete(true);
        }
        Ok(())
    }

    async fn runtime_state(&self) -> BackendResult<RuntimeState> {
        self.record(Call::RuntimeState);
        let active = self.active_state_queries.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_state_queries.fetch_max(active, Ordering::SeqCst);

        let delay = *lock(&self.state_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.active_state_queries.fetch_sub(1, Ordering::SeqCst);
        if let Some(err) = lock(&self.state_error).clone() {
            return Err(err);
        }
        Ok(lock(&self.runtime).clone())
    }

    async fn pause_runtime(&self) -> BackendResult<()> {
        self.record(Call::PauseRuntime);
        self.transition(RuntimeState::Running, RuntimeState::Paused, "pause")
    }

    async fn resume_runtime(&self) -> BackendResult<()> {
        self.record(Call::ResumeRuntime);
        self.transition(RuntimeState::Paused, RuntimeState::Running, "resume")
    }

    async fn submit_prompt(&self, prompt: &str) -> BackendResult<String> {
        self.record(Call::SubmitPrompt(prompt.to_string()));
        self.prompt_started.notify_one();

        let gate = lock(&self.prompt_gate).clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        lock(&self.prompt_replies)
            .pop_front()
            .unwrap_or_else(|| Ok(format!("echo: {prompt}")))
    }

    async fn save_provider_credential(
        &self,
        provider: Provider,
        credential: &str,
    ) -> BackendResult<()> {
        self.record(Call::SaveCredential {
            provider,
            credential: credential.to_string(),
        });
        self.settings_result()
    }

    async fn update_provider_model(&self, provider: Provider, model: &str) -> BackendResult<()> {
        self.record(Call::UpdateModel {
            provider,
            model: model.to_string(),
        });
        self.settings_result()
    }

    async fn test_credential_storage(&self) -> BackendResult<String> {
        self.record(Call::TestCredentialStorage);
        self.settings_result()
            .map(|()| "Gemini key found: AIza-test...".to_string())
    }

    async fn reset_provider_config(&self, provider: Provider) -> BackendResult<String> {
        self.record(Call::ResetProvider(provider));
        self.settings_result()
            .map(|()| format!("Reset {provider} to model: default"))
    }

    async fn usage_stats(&self, days: u32) -> BackendResult<Vec<UsageStats>> {
        self.record(Call::UsageStats(days));
        if let Some(err) = lock(&self.usage_error).clone() {
            return Err(err);
        }
        Ok(lock(&self.usage).clone())
    }

    async fn total_cost(&self, days: u32) -> BackendResult<f64> {
        self.record(Call::TotalCost(days));
        if let Some(err) = lock(&self.usage_error).clone() {
            return Err(err);
        }
        Ok(*lock(&self.cost))
    }
}
