//! Consent gate that must be passed before any runtime capability is used.
//!
//! The gate walks a fixed three-step sequence (welcome, privacy disclosure,
//! operating contract). The contract step collects the consent artifacts and
//! submits them to the backend as one [`ConsentRecord`]. Completion is never
//! tracked locally: a successful submission only fires the completion hook,
//! and the owner re-queries the backend for the authoritative status.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

use serde_json::json;
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::audit::log_sensitive_event;
use crate::backend::SharedBackend;
use crate::error_taxonomy;
use crate::logging;

pub const CONTRACT_VERSION: &str = "v1.0";

const CONTRACT_CLAUSES: [&str; 3] = [
    "1. Pause means Pause. Absolutely.",
    "2. No hidden training on your data.",
    "3. Full auditability of all actions.",
];

// === Status ===

/// Onboarding status as last reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnboardingStatus {
    #[default]
    Unknown,
    Incomplete,
    Complete,
}

impl OnboardingStatus {
    /// Fold a backend report into the current status.
    ///
    /// `Complete` is terminal for the session; a later `false` report does not
    /// move it back.
    #[must_use]
    pub fn observe(self, complete: bool) -> Self {
        match (self, complete) {
            (Self::Complete, _) | (_, true) => Self::Complete,
            (_, false) => Self::Incomplete,
        }
    }
}

// === Contract ===

/// Operating contract shown on the final onboarding step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contract {
    pub version: String,
    pub clauses: Vec<String>,
}

impl Contract {
    #[must_use]
    pub fn current() -> Self {
        Self {
            version: CONTRACT_VERSION.to_string(),
            clauses: CONTRACT_CLAUSES.iter().map(ToString::to_string).collect(),
        }
    }

    /// Exact text displayed to the user.
    #[must_use]
    pub fn text(&self) -> String {
        self.clauses.join("\n")
    }

    /// Content hash of [`Contract::text`], recorded for auditability.
    #[must_use]
    pub fn hash(&self) -> String {
        let digest = Sha256::digest(self.text().as_bytes());
        format!("sha256:{}", hex::encode(digest))
    }
}

// === Consent ===

/// A consent requirement of the contract step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Credential,
    EgressConsent,
    ContractAcceptance,
}

impl Requirement {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Credential => "provider API key",
            Self::EgressConsent => "network egress consent",
            Self::ContractAcceptance => "operating contract acceptance",
        }
    }
}

/// Every requirement that blocked a sign-off, in display order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct UnmetRequirements(pub Vec<Requirement>);

impl fmt::Display for UnmetRequirements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(|req| req.label()).collect();
        write!(f, "Complete: {}.", names.join(", "))
    }
}

/// Field values entered on the contract step.
#[derive(Clone, Default)]
pub struct ContractForm {
    pub contract_accepted: bool,
    pub credential: Zeroizing<String>,
    pub egress_consent: bool,
}

impl ContractForm {
    /// Requirements not yet satisfied, in display order.
    #[must_use]
    pub fn unmet(&self) -> Vec<Requirement> {
        let mut missing = Vec::new();
        if self.credential.trim().is_empty() {
            missing.push(Requirement::Credential);
        }
        if !self.egress_consent {
            missing.push(Requirement::EgressConsent);
        }
        if !self.contract_accepted {
            missing.push(Requirement::ContractAcceptance);
        }
        missing
    }

    /// Build the record submitted on sign-off.
    ///
    /// Fails with the full set of unmet requirements; a partial record is
    /// never produced.
    pub fn consent_record(
        &self,
        contract: &Contract,
        credential_id: &str,
    ) -> Result<ConsentRecord, UnmetRequirements> {
        let missing = self.unmet();
        if !missing.is_empty() {
            return Err(UnmetRequirements(missing));
        }
        Ok(ConsentRecord {
            contract_version: contract.version.clone(),
            contract_hash: contract.hash(),
            credential_id: credential_id.to_string(),
            credential_value: self.credential.clone(),
            network_egress_consent: self.egress_consent,
        })
    }
}

impl fmt::Debug for ContractForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractForm")
            .field("contract_accepted", &self.contract_accepted)
            .field("credential", &redacted(&self.credential))
            .field("egress_consent", &self.egress_consent)
            .finish()
    }
}

fn redacted(secret: &str) -> &'static str {
    if secret.is_empty() { "<empty>" } else { "<redacted>" }
}

/// Consent artifacts handed to the backend in one submission.
///
/// Only [`ContractForm::consent_record`] constructs one.
#[derive(Clone, PartialEq, Eq)]
pub struct ConsentRecord {
    contract_version: String,
    contract_hash: String,
    credential_id: String,
    credential_value: Zeroizing<String>,
    network_egress_consent: bool,
}

impl ConsentRecord {
    #[must_use]
    pub fn contract_version(&self) -> &str {
        &self.contract_version
    }

    #[must_use]
    pub fn contract_hash(&self) -> &str {
        &self.contract_hash
    }

    #[must_use]
    pub fn credential_id(&self) -> &str {
        &self.credential_id
    }

    #[must_use]
    pub fn credential_value(&self) -> &str {
        &self.credential_value
    }

    #[must_use]
    pub fn network_egress_consent(&self) -> bool {
        self.network_egress_consent
    }
}

impl fmt::Debug for ConsentRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsentRecord")
            .field("contract_version", &self.contract_version)
            .field("contract_hash", &self.contract_hash)
            .field("credential_id", &self.credential_id)
            .field("credential_value", &"<redacted>")
            .field("network_egress_consent", &self.network_egress_consent)
            .finish()
    }
}

// === Gate state machine ===

/// Screen of the onboarding sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnboardingStep {
    Welcome,
    Privacy,
    Contract,
}

impl OnboardingStep {
    pub const COUNT: usize = 3;

    /// Zero-based position in the sequence.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Welcome => 0,
            Self::Privacy => 1,
            Self::Contract => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatePhase {
    Welcome,
    Privacy,
    ContractPending,
    ContractSubmitting,
    ContractFailed { message: String },
    Completed,
}

impl GatePhase {
    #[must_use]
    pub fn step(&self) -> OnboardingStep {
        match self {
            Self::Welcome => OnboardingStep::Welcome,
            Self::Privacy => OnboardingStep::Privacy,
            _ => OnboardingStep::Contract,
        }
    }
}

#[derive(Clone)]
pub enum GateEvent {
    Advance,
    SetCredential(String),
    SetContractAccepted(bool),
    SetEgressConsent(bool),
    SignOff,
    SubmissionSucceeded,
    SubmissionFailed(String),
    /// The backend still reports onboarding incomplete after a sign-off.
    Reopen(String),
}

impl fmt::Debug for GateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Advance => f.write_str("Advance"),
            Self::SetCredential(value) => f
                .debug_tuple("SetCredential")
                .field(&redacted(value))
                .finish(),
            Self::SetContractAccepted(accepted) => f
                .debug_tuple("SetContractAccepted")
                .field(accepted)
                .finish(),
            Self::SetEgressConsent(consent) => {
                f.debug_tuple("SetEgressConsent").field(consent).finish()
            }
            Self::SignOff => f.write_str("SignOff"),
            Self::SubmissionSucceeded => f.write_str("SubmissionSucceeded"),
            Self::SubmissionFailed(message) => {
                f.debug_tuple("SubmissionFailed").field(message).finish()
            }
            Self::Reopen(message) => f.debug_tuple("Reopen").field(message).finish(),
        }
    }
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateEffect {
    Submit(ConsentRecord),
}

#[derive(Debug, Clone)]
pub struct GateState {
    pub phase: GatePhase,
    pub form: ContractForm,
    /// Local validation message from the last rejected sign-off.
    pub notice: Option<String>,
    pub contract: Contract,
    pub credential_id: String,
}

impl GateState {
    #[must_use]
    pub fn new(contract: Contract, credential_id: impl Into<String>) -> Self {
        Self {
            phase: GatePhase::Welcome,
            form: ContractForm::default(),
            notice: None,
            contract,
            credential_id: credential_id.into(),
        }
    }

    /// Message to show on the contract step, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match &self.phase {
            GatePhase::ContractFailed { message } => Some(message),
            _ => self.notice.as_deref(),
        }
    }

    fn form_editable(&self) -> bool {
        matches!(
            self.phase,
            GatePhase::ContractPending | GatePhase::ContractFailed { .. }
        )
    }
}

/// Apply `event` to `state`.
#[must_use]
pub fn update(mut state: GateState, event: GateEvent) -> (GateState, Option<GateEffect>) {
    match event {
        GateEvent::Advance => {
            state.phase = match state.phase {
                GatePhase::Welcome => GatePhase::Privacy,
                GatePhase::Privacy => GatePhase::ContractPending,
                other => other,
            };
            (state, None)
        }
        GateEvent::SetCredential(value) if state.form_editable() => {
            state.form.credential = Zeroizing::new(value);
            (state, None)
        }
        GateEvent::SetContractAccepted(value) if state.form_editable() => {
            state.form.contract_accepted = value;
            (state, None)
        }
        GateEvent::SetEgressConsent(value) if state.form_editable() => {
            state.form.egress_consent = value;
            (state, None)
        }
        GateEvent::SignOff if state.form_editable() => {
            match state
                .form
                .consent_record(&state.contract, &state.credential_id)
            {
                Ok(record) => {
                    state.notice = None;
                    state.phase = GatePhase::ContractSubmitting;
                    (state, Some(GateEffect::Submit(record)))
                }
                Err(unmet) => {
                    state.notice = Some(unmet.to_string());
                    state.phase = GatePhase::ContractPending;
                    (state, None)
                }
            }
        }
        GateEvent::SubmissionSucceeded if state.phase == GatePhase::ContractSubmitting => {
            state.phase = GatePhase::Completed;
            (state, None)
        }
        GateEvent::SubmissionFailed(error) if state.phase == GatePhase::ContractSubmitting => {
            state.phase = GatePhase::ContractFailed {
                message: format!("Failed to sign contract: {error}"),
            };
            (state, None)
        }
        GateEvent::Reopen(reason) if state.phase == GatePhase::Completed => {
            state.phase = GatePhase::ContractFailed {
                message: format!("Failed to sign contract: {reason}"),
            };
            (state, None)
        }
        _ => (state, None),
    }
}

// === Gate driver ===

/// Outcome of a sign-off attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignOff {
    /// Rejected locally; no backend call was made.
    Rejected(UnmetRequirements),
    /// The backend accepted the consent record.
    Submitted,
    /// The backend refused or could not be reached; fields are kept.
    Failed(String),
    /// Not on the contract step, or a submission is already outstanding.
    Ignored,
}

type CompletionHook = Box<dyn Fn() + Send + Sync>;

/// Onboarding gate bound to a backend.
pub struct OnboardingGate {
    backend: SharedBackend,
    state: Mutex<GateState>,
    on_complete: CompletionHook,
}

impl OnboardingGate {
    pub fn new(
        backend: SharedBackend,
        credential_id: impl Into<String>,
        on_complete: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self::with_contract(backend, Contract::current(), credential_id, on_complete)
    }

    pub fn with_contract(
        backend: SharedBackend,
        contract: Contract,
        credential_id: impl Into<String>,
        on_complete: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            backend,
            state: Mutex::new(GateState::new(contract, credential_id)),
            on_complete: Box::new(on_complete),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn dispatch(&self, event: GateEvent) -> Option<GateEffect> {
        let mut guard = self.lock();
        let current = guard.clone();
        let (next, effect) = update(current, event);
        *guard = next;
        effect
    }

    /// Snapshot of the gate state for rendering.
    #[must_use]
    pub fn snapshot(&self) -> GateState {
        self.lock().clone()
    }

    #[must_use]
    pub fn current_step(&self) -> OnboardingStep {
        self.lock().phase.step()
    }

    #[must_use]
    pub fn phase(&self) -> GatePhase {
        self.lock().phase.clone()
    }

    /// Move past an informational step.
    pub fn advance(&self) {
        self.dispatch(GateEvent::Advance);
    }

    pub fn set_credential(&self, value: impl Into<String>) {
        self.dispatch(GateEvent::SetCredential(value.into()));
    }

    pub fn set_contract_accepted(&self, accepted: bool) {
        self.dispatch(GateEvent::SetContractAccepted(accepted));
    }

    pub fn set_egress_consent(&self, consent: bool) {
        self.dispatch(GateEvent::SetEgressConsent(consent));
    }

    /// Return a completed gate to the contract step, keeping every field, when
    /// the backend has not recorded the sign-off.
    pub fn reopen(&self, reason: impl Into<String>) {
        self.dispatch(GateEvent::Reopen(reason.into()));
    }

    /// Sign the contract and submit the consent record.
    pub async fn complete(&self) -> SignOff {
        let Some(GateEffect::Submit(record)) = self.dispatch(GateEvent::SignOff) else {
            let state = self.lock();
            return match (&state.phase, state.notice.as_ref()) {
                (GatePhase::ContractPending, Some(_)) => {
                    SignOff::Rejected(UnmetRequirements(state.form.unmet()))
                }
                _ => SignOff::Ignored,
            };
        };

        logging::info(format!(
            "Submitting consent record (contract {}, key {})",
            record.contract_version(),
            record.credential_id()
        ));

        match self.backend.complete_onboarding(&record).await {
            Ok(()) => {
                self.dispatch(GateEvent::SubmissionSucceeded);
                log_sensitive_event(
                    "onboarding.completed",
                    json!({
                        "contract_version": record.contract_version(),
                        "contract_hash": record.contract_hash(),
                        "credential_id": record.credential_id(),
                        "network_egress_consent": record.network_egress_consent(),
                    }),
                );
                (self.on_complete)();
                SignOff::Submitted
            }
            Err(err) => {
                let message = error_taxonomy::report("complete_onboarding", &err);
                self.dispatch(GateEvent::SubmissionFailed(message.clone()));
                SignOff::Failed(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Call, FakeBackend};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn gate_on_contract(backend: &Arc<FakeBackend>) -> (OnboardingGate, Arc<AtomicUsize>) {
        let completions = Arc::new(AtomicUsize::new(0));
        let counter = completions.clone();
        let gate = OnboardingGate::new(backend.clone(), "gemini_api_key", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        gate.advance();
        gate.advance();
        (gate, completions)
    }

    #[test]
    fn status_never_reverses_once_complete() {
        let status = OnboardingStatus::Unknown.observe(false);
        assert_eq!(status, OnboardingStatus::Incomplete);
        let status = status.observe(true);
        assert_eq!(status, OnboardingStatus::Complete);
        assert_eq!(status.observe(false), OnboardingStatus::Complete);
    }

    #[test]
    fn contract_hash_tracks_displayed_text() {
        let contract = Contract::current();
        let hash = contract.hash();
        assert!(hash.starts_with("sha256:"));
        assert_eq!(hash.len(), "sha256:".len() + 64);

        let mut edited = contract.clone();
        edited.clauses.push("4. Extra clause.".to_string());
        assert_ne!(edited.hash(), hash);
    }

    #[test]
    fn informational_steps_advance_unconditionally() {
        let state = GateState::new(Contract::current(), "gemini_api_key");
        assert_eq!(state.phase.step(), OnboardingStep::Welcome);
        let (state, effect) = update(state, GateEvent::Advance);
        assert_eq!(state.phase, GatePhase::Privacy);
        assert!(effect.is_none());
        let (state, _) = update(state, GateEvent::Advance);
        assert_eq!(state.phase, GatePhase::ContractPending);
        assert_eq!(state.phase.step().index(), 2);
        let (state, _) = update(state, GateEvent::Advance);
        assert_eq!(state.phase, GatePhase::ContractPending);
    }

    #[test]
    fn every_unsatisfied_subset_is_reported_in_full() {
        for mask in 0u8..8 {
            let form = ContractForm {
                credential: Zeroizing::new(if mask & 1 == 0 {
                    "key".to_string()
                } else {
                    "   ".to_string()
                }),
                egress_consent: mask & 2 == 0,
                contract_accepted: mask & 4 == 0,
            };
            let mut expected = Vec::new();
            if mask & 1 != 0 {
                expected.push("provider API key");
            }
            if mask & 2 != 0 {
                expected.push("network egress consent");
            }
            if mask & 4 != 0 {
                expected.push("operating contract acceptance");
            }

            let result = form.consent_record(&Contract::current(), "gemini_api_key");
            if expected.is_empty() {
                assert!(result.is_ok());
            } else {
                let unmet = result.unwrap_err();
                assert_eq!(unmet.to_string(), format!("Complete: {}.", expected.join(", ")));
            }
        }
    }

    #[test]
    fn fields_are_frozen_while_submitting() {
        let mut state = GateState::new(Contract::current(), "gemini_api_key");
        state.phase = GatePhase::ContractSubmitting;
        let (state, _) = update(state, GateEvent::SetCredential("late".into()));
        assert!(state.form.credential.is_empty());
        let (state, effect) = update(state, GateEvent::SignOff);
        assert!(effect.is_none());
        assert_eq!(state.phase, GatePhase::ContractSubmitting);
    }

    #[test]
    fn reopen_returns_completed_gate_to_contract_with_fields() {
        let mut state = GateState::new(Contract::current(), "gemini_api_key");
        state.form.credential = Zeroizing::new("AIza-kept".to_string());
        state.form.egress_consent = true;

        let (state, _) = update(state, GateEvent::Reopen("not recorded".into()));
        assert_eq!(state.phase, GatePhase::Welcome);

        let mut state = state;
        state.phase = GatePhase::Completed;
        let (state, effect) = update(state, GateEvent::Reopen("not recorded".into()));
        assert!(effect.is_none());
        assert_eq!(state.message(), Some("Failed to sign contract: not recorded"));
        assert_eq!(state.phase.step(), OnboardingStep::Contract);
        assert_eq!(state.form.credential.as_str(), "AIza-kept");
        assert!(state.form.egress_consent);
    }

    #[tokio::test]
    async fn missing_requirements_make_no_backend_calls() {
        let backend = Arc::new(FakeBackend::default());
        for mask in 1u8..8 {
            let (gate, completions) = gate_on_contract(&backend);
            gate.set_credential(if mask & 1 == 0 { "key" } else { "" });
            gate.set_egress_consent(mask & 2 == 0);
            gate.set_contract_accepted(mask & 4 == 0);

            let outcome = gate.complete().await;
            assert!(matches!(outcome, SignOff::Rejected(_)));
            assert_eq!(gate.phase(), GatePhase::ContractPending);
            assert_eq!(completions.load(Ordering::SeqCst), 0);
        }
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn empty_credential_is_the_only_named_requirement() {
        let backend = Arc::new(FakeBackend::default());
        let (gate, _) = gate_on_contract(&backend);
        gate.set_egress_consent(true);
        gate.set_contract_accepted(true);

        let outcome = gate.complete().await;
        assert_eq!(
            outcome,
            SignOff::Rejected(UnmetRequirements(vec![Requirement::Credential]))
        );
        assert_eq!(
            gate.snapshot().message(),
            Some("Complete: provider API key.")
        );
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn complete_record_is_submitted_once_verbatim() {
        let backend = Arc::new(FakeBackend::default());
        let (gate, completions) = gate_on_contract(&backend);
        gate.set_credential("AIza-secret");
        gate.set_egress_consent(true);
        gate.set_contract_accepted(true);

        assert_eq!(gate.complete().await, SignOff::Submitted);
        assert_eq!(gate.phase(), GatePhase::Completed);
        assert_eq!(completions.load(Ordering::SeqCst), 1);

        let contract = Contract::current();
        assert_eq!(
            backend.calls(),
            vec![Call::CompleteOnboarding {
                contract_version: "v1.0".to_string(),
                contract_hash: contract.hash(),
                credential_id: "gemini_api_key".to_string(),
                credential_value: "AIza-secret".to_string(),
                network_egress_consent: true,
            }]
        );

        assert_eq!(gate.complete().await, SignOff::Ignored);
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn backend_failure_keeps_fields_and_allows_retry() {
        let backend = Arc::new(FakeBackend::default());
        backend.fail_next_onboarding("keychain write failed");
        let (gate, completions) = gate_on_contract(&backend);
        gate.set_credential("AIza-secret");
        gate.set_egress_consent(true);
        gate.set_contract_accepted(true);

        let outcome = gate.complete().await;
        assert_eq!(outcome, SignOff::Failed("keychain write failed".to_string()));
        let snapshot = gate.snapshot();
        assert_eq!(
            snapshot.message(),
            Some("Failed to sign contract: keychain write failed")
        );
        assert_eq!(snapshot.form.credential.as_str(), "AIza-secret");
        assert!(snapshot.form.egress_consent);
        assert!(snapshot.form.contract_accepted);
        assert_eq!(gate.current_step(), OnboardingStep::Contract);
        assert_eq!(completions.load(Ordering::SeqCst), 0);

        assert_eq!(gate.complete().await, SignOff::Submitted);
        assert_eq!(completions.load(Ordering::SeqCst), 1);
        assert_eq!(backend.calls().len(), 2);
    }

    #[test]
    fn consent_record_debug_redacts_secret() {
        let form = ContractForm {
            contract_accepted: true,
            credential: Zeroizing::new("AIza-secret".to_string()),
            egress_consent: true,
        };
        let record = form
            .consent_record(&Contract::current(), "gemini_api_key")
            .unwrap();
        let debug = format!("{record:?}");
        assert!(!debug.contains("AIza-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn form_state_and_events_debug_redact_secret() {
        let mut state = GateState::new(Contract::current(), "gemini_api_key");
        assert!(format!("{:?}", state.form).contains("<empty>"));

        state.form.credential = Zeroizing::new("AIza-secret".to_string());
        let event = GateEvent::SetCredential("AIza-secret".to_string());

        for debug in [
            format!("{:?}", state.form),
            format!("{state:?}"),
            format!("{event:?}"),
        ] {
            assert!(!debug.contains("AIza-secret"), "{debug}");
            assert!(debug.contains("<redacted>"), "{debug}");
        }
        assert_eq!(
            format!("{:?}", GateEvent::SetEgressConsent(true)),
            "SetEgressConsent(true)"
        );
    }
}
