//! Provider settings panel: credential storage, model overrides, keychain
//! diagnostics and per-provider resets.
//!
//! Every operation reports through a single status message, mirroring how the
//! panel shows one line of feedback beneath its controls.

use zeroize::Zeroizing;

use crate::backend::{Provider, SharedBackend};
use crate::error_taxonomy::{self, ErrorEnvelope};
use crate::logging;

pub const KEY_SAVED: &str = "Key saved successfully.";
pub const MODEL_UPDATED: &str = "Model updated.";
pub const EMPTY_KEY: &str = "Enter an API key before saving.";
pub const EMPTY_MODEL: &str = "Enter a model id before updating.";

/// Mutable state of the settings panel.
pub struct ProviderSettings {
    backend: SharedBackend,
    provider: Provider,
    credential: Zeroizing<String>,
    model: String,
    message: Option<String>,
}

impl ProviderSettings {
    #[must_use]
    pub fn new(backend: SharedBackend, provider: Provider) -> Self {
        Self {
            backend,
            provider,
            credential: Zeroizing::new(String::new()),
            model: String::new(),
            message: None,
        }
    }

    #[must_use]
    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn select_provider(&mut self, provider: Provider) {
        self.provider = provider;
    }

    pub fn set_credential(&mut self, value: impl Into<String>) {
        self.credential = Zeroizing::new(value.into());
    }

    pub fn set_model(&mut self, value: impl Into<String>) {
        self.model = value.into();
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    fn reject_locally(&mut self, message: &str) {
        let envelope = ErrorEnvelope::invalid_input(message);
        logging::debug(format!("settings [{}]: {}", envelope.code, envelope.message));
        self.message = Some(envelope.message);
    }

    /// Store the entered key in the runtime keychain for the selected provider.
    pub async fn save_credential(&mut self) {
        let key = self.credential.trim();
        if key.is_empty() {
            self.reject_locally(EMPTY_KEY);
            return;
        }
        let result = self
            .backend
            .save_provider_credential(self.provider, key)
            .await;
        self.message = Some(match result {
            Ok(()) => {
                self.credential = Zeroizing::new(String::new());
                KEY_SAVED.to_string()
            }
            Err(err) => error_taxonomy::report("save_provider_credential", &err),
        });
    }

    pub async fn update_model(&mut self) {
        let model = self.model.trim().to_string();
        if model.is_empty() {
            self.reject_locally(EMPTY_MODEL);
            return;
        }
        let result = self
            .backend
            .update_provider_model(self.provider, &model)
            .await;
        self.message = Some(match result {
            Ok(()) => MODEL_UPDATED.to_string(),
            Err(err) => error_taxonomy::report("update_provider_model", &err),
        });
    }

    pub async fn test_keychain(&mut self) {
        self.message = Some(match self.backend.test_credential_storage().await {
            Ok(result) => format!("Keychain test: {result}"),
            Err(err) => format!(
                "Keychain test failed: {}",
                error_taxonomy::report("test_credential_storage", &err)
            ),
        });
    }

    pub async fn reset(&mut self) {
        self.message = Some(match self.backend.reset_provider_config(self.provider).await {
            Ok(result) => result,
            Err(err) => format!(
                "Reset failed: {}",
                error_taxonomy::report("reset_provider_config", &err)
            ),
        });
    }
}
