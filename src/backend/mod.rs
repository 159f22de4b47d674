//! Command interface to the privileged runtime backend.
//!
//! Every capability the shell exposes is a request/response call through the
//! [`Backend`] trait. Components never assume partial or streamed responses.

pub mod http;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::onboarding::ConsentRecord;

pub use http::HttpBackend;

/// Result of a single backend command.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Backend handle shared by every component of the shell.
pub type SharedBackend = Arc<dyn Backend>;

/// Failure of a backend command.
///
/// `Display` yields the text shown to the user; for [`BackendError::Rejected`]
/// that is the backend's own message, verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("runtime unreachable: {0}")]
    Unreachable(String),
    #[error("{message}")]
    Rejected {
        status: Option<u16>,
        message: String,
    },
    #[error("malformed runtime response: {0}")]
    Decode(String),
}

impl BackendError {
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            status: None,
            message: message.into(),
        }
    }

    /// True when the backend refused the command because the target is already
    /// in the requested state.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Rejected { status: Some(409), .. })
    }
}

/// Run state of the backend runtime as last reported by the backend.
///
/// Labels other than `Running` and `Paused` are carried through untouched so
/// display logic can show whatever the backend reports.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RuntimeState {
    #[default]
    Unknown,
    Running,
    Paused,
    Other(String),
}

impl RuntimeState {
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "" | "Unknown" => Self::Unknown,
            "Running" => Self::Running,
            "Paused" => Self::Paused,
            other => Self::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Unknown => "Unknown",
            Self::Running => "Running",
            Self::Paused => "Paused",
            Self::Other(label) => label,
        }
    }
}

impl fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Model providers the runtime can route prompts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Gemini,
    OpenAi,
    Anthropic,
    DeepSeek,
    OpenRouter,
}

impl Provider {
    pub const ALL: [Provider; 5] = [
        Provider::Gemini,
        Provider::OpenAi,
        Provider::Anthropic,
        Provider::DeepSeek,
        Provider::OpenRouter,
    ];

    /// Identifier used on the wire and in config files.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::DeepSeek => "deepseek",
            Self::OpenRouter => "openrouter",
        }
    }

    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Gemini => "Gemini",
            Self::OpenAi => "OpenAI",
            Self::Anthropic => "Anthropic",
            Self::DeepSeek => "DeepSeek",
            Self::OpenRouter => "OpenRouter",
        }
    }

    /// Keychain identifier the runtime stores this provider's key under.
    #[must_use]
    pub fn credential_id(self) -> String {
        format!("{}_api_key", self.as_str())
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown provider '{0}'. Expected: gemini, openai, anthropic, deepseek, openrouter.")]
pub struct UnknownProvider(pub String);

impl FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "deepseek" => Ok(Self::DeepSeek),
            "openrouter" => Ok(Self::OpenRouter),
            _ => Err(UnknownProvider(value.to_string())),
        }
    }
}

/// Per-provider usage aggregate over a lookback window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    pub provider: String,
    pub total_requests: i64,
    pub total_tokens: i64,
    pub total_cost_usd: f64,
    pub period_start: String,
    pub period_end: String,
}

/// Commands the backend runtime accepts.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn onboarding_status(&self) -> BackendResult<bool>;

    async fn start_runtime(&self) -> BackendResult<()>;

    async fn complete_onboarding(&self, record: &ConsentRecord) -> BackendResult<()>;

    async fn runtime_state(&self) -> BackendResult<RuntimeState>;

    async fn pause_runtime(&self) -> BackendResult<()>;

    async fn resume_runtime(&self) -> BackendResult<()>;

    async fn submit_prompt(&self, prompt: &str) -> BackendResult<String>;

    async fn save_provider_credential(
        &self,
        provider: Provider,
        credential: &str,
    ) -> BackendResult<()>;

    async fn update_provider_model(&self, provider: Provider, model: &str) -> BackendResult<()>;

    async fn test_credential_storage(&self) -> BackendResult<String>;

    async fn reset_provider_config(&self, provider: Provider) -> BackendResult<String>;

    async fn usage_stats(&self, days: u32) -> BackendResult<Vec<UsageStats>>;

    async fn total_cost(&self, days: u32) -> BackendResult<f64>;
}
