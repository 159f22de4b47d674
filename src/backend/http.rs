//! JSON-over-HTTP adapter for the local runtime service.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{Backend, BackendError, BackendResult, Provider, RuntimeState, UsageStats};
use crate::config::Config;
use crate::logging;
use crate::onboarding::ConsentRecord;

// === Wire types ===

#[derive(Debug, Deserialize)]
struct OnboardingStatusResponse {
    complete: bool,
}

#[derive(Debug, Deserialize)]
struct RuntimeStateResponse {
    state: String,
}

#[derive(Debug, Deserialize)]
struct PromptResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct DiagnosticResponse {
    message: String,
}

#[derive(Debug, Deserialize)]
struct UsageResponse {
    stats: Vec<UsageStats>,
}

#[derive(Debug, Deserialize)]
struct CostResponse {
    total_cost_usd: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConsentPayload<'a> {
    contract_version: &'a str,
    contract_hash: &'a str,
    credential_id: &'a str,
    credential_value: &'a str,
    network_egress_consent: bool,
}

impl<'a> From<&'a ConsentRecord> for ConsentPayload<'a> {
    fn from(record: &'a ConsentRecord) -> Self {
        Self {
            contract_version: record.contract_version(),
            contract_hash: record.contract_hash(),
            credential_id: record.credential_id(),
            credential_value: record.credential_value(),
            network_egress_consent: record.network_egress_consent(),
        }
    }
}

// === HttpBackend ===

/// Backend that talks to the runtime's local HTTP API.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    /// Create a backend client from resolved configuration.
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = config.runtime_url();
        let timeout = config.request_timeout();
        logging::info(format!("Runtime base URL: {base_url}"));
        logging::debug(format!("Runtime request timeout: {}s", timeout.as_secs()));
        Self::with_base_url(base_url, timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(&self, request: RequestBuilder) -> BackendResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|err| BackendError::Unreachable(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(BackendError::Rejected {
            status: Some(status.as_u16()),
            message: error_message(&body, status),
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> BackendResult<T> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|err| BackendError::Decode(err.to_string()))
    }

    async fn send_empty(&self, request: RequestBuilder) -> BackendResult<()> {
        self.send(request).await.map(|_| ())
    }
}

/// Extract the user-facing message from an error body.
///
/// The runtime answers with `{"error": {"message": ..}}`; anything else is
/// shown as-is.
fn error_message(body: &str, status: StatusCode) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(message) = value.pointer("/error/message").and_then(Value::as_str) {
            return message.to_string();
        }
        if let Some(message) = value.get("error").and_then(Value::as_str) {
            return message.to_string();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {status}")
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn onboarding_status(&self) -> BackendResult<bool> {
        let response: OnboardingStatusResponse = self
            .send_json(self.http_client.get(self.url("/v1/onboarding/status")))
            .await?;
        Ok(response.complete)
    }

    async fn start_runtime(&self) -> BackendResult<()> {
        self.send_empty(self.http_client.post(self.url("/v1/runtime/start")))
            .await
    }

    async fn complete_onboarding(&self, record: &ConsentRecord) -> BackendResult<()> {
        let payload = ConsentPayload::from(record);
        self.send_empty(
            self.http_client
                .post(self.url("/v1/onboarding/complete"))
                .json(&payload),
        )
        .await
    }

    async fn runtime_state(&self) -> BackendResult<RuntimeState> {
        let response: RuntimeStateResponse = self
            .send_json(self.http_client.get(self.url("/v1/runtime/state")))
            .await?;
        Ok(RuntimeState::from_label(&response.state))
    }

    async fn pause_runtime(&self) -> BackendResult<()> {
        self.send_empty(self.http_client.post(self.url("/v1/runtime/pause")))
            .await
    }

    async fn resume_runtime(&self) -> BackendResult<()> {
        self.send_empty(self.http_client.post(self.url("/v1/runtime/resume")))
            .await
    }

    async fn submit_prompt(&self, prompt: &str) -> BackendResult<String> {
        let response: PromptResponse = self
            .send_json(
                self.http_client
                    .post(self.url("/v1/prompt"))
                    .json(&json!({ "prompt": prompt })),
            )
            .await?;
        Ok(response.response)
    }

    async fn save_provider_credential(
        &self,
        provider: Provider,
        credential: &str,
    ) -> BackendResult<()> {
        let path = format!("/v1/providers/{}/credential", provider.as_str());
        self.send_empty(
            self.http_client
                .put(self.url(&path))
                .json(&json!({ "value": credential })),
        )
        .await
    }

    async fn update_provider_model(&self, provider: Provider, model: &str) -> BackendResult<()> {
        let path = format!("/v1/providers/{}/model", provider.as_str());
        self.send_empty(
            self.http_client
                .put(self.url(&path))
                .json(&json!({ "model": model })),
        )
        .await
    }

    async fn test_credential_storage(&self) -> BackendResult<String> {
        let response: DiagnosticResponse = self
            .send_json(self.http_client.post(self.url("/v1/credentials/test")))
            .await?;
        Ok(response.message)
    }

    async fn reset_provider_config(&self, provider: Provider) -> BackendResult<String> {
        let path = format!("/v1/providers/{}/reset", provider.as_str());
        let response: DiagnosticResponse = self
            .send_json(self.http_client.post(self.url(&path)))
            .await?;
        Ok(response.message)
    }

    async fn usage_stats(&self, days: u32) -> BackendResult<Vec<UsageStats>> {
        let path = format!("/v1/usage?days={days}");
        let response: UsageResponse = self.send_json(self.http_client.get(self.url(&path))).await?;
        Ok(response.stats)
    }

    async fn total_cost(&self, days: u32) -> BackendResult<f64> {
        let path = format!("/v1/usage/cost?days={days}");
        let response: CostResponse = self.send_json(self.http_client.get(self.url(&path))).await?;
        Ok(response.total_cost_usd)
    }
}
