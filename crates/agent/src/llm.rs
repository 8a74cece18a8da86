use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use concierge_core::config::{LlmConfig, LlmProvider};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_MAX_TOKENS: u32 = 2048;
const JSON_ONLY_SUFFIX: &str =
    "\n\nRespond with one valid JSON object only. No markdown code fences, no commentary.";

/// One system + user exchange. `json_mode` asks the provider for a single
/// JSON object back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub json_mode: bool,
}

impl CompletionRequest {
    pub fn json(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self { system: system.into(), user: user.into(), json_mode: true }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Chat client for OpenAI-compatible endpoints (OpenAI, Ollama) and the
/// Anthropic messages API. Temperature is pinned to zero.
pub struct HttpLlmClient {
    http: reqwest::Client,
    provider: LlmProvider,
    api_key: Option<SecretString>,
    base_url: String,
    model: String,
    max_retries: u32,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| anyhow!("failed to build llm http client: {error}"))?;

        let base_url = match (&config.base_url, config.provider) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, LlmProvider::OpenAi) => OPENAI_BASE_URL.to_string(),
            (None, LlmProvider::Anthropic) => ANTHROPIC_BASE_URL.to_string(),
            (None, LlmProvider::Ollama) => {
                return Err(anyhow!("llm.base_url is required for the ollama provider"))
            }
        };

        Ok(Self {
            http,
            provider: config.provider,
            api_key: config.api_key.clone(),
            base_url,
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn send_once(&self, request: &CompletionRequest) -> Result<String, CallFailure> {
        match self.provider {
            LlmProvider::OpenAi | LlmProvider::Ollama => self.send_chat_completion(request).await,
            LlmProvider::Anthropic => self.send_anthropic_message(request).await,
        }
    }

    async fn send_chat_completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<String, CallFailure> {
        let mut body = json!({
            "model": &self.model,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": &request.system},
                {"role": "user", "content": &request.user}
            ]
        });
        if request.json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }

        let mut builder = self.http.post(format!("{}/chat/completions", self.base_url)).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder.send().await.map_err(CallFailure::transport)?;
        let response = check_status(response).await?;

        #[derive(Deserialize)]
        struct Message {
            content: Option<String>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }
        #[derive(Deserialize)]
        struct ApiResponse {
            choices: Vec<Choice>,
        }

        let parsed: ApiResponse = response.json().await.map_err(CallFailure::decode)?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| CallFailure::permanent("completion returned no choices"))
    }

    async fn send_anthropic_message(
        &self,
        request: &CompletionRequest,
    ) -> Result<String, CallFailure> {
        let system = if request.json_mode {
            format!("{}{JSON_ONLY_SUFFIX}", request.system)
        } else {
            request.system.clone()
        };
        let body = json!({
            "model": &self.model,
            "max_tokens": ANTHROPIC_MAX_TOKENS,
            "temperature": 0,
            "system": system,
            "messages": [{"role": "user", "content": &request.user}]
        });

        let api_key = self.api_key.as_ref().map(|key| key.expose_secret().to_string());
        let response = self
            .http
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", api_key.unwrap_or_default())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(CallFailure::transport)?;
        let response = check_status(response).await?;

        #[derive(Deserialize)]
        struct ContentBlock {
            text: Option<String>,
        }
        #[derive(Deserialize)]
        struct ApiResponse {
            content: Vec<ContentBlock>,
        }

        let parsed: ApiResponse = response.json().await.map_err(CallFailure::decode)?;
        parsed
            .content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or_else(|| CallFailure::permanent("empty response from anthropic"))
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.send_once(request).await {
                Ok(text) => return Ok(text),
                Err(failure) if failure.retryable && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        event_name = "agent.llm.retry",
                        attempt,
                        error = %failure.message,
                        "retrying llm completion"
                    );
                    tokio::time::sleep(Duration::from_millis(250 * u64::from(attempt))).await;
                }
                Err(failure) => return Err(anyhow!(failure.message)),
            }
        }
    }
}

struct CallFailure {
    message: String,
    retryable: bool,
}

impl CallFailure {
    fn transport(error: reqwest::Error) -> Self {
        Self { message: format!("llm request failed: {error}"), retryable: true }
    }

    fn decode(error: reqwest::Error) -> Self {
        Self { message: format!("llm response could not be decoded: {error}"), retryable: false }
    }

    fn permanent(message: &str) -> Self {
        Self { message: message.to_string(), retryable: false }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, CallFailure> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(CallFailure {
        message: format!("llm provider returned {status}: {body}"),
        retryable: status.as_u16() == 429 || status.is_server_error(),
    })
}

/// Strips markdown code fences some models wrap around JSON output.
pub fn extract_json_object(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
