//! Language model gateway: prompt in, text out.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use premia_core::LlmConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::GatewayError;

/// A generative language backend.
#[async_trait]
pub trait LanguageModelGateway: Send + Sync {
    /// Run one completion.
    async fn complete(&self, prompt: &str) -> Result<String, GatewayError>;
}

// =============================================================================
// OllamaGateway
// =============================================================================

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Gateway backed by an Ollama-compatible `/api/generate` endpoint.
pub struct OllamaGateway {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OllamaGateway {
    pub fn new(base_url: &str, model: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/api/generate", base_url.trim_end_matches('/')),
            model: model.into(),
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, GatewayError> {
        Self::new(&config.base_url, config.model.clone(), config.timeout())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LanguageModelGateway for OllamaGateway {
    async fn complete(&self, prompt: &str) -> Result<String, GatewayError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        let started = std::time::Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        let body: GenerateResponse = response.json().await?;

        debug!(
            model = %self.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            chars = body.response.len(),
            "LLM completion finished"
        );
        Ok(body.response)
    }
}

// =============================================================================
// MockGateway
// =============================================================================

type Responder = Box<dyn Fn(&str) -> String + Send + Sync>;

/// Scripted gateway for tests.
///
/// Replies are consumed in order. Once the script runs out, the responder
/// (if any) answers, otherwise the fallback reply is returned. Every prompt
/// received is recorded.
#[derive(Default)]
pub struct MockGateway {
    script: Mutex<VecDeque<Result<String, GatewayError>>>,
    responder: Option<Responder>,
    fallback: String,
    prompts: Mutex<Vec<String>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            fallback: "OK".to_string(),
            ..Default::default()
        }
    }

    /// Gateway that answers every unscripted prompt with `responder`.
    pub fn with_responder(responder: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::new()
        }
    }

    /// Queue a successful reply.
    pub fn push_reply(&self, reply: impl Into<String>) -> &Self {
        self.lock_script().push_back(Ok(reply.into()));
        self
    }

    /// Queue a failure.
    pub fn push_error(&self, error: GatewayError) -> &Self {
        self.lock_script().push_back(Err(error));
        self
    }

    /// Every prompt received so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String, GatewayError>>> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl LanguageModelGateway for MockGateway {
    async fn complete(&self, prompt: &str) -> Result<String, GatewayError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        if let Some(scripted) = self.lock_script().pop_front() {
            return scripted;
        }
        Ok(match &self.responder {
            Some(responder) => responder(prompt),
            None => self.fallback.clone(),
        })
    }
}
