use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PremiaError, Result};

/// Top-level configuration for the Premia service.
///
/// Loaded from `~/.premia/config.toml` by default. Each section corresponds
/// to one collaborator or cross-cutting concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PremiaConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub recommendation: RecommendationConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl PremiaConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read, parsed, or fails
    /// validation.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PremiaConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values that would make the service unusable.
    pub fn validate(&self) -> Result<()> {
        if self.llm.base_url.trim().is_empty() {
            return Err(PremiaError::Config("llm.base_url must not be empty".into()));
        }
        if self.llm.model.trim().is_empty() {
            return Err(PremiaError::Config("llm.model must not be empty".into()));
        }
        if self.pricing.url.trim().is_empty() {
            return Err(PremiaError::Config("pricing.url must not be empty".into()));
        }
        if self.recommendation.url.trim().is_empty() {
            return Err(PremiaError::Config(
                "recommendation.url must not be empty".into(),
            ));
        }
        if self.recommendation.top_k == 0 {
            return Err(PremiaError::Config(
                "recommendation.top_k must be at least 1".into(),
            ));
        }
        if self.llm.timeout_secs == 0 {
            return Err(PremiaError::Config(
                "llm.timeout_secs must be greater than zero".into(),
            ));
        }
        if self.pricing.timeout_ms == 0 || self.recommendation.timeout_ms == 0 {
            return Err(PremiaError::Config(
                "downstream timeouts must be greater than zero".into(),
            ));
        }
        if self.chat.max_message_length == 0 {
            return Err(PremiaError::Config(
                "chat.max_message_length must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// General server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Address the HTTP API binds to.
    pub bind_address: String,
    /// HTTP API port.
    pub port: u16,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 5002,
            log_level: "info".to_string(),
        }
    }
}

/// Generative language backend (Ollama-compatible HTTP API).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of the backend, without the `/api/generate` suffix.
    pub base_url: String,
    /// Model tag passed on every request.
    pub model: String,
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.1:8b".to_string(),
            timeout_secs: 120,
        }
    }
}

/// Pricing service endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Full URL of the predict endpoint.
    pub url: String,
    /// Timeout for one pricing call in milliseconds.
    pub timeout_ms: u64,
}

impl PricingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:5001/predict".to_string(),
            timeout_ms: 5_000,
        }
    }
}

/// Recommendation service endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationConfig {
    /// Full URL of the recommend endpoint.
    pub url: String,
    /// Timeout for one recommendation call in milliseconds.
    pub timeout_ms: u64,
    /// Number of products requested per query.
    pub top_k: usize,
}

impl RecommendationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:5003/recommend_products".to_string(),
            timeout_ms: 5_000,
            top_k: 3,
        }
    }
}

/// What happens on turns after a conversation has already completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionPolicy {
    /// Every completed turn dispatches to pricing and recommendations again.
    #[default]
    Always,
    /// Dispatch again only when the slot values changed since the last dispatch.
    OnChange,
    /// Dispatch on the completing turn only and reuse that result afterwards.
    Once,
}

/// Turn controller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Maximum accepted message length in characters.
    pub max_message_length: usize,
    /// Fan-out behaviour for turns after completion.
    pub completion_policy: CompletionPolicy,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_message_length: 2000,
            completion_policy: CompletionPolicy::Always,
        }
    }
}

/// In-memory session retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle minutes before a conversation is evicted. 0 keeps sessions forever.
    pub ttl_minutes: u64,
    /// Seconds between eviction sweeps.
    pub sweep_interval_secs: u64,
}

impl SessionConfig {
    /// Idle time-to-live, or `None` when eviction is disabled.
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_minutes > 0).then(|| Duration::from_secs(self.ttl_minutes.saturating_mul(60)))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: 60,
            sweep_interval_secs: 60,
        }
    }
}
