//! Shared configuration and error types for Premia.

pub mod config;
pub mod error;

pub use config::{
    ChatConfig, CompletionPolicy, GeneralConfig, LlmConfig, PremiaConfig, PricingConfig,
    RecommendationConfig, SessionConfig,
};
pub use error::{PremiaError, Result};
