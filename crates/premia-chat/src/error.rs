//! Error types for the conversational orchestrator.
//!
//! Only [`ChatError`] ever escapes a turn. The remaining types describe
//! failures that the orchestrator absorbs locally and turns into explicit
//! defaults; they exist so that those branches are values, not panics.

use std::time::Duration;

/// Errors that fail a whole turn.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("language model gateway failed: {0}")]
    Gateway(#[from] GatewayError),
}

/// Failure of the generative language backend.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("request timed out")]
    Timeout,
    #[error("backend returned status {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid backend response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout
        } else if let Some(status) = err.status() {
            GatewayError::Status(status.as_u16())
        } else if err.is_decode() {
            GatewayError::InvalidResponse(err.to_string())
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

/// Failure of the pricing or recommendation service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("service returned status {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid service response: {0}")]
    InvalidResponse(String),
    #[error("task aborted: {0}")]
    Aborted(String),
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            ServiceError::Status(status.as_u16())
        } else if err.is_decode() {
            ServiceError::InvalidResponse(err.to_string())
        } else {
            ServiceError::Transport(err.to_string())
        }
    }
}

/// Why a model response could not be decoded into a structured object.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionParseError {
    #[error("model output is empty")]
    Empty,
    #[error("no JSON object found in model output")]
    NoObject,
    #[error("JSON object is not closed within {0} bytes")]
    Unterminated(usize),
    #[error("malformed JSON: {0}")]
    Malformed(String),
    #[error("decoded value is not a JSON object")]
    NotAnObject,
}

/// Why `bmi` could not be derived from height and weight.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DerivedComputationError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{field} is not numeric: {value}")]
    NonNumeric { field: &'static str, value: String },
    #[error("height must be positive, got {0}")]
    NonPositiveHeight(f64),
    #[error("computed value is not finite")]
    NotFinite,
}
