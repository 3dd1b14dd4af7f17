use thiserror::Error;

/// Top-level error type for the Premia system.
///
/// Covers failures that are not owned by a single subsystem: loading and
/// validating configuration, serving the HTTP API, and I/O at startup.
/// Subsystem crates keep their own error enums and convert into this one
/// where they cross into the composition root.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PremiaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for PremiaError {
    fn from(err: toml::de::Error) -> Self {
        PremiaError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for PremiaError {
    fn from(err: toml::ser::Error) -> Self {
        PremiaError::Config(err.to_string())
    }
}

/// A specialized `Result` type for Premia operations.
pub type Result<T> = std::result::Result<T, PremiaError>;
