//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use premia_chat::TurnController;
use premia_core::PremiaConfig;

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<PremiaConfig>,
    /// Conversation orchestrator.
    pub controller: Arc<TurnController>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: PremiaConfig, controller: Arc<TurnController>) -> Self {
        Self {
            config: Arc::new(config),
            controller,
            start_time: Instant::now(),
        }
    }
}
