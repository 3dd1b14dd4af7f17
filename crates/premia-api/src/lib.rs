//! HTTP interface for the Premia chat orchestrator.
//!
//! Exposes the chat operation plus health and conversation inspection
//! endpoints over axum.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
