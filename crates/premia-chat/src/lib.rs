//! Conversational slot-filling orchestrator.
//!
//! Tracks per-conversation facts, extracts updates from free-form model
//! output, and once every required fact is known calls the pricing and
//! recommendation services concurrently.

pub mod error;
pub mod extraction;
pub mod fanout;
pub mod gateway;
pub mod orchestrator;
pub mod prompt;
pub mod services;
pub mod session;
pub mod slots;
pub mod types;

pub use error::{ChatError, DerivedComputationError, ExtractionParseError, GatewayError, ServiceError};
pub use extraction::{parse_structured, ExtractionAdapter};
pub use fanout::{FanOutDispatcher, FanOutSettings};
pub use gateway::{LanguageModelGateway, MockGateway, OllamaGateway};
pub use orchestrator::TurnController;
pub use services::{
    HttpPricingService, HttpRecommendationService, MockBehavior, MockPricingService,
    MockRecommendationService, PricingService, RecommendationService,
};
pub use session::{ConversationSession, SessionStore};
pub use slots::{ExtractionDelta, SlotField, SlotState, SlotValue};
pub use types::{
    ChatTurnResult, ConversationPhase, PredictionResult, RawRecommendation, RecommendationItem,
    SessionSnapshot, StructuredData,
};
