//! Turn controller: central coordinator for one conversation turn.
//!
//! A turn extracts slot values from the user message, derives `bmi`, and
//! then either asks for what is still missing or, once every required fact
//! is known, fans out to the pricing and recommendation services and
//! presents the result.

use std::sync::Arc;

use premia_core::{ChatConfig, CompletionPolicy, PremiaConfig};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::{ChatError, DerivedComputationError};
use crate::extraction::ExtractionAdapter;
use crate::fanout::{FanOutDispatcher, FanOutSettings};
use crate::gateway::LanguageModelGateway;
use crate::prompt;
use crate::services::{PricingService, RecommendationService};
use crate::session::{CachedOutcome, ConversationSession, SessionStore};
use crate::types::{ChatTurnResult, ConversationPhase, SessionSnapshot, StructuredData};

/// Runs conversation turns against the model and downstream services.
pub struct TurnController {
    gateway: Arc<dyn LanguageModelGateway>,
    extraction: ExtractionAdapter,
    fanout: FanOutDispatcher,
    sessions: SessionStore,
    config: ChatConfig,
}

impl TurnController {
    pub fn new(
        gateway: Arc<dyn LanguageModelGateway>,
        fanout: FanOutDispatcher,
        sessions: SessionStore,
        config: ChatConfig,
    ) -> Self {
        Self {
            extraction: ExtractionAdapter::new(Arc::clone(&gateway)),
            gateway,
            fanout,
            sessions,
            config,
        }
    }

    /// Build a controller from the full application configuration.
    pub fn from_config(
        config: &PremiaConfig,
        gateway: Arc<dyn LanguageModelGateway>,
        pricing: Arc<dyn PricingService>,
        recommendations: Arc<dyn RecommendationService>,
    ) -> Self {
        let settings = FanOutSettings {
            pricing_timeout: config.pricing.timeout(),
            recommendation_timeout: config.recommendation.timeout(),
            top_k: config.recommendation.top_k,
        };
        Self::new(
            gateway,
            FanOutDispatcher::new(pricing, recommendations, settings),
            SessionStore::with_ttl(config.session.ttl()),
            config.chat.clone(),
        )
    }

    /// Process one user message.
    ///
    /// A missing or blank `conversation_id` starts a new conversation with
    /// a generated id. Only gateway failures and invalid input fail a turn.
    #[instrument(skip_all, fields(conversation_id = tracing::field::Empty))]
    pub async fn handle_turn(
        &self,
        message: &str,
        conversation_id: Option<&str>,
    ) -> Result<ChatTurnResult, ChatError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if message.chars().count() > self.config.max_message_length {
            return Err(ChatError::MessageTooLong(self.config.max_message_length));
        }

        let id = match conversation_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };
        tracing::Span::current().record("conversation_id", id.as_str());

        let mut session = loop {
            let handle = self.sessions.get_or_create(&id);
            let session = Arc::clone(&handle).lock_owned().await;
            if self.sessions.is_current(&id, &handle) {
                break session;
            }
            debug!("Session was reset while waiting, retrying");
        };
        session.touch();

        if let Some(delta) = self.extraction.extract(message, &session.slots).await? {
            let changed = session.slots.apply(&delta);
            debug!(changed = ?changed, filled = session.filled(), "Merged extraction");
        }

        match session.slots.derive_bmi() {
            Ok(bmi) => debug!(bmi, "Derived bmi"),
            Err(DerivedComputationError::Missing(_)) => {}
            Err(e) => debug!(error = %e, "Keeping previous bmi"),
        }

        if !session.slots.is_complete() {
            let prompt = prompt::follow_up_prompt(message, &session.slots);
            let reply = self.gateway.complete(&prompt).await?;
            return Ok(ChatTurnResult {
                reply: reply.trim().to_string(),
                slots: session.slots.clone(),
                complete: false,
                structured_data: None,
                conversation_id: id,
            });
        }

        let transition = !session.is_complete();
        if transition {
            session.phase = ConversationPhase::Complete;
            info!(turns = session.turn_count, "Conversation complete");
        }

        let data = self.outcome(&mut session, transition).await;
        let prompt = prompt::finalization_prompt(message, &session.slots, &data);
        let reply = self.gateway.complete(&prompt).await?;

        Ok(ChatTurnResult {
            reply: reply.trim().to_string(),
            slots: session.slots.clone(),
            complete: true,
            structured_data: Some(data),
            conversation_id: id,
        })
    }

    /// Fan out, or reuse the cached outcome when the policy allows it.
    async fn outcome(&self, session: &mut ConversationSession, transition: bool) -> StructuredData {
        let cached = session.last_outcome.as_ref().and_then(|cached| {
            let reusable = match self.config.completion_policy {
                CompletionPolicy::Always => false,
                CompletionPolicy::OnChange => cached.slots == session.slots,
                CompletionPolicy::Once => !transition,
            };
            reusable.then(|| cached.data.clone())
        });
        if let Some(data) = cached {
            debug!(policy = ?self.config.completion_policy, "Reusing previous fan-out outcome");
            return data;
        }

        let data = self.fanout.dispatch(&session.slots).await;
        session.last_outcome = Some(CachedOutcome {
            slots: session.slots.clone(),
            data: data.clone(),
        });
        data
    }

    /// Current state of a conversation, if it exists.
    pub async fn session_snapshot(&self, conversation_id: &str) -> Option<SessionSnapshot> {
        let handle = self.sessions.get(conversation_id)?;
        let session = handle.lock().await;
        Some(session.snapshot())
    }

    /// Forget a conversation. The next message with this id starts over.
    ///
    /// Waits for a turn in progress on the conversation to finish first.
    pub async fn reset_session(&self, conversation_id: &str) -> bool {
        let Some(handle) = self.sessions.get(conversation_id) else {
            return false;
        };
        let _session = handle.lock().await;
        let removed = self.sessions.is_current(conversation_id, &handle)
            && self.sessions.remove(conversation_id);
        if removed {
            info!(conversation_id, "Conversation reset");
        }
        removed
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Drop idle conversations; see [`SessionStore::evict_expired`].
    pub fn evict_expired(&self) -> usize {
        self.sessions.evict_expired()
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }
}
