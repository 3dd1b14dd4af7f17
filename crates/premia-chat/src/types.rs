//! Result types shared by the orchestrator, the downstream clients and the API.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::slots::SlotState;

/// Wire marker for a price that could not be computed.
pub const UNAVAILABLE: &str = "unavailable";

// =============================================================================
// PredictionResult
// =============================================================================

/// Outcome of the pricing call.
///
/// Serialized as a bare JSON number, or the string `"unavailable"`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PredictionResult {
    Charge(f64),
    Unavailable,
}

impl PredictionResult {
    pub fn charge(&self) -> Option<f64> {
        match self {
            PredictionResult::Charge(c) => Some(*c),
            PredictionResult::Unavailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, PredictionResult::Charge(_))
    }
}

impl fmt::Display for PredictionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictionResult::Charge(c) => write!(f, "{:.2}", c),
            PredictionResult::Unavailable => f.write_str(UNAVAILABLE),
        }
    }
}

impl Serialize for PredictionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PredictionResult::Charge(c) => serializer.serialize_f64(*c),
            PredictionResult::Unavailable => serializer.serialize_str(UNAVAILABLE),
        }
    }
}

impl<'de> Deserialize<'de> for PredictionResult {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Number(n) => n
                .as_f64()
                .map(PredictionResult::Charge)
                .ok_or_else(|| serde::de::Error::custom("charge is not representable as f64")),
            Value::String(s) if s == UNAVAILABLE => Ok(PredictionResult::Unavailable),
            other => Err(serde::de::Error::custom(format!(
                "expected a number or \"{UNAVAILABLE}\", got {other}"
            ))),
        }
    }
}

// =============================================================================
// Recommendations
// =============================================================================

/// One suggested product, normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationItem {
    pub id: String,
    pub title: String,
    pub url: String,
    pub summary: String,
    /// Relevance in `[0, 1]`.
    pub score: f64,
}

/// A product as returned by the recommendation engine.
///
/// The engine is inconsistent about key casing for `summary` and `url`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRecommendation {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, rename = "URL")]
    pub url_upper: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default, rename = "Summary")]
    pub summary_upper: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
}

impl From<RawRecommendation> for RecommendationItem {
    fn from(raw: RawRecommendation) -> Self {
        let id = match raw.id {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        };
        let score = raw.score.filter(|s| !s.is_nan()).unwrap_or(0.0).clamp(0.0, 1.0);

        Self {
            id,
            title: raw.title.unwrap_or_default(),
            url: raw.url.or(raw.url_upper).unwrap_or_default(),
            summary: raw.summary.or(raw.summary_upper).unwrap_or_default(),
            score,
        }
    }
}

// =============================================================================
// Turn results
// =============================================================================

/// Payload attached to a turn once every required fact is known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredData {
    pub predicted_price: PredictionResult,
    pub recommendations: Vec<RecommendationItem>,
}

/// Where a conversation is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationPhase {
    Gathering,
    Complete,
}

/// Everything returned for one processed message.
#[derive(Debug, Clone, Serialize)]
pub struct ChatTurnResult {
    pub reply: String,
    pub slots: SlotState,
    pub complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_data: Option<StructuredData>,
    pub conversation_id: String,
}

/// Read-only view of a stored conversation.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub conversation_id: String,
    pub phase: ConversationPhase,
    pub slots: SlotState,
    pub turn_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<StructuredData>,
}
