//! Clients for the pricing and recommendation services.
//!
//! Each service is a trait with an HTTP adapter and a configurable mock.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use premia_core::{PricingConfig, RecommendationConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::ServiceError;
use crate::slots::SlotState;
use crate::types::RawRecommendation;

/// Price prediction model.
#[async_trait]
pub trait PricingService: Send + Sync {
    /// Predict the annual charge for a complete slot snapshot.
    async fn predict(&self, slots: &SlotState) -> Result<f64, ServiceError>;
}

/// Product recommendation engine.
#[async_trait]
pub trait RecommendationService: Send + Sync {
    /// Up to `top_k` products matching a free-text customer summary.
    async fn recommend(&self, query: &str, top_k: usize)
        -> Result<Vec<RawRecommendation>, ServiceError>;
}

fn build_client(timeout: Duration) -> Result<reqwest::Client, ServiceError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ServiceError::Transport(e.to_string()))
}

fn classify(err: reqwest::Error, timeout: Duration) -> ServiceError {
    if err.is_timeout() {
        ServiceError::Timeout(timeout)
    } else {
        ServiceError::from(err)
    }
}

// =============================================================================
// HTTP adapters
// =============================================================================

/// Pricing service reached over HTTP.
///
/// Posts the slot snapshot and expects `{"predicted_charge": <number>}`.
pub struct HttpPricingService {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpPricingService {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ServiceError> {
        Ok(Self {
            client: build_client(timeout)?,
            url: url.into(),
            timeout,
        })
    }

    pub fn from_config(config: &PricingConfig) -> Result<Self, ServiceError> {
        Self::new(config.url.clone(), config.timeout())
    }
}

#[async_trait]
impl PricingService for HttpPricingService {
    async fn predict(&self, slots: &SlotState) -> Result<f64, ServiceError> {
        let body: Value = self
            .client
            .post(&self.url)
            .json(slots)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| classify(e, self.timeout))?
            .json()
            .await
            .map_err(|e| classify(e, self.timeout))?;

        body.get("predicted_charge")
            .and_then(Value::as_f64)
            .ok_or_else(|| {
                ServiceError::InvalidResponse(format!("missing numeric predicted_charge in {body}"))
            })
    }
}

#[derive(Serialize)]
struct RecommendRequest<'a> {
    query: &'a str,
    top_k: usize,
}

#[derive(Deserialize)]
struct RecommendResponse {
    #[serde(default)]
    products: Vec<Value>,
}

impl RecommendResponse {
    /// Decode each product on its own; malformed entries are skipped.
    fn into_products(self) -> Vec<RawRecommendation> {
        self.products
            .into_iter()
            .enumerate()
            .filter_map(|(index, item)| match serde_json::from_value(item) {
                Ok(product) => Some(product),
                Err(e) => {
                    warn!(index, error = %e, "Skipping malformed recommendation");
                    None
                }
            })
            .collect()
    }
}

/// Recommendation engine reached over HTTP.
///
/// Posts `{"query", "top_k"}` and expects `{"products": [...]}`.
pub struct HttpRecommendationService {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpRecommendationService {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ServiceError> {
        Ok(Self {
            client: build_client(timeout)?,
            url: url.into(),
            timeout,
        })
    }

    pub fn from_config(config: &RecommendationConfig) -> Result<Self, ServiceError> {
        Self::new(config.url.clone(), config.timeout())
    }
}

#[async_trait]
impl RecommendationService for HttpRecommendationService {
    async fn recommend(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RawRecommendation>, ServiceError> {
        let response: RecommendResponse = self
            .client
            .post(&self.url)
            .json(&RecommendRequest { query, top_k })
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| classify(e, self.timeout))?
            .json()
            .await
            .map_err(|e| classify(e, self.timeout))?;

        Ok(response.into_products())
    }
}

// =============================================================================
// Mocks
// =============================================================================

/// What a mock service does when called.
#[derive(Debug, Clone)]
pub enum MockBehavior<T> {
    Succeed(T),
    FailWithStatus(u16),
    Panic,
}

impl<T: Clone> MockBehavior<T> {
    fn run(&self) -> Result<T, ServiceError> {
        match self {
            MockBehavior::Succeed(value) => Ok(value.clone()),
            MockBehavior::FailWithStatus(code) => Err(ServiceError::Status(*code)),
            MockBehavior::Panic => panic!("mock service panicked"),
        }
    }
}

/// Pricing service stub with optional latency.
pub struct MockPricingService {
    behavior: MockBehavior<f64>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    last_request: Mutex<Option<SlotState>>,
}

impl MockPricingService {
    pub fn new(behavior: MockBehavior<f64>) -> Self {
        Self {
            behavior,
            delay: None,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn returning(charge: f64) -> Self {
        Self::new(MockBehavior::Succeed(charge))
    }

    pub fn failing(status: u16) -> Self {
        Self::new(MockBehavior::FailWithStatus(status))
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<SlotState> {
        self.last_request.lock().ok().and_then(|r| r.clone())
    }
}

#[async_trait]
impl PricingService for MockPricingService {
    async fn predict(&self, slots: &SlotState) -> Result<f64, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(slots.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.behavior.run()
    }
}

/// Recommendation engine stub with optional latency.
pub struct MockRecommendationService {
    behavior: MockBehavior<Vec<RawRecommendation>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    last_request: Mutex<Option<(String, usize)>>,
}

impl MockRecommendationService {
    pub fn new(behavior: MockBehavior<Vec<RawRecommendation>>) -> Self {
        Self {
            behavior,
            delay: None,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn returning(products: Vec<RawRecommendation>) -> Self {
        Self::new(MockBehavior::Succeed(products))
    }

    pub fn failing(status: u16) -> Self {
        Self::new(MockBehavior::FailWithStatus(status))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The `(query, top_k)` of the most recent call.
    pub fn last_request(&self) -> Option<(String, usize)> {
        self.last_request.lock().ok().and_then(|r| r.clone())
    }
}

#[async_trait]
impl RecommendationService for MockRecommendationService {
    async fn recommend(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RawRecommendation>, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some((query.to_string(), top_k));
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.behavior.run()
    }
}
