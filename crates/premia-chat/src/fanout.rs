//! Concurrent pricing and recommendation calls.
//!
//! Both calls run as separate tokio tasks with their own timeout. The
//! dispatcher waits for both; a failure on one side never discards the
//! other side's result.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinError;
use tracing::{debug, warn};

use crate::error::ServiceError;
use crate::prompt;
use crate::services::{PricingService, RecommendationService};
use crate::slots::SlotState;
use crate::types::{PredictionResult, RawRecommendation, RecommendationItem, StructuredData};

/// Per-call limits for one fan-out cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanOutSettings {
    pub pricing_timeout: Duration,
    pub recommendation_timeout: Duration,
    pub top_k: usize,
}

impl Default for FanOutSettings {
    fn default() -> Self {
        Self {
            pricing_timeout: Duration::from_secs(5),
            recommendation_timeout: Duration::from_secs(5),
            top_k: 3,
        }
    }
}

/// Runs the pricing and recommendation calls side by side.
pub struct FanOutDispatcher {
    pricing: Arc<dyn PricingService>,
    recommendations: Arc<dyn RecommendationService>,
    settings: FanOutSettings,
}

impl FanOutDispatcher {
    pub fn new(
        pricing: Arc<dyn PricingService>,
        recommendations: Arc<dyn RecommendationService>,
        settings: FanOutSettings,
    ) -> Self {
        Self {
            pricing,
            recommendations,
            settings,
        }
    }

    pub fn settings(&self) -> &FanOutSettings {
        &self.settings
    }

    /// Call both services for a complete slot snapshot.
    ///
    /// Never fails: an unusable price becomes
    /// [`PredictionResult::Unavailable`] and unusable recommendations
    /// become an empty list.
    pub async fn dispatch(&self, slots: &SlotState) -> StructuredData {
        let started = Instant::now();
        let query = prompt::query_summary(slots);

        let pricing = {
            let service = Arc::clone(&self.pricing);
            let snapshot = slots.clone();
            supervise(self.settings.pricing_timeout, async move {
                service.predict(&snapshot).await
            })
        };
        let recommendations = {
            let service = Arc::clone(&self.recommendations);
            let top_k = self.settings.top_k;
            supervise(self.settings.recommendation_timeout, async move {
                service.recommend(&query, top_k).await
            })
        };

        let (price, products) = tokio::join!(pricing, recommendations);

        let predicted_price = match price {
            Ok(charge) if charge.is_finite() => PredictionResult::Charge(charge),
            Ok(charge) => {
                warn!(charge, "Pricing service returned a non-finite charge");
                PredictionResult::Unavailable
            }
            Err(e) => {
                warn!(error = %e, "Pricing unavailable");
                PredictionResult::Unavailable
            }
        };

        let recommendations = match products {
            Ok(products) => normalize(products, self.settings.top_k),
            Err(e) => {
                warn!(error = %e, "Recommendations unavailable");
                Vec::new()
            }
        };

        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            price_available = predicted_price.is_available(),
            recommendations = recommendations.len(),
            "Fan-out finished"
        );

        StructuredData {
            predicted_price,
            recommendations,
        }
    }
}

/// Spawn `call` on its own task, bounded by `limit`.
///
/// A timeout aborts the task; a panic surfaces as [`ServiceError::Aborted`].
async fn supervise<T, F>(limit: Duration, call: F) -> Result<T, ServiceError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, ServiceError>> + Send + 'static,
{
    let handle = tokio::spawn(call);
    let abort = handle.abort_handle();

    match tokio::time::timeout(limit, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(aborted(join_error)),
        Err(_) => {
            abort.abort();
            Err(ServiceError::Timeout(limit))
        }
    }
}

fn aborted(err: JoinError) -> ServiceError {
    if err.is_panic() {
        ServiceError::Aborted("task panicked".to_string())
    } else {
        ServiceError::Aborted(err.to_string())
    }
}

fn normalize(products: Vec<RawRecommendation>, top_k: usize) -> Vec<RecommendationItem> {
    products
        .into_iter()
        .take(top_k)
        .map(RecommendationItem::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{MockBehavior, MockPricingService, MockRecommendationService};
    use crate::slots::{ExtractionDelta, SlotField};
    use serde_json::json;

    fn complete_state() -> SlotState {
        let mut state = SlotState::new();
        let delta = json!({
            "age": 35, "sex": "male", "smoker": "no", "children": 2,
            "region": "Taipei", "height": 175, "weight": 70
        });
        state.apply(&ExtractionDelta::from_object(delta.as_object().unwrap()));
        state.derive_bmi().unwrap();
        state
    }

    fn products(n: usize) -> Vec<RawRecommendation> {
        (0..n)
            .map(|i| {
                serde_json::from_value(json!({
                    "id": i, "title": format!("Plan {i}"), "URL": format!("https://x/{i}"),
                    "Summary": "cover", "score": 0.5
                }))
                .unwrap()
            })
            .collect()
    }

    fn dispatcher(
        pricing: Arc<MockPricingService>,
        recs: Arc<MockRecommendationService>,
    ) -> FanOutDispatcher {
        FanOutDispatcher::new(pricing, recs, FanOutSettings::default())
    }

    #[tokio::test]
    async fn test_both_services_succeed() {
        let pricing = Arc::new(MockPricingService::returning(18234.5));
        let recs = Arc::new(MockRecommendationService::returning(products(3)));
        let outcome = dispatcher(pricing.clone(), recs.clone())
            .dispatch(&complete_state())
            .await;

        assert_eq!(outcome.predicted_price, PredictionResult::Charge(18234.5));
        assert_eq!(outcome.recommendations.len(), 3);
        assert_eq!(outcome.recommendations[0].url, "https://x/0");
        assert_eq!(outcome.recommendations[0].summary, "cover");

        let sent = pricing.last_request().unwrap();
        assert_eq!(sent.get(SlotField::Bmi).and_then(|v| v.as_f64()), Some(22.86));
        let (query, top_k) = recs.last_request().unwrap();
        assert_eq!(query, "Customer age 35, sex male, BMI 22.86, lives in Taipei");
        assert_eq!(top_k, 3);
    }

    #[tokio::test]
    async fn test_excess_products_truncated_to_top_k() {
        let pricing = Arc::new(MockPricingService::returning(1.0));
        let recs = Arc::new(MockRecommendationService::returning(products(5)));
        let outcome = dispatcher(pricing, recs).dispatch(&complete_state()).await;
        assert_eq!(outcome.recommendations.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pricing_timeout_and_empty_recommendations() {
        let pricing =
            Arc::new(MockPricingService::returning(1.0).with_delay(Duration::from_secs(30)));
        let recs = Arc::new(MockRecommendationService::returning(vec![]));
        let outcome = dispatcher(pricing, recs).dispatch(&complete_state()).await;

        assert_eq!(outcome.predicted_price, PredictionResult::Unavailable);
        assert!(outcome.recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_pricing_failure_keeps_recommendations() {
        let pricing = Arc::new(MockPricingService::failing(500));
        let recs = Arc::new(MockRecommendationService::returning(products(2)));
        let outcome = dispatcher(pricing, recs).dispatch(&complete_state()).await;

        assert_eq!(outcome.predicted_price, PredictionResult::Unavailable);
        assert_eq!(outcome.recommendations.len(), 2);
    }

    #[tokio::test]
    async fn test_recommendation_failure_keeps_price() {
        let pricing = Arc::new(MockPricingService::returning(9000.0));
        let recs = Arc::new(MockRecommendationService::failing(502));
        let outcome = dispatcher(pricing, recs).dispatch(&complete_state()).await;

        assert_eq!(outcome.predicted_price, PredictionResult::Charge(9000.0));
        assert!(outcome.recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_panicking_service_is_contained() {
        let pricing = Arc::new(MockPricingService::new(MockBehavior::Panic));
        let recs = Arc::new(MockRecommendationService::returning(products(1)));
        let outcome = dispatcher(pricing, recs).dispatch(&complete_state()).await;

        assert_eq!(outcome.predicted_price, PredictionResult::Unavailable);
        assert_eq!(outcome.recommendations.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_calls_run_concurrently() {
        let pricing =
            Arc::new(MockPricingService::returning(1.0).with_delay(Duration::from_secs(3)));
        let recs = Arc::new(
            MockRecommendationService::returning(products(1)).with_delay(Duration::from_secs(3)),
        );
        let started = tokio::time::Instant::now();
        let outcome = dispatcher(pricing, recs).dispatch(&complete_state()).await;

        assert!(outcome.predicted_price.is_available());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_non_finite_charge_is_unavailable() {
        let pricing = Arc::new(MockPricingService::returning(f64::INFINITY));
        let recs = Arc::new(MockRecommendationService::returning(vec![]));
        let outcome = dispatcher(pricing, recs).dispatch(&complete_state()).await;
        assert_eq!(outcome.predicted_price, PredictionResult::Unavailable);
    }

    #[tokio::test]
    async fn test_supervise_reports_timeout() {
        let result: Result<(), ServiceError> = supervise(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(ServiceError::Timeout(d)) if d == Duration::from_millis(10)));
    }
}
