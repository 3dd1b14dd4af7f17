//! Integration tests for the Premia API.
//!
//! Each test builds its own router over mock language model and downstream
//! services, so nothing leaves the process.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use premia_api::{create_router, start_server};
use premia_api::handlers::HealthResponse;
use premia_api::state::AppState;
use premia_chat::{
    FanOutDispatcher, FanOutSettings, GatewayError, MockGateway, MockPricingService,
    MockRecommendationService, RawRecommendation, SessionStore, TurnController,
};
use premia_core::{PremiaConfig, PremiaError};

// =============================================================================
// Helpers
// =============================================================================

const FULL_EXTRACTION: &str = r#"{"age": 35, "sex": "male", "smoker": "no", "children": 2, "region": "Taipei", "height": 175, "weight": 70}"#;

struct TestApp {
    state: AppState,
    gateway: Arc<MockGateway>,
    pricing: Arc<MockPricingService>,
}

impl TestApp {
    fn router(&self) -> axum::Router {
        create_router(self.state.clone())
    }
}

fn products() -> Vec<RawRecommendation> {
    vec![serde_json::from_value(json!({
        "id": 11, "title": "Family Shield", "URL": "https://example.test/11",
        "Summary": "Covers the whole family", "score": 0.87
    }))
    .unwrap()]
}

fn make_app_with(pricing: MockPricingService, recs: MockRecommendationService) -> TestApp {
    let config = PremiaConfig::default();
    let gateway = Arc::new(MockGateway::new());
    let pricing = Arc::new(pricing);
    let controller = TurnController::new(
        gateway.clone(),
        FanOutDispatcher::new(pricing.clone(), Arc::new(recs), FanOutSettings::default()),
        SessionStore::new(),
        config.chat.clone(),
    );
    TestApp {
        state: AppState::new(config, Arc::new(controller)),
        gateway,
        pricing,
    }
}

fn make_app() -> TestApp {
    make_app_with(
        MockPricingService::returning(18234.5),
        MockRecommendationService::returning(products()),
    )
}

fn post_json(uri: &str, json: &str) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// =============================================================================
// GET /health
// =============================================================================

#[tokio::test]
async fn test_health_happy_path() {
    let app = make_app();
    let resp = app.router().oneshot(get("/health")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
    let health: HealthResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
    assert_eq!(health.active_sessions, 0);
}

#[tokio::test]
async fn test_health_counts_sessions() {
    let app = make_app();
    app.router()
        .oneshot(post_json("/chat", r#"{"message": "hi", "conversation_id": "h1"}"#))
        .await
        .unwrap();

    let body = body_json(app.router().oneshot(get("/health")).await.unwrap()).await;
    assert_eq!(body["active_sessions"], json!(1));
}

// =============================================================================
// POST /chat
// =============================================================================

#[tokio::test]
async fn test_chat_gathering_turn() {
    let app = make_app();
    app.gateway
        .push_reply(r#"{"age": 35, "sex": "male"}"#)
        .push_reply("Great, do you smoke?");

    let resp = app
        .router()
        .oneshot(post_json(
            "/chat",
            r#"{"message": "I'm a 35 year old man", "conversation_id": "c-1"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["reply"], "Great, do you smoke?");
    assert_eq!(body["complete"], json!(false));
    assert_eq!(body["conversation_id"], "c-1");
    assert!(body.get("structured_data").is_none());
    assert_eq!(body["slots"]["age"], json!(35));
    assert_eq!(body["slots"]["bmi"], Value::Null);
    assert_eq!(body["slots"].as_object().unwrap().len(), 8);
}

#[tokio::test]
async fn test_chat_completes_in_one_message() {
    let app = make_app();
    app.gateway
        .push_reply(FULL_EXTRACTION)
        .push_reply("Your estimated premium is about 18235.");

    let resp = app
        .router()
        .oneshot(post_json(
            "/chat",
            r#"{"message": "35 year old male, non-smoker, 2 kids, Taipei, 175cm, 70kg"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["complete"], json!(true));
    assert_eq!(body["slots"]["bmi"], json!(22.86));
    assert!(Uuid::parse_str(body["conversation_id"].as_str().unwrap()).is_ok());

    let data = &body["structured_data"];
    assert_eq!(data["predicted_price"], json!(18234.5));
    let recs = data["recommendations"].as_array().unwrap();
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0]["url"], "https://example.test/11");
    assert_eq!(recs[0]["summary"], "Covers the whole family");
    assert_eq!(recs[0]["id"], "11");
    assert_eq!(app.pricing.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_chat_degraded_downstream() {
    let app = make_app_with(
        MockPricingService::returning(1.0).with_delay(Duration::from_secs(60)),
        MockRecommendationService::failing(500),
    );
    app.gateway.push_reply(FULL_EXTRACTION).push_reply("Sorry, no quote yet.");

    let resp = app
        .router()
        .oneshot(post_json("/chat", r#"{"message": "everything at once"}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["complete"], json!(true));
    assert_eq!(body["structured_data"]["predicted_price"], "unavailable");
    assert_eq!(body["structured_data"]["recommendations"], json!([]));
}

#[tokio::test]
async fn test_chat_missing_message() {
    let app = make_app();
    let resp = app
        .router()
        .oneshot(post_json("/chat", r#"{"conversation_id": "x"}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "bad_request");
    assert_eq!(app.gateway.call_count(), 0);
}

#[tokio::test]
async fn test_chat_blank_message() {
    let app = make_app();
    let resp = app
        .router()
        .oneshot(post_json("/chat", r#"{"message": "   "}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_chat_malformed_json() {
    let app = make_app();
    let resp = app
        .router()
        .oneshot(post_json("/chat", "{not json"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn test_chat_missing_content_type() {
    let app = make_app();
    let req = Request::post("/chat")
        .body(Body::from(r#"{"message": "hi"}"#))
        .unwrap();
    let resp = app.router().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_chat_message_too_long() {
    let app = make_app();
    let payload = json!({ "message": "a".repeat(2001) }).to_string();
    let resp = app
        .router()
        .oneshot(post_json("/chat", &payload))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "unprocessable_entity");
}

#[tokio::test]
async fn test_chat_gateway_failure_is_bad_gateway() {
    let app = make_app();
    app.gateway.push_error(GatewayError::Status(503));

    let resp = app
        .router()
        .oneshot(post_json("/chat", r#"{"message": "hi", "conversation_id": "g"}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "bad_gateway");

    // The conversation survives the failed turn.
    let resp = app.router().oneshot(get("/sessions/g")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_chat_turns_accumulate() {
    let app = make_app();
    app.gateway
        .push_reply(r#"{"age": 35, "sex": "male", "smoker": "no"}"#)
        .push_reply("How many children do you have?")
        .push_reply(r#"{"children": 2, "region": "Taipei", "height": 175, "weight": 70}"#)
        .push_reply("Here is your estimate.");

    let first = body_json(
        app.router()
            .oneshot(post_json("/chat", r#"{"message": "35, male, no smoking", "conversation_id": "acc"}"#))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(first["complete"], json!(false));

    let second = body_json(
        app.router()
            .oneshot(post_json("/chat", r#"{"message": "2 kids, Taipei, 175/70", "conversation_id": "acc"}"#))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(second["complete"], json!(true));
    assert_eq!(second["slots"]["smoker"], "no");
    assert!(second["structured_data"].is_object());
}

// =============================================================================
// /sessions/{id}
// =============================================================================

#[tokio::test]
async fn test_get_session_snapshot() {
    let app = make_app();
    app.gateway
        .push_reply(r#"{"region": "Kaohsiung"}"#)
        .push_reply("ok");
    app.router()
        .oneshot(post_json("/chat", r#"{"message": "I live in Kaohsiung", "conversation_id": "s1"}"#))
        .await
        .unwrap();

    let resp = app.router().oneshot(get("/sessions/s1")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["conversation_id"], "s1");
    assert_eq!(body["phase"], "gathering");
    assert_eq!(body["turn_count"], json!(1));
    assert_eq!(body["slots"]["region"], "Kaohsiung");
}

#[tokio::test]
async fn test_get_unknown_session() {
    let app = make_app();
    let resp = app.router().oneshot(get("/sessions/nope")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_delete_session() {
    let app = make_app();
    app.router()
        .oneshot(post_json("/chat", r#"{"message": "hi", "conversation_id": "d1"}"#))
        .await
        .unwrap();

    let delete = || Request::delete("/sessions/d1").body(Body::empty()).unwrap();

    let resp = app.router().oneshot(delete()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = app.router().oneshot(delete()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app.router().oneshot(get("/sessions/d1")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_route() {
    let app = make_app();
    let resp = app.router().oneshot(get("/nope")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Server startup
// =============================================================================

#[tokio::test]
async fn test_start_server_reports_taken_port() {
    let app = make_app();
    let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();

    let mut config = PremiaConfig::default();
    config.general.bind_address = "127.0.0.1".into();
    config.general.port = taken.local_addr().unwrap().port();
    let state = AppState {
        config: Arc::new(config),
        ..app.state.clone()
    };

    let err = start_server(state, async {}).await.unwrap_err();
    assert!(matches!(err, PremiaError::Api(_)));
    assert!(err.to_string().contains("Failed to bind"));
}

#[tokio::test]
async fn test_start_server_stops_on_shutdown() {
    let app = make_app();
    let mut config = PremiaConfig::default();
    config.general.bind_address = "127.0.0.1".into();
    config.general.port = 0;
    let state = AppState {
        config: Arc::new(config),
        ..app.state.clone()
    };

    let served = tokio::time::timeout(Duration::from_secs(5), start_server(state, async {})).await;
    assert!(matches!(served, Ok(Ok(()))));
}
