// tests/monitor_cycle_tests.rs
//
// Drives full poll cycles against mock Ozon and Telegram HTTP servers and
// checks the fetch -> normalize -> diff -> notify -> heartbeat pipeline.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use ozon_price_monitor::heartbeat::evaluate_heartbeat;
use ozon_price_monitor::monitor::run_poll_cycle;
use ozon_price_monitor::ozon_client::OzonClient;
use ozon_price_monitor::state::MonitorState;
use ozon_price_monitor::telegram::TelegramClient;
use ozon_price_monitor::config::Settings;

#[derive(Clone, Default)]
struct VendorState {
    price_calls: Arc<AtomicUsize>,
    price_requests: Arc<Mutex<Vec<Value>>>,
}

async fn vendor_list(Json(_body): Json<Value>) -> Json<Value> {
    Json(json!({
        "result": {
            "items": [
                {"offer_id": "A", "product_id": 11},
                {"offer_id": "B", "product_id": 22},
            ],
            "last_id": "",
        }
    }))
}

/// First call prices offer A at marketing 90, subsequent calls at 80.
/// Offer B never changes.
async fn vendor_prices(
    State(state): State<VendorState>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let call = state.price_calls.fetch_add(1, Ordering::SeqCst);
    state.price_requests.lock().await.push(body);

    let marketing_a = if call == 0 { 90 } else { 80 };
    Json(json!({
        "items": [
            {
                "offer_id": "A",
                "product_id": 11,
                "price": {"price": 100, "old_price": 150, "marketing_price": marketing_a},
            },
            {
                "offer_id": "B",
                "product_id": 22,
                "price": {"price": "250", "old_price": 0, "marketing_price": null},
            },
        ]
    }))
}

/// Listing with no offer_id on the only item; pricing keyed by product_id.
#[derive(Clone, Default)]
struct ProductIdVendorState {
    price_requests: Arc<Mutex<Vec<Value>>>,
}

async fn vendor_list_product_only(Json(_body): Json<Value>) -> Json<Value> {
    Json(json!({
        "result": {
            "items": [
                {"offer_id": "", "product_id": 33},
            ],
            "last_id": "",
        }
    }))
}

async fn vendor_prices_product_only(
    State(state): State<ProductIdVendorState>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.price_requests.lock().await.push(body);
    Json(json!({
        "items": [
            {
                "offer_id": "",
                "product_id": 33,
                "price": {"price": 500, "old_price": 0, "marketing_price": 0},
            },
        ]
    }))
}

async fn vendor_list_failing() -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "{\"message\":\"internal error\"}".to_string(),
    )
}

#[derive(Clone, Default)]
struct TelegramCapture {
    sent: Arc<Mutex<Vec<Value>>>,
}

async fn telegram_send(
    State(capture): State<TelegramCapture>,
    Json(body): Json<Value>,
) -> Json<Value> {
    capture.sent.lock().await.push(body);
    Json(json!({"ok": true, "result": {}}))
}

async fn telegram_send_failing() -> (StatusCode, String) {
    (
        StatusCode::BAD_GATEWAY,
        "{\"ok\":false,\"description\":\"upstream unavailable\"}".to_string(),
    )
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", addr)
}

async fn spawn_vendor(state: VendorState) -> String {
    let app = Router::new()
        .route("/v3/product/list", post(vendor_list))
        .route("/v5/product/info/prices", post(vendor_prices))
        .with_state(state);
    serve(app).await
}

async fn spawn_failing_vendor() -> String {
    let app = Router::new().route("/v3/product/list", post(vendor_list_failing));
    serve(app).await
}

async fn spawn_telegram(capture: TelegramCapture) -> String {
    let app = Router::new()
        .route("/:bot/sendMessage", post(telegram_send))
        .with_state(capture);
    serve(app).await
}

async fn spawn_failing_telegram() -> String {
    let app = Router::new().route("/:bot/sendMessage", post(telegram_send_failing));
    serve(app).await
}

fn test_settings() -> Settings {
    Settings {
        tg_token: "test-token".to_string(),
        admin_ids: vec![1001],
        ozon_client_id: "client".to_string(),
        ozon_api_key: "key".to_string(),
        heartbeat_threshold: Duration::from_secs(600),
        heartbeat_chat_id: Some(1001),
        monitor_offer_ids: Vec::new(),
        monitor_product_ids: Vec::new(),
        poll_period: Duration::from_secs(300),
    }
}

fn build_state(settings: Settings, vendor_url: &str, telegram_url: &str) -> MonitorState {
    let ozon = OzonClient::with_base_url(&settings.ozon_client_id, &settings.ozon_api_key, vendor_url);
    let telegram = TelegramClient::with_base_url(&settings.tg_token, telegram_url);
    MonitorState::with_clients(settings, ozon, telegram)
}

#[tokio::test]
async fn test_first_cycle_stores_prices_without_alerting() {
    let vendor = VendorState::default();
    let capture = TelegramCapture::default();
    let vendor_url = spawn_vendor(vendor).await;
    let telegram_url = spawn_telegram(capture.clone()).await;
    let state = build_state(test_settings(), &vendor_url, &telegram_url);

    let events = run_poll_cycle(&state).await.expect("cycle should succeed");
    assert!(events.is_empty(), "cold start must not emit events");
    assert!(capture.sent.lock().await.is_empty(), "no alert expected");

    let detector = state.prices.lock().await;
    assert_eq!(detector.last_price("A"), Some(90));
    assert_eq!(detector.last_price("B"), Some(250));
}

#[tokio::test]
async fn test_price_change_emits_exactly_one_alert() {
    let vendor = VendorState::default();
    let capture = TelegramCapture::default();
    let vendor_url = spawn_vendor(vendor).await;
    let telegram_url = spawn_telegram(capture.clone()).await;
    let state = build_state(test_settings(), &vendor_url, &telegram_url);

    run_poll_cycle(&state).await.expect("first cycle");
    let events = run_poll_cycle(&state).await.expect("second cycle");

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].offer_id, "A");
    assert_eq!(events[0].old_price, 90);
    assert_eq!(events[0].new_price, 80);

    let sent = capture.sent.lock().await;
    assert_eq!(sent.len(), 1, "exactly one aggregated alert message");
    let text = sent[0]["text"].as_str().unwrap_or_default();
    assert!(text.contains("A"));
    assert!(text.contains("90"));
    assert!(text.contains("80"));
    assert_eq!(sent[0]["chat_id"].as_i64(), Some(1001));

    // heartbeat recorded both successful cycles
    let hb = state.heartbeat.lock().await;
    assert!(hb.last_cycle_at().is_some());
}

#[tokio::test]
async fn test_repeat_price_does_not_realert() {
    let vendor = VendorState::default();
    let capture = TelegramCapture::default();
    let vendor_url = spawn_vendor(vendor).await;
    let telegram_url = spawn_telegram(capture.clone()).await;
    let state = build_state(test_settings(), &vendor_url, &telegram_url);

    run_poll_cycle(&state).await.expect("first cycle");
    run_poll_cycle(&state).await.expect("second cycle");
    // third cycle sees 80 again: no new events
    let events = run_poll_cycle(&state).await.expect("third cycle");
    assert!(events.is_empty());
    assert_eq!(capture.sent.lock().await.len(), 1);
}

#[tokio::test]
async fn test_vendor_500_short_circuits_cycle() {
    let capture = TelegramCapture::default();
    let vendor_url = spawn_failing_vendor().await;
    let telegram_url = spawn_telegram(capture.clone()).await;
    let state = build_state(test_settings(), &vendor_url, &telegram_url);

    let result = run_poll_cycle(&state).await;
    assert!(result.is_err(), "failed listing must abandon the cycle");

    // heartbeat untouched so silence detection can eventually fire
    let hb = state.heartbeat.lock().await;
    assert!(hb.last_cycle_at().is_none());
    assert!(capture.sent.lock().await.is_empty());
}

#[tokio::test]
async fn test_listing_without_offer_id_is_priced_by_product_id() {
    let vendor = ProductIdVendorState::default();
    let capture = TelegramCapture::default();
    let vendor_app = Router::new()
        .route("/v3/product/list", post(vendor_list_product_only))
        .route("/v5/product/info/prices", post(vendor_prices_product_only))
        .with_state(vendor.clone());
    let vendor_url = serve(vendor_app).await;
    let telegram_url = spawn_telegram(capture).await;
    let state = build_state(test_settings(), &vendor_url, &telegram_url);

    run_poll_cycle(&state).await.expect("cycle");

    let requests = vendor.price_requests.lock().await;
    assert_eq!(requests.len(), 1);
    let requested: Vec<i64> = requests[0]["filter"]["product_id"]
        .as_array()
        .expect("product_id filter")
        .iter()
        .filter_map(|v| v.as_i64())
        .collect();
    assert_eq!(requested, vec![33]);

    // the record keys into price state under the numeric id
    let detector = state.prices.lock().await;
    assert_eq!(detector.last_price("33"), Some(500));
}

#[tokio::test]
async fn test_silence_alert_fires_once_then_throttles() {
    let capture = TelegramCapture::default();
    let vendor_url = spawn_failing_vendor().await;
    let telegram_url = spawn_telegram(capture.clone()).await;

    let mut settings = test_settings();
    settings.heartbeat_threshold = Duration::from_millis(100);
    settings.heartbeat_chat_id = Some(777);
    let state = build_state(settings, &vendor_url, &telegram_url);

    // let the silence window lapse without any activity
    tokio::time::sleep(Duration::from_millis(250)).await;

    assert!(evaluate_heartbeat(&state).await, "silence should be detected");
    {
        let sent = capture.sent.lock().await;
        assert_eq!(sent.len(), 1, "exactly one silence alert");
        assert_eq!(sent[0]["chat_id"].as_i64(), Some(777));
        let text = sent[0]["text"].as_str().unwrap_or_default();
        assert!(text.contains("silent"), "alert text: {}", text);
    }

    // the alert touch reset the window, so the next evaluation is quiet
    assert!(!evaluate_heartbeat(&state).await);
    assert_eq!(capture.sent.lock().await.len(), 1);

    let hb = state.heartbeat.lock().await;
    let snapshot = hb.snapshot(chrono::Utc::now());
    assert!(snapshot.last_alert_at.is_some());
}

#[tokio::test]
async fn test_silence_alert_delivery_failure_is_swallowed() {
    let vendor_url = spawn_failing_vendor().await;
    let telegram_url = spawn_failing_telegram().await;

    let mut settings = test_settings();
    settings.heartbeat_threshold = Duration::from_millis(100);
    settings.heartbeat_chat_id = Some(777);
    let state = build_state(settings, &vendor_url, &telegram_url);

    tokio::time::sleep(Duration::from_millis(250)).await;

    let before = {
        let hb = state.heartbeat.lock().await;
        hb.last_activity()
    };

    // must not panic, and the failed attempt still resets the window
    assert!(evaluate_heartbeat(&state).await);

    let hb = state.heartbeat.lock().await;
    assert!(hb.last_activity() > before, "touch must follow a failed delivery");
    assert!(hb.snapshot(chrono::Utc::now()).last_alert_at.is_some());
}

#[tokio::test]
async fn test_offer_allow_list_filters_price_requests() {
    let vendor = VendorState::default();
    let capture = TelegramCapture::default();
    let vendor_url = spawn_vendor(vendor.clone()).await;
    let telegram_url = spawn_telegram(capture).await;

    let mut settings = test_settings();
    settings.monitor_offer_ids = vec!["A".to_string()];
    let state = build_state(settings, &vendor_url, &telegram_url);

    run_poll_cycle(&state).await.expect("cycle");

    let requests = vendor.price_requests.lock().await;
    assert_eq!(requests.len(), 1);
    let requested: Vec<&str> = requests[0]["filter"]["offer_id"]
        .as_array()
        .expect("offer_id filter")
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert_eq!(requested, vec!["A"]);
}
