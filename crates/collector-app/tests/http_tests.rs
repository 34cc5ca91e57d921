use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use collector_app::http::{router, AppState};
use collector_app::sink::MetricsSink;
use collector_app::DeviceRegistry;
use poller_actor::{ActorConfig, DataSource, DevicePoller, PollError};
use types::{DeviceIdentity, InverterItem, Snapshot};

/// Answers every poll with the same reading.
struct StaticSource {
    calls: AtomicUsize,
}

#[async_trait]
impl DataSource for StaticSource {
    async fn poll(&self) -> Result<Snapshot, PollError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![
            InverterItem::new("commonua", 230.4).with_unit("V"),
            InverterItem::new("total_yield", 5123.4).with_unit("kWh"),
            InverterItem::new("running_state", "Run"),
            InverterItem::new("not_in_catalog", 1.0),
        ]
        .into_iter()
        .collect())
    }
}

struct DownSource;

#[async_trait]
impl DataSource for DownSource {
    async fn poll(&self) -> Result<Snapshot, PollError> {
        Err(PollError::Connection("connection refused".into()))
    }
}

fn app(source: Arc<dyn DataSource>) -> Router {
    let mut registry = DeviceRegistry::default();
    registry.insert(Arc::new(DevicePoller::new(
        DeviceIdentity::new("192.168.1.50", Some("Roof".to_string())),
        source,
        Arc::new(MetricsSink),
        ActorConfig {
            poll_interval: Duration::from_secs(60),
            request_timeout: Duration::from_millis(500),
            setup_retry: Duration::from_secs(60),
        },
    )));
    router(AppState {
        registry: Arc::new(registry),
        metrics: None,
    })
}

fn healthy_app() -> Router {
    app(Arc::new(StaticSource {
        calls: AtomicUsize::new(0),
    }))
}

async fn send(app: &Router, method: Method, uri: &str) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    (status, body.to_vec())
}

async fn send_json(app: &Router, method: Method, uri: &str) -> (StatusCode, Value) {
    let (status, body) = send(app, method, uri).await;
    (status, serde_json::from_slice(&body).expect("json body"))
}

fn field<'a>(status: &'a Value, key: &str) -> &'a Value {
    status["fields"]
        .as_array()
        .expect("fields")
        .iter()
        .find(|entry| entry["field"] == key)
        .expect("field entry")
}

#[tokio::test]
async fn health_reports_ok() {
    let app = healthy_app();
    let (status, body) = send(&app, Method::GET, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
}

#[tokio::test]
async fn lists_configured_devices() {
    let app = healthy_app();
    let (status, body) = send_json(&app, Method::GET, "/devices").await;
    assert_eq!(status, StatusCode::OK);

    let devices = body.as_array().expect("array");
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0]["address"], "192.168.1.50");
    assert_eq!(devices[0]["name"], "Roof");
    assert_eq!(devices[0]["phase"], "pending");
    assert_eq!(devices[0]["fields_published"], 0);
}

#[tokio::test]
async fn unknown_device_is_not_found() {
    let app = healthy_app();
    let (status, body) = send_json(&app, Method::GET, "/devices/10.9.9.9").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"]
        .as_str()
        .expect("error message")
        .contains("10.9.9.9"));

    let (status, _) = send(&app, Method::POST, "/devices/10.9.9.9/refresh").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn fields_are_null_before_first_poll() {
    let app = healthy_app();
    let (status, body) = send_json(&app, Method::GET, "/devices/192.168.1.50").await;
    assert_eq!(status, StatusCode::OK);

    let fields = body["fields"].as_array().expect("fields");
    assert_eq!(fields.len(), 17);
    assert!(fields.iter().all(|entry| entry["value"].is_null()));

    let voltage = field(&body, "commonua");
    assert_eq!(voltage["unit"], "V");
    assert_eq!(voltage["device_class"], "voltage");
}

#[tokio::test]
async fn refresh_publishes_and_status_shows_values() {
    let app = healthy_app();
    let (status, outcome) = send_json(&app, Method::POST, "/devices/192.168.1.50/refresh").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["outcome"], "published");
    assert_eq!(outcome["fields"], 3);

    let (_, body) = send_json(&app, Method::GET, "/devices/192.168.1.50").await;
    assert_eq!(body["phase"], "active");
    assert_eq!(body["successes"], 1);
    assert_eq!(field(&body, "commonua")["value"], 230.4);
    assert_eq!(field(&body, "running_state")["value"], "Run");
    assert!(field(&body, "bus_voltage")["value"].is_null());
}

#[tokio::test]
async fn failed_refresh_is_reported_on_status() {
    let app = app(Arc::new(DownSource));
    let (status, outcome) = send_json(&app, Method::POST, "/devices/192.168.1.50/refresh").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["outcome"], "failed");
    assert_eq!(outcome["kind"], "connection");

    let (_, body) = send_json(&app, Method::GET, "/devices/192.168.1.50").await;
    assert_eq!(body["phase"], "setup_failed");
    assert_eq!(body["last_error"]["kind"], "connection");
    assert_eq!(body["failures"], 1);
}

#[tokio::test]
async fn metrics_route_without_exporter_is_not_found() {
    let app = healthy_app();
    let (status, _) = send(&app, Method::GET, "/metrics").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
