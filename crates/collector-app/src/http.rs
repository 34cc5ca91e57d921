use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use serde_json::json;

use field_catalog::{FieldDescriptor, DESCRIPTORS};
use poller_actor::{DevicePoller, LastError, Phase, PollerState};
use types::FieldValue;

use crate::registry::DeviceRegistry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<DeviceRegistry>,
    pub metrics: Option<PrometheusHandle>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/devices", get(list_devices))
        .route("/devices/:address", get(device_status))
        .route("/devices/:address/refresh", post(refresh_device))
        .route("/metrics", get(render_metrics))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct DeviceSummary {
    address: String,
    name: String,
    phase: Phase,
    fields_published: usize,
    last_success_ms: Option<u64>,
    last_error: Option<LastError>,
}

impl From<PollerState> for DeviceSummary {
    fn from(state: PollerState) -> Self {
        Self {
            address: state.identity.address,
            name: state.identity.name,
            phase: state.phase,
            fields_published: state.published.as_ref().map_or(0, |data| data.len()),
            last_success_ms: state.last_success_ms,
            last_error: state.last_error,
        }
    }
}

#[derive(Debug, Serialize)]
struct FieldStatus {
    #[serde(flatten)]
    descriptor: &'static FieldDescriptor,
    /// `null` until the field has been read successfully at least once.
    value: Option<FieldValue>,
}

#[derive(Debug, Serialize)]
struct DeviceStatus {
    address: String,
    name: String,
    phase: Phase,
    last_success_ms: Option<u64>,
    last_attempt_ms: Option<u64>,
    successes: u64,
    failures: u64,
    skipped: u64,
    last_error: Option<LastError>,
    fields: Vec<FieldStatus>,
}

impl From<PollerState> for DeviceStatus {
    fn from(state: PollerState) -> Self {
        let fields = DESCRIPTORS
            .iter()
            .map(|descriptor| FieldStatus {
                descriptor,
                value: state
                    .published
                    .as_ref()
                    .and_then(|data| data.get(descriptor.field))
                    .cloned(),
            })
            .collect();
        Self {
            address: state.identity.address,
            name: state.identity.name,
            phase: state.phase,
            last_success_ms: state.last_success_ms,
            last_attempt_ms: state.last_attempt_ms,
            successes: state.successes,
            failures: state.failures,
            skipped: state.skipped,
            last_error: state.last_error,
            fields,
        }
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn list_devices(State(state): State<AppState>) -> Json<Vec<DeviceSummary>> {
    Json(
        state
            .registry
            .iter()
            .map(|poller| DeviceSummary::from(poller.state()))
            .collect(),
    )
}

async fn device_status(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<DeviceStatus>, Response> {
    let poller = find_device(&state, &address)?;
    Ok(Json(DeviceStatus::from(poller.state())))
}

async fn refresh_device(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Response, Response> {
    let poller = find_device(&state, &address)?.clone();
    let outcome = poller.trigger().await;
    Ok(Json(outcome).into_response())
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics exporter disabled").into_response(),
    }
}

fn find_device<'a>(state: &'a AppState, address: &str) -> Result<&'a Arc<DevicePoller>, Response> {
    state.registry.get(address).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("unknown device {address}") })),
        )
            .into_response()
    })
}
