use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use olympus_shared::database::ConnectionPool;
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use std::time::SystemTime;

#[derive(Clone)]
pub struct HealthState {
    pub db: Arc<ConnectionPool>,
}

#[derive(Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub database: ComponentStatus,
}

#[derive(Serialize)]
pub struct ComponentStatus {
    pub status: &'static str,
    pub latency_ms: Option<f64>,
}

static START_TIME: OnceLock<SystemTime> = OnceLock::new();

pub fn init() {
    START_TIME.get_or_init(SystemTime::now);
}

fn uptime_seconds() -> u64 {
    START_TIME
        .get()
        .and_then(|start| SystemTime::now().duration_since(*start).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub async fn health_check(State(state): State<HealthState>) -> impl IntoResponse {
    let start = std::time::Instant::now();
    let db_status = match state.db.health_check().await {
        Ok(true) => ComponentStatus {
            status: "operational",
            latency_ms: Some(start.elapsed().as_secs_f64() * 1000.0),
        },
        _ => ComponentStatus {
            status: "degraded",
            latency_ms: None,
        },
    };

    let overall = if db_status.status == "operational" {
        "healthy"
    } else {
        "degraded"
    };

    let report = HealthReport {
        status: overall,
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: uptime_seconds(),
        database: db_status,
    };

    let code = if overall == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (code, Json(report))
}

pub async fn readiness_check(State(state): State<HealthState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(true) => (StatusCode::OK, Json(serde_json::json!({ "ready": true }))),
        _ => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "ready": false })),
        ),
    }
}

pub async fn liveness_check() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "alive": true })))
}
