use axum::{
    extract::State,
    http::{header, Method},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::{ErrorRecord, MetricsSnapshot, ServiceMonitor, SystemMetrics, SystemSampler};
use crate::connections::{ConnectionManager, ConnectionSnapshot};
use crate::error::ErrorCategory;

/// Recent errors included in `/health`.
const HEALTH_RECENT_ERRORS: usize = 20;

pub struct MonitoringState {
    pub monitor: Arc<ServiceMonitor>,
    pub connections: Arc<ConnectionManager>,
    pub system: SystemSampler,
    pub backend: &'static str,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_seconds: f64,
    pub metrics: MetricsSnapshot,
    pub connections: ConnectionSnapshot,
    pub system: SystemMetrics,
    pub errors: ErrorSummary,
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorSummary {
    pub by_category: BTreeMap<ErrorCategory, u64>,
    pub recent: Vec<ErrorRecord>,
}

#[derive(Debug, Serialize)]
pub struct ProbeResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub backend: &'static str,
    pub host: String,
    pub port: u16,
    pub uptime_seconds: f64,
}

pub fn create_router(state: Arc<MonitoringState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health))
        .route("/health/live", get(live))
        .route("/health/ready", get(ready))
        .route("/metrics", get(metrics))
        .route("/info", get(info))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<Arc<MonitoringState>>) -> Json<HealthResponse> {
    let metrics = state.monitor.metrics();
    let connections = state.connections.snapshot();
    let system = state.system.sample();
    let warnings = health_warnings(&system, &metrics, &connections);

    Json(HealthResponse {
        status: if warnings.is_empty() { "healthy" } else { "degraded" },
        uptime_seconds: metrics.uptime_seconds,
        metrics,
        connections,
        system,
        errors: ErrorSummary {
            by_category: state.monitor.errors_by_category(),
            recent: state.monitor.recent_errors(HEALTH_RECENT_ERRORS),
        },
        warnings,
    })
}

/// Conditions that mark the service degraded. Empty means healthy.
fn health_warnings(
    system: &SystemMetrics,
    metrics: &MetricsSnapshot,
    connections: &ConnectionSnapshot,
) -> Vec<String> {
    let mut warnings = system.warnings();
    if metrics.errors_total > 0 {
        warnings.push("Recent synthesis errors detected".to_string());
    }
    if connections.active_connections >= connections.max_connections {
        warnings.push("Connection limit reached".to_string());
    }
    warnings
}

async fn live() -> Json<ProbeResponse> {
    Json(ProbeResponse { status: "live" })
}

// The backend is constructed before either server binds, so once this route
// answers the service can take requests.
async fn ready() -> Json<ProbeResponse> {
    Json(ProbeResponse { status: "ready" })
}

async fn metrics(State(state): State<Arc<MonitoringState>>) -> Json<MetricsSnapshot> {
    Json(state.monitor.metrics())
}

async fn info(State(state): State<Arc<MonitoringState>>) -> Json<InfoResponse> {
    Json(InfoResponse {
        service: "tts-service",
        version: env!("CARGO_PKG_VERSION"),
        backend: state.backend,
        host: state.host.clone(),
        port: state.port,
        uptime_seconds: state.monitor.uptime(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn state(max_connections: usize) -> Arc<MonitoringState> {
        Arc::new(MonitoringState {
            monitor: Arc::new(ServiceMonitor::new()),
            connections: Arc::new(ConnectionManager::new(max_connections)),
            system: SystemSampler::new(),
            backend: "kokoro",
            host: "0.0.0.0".to_string(),
            port: 9093,
        })
    }

    async fn get_json(state: Arc<MonitoringState>, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = create_router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn calm_system() -> SystemMetrics {
        SystemMetrics {
            cpu_percent: 5.0,
            memory_percent: 30.0,
            memory_available_gb: 12.0,
        }
    }

    #[test]
    fn test_no_warnings_when_idle() {
        let monitor = ServiceMonitor::new();
        let connections = ConnectionManager::new(5);
        let warnings =
            health_warnings(&calm_system(), &monitor.metrics(), &connections.snapshot());
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_errors_and_full_capacity_warn() {
        let monitor = ServiceMonitor::new();
        monitor.record_failure(&crate::error::AppError::MissingText);
        let connections = ConnectionManager::new(1);
        connections.add("a", None);

        let warnings =
            health_warnings(&calm_system(), &monitor.metrics(), &connections.snapshot());
        assert_eq!(
            warnings,
            vec!["Recent synthesis errors detected", "Connection limit reached"]
        );
    }

    #[test]
    fn test_system_pressure_warns() {
        let monitor = ServiceMonitor::new();
        let connections = ConnectionManager::new(5);
        let system = SystemMetrics {
            cpu_percent: 99.0,
            ..calm_system()
        };
        let warnings = health_warnings(&system, &monitor.metrics(), &connections.snapshot());
        assert_eq!(warnings, vec!["High CPU usage"]);
    }

    #[tokio::test]
    async fn test_health_reports_system_and_sessions() {
        let state = state(5);
        state.connections.add("abc", Some("127.0.0.1:9000".into()));
        let (status, body) = get_json(state, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["status"] == "healthy" || body["status"] == "degraded");
        assert!(body["system"]["cpu_percent"].is_number());
        assert!(body["system"]["memory_available_gb"].is_number());
        assert_eq!(body["connections"]["max_connections"], 5);
        assert_eq!(body["connections"]["sessions"][0]["session_id"], "abc");
    }

    #[tokio::test]
    async fn test_health_degrades_after_errors() {
        let state = state(5);
        state
            .monitor
            .record_failure(&crate::error::AppError::TtsError("boom".into()));
        let (_, body) = get_json(state, "/health").await;
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["metrics"]["errors_total"], 1);
        assert_eq!(body["errors"]["by_category"]["processing"], 1);
        assert_eq!(body["errors"]["recent"][0]["code"], "TTS_ERROR");
    }

    #[tokio::test]
    async fn test_probes() {
        let (_, live) = get_json(state(1), "/health/live").await;
        assert_eq!(live["status"], "live");
        let (_, ready) = get_json(state(1), "/health/ready").await;
        assert_eq!(ready["status"], "ready");
    }

    #[tokio::test]
    async fn test_metrics_and_info() {
        let state = state(1);
        state.monitor.record_request();
        let (_, metrics) = get_json(Arc::clone(&state), "/metrics").await;
        assert_eq!(metrics["requests_total"], 1);

        let (_, info) = get_json(state, "/info").await;
        assert_eq!(info["service"], "tts-service");
        assert_eq!(info["backend"], "kokoro");
        assert_eq!(info["port"], 9093);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let response = create_router(state(1))
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
