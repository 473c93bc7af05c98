//! API Routes
//!
//! HTTP endpoints: the host-echoing greeting, the peer registry, name
//! table inspection, health and metrics.

use axum::{
    extract::{Host, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::Metrics;
use crate::config::Config;
use crate::names::NameTable;
use crate::registry::PeerRegistry;
use crate::supervisor::SupervisorState;

/// Shared API state
pub struct ApiState {
    pub table: Arc<RwLock<NameTable>>,
    pub peers: Arc<RwLock<PeerRegistry>>,
    pub metrics: Arc<Metrics>,
    pub lifecycle: Arc<RwLock<SupervisorState>>,
}

/// Run the HTTP responder
pub async fn run_api_server(
    config: Arc<Config>,
    table: Arc<RwLock<NameTable>>,
    peers: Arc<RwLock<PeerRegistry>>,
    metrics: Arc<Metrics>,
    lifecycle: Arc<RwLock<SupervisorState>>,
) -> anyhow::Result<()> {
    let state = Arc::new(ApiState {
        table,
        peers,
        metrics,
        lifecycle,
    });

    let app = router(state);

    let addr = SocketAddr::new(config.http_listen, config.http_port);
    info!("📊 HTTP responder listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        // Greeting
        .route("/", get(greeting))

        // Peer registry
        .route("/peers", get(list_peers).post(register_peer))

        // Name table
        .route("/names", get(get_names))

        // Health & Status
        .route("/health", get(health_check))
        .route("/status", get(get_status))

        // Metrics
        .route("/metrics", get(get_metrics_prometheus))
        .route("/metrics/json", get(get_metrics_json))

        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET / - Greeting that echoes the request's host header
async fn greeting(Host(host): Host, State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    state.metrics.inc_http_requests();
    format!("Hello from {}!\n", host)
}

/// GET /peers - Registered peer addresses
async fn list_peers(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    state.metrics.inc_http_requests();

    let peers = state.peers.read().await;
    Json(peers.list())
}

/// Request body for peer registration
#[derive(Debug, Deserialize)]
struct RegisterPeer {
    addr: String,
}

/// POST /peers - Register a peer address
async fn register_peer(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<RegisterPeer>,
) -> impl IntoResponse {
    state.metrics.inc_http_requests();

    state.peers.write().await.add(req.addr);
    state.metrics.inc_peers_registered();

    StatusCode::CREATED
}

/// GET /names - Name table contents
async fn get_names(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    state.metrics.inc_http_requests();

    let table = state.table.read().await;
    Json(serde_json::json!({
        "zone": table.zone(),
        "wildcard": table.wildcard(),
        "records": table.records(),
    }))
}

/// GET /health - Simple health check
async fn health_check() -> impl IntoResponse {
    "OK"
}

/// GET /status - Service status
async fn get_status(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let table = state.table.read().await;
    let peers = state.peers.read().await;
    let lifecycle = state.lifecycle.read().await;

    let status = serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.metrics.uptime_secs(),
        "lifecycle": *lifecycle,
        "zone": table.zone(),
        "names": table.len(),
        "peers": peers.count(),
    });

    Json(status)
}

/// GET /metrics - Prometheus format metrics
async fn get_metrics_prometheus(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.metrics.to_prometheus(),
    )
}

/// GET /metrics/json - JSON format metrics
async fn get_metrics_json(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(state.metrics.to_json())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use std::net::Ipv4Addr;
    use tower::ServiceExt;

    use crate::names::NameRecord;

    fn test_router() -> Router {
        let records = vec![NameRecord {
            name: "example.p2p.".to_string(),
            address: Ipv4Addr::new(127, 0, 0, 1),
        }];
        let state = Arc::new(ApiState {
            table: Arc::new(RwLock::new(NameTable::new("p2p", &records, None))),
            peers: Arc::new(RwLock::new(PeerRegistry::new())),
            metrics: Arc::new(Metrics::new()),
            lifecycle: Arc::new(RwLock::new(SupervisorState::Running)),
        });
        router(state)
    }

    async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn test_greeting_echoes_host() {
        let app = test_router();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("host", "example.p2p")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"Hello from example.p2p!\n");
    }

    #[tokio::test]
    async fn test_peers_round_trip() {
        let app = test_router();

        // Initially empty
        let response = app
            .clone()
            .oneshot(Request::builder().uri("/peers").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let peers: Vec<String> = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert!(peers.is_empty());

        // Register one
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/peers")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"addr":"peer1"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        // And read it back
        let response = app
            .oneshot(Request::builder().uri("/peers").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let peers: Vec<String> = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(peers, vec!["peer1".to_string()]);
    }

    #[tokio::test]
    async fn test_register_peer_rejects_bad_body() {
        let app = test_router();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/peers")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_names_lists_the_table() {
        let app = test_router();

        let response = app
            .oneshot(Request::builder().uri("/names").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let names: serde_json::Value =
            serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(names["zone"], "p2p");
        assert_eq!(names["records"][0]["name"], "example.p2p.");
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = test_router();

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"OK");
    }

    #[tokio::test]
    async fn test_status_reports_lifecycle() {
        let app = test_router();

        let response = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status: serde_json::Value =
            serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(status["status"], "healthy");
        assert_eq!(status["lifecycle"], "running");
        assert_eq!(status["names"], 1);
    }
}
