//! HTTP adapter for the gateway — metrics feed and live dashboard.
//!
//! A thin request→snapshot bridge: `/metrics` serialises the gateway's
//! current [`MetricsSnapshot`], `/` serves the embedded dashboard, and
//! everything else is a 404. The snapshot call takes the gateway lock
//! briefly; the ingest path is never blocked for longer than one copy.

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use serde::Serialize;

use edgespike_core::Gateway;

const DASHBOARD_HTML: &str = include_str!("dashboard.html");

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_body(message: &str) -> String {
    serde_json::to_string(&ErrorBody {
        error: message.to_string(),
    })
    .unwrap_or_else(|_| r#"{"error":"metrics snapshot failed"}"#.to_string())
}

async fn handle_metrics(State(gateway): State<Arc<Gateway>>) -> Response {
    let snapshot = gateway.snapshot_metrics();
    match serde_json::to_string(&snapshot) {
        Ok(body) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/json"),
                (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            ],
            body,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "application/json")],
            error_body(&e.to_string()),
        )
            .into_response(),
    }
}

async fn handle_index() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

async fn handle_not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}

/// Build the axum router.
fn build_router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route("/metrics", get(handle_metrics))
        .fallback(handle_not_found)
        .with_state(gateway)
}

/// Run the dashboard/metrics server until the process ends. A bind
/// failure surfaces as the returned error; callers treat it as fatal.
pub async fn run_server(gateway: Arc<Gateway>, host: &str, port: u16) -> std::io::Result<()> {
    let app = build_router(gateway);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await
}
