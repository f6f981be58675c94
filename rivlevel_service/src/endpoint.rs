/// HTTP status endpoint
///
/// Serves the daemon's most recent cycle to external displays.
///
/// Endpoints:
/// - GET /status - Latest levels, flood actions and the projected level
/// - GET /health - Service health check

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use crate::alert::thresholds::FloodAction;
use crate::logging::{self, DataSource};

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Snapshot of the latest scrape and publish cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub generated_at: DateTime<Utc>,
    pub gauges: Vec<GaugeStatus>,
    pub projection: Option<ProjectionStatus>,
    /// Last status message built, published or not
    pub message: Option<String>,
    pub duplicates: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaugeStatus {
    pub name: String,
    pub level_ft: Option<f64>,
    pub observed_at: Option<DateTime<Utc>>,
    pub action: Option<FloodAction>,
    pub highest_forecast_ft: Option<f64>,
    pub scrape_date: Option<DateTime<Utc>>,
    pub scrape_date_degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionStatus {
    pub location: String,
    pub target_mile: f64,
    pub level_ft: f64,
}

/// Shared between the daemon (writer) and the endpoint thread (reader).
pub type SharedStatus = Arc<Mutex<Option<StatusSnapshot>>>;

pub fn shared_status() -> SharedStatus {
    Arc::new(Mutex::new(None))
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Maps a request path to a status code and JSON body.
pub fn route(url: &str, status: &SharedStatus) -> (u16, serde_json::Value) {
    let path = url.split('?').next().unwrap_or(url);
    match path {
        "/health" => (
            200,
            serde_json::json!({
                "status": "ok",
                "service": "rivlevel_service",
                "version": env!("CARGO_PKG_VERSION")
            }),
        ),
        "/status" => handle_status(status),
        _ => (
            404,
            serde_json::json!({
                "error": "Not found",
                "available_endpoints": ["/health", "/status"]
            }),
        ),
    }
}

fn handle_status(status: &SharedStatus) -> (u16, serde_json::Value) {
    let snapshot = match status.lock() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    };
    match snapshot {
        Some(snapshot) => match serde_json::to_value(&snapshot) {
            Ok(body) => (200, body),
            Err(e) => (500, serde_json::json!({ "error": e.to_string() })),
        },
        None => (
            503,
            serde_json::json!({ "error": "No scrape cycle has completed yet" }),
        ),
    }
}

// ---------------------------------------------------------------------------
// HTTP Server
// ---------------------------------------------------------------------------

/// Start HTTP endpoint server on the specified port. Blocks for the life of
/// the server.
pub fn start_endpoint_server(port: u16, status: SharedStatus) -> Result<(), String> {
    let server = tiny_http::Server::http(format!("0.0.0.0:{}", port))
        .map_err(|e| format!("Failed to start HTTP server: {}", e))?;

    logging::info(
        DataSource::System,
        None,
        &format!("HTTP endpoint listening on http://0.0.0.0:{} (/status, /health)", port),
    );

    for request in server.incoming_requests() {
        let (code, body) = route(request.url(), &status);
        if let Err(e) = request.respond(create_response(code, &body)) {
            logging::warn(DataSource::System, None, &format!("Failed to send response: {}", e));
        }
    }

    Ok(())
}

/// Create HTTP response with JSON body
fn create_response(
    status_code: u16,
    json: &serde_json::Value,
) -> tiny_http::Response<std::io::Cursor<Vec<u8>>> {
    let body = serde_json::to_string_pretty(json).unwrap_or_else(|_| json.to_string());
    let mut response = tiny_http::Response::from_data(body.into_bytes())
        .with_status_code(tiny_http::StatusCode::from(status_code));
    if let Ok(header) = tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        response = response.with_header(header);
    }
    response
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
