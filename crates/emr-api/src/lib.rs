//! # EMR API
//!
//! JSON over HTTP for the pharmacy backend in `emr-core`.
//!
//! ```text
//! ┌──────────────┐   ┌────────────────┐   ┌─────────────────────┐
//! │ axum routes  │──▶│ Pharmacy /     │──▶│ Database (SQLite)   │
//! │ /api/...     │   │ Inventory      │   │ behind Arc<Mutex<>> │
//! └──────────────┘   └───────┬────────┘   └─────────────────────┘
//!                            │ publish
//!                    ┌───────▼────────┐
//!                    │ broadcast ──▶  │ GET /api/events (SSE)
//!                    └────────────────┘
//! ```

pub mod config;
pub mod errors;
pub mod routes;
pub mod state;
pub mod telemetry;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use state::AppState;

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Build the full application router.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api", routes::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
