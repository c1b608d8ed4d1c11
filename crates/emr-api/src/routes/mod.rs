//! HTTP routes, mounted under `/api`.

use axum::Router;
use serde::Deserialize;

use crate::errors::{ApiError, ApiResult};
use crate::state::AppState;

pub mod batches;
pub mod events;
pub mod inventory;
pub mod medications;
pub mod patients;
pub mod prescriptions;
pub mod queue;
pub mod visits;

pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/medications", medications::router())
        .nest("/batches", batches::router())
        .nest("/inventory", inventory::router())
        .nest("/prescriptions", prescriptions::router())
        .nest("/prescription-items", prescriptions::item_router())
        .nest("/pharmacy-queue", queue::router())
        .nest("/patients", patients::router())
        .nest("/visits", visits::router())
        .merge(events::router())
}

/// Who performed a stock-moving action.
#[derive(Debug, Deserialize)]
pub struct Actor {
    pub performed_by: String,
}

pub(crate) fn require_actor(performed_by: &str) -> ApiResult<&str> {
    required("performed_by", performed_by)
}

pub(crate) fn required<'a>(name: &str, value: &'a str) -> ApiResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::BadRequest(format!("{name} is required")));
    }
    Ok(value)
}

/// Parse an optional enum filter from a query string.
pub(crate) fn parse_filter<T>(
    name: &str,
    raw: Option<&str>,
    parse: impl Fn(&str) -> Option<T>,
) -> ApiResult<Option<T>> {
    match raw {
        None => Ok(None),
        Some(value) => parse(value)
            .map(Some)
            .ok_or_else(|| ApiError::BadRequest(format!("unknown {name} '{value}'"))),
    }
}
