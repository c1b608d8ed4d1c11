use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use emr_core::models::{PharmacyQueueEntry, QueueStatus};
use emr_core::pharmacy::{ItemRequest, Pharmacy, QueueDispense};

use super::{parse_filter, require_actor, required};
use crate::errors::ApiResult;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_queue))
        .route("/:id", get(get_entry))
        .route("/:id/assign", post(assign))
        .route("/:id/ready", post(ready))
        .route("/:id/dispense", post(dispense))
        .route("/:id/cancel", post(cancel))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

/// Entries in service order: priority, then arrival.
async fn list_queue(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<PharmacyQueueEntry>>> {
    let status = parse_filter("status", query.status.as_deref(), QueueStatus::parse)?;
    let db = state.db()?;
    Ok(Json(db.list_queue(status)?))
}

async fn get_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<PharmacyQueueEntry>> {
    let db = state.db()?;
    Ok(Json(db.require_queue_entry(&id)?))
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub pharmacist: String,
}

async fn assign(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AssignRequest>,
) -> ApiResult<Json<PharmacyQueueEntry>> {
    let pharmacist = required("pharmacist", &body.pharmacist)?;
    let db = state.db()?;
    Ok(Json(Pharmacy::new(&db, state.publisher()).assign_to_me(&id, pharmacist)?))
}

async fn ready(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<PharmacyQueueEntry>> {
    let db = state.db()?;
    Ok(Json(Pharmacy::new(&db, state.publisher()).mark_ready(&id)?))
}

#[derive(Debug, Deserialize)]
pub struct DispenseRequest {
    pub items: Vec<ItemRequest>,
    pub performed_by: String,
}

async fn dispense(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<DispenseRequest>,
) -> ApiResult<Json<QueueDispense>> {
    let actor = require_actor(&body.performed_by)?;
    let db = state.db()?;
    let outcome = Pharmacy::new(&db, state.publisher()).dispense_items(&id, &body.items, actor)?;
    Ok(Json(outcome))
}

async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<PharmacyQueueEntry>> {
    let db = state.db()?;
    Ok(Json(Pharmacy::new(&db, state.publisher()).cancel_queue_entry(&id)?))
}
