use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use emr_core::inventory::{Inventory, StockChange};
use emr_core::models::MedicationBatch;

use super::require_actor;
use crate::errors::ApiResult;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:id", get(get_batch))
        .route("/:id/adjust", post(adjust))
        .route("/:id/return", post(return_tablets))
        .route("/:id/recall", post(recall))
}

async fn get_batch(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<MedicationBatch>> {
    let db = state.db()?;
    Ok(Json(db.require_batch(&id)?))
}

#[derive(Debug, Deserialize)]
pub struct AdjustRequest {
    /// Counted tablets left in the batch
    pub remaining_tablets: u32,
    pub reason: String,
    pub performed_by: String,
}

async fn adjust(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AdjustRequest>,
) -> ApiResult<Json<StockChange>> {
    let actor = require_actor(&body.performed_by)?;
    let db = state.db()?;
    let change =
        Inventory::new(&db).adjust_batch(&id, body.remaining_tablets, &body.reason, actor)?;
    Ok(Json(change))
}

#[derive(Debug, Deserialize)]
pub struct ReturnRequest {
    pub quantity: u32,
    pub reason: String,
    pub performed_by: String,
}

async fn return_tablets(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ReturnRequest>,
) -> ApiResult<Json<StockChange>> {
    let actor = require_actor(&body.performed_by)?;
    let db = state.db()?;
    let change = Inventory::new(&db).return_to_batch(&id, body.quantity, &body.reason, actor)?;
    Ok(Json(change))
}

#[derive(Debug, Deserialize)]
pub struct RecallRequest {
    pub reason: String,
    pub performed_by: String,
}

async fn recall(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RecallRequest>,
) -> ApiResult<Json<StockChange>> {
    let actor = require_actor(&body.performed_by)?;
    let db = state.db()?;
    Ok(Json(Inventory::new(&db).recall_batch(&id, &body.reason, actor)?))
}
