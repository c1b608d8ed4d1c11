use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use emr_core::models::{PharmacyQueueEntry, Prescription, PrescriptionStatus, Priority};
use emr_core::pharmacy::{
    DrugInteraction, ItemDispense, NewPrescription, NewPrescriptionItem, Pharmacy,
    PrescriptionSummary, SubstituteSuggestion,
};

use super::{parse_filter, require_actor};
use crate::errors::ApiResult;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_prescriptions).post(create_prescription))
        .route("/:id", get(get_prescription))
        .route("/:id/items", post(add_item))
        .route("/:id/refresh", post(refresh_availability))
        .route("/:id/cancel", post(cancel))
        .route("/:id/interactions", get(interactions))
        .route("/:id/summary", get(summary))
        .route("/:id/queue", post(enqueue))
}

/// Routes addressed by prescription item id.
pub fn item_router() -> Router<AppState> {
    Router::new()
        .route("/:id/substitutes", get(substitutes))
        .route("/:id/substitute", post(substitute))
        .route("/:id/dispense", post(dispense_item))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub patient_id: Option<String>,
    pub status: Option<String>,
}

async fn list_prescriptions(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Prescription>>> {
    let status = parse_filter("status", query.status.as_deref(), PrescriptionStatus::parse)?;
    let db = state.db()?;
    Ok(Json(db.list_prescriptions(query.patient_id.as_deref(), status)?))
}

async fn create_prescription(
    State(state): State<AppState>,
    Json(body): Json<NewPrescription>,
) -> ApiResult<(StatusCode, Json<Prescription>)> {
    let db = state.db()?;
    let prescription = Pharmacy::new(&db, state.publisher()).create_prescription(body)?;
    Ok((StatusCode::CREATED, Json(prescription)))
}

async fn get_prescription(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Prescription>> {
    let db = state.db()?;
    Ok(Json(db.require_prescription(&id)?))
}

async fn add_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<NewPrescriptionItem>,
) -> ApiResult<Json<Prescription>> {
    let db = state.db()?;
    Ok(Json(Pharmacy::new(&db, state.publisher()).add_item(&id, body)?))
}

async fn refresh_availability(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Prescription>> {
    let db = state.db()?;
    Ok(Json(Pharmacy::new(&db, state.publisher()).refresh_availability(&id)?))
}

async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Prescription>> {
    let db = state.db()?;
    Ok(Json(Pharmacy::new(&db, state.publisher()).cancel_prescription(&id)?))
}

async fn interactions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<DrugInteraction>>> {
    let db = state.db()?;
    Ok(Json(Pharmacy::new(&db, state.publisher()).prescription_interactions(&id)?))
}

async fn summary(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<PrescriptionSummary>> {
    let db = state.db()?;
    Ok(Json(Pharmacy::new(&db, state.publisher()).prescription_summary(&id)?))
}

#[derive(Debug, Default, Deserialize)]
pub struct EnqueueRequest {
    #[serde(default)]
    pub priority: Priority,
}

async fn enqueue(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<EnqueueRequest>,
) -> ApiResult<(StatusCode, Json<PharmacyQueueEntry>)> {
    let db = state.db()?;
    let entry = Pharmacy::new(&db, state.publisher()).enqueue(&id, body.priority)?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn substitutes(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> ApiResult<Json<Vec<SubstituteSuggestion>>> {
    let db = state.db()?;
    Ok(Json(Pharmacy::new(&db, state.publisher()).suggest_substitutes(&item_id)?))
}

#[derive(Debug, Deserialize)]
pub struct SubstituteRequest {
    pub substitute_medication_id: String,
    pub reason: String,
    pub performed_by: String,
}

async fn substitute(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
    Json(body): Json<SubstituteRequest>,
) -> ApiResult<Json<Prescription>> {
    let actor = require_actor(&body.performed_by)?;
    let db = state.db()?;
    let prescription = Pharmacy::new(&db, state.publisher()).substitute_item(
        &item_id,
        &body.substitute_medication_id,
        &body.reason,
        actor,
    )?;
    Ok(Json(prescription))
}

#[derive(Debug, Deserialize)]
pub struct DispenseItemRequest {
    /// Defaults to the prescribed quantity
    #[serde(default)]
    pub quantity: Option<u32>,
    pub performed_by: String,
}

async fn dispense_item(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
    Json(body): Json<DispenseItemRequest>,
) -> ApiResult<Json<ItemDispense>> {
    let actor = require_actor(&body.performed_by)?;
    let db = state.db()?;
    let dispensed =
        Pharmacy::new(&db, state.publisher()).dispense_item(&item_id, body.quantity, actor)?;
    Ok(Json(dispensed))
}
