use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;

use emr_core::models::{Visit, VisitPriority, VisitStatus};
use emr_core::notify::VISIT_UPDATED;
use emr_core::EventPublisher;

use super::{parse_filter, required};
use crate::errors::ApiResult;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_visits).post(create_visit))
        .route("/:id", get(get_visit))
        .route("/:id/status", put(update_status))
}

#[derive(Debug, Deserialize)]
pub struct NewVisit {
    pub patient_id: String,
    pub visit_date: NaiveDate,
    pub visit_time: NaiveTime,
    pub visit_location: String,
    pub visit_type: String,
    pub clinic: String,
    #[serde(default)]
    pub priority: VisitPriority,
    #[serde(default)]
    pub special_instructions: Option<String>,
    #[serde(default)]
    pub assigned_nurse: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub patient_id: Option<String>,
    pub status: Option<String>,
}

async fn list_visits(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Visit>>> {
    let status = parse_filter("status", query.status.as_deref(), VisitStatus::parse)?;
    let db = state.db()?;
    Ok(Json(db.list_visits(query.patient_id.as_deref(), status)?))
}

async fn create_visit(
    State(state): State<AppState>,
    Json(body): Json<NewVisit>,
) -> ApiResult<(StatusCode, Json<Visit>)> {
    let mut visit = Visit::new(
        body.patient_id,
        body.visit_date,
        body.visit_time,
        required("visit_location", &body.visit_location)?.to_string(),
        required("visit_type", &body.visit_type)?.to_string(),
        required("clinic", &body.clinic)?.to_string(),
    );
    visit.priority = body.priority;
    visit.special_instructions = body.special_instructions;
    visit.assigned_nurse = body.assigned_nurse;

    let db = state.db()?;
    db.require_patient(&visit.patient_id)?;
    db.insert_visit(&visit)?;
    tracing::info!(id = %visit.id, patient = %visit.patient_id, "visit scheduled");
    Ok((StatusCode::CREATED, Json(visit)))
}

async fn get_visit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Visit>> {
    let db = state.db()?;
    Ok(Json(db.require_visit(&id)?))
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: VisitStatus,
    #[serde(default)]
    pub assigned_nurse: Option<String>,
}

async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<StatusUpdate>,
) -> ApiResult<Json<Visit>> {
    let visit = {
        let db = state.db()?;
        let mut visit = db.require_visit(&id)?;
        visit.status = body.status;
        if body.assigned_nurse.is_some() {
            visit.assigned_nurse = body.assigned_nurse;
        }
        db.update_visit(&visit)?;
        db.require_visit(&id)?
    };

    match serde_json::to_value(&visit) {
        Ok(payload) => state.publisher().publish(VISIT_UPDATED, payload),
        Err(err) => tracing::warn!(error = %err, visit = %visit.id, "visit event not published"),
    }
    Ok(Json(visit))
}
