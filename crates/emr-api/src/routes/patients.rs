use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use emr_core::models::{Patient, PatientKind, Visit, VitalReading};
use emr_core::DbError;

use super::required;
use crate::errors::{ApiError, ApiResult};
use crate::state::AppState;

const SEARCH_LIMIT: usize = 50;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_patients).post(create_patient))
        .route(
            "/:id",
            get(get_patient).put(update_patient).delete(delete_patient),
        )
        .route("/:id/dependents", get(dependents))
        .route("/:id/visits", get(visits))
        .route("/:id/vitals", get(list_vitals).post(record_vitals))
}

#[derive(Debug, Deserialize)]
pub struct PatientInput {
    #[serde(default)]
    pub title: Option<String>,
    pub surname: String,
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub marital_status: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub blood_group: Option<String>,
    #[serde(default)]
    pub genotype: Option<String>,
    #[serde(default)]
    pub nok_first_name: Option<String>,
    #[serde(default)]
    pub nok_last_name: Option<String>,
    #[serde(default)]
    pub nok_relationship: Option<String>,
    #[serde(default)]
    pub nok_phone: Option<String>,
    pub kind: PatientKind,
}

impl PatientInput {
    fn apply(self, patient: &mut Patient) -> ApiResult<()> {
        patient.title = self.title;
        patient.surname = self.surname.trim().to_string();
        patient.first_name = self.first_name.trim().to_string();
        patient.last_name = self.last_name;
        patient.gender = self.gender;
        patient.marital_status = self.marital_status;
        patient.date_of_birth = self.date_of_birth;
        patient.email = self.email;
        patient.phone = self.phone;
        patient.address = self.address;
        patient.blood_group = self.blood_group;
        patient.genotype = self.genotype;
        patient.nok_first_name = self.nok_first_name;
        patient.nok_last_name = self.nok_last_name;
        patient.nok_relationship = self.nok_relationship;
        patient.nok_phone = self.nok_phone;
        patient.kind = self.kind;
        patient
            .validate(Utc::now().date_naive())
            .map_err(ApiError::BadRequest)
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Name or personal number prefix
    pub q: Option<String>,
    /// `Employee`, `Retiree`, `Dependent` or `NonNpa`
    pub kind: Option<String>,
}

async fn list_patients(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Patient>>> {
    let db = state.db()?;
    let patients = match query.q.as_deref().map(str::trim) {
        Some(q) if !q.is_empty() => db.search_patients(q, SEARCH_LIMIT)?,
        _ => db.list_patients(query.kind.as_deref())?,
    };
    Ok(Json(patients))
}

async fn create_patient(
    State(state): State<AppState>,
    Json(body): Json<PatientInput>,
) -> ApiResult<(StatusCode, Json<Patient>)> {
    let mut patient = Patient::new(String::new(), String::new(), body.kind.clone());
    body.apply(&mut patient)?;
    let db = state.db()?;
    db.insert_patient(&patient)?;
    tracing::info!(id = %patient.id, kind = patient.kind.as_str(), "patient registered");
    Ok((StatusCode::CREATED, Json(patient)))
}

async fn get_patient(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Patient>> {
    let db = state.db()?;
    Ok(Json(db.require_patient(&id)?))
}

async fn update_patient(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<PatientInput>,
) -> ApiResult<Json<Patient>> {
    let db = state.db()?;
    let mut patient = db.require_patient(&id)?;
    body.apply(&mut patient)?;
    db.update_patient(&patient)?;
    Ok(Json(db.require_patient(&id)?))
}

async fn delete_patient(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let db = state.db()?;
    if !db.delete_patient(&id)? {
        return Err(DbError::NotFound(format!("patient {id}")).into());
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Dependents sponsored by an employee or retiree.
async fn dependents(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Patient>>> {
    let db = state.db()?;
    let patient = db.require_patient(&id)?;
    let dependents = match patient.kind.personal_number() {
        Some(personal_number) => db.dependents_of(personal_number)?,
        None => Vec::new(),
    };
    Ok(Json(dependents))
}

async fn visits(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Visit>>> {
    let db = state.db()?;
    db.require_patient(&id)?;
    Ok(Json(db.list_visits(Some(&id), None)?))
}

#[derive(Debug, Deserialize)]
pub struct VitalsInput {
    #[serde(default)]
    pub systolic: Option<i32>,
    #[serde(default)]
    pub diastolic: Option<i32>,
    #[serde(default)]
    pub heart_rate: Option<i32>,
    #[serde(default)]
    pub blood_sugar: Option<f64>,
    #[serde(default)]
    pub rbs: Option<f64>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub respiratory_rate: Option<i32>,
    #[serde(default)]
    pub oxygen_saturation: Option<f64>,
    #[serde(default)]
    pub pain_scale: Option<i32>,
    #[serde(default)]
    pub comment: Option<String>,
    pub recorded_by: String,
}

/// A vitals reading with its computed BMI.
#[derive(Debug, Serialize)]
pub struct VitalsView {
    #[serde(flatten)]
    pub reading: VitalReading,
    pub bmi: Option<f64>,
}

impl From<VitalReading> for VitalsView {
    fn from(reading: VitalReading) -> Self {
        let bmi = reading.bmi();
        Self { reading, bmi }
    }
}

async fn list_vitals(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<VitalsView>>> {
    let db = state.db()?;
    db.require_patient(&id)?;
    let readings = db.vitals_for_patient(&id)?;
    Ok(Json(readings.into_iter().map(VitalsView::from).collect()))
}

async fn record_vitals(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<VitalsInput>,
) -> ApiResult<(StatusCode, Json<VitalsView>)> {
    let recorded_by = required("recorded_by", &body.recorded_by)?.to_string();
    let mut reading = VitalReading::new(id.clone(), recorded_by);
    reading.systolic = body.systolic;
    reading.diastolic = body.diastolic;
    reading.heart_rate = body.heart_rate;
    reading.blood_sugar = body.blood_sugar;
    reading.rbs = body.rbs;
    reading.temperature = body.temperature;
    reading.weight = body.weight;
    reading.height = body.height;
    reading.respiratory_rate = body.respiratory_rate;
    reading.oxygen_saturation = body.oxygen_saturation;
    reading.pain_scale = body.pain_scale;
    reading.comment = body.comment;
    reading.validate().map_err(ApiError::BadRequest)?;

    let db = state.db()?;
    db.require_patient(&id)?;
    db.insert_vitals(&reading)?;
    Ok((StatusCode::CREATED, Json(VitalsView::from(reading))))
}
