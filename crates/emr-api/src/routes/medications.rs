use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use emr_core::db::MedicationFilter;
use emr_core::inventory::{
    DispenseOutcome, ExpiryWriteOff, Inventory, NewBatch, StockAlert, StockChange,
    StockLevelSuggestion, UsageTrend,
};
use emr_core::models::{
    Medication, MedicationBatch, MedicationStatus, StockTransaction, TransactionContext,
};

use super::{parse_filter, require_actor, Actor};
use crate::errors::{ApiError, ApiResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_medications).post(create_medication))
        .route(
            "/:id",
            get(get_medication)
                .put(update_medication)
                .delete(delete_medication),
        )
        .route("/:id/batches", get(list_batches).post(add_batch))
        .route("/:id/dispense", post(dispense))
        .route("/:id/expire", post(expire_stock))
        .route("/:id/alerts", get(alerts))
        .route("/:id/stock-suggestions", get(stock_suggestions))
        .route("/:id/usage", get(usage))
        .route("/:id/ledger", get(ledger))
}

/// Editable medication fields.
#[derive(Debug, Deserialize)]
pub struct MedicationInput {
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub generic_name: Option<String>,
    #[serde(default)]
    pub strength: Option<String>,
    #[serde(default)]
    pub dosage_form: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub supplier: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub prescription_required: bool,
    #[serde(default)]
    pub is_generic: bool,
    #[serde(default)]
    pub minimum_stock: u32,
    #[serde(default)]
    pub maximum_stock: u32,
    #[serde(default)]
    pub pack_size: Option<u32>,
    #[serde(default)]
    pub monthly_usage: u32,
    #[serde(default)]
    pub notes: Option<String>,
}

impl MedicationInput {
    fn apply(self, medication: &mut Medication) -> ApiResult<()> {
        if self.name.trim().is_empty() || self.category.trim().is_empty() {
            return Err(ApiError::BadRequest(
                "name and category are required".to_string(),
            ));
        }
        if self.maximum_stock > 0 && self.maximum_stock < self.minimum_stock {
            return Err(ApiError::BadRequest(
                "maximum_stock is below minimum_stock".to_string(),
            ));
        }
        medication.name = self.name.trim().to_string();
        medication.category = self.category.trim().to_string();
        medication.generic_name = self.generic_name;
        medication.strength = self.strength;
        medication.dosage_form = self.dosage_form;
        medication.manufacturer = self.manufacturer;
        medication.supplier = self.supplier;
        medication.location = self.location;
        medication.barcode = self.barcode;
        medication.prescription_required = self.prescription_required;
        medication.is_generic = self.is_generic;
        medication.minimum_stock = self.minimum_stock;
        medication.maximum_stock = self.maximum_stock;
        medication.pack_size = self.pack_size.unwrap_or(medication.pack_size).max(1);
        medication.monthly_usage = self.monthly_usage;
        medication.notes = self.notes;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub status: Option<String>,
}

async fn list_medications(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Medication>>> {
    let filter = MedicationFilter {
        search: query.search,
        category: query.category,
        status: parse_filter("status", query.status.as_deref(), MedicationStatus::parse)?,
    };
    let db = state.db()?;
    Ok(Json(db.list_medications(&filter)?))
}

async fn create_medication(
    State(state): State<AppState>,
    Json(body): Json<MedicationInput>,
) -> ApiResult<(StatusCode, Json<Medication>)> {
    let mut medication = Medication::new(String::new(), String::new());
    body.apply(&mut medication)?;

    let db = state.db()?;
    db.insert_medication(&medication)?;
    let medication = Inventory::new(&db).refresh_medication(&medication.id)?;
    tracing::info!(medication = %medication.name, id = %medication.id, "medication created");
    Ok((StatusCode::CREATED, Json(medication)))
}

async fn get_medication(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Medication>> {
    let db = state.db()?;
    Ok(Json(db.require_medication(&id)?))
}

async fn update_medication(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<MedicationInput>,
) -> ApiResult<Json<Medication>> {
    let db = state.db()?;
    let mut medication = db.require_medication(&id)?;
    body.apply(&mut medication)?;
    db.update_medication(&medication)?;
    // Thresholds feed the derived status.
    Ok(Json(Inventory::new(&db).refresh_medication(&id)?))
}

async fn delete_medication(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let db = state.db()?;
    if !db.delete_medication(&id)? {
        return Err(emr_core::DbError::NotFound(format!("medication {id}")).into());
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn list_batches(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<MedicationBatch>>> {
    let db = state.db()?;
    db.require_medication(&id)?;
    Ok(Json(db.batches_for_medication(&id)?))
}

#[derive(Debug, Deserialize)]
pub struct RestockRequest {
    #[serde(flatten)]
    pub batch: NewBatch,
    pub performed_by: String,
}

async fn add_batch(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RestockRequest>,
) -> ApiResult<(StatusCode, Json<StockChange>)> {
    let actor = require_actor(&body.performed_by)?;
    let db = state.db()?;
    let change = Inventory::new(&db).add_batch(&id, body.batch, actor)?;
    Ok((StatusCode::CREATED, Json(change)))
}

#[derive(Debug, Deserialize)]
pub struct DispenseRequest {
    pub quantity: u32,
    pub performed_by: String,
    #[serde(default)]
    pub visit_id: Option<String>,
    #[serde(default)]
    pub prescription_id: Option<String>,
    #[serde(default)]
    pub prescription_item_id: Option<String>,
}

async fn dispense(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<DispenseRequest>,
) -> ApiResult<Json<DispenseOutcome>> {
    let actor = require_actor(&body.performed_by)?;
    let context = TransactionContext {
        visit_id: body.visit_id,
        prescription_id: body.prescription_id,
        prescription_item_id: body.prescription_item_id,
    };
    let db = state.db()?;
    let outcome = Inventory::new(&db).dispense(&id, body.quantity, actor, &context)?;
    Ok(Json(outcome))
}

async fn expire_stock(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Actor>,
) -> ApiResult<Json<ExpiryWriteOff>> {
    let actor = require_actor(&body.performed_by)?;
    let db = state.db()?;
    Ok(Json(Inventory::new(&db).expire_stock(&id, actor)?))
}

async fn alerts(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<StockAlert>>> {
    let db = state.db()?;
    Ok(Json(Inventory::new(&db).check_medication_alerts(&id)?))
}

async fn stock_suggestions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<StockLevelSuggestion>> {
    let db = state.db()?;
    Ok(Json(Inventory::new(&db).suggest_stock_levels(&id)?))
}

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    #[serde(default = "default_usage_days")]
    pub days: i64,
}

fn default_usage_days() -> i64 {
    30
}

async fn usage(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<UsageQuery>,
) -> ApiResult<Json<UsageTrend>> {
    let db = state.db()?;
    Ok(Json(Inventory::new(&db).usage_trends(&id, query.days)?))
}

#[derive(Debug, Deserialize)]
pub struct LedgerQuery {
    pub limit: Option<usize>,
}

async fn ledger(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<LedgerQuery>,
) -> ApiResult<Json<Vec<StockTransaction>>> {
    let db = state.db()?;
    Ok(Json(Inventory::new(&db).stock_history(&id, query.limit)?))
}
