use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;

use emr_core::db::TransactionFilter;
use emr_core::inventory::{
    ExpiryWriteOff, FastMover, Inventory, RefreshSummary, StockAlert, DEFAULT_FAST_MOVING_DAYS,
    DEFAULT_FAST_MOVING_THRESHOLD, DEFAULT_SLOW_MOVING_DAYS,
};
use emr_core::models::{LedgerVerification, Medication, StockTransaction, TransactionType};

use super::{parse_filter, require_actor, Actor};
use crate::errors::ApiResult;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/refresh", post(refresh))
        .route("/expire", post(expire_all))
        .route("/alerts", get(alerts))
        .route("/slow-moving", get(slow_moving))
        .route("/fast-moving", get(fast_moving))
        .route("/transactions", get(transactions))
        .route("/ledger/verify", get(verify_ledger))
}

async fn refresh(State(state): State<AppState>) -> ApiResult<Json<RefreshSummary>> {
    let db = state.db()?;
    Ok(Json(Inventory::new(&db).refresh_statuses()?))
}

async fn expire_all(
    State(state): State<AppState>,
    Json(body): Json<Actor>,
) -> ApiResult<Json<Vec<ExpiryWriteOff>>> {
    let actor = require_actor(&body.performed_by)?;
    let db = state.db()?;
    Ok(Json(Inventory::new(&db).expire_all(actor)?))
}

async fn alerts(State(state): State<AppState>) -> ApiResult<Json<Vec<StockAlert>>> {
    let db = state.db()?;
    Ok(Json(Inventory::new(&db).all_alerts()?))
}

#[derive(Debug, Deserialize)]
pub struct MoversQuery {
    pub days: Option<i64>,
    pub threshold: Option<u64>,
}

async fn slow_moving(
    State(state): State<AppState>,
    Query(query): Query<MoversQuery>,
) -> ApiResult<Json<Vec<Medication>>> {
    let days = query.days.unwrap_or(DEFAULT_SLOW_MOVING_DAYS);
    let db = state.db()?;
    Ok(Json(Inventory::new(&db).slow_moving(days)?))
}

async fn fast_moving(
    State(state): State<AppState>,
    Query(query): Query<MoversQuery>,
) -> ApiResult<Json<Vec<FastMover>>> {
    let days = query.days.unwrap_or(DEFAULT_FAST_MOVING_DAYS);
    let threshold = query.threshold.unwrap_or(DEFAULT_FAST_MOVING_THRESHOLD);
    let db = state.db()?;
    Ok(Json(Inventory::new(&db).fast_moving(days, threshold)?))
}

#[derive(Debug, Deserialize)]
pub struct TransactionQuery {
    pub medication_id: Option<String>,
    pub transaction_type: Option<String>,
    pub prescription_id: Option<String>,
    pub since: Option<NaiveDate>,
    pub limit: Option<usize>,
}

async fn transactions(
    State(state): State<AppState>,
    Query(query): Query<TransactionQuery>,
) -> ApiResult<Json<Vec<StockTransaction>>> {
    let filter = TransactionFilter {
        medication_id: query.medication_id,
        kind: parse_filter(
            "transaction_type",
            query.transaction_type.as_deref(),
            TransactionType::parse,
        )?,
        prescription_id: query.prescription_id,
        since: query.since,
        limit: query.limit,
    };
    let db = state.db()?;
    Ok(Json(db.list_transactions(&filter)?))
}

async fn verify_ledger(State(state): State<AppState>) -> ApiResult<Json<LedgerVerification>> {
    let db = state.db()?;
    Ok(Json(Inventory::new(&db).verify_ledger()?))
}
