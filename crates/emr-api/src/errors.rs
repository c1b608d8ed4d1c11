//! Mapping of core errors to JSON error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use emr_core::{DbError, InventoryError, PharmacyError};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error(transparent)]
    Pharmacy(#[from] PharmacyError),

    #[error("{0}")]
    BadRequest(String),

    #[error("database lock poisoned")]
    Poisoned,
}

pub type ApiResult<T> = Result<T, ApiError>;

fn db_status(err: &DbError) -> (StatusCode, &'static str) {
    match err {
        DbError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        DbError::Constraint(_) => (StatusCode::CONFLICT, "conflict"),
        DbError::Sqlite(_) | DbError::Json(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
        }
    }
}

fn inventory_status(err: &InventoryError) -> (StatusCode, &'static str) {
    match err {
        InventoryError::InsufficientStock { .. } => (StatusCode::CONFLICT, "insufficient_stock"),
        InventoryError::InvalidBatchDate(_) => (StatusCode::BAD_REQUEST, "invalid_batch_date"),
        InventoryError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        InventoryError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
        InventoryError::Database(db) => db_status(db),
    }
}

impl ApiError {
    pub fn status(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Db(err) => db_status(err),
            ApiError::Inventory(err) => inventory_status(err),
            ApiError::Pharmacy(PharmacyError::Inventory(err)) => inventory_status(err),
            ApiError::Pharmacy(PharmacyError::NotFound(_)) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Pharmacy(PharmacyError::Validation(_)) => {
                (StatusCode::BAD_REQUEST, "validation_error")
            }
            ApiError::Pharmacy(PharmacyError::InvalidState(_)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "invalid_state")
            }
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Poisoned => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        json_error(status, code, self.to_string())
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
