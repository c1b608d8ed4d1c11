//! Pharmacy inventory engine.
//!
//! Stock lives in batches; the medication row caches derived totals. Every
//! write path here changes batches, recomputes the medication and appends a
//! ledger row inside one `IMMEDIATE` transaction.

mod alerts;
mod analytics;
mod dispensing;
mod ledger;
mod restock;
pub mod status;

pub use alerts::*;
pub use analytics::*;
pub use dispensing::*;
pub use restock::*;

use chrono::NaiveDate;
use thiserror::Error;

use crate::db::{Database, DbError};
use crate::models::{Medication, MedicationBatch};

/// Inventory errors.
#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("Insufficient stock for {medication}: requested {requested}, available {available}")]
    InsufficientStock {
        medication: String,
        requested: u32,
        available: u32,
    },

    #[error("Invalid batch date: {0}")]
    InvalidBatchDate(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(DbError),
}

impl From<DbError> for InventoryError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => InventoryError::NotFound(what),
            other => InventoryError::Database(other),
        }
    }
}

pub type InventoryResult<T> = Result<T, InventoryError>;

/// Inventory manager bound to a database and a business date.
pub struct Inventory<'a> {
    db: &'a Database,
    today: NaiveDate,
}

impl<'a> Inventory<'a> {
    /// Create an inventory manager for the current UTC date, the same clock
    /// ledger `created_at` stamps are bucketed on.
    pub fn new(db: &'a Database) -> Self {
        Self::with_today(db, chrono::Utc::now().date_naive())
    }

    /// Create an inventory manager that treats `today` as the current date.
    pub fn with_today(db: &'a Database, today: NaiveDate) -> Self {
        Self { db, today }
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn db(&self) -> &'a Database {
        self.db
    }

    /// Refresh batch statuses and the medication's derived fields, and persist
    /// whatever changed.
    ///
    /// Callers that are about to write a ledger row run this inside their own
    /// transaction so the stock snapshot matches the write.
    pub(crate) fn recompute(
        &self,
        medication_id: &str,
    ) -> InventoryResult<(Medication, Vec<MedicationBatch>)> {
        let mut medication = self.db.require_medication(medication_id)?;
        let mut batches = self.db.batches_for_medication(medication_id)?;

        for batch in &mut batches {
            if status::refresh_batch_status(batch, self.today) {
                self.db.update_batch_stock(batch)?;
            }
        }

        let before = (
            medication.current_stock,
            medication.status,
            medication.last_restocked,
        );
        status::recompute_medication(&mut medication, &batches, self.today);
        if before
            != (
                medication.current_stock,
                medication.status,
                medication.last_restocked,
            )
        {
            self.db.save_medication_stock(&medication)?;
        }

        Ok((medication, batches))
    }

    /// Recompute one medication's stock and status, in its own transaction.
    pub fn refresh_medication(&self, medication_id: &str) -> InventoryResult<Medication> {
        self.db
            .atomically(|_| self.recompute(medication_id))
            .map(|(medication, _)| medication)
    }
}
