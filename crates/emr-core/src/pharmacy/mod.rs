//! Prescription fulfillment and the pharmacy counter queue.
//!
//! Builds on [`Inventory`]: every dispense goes through the FIFO engine and
//! every substitution leaves a ledger row.

mod fulfillment;
mod interactions;
mod queue;
mod substitutes;
mod summary;

pub use fulfillment::*;
pub use interactions::*;
pub use queue::*;
pub use substitutes::*;
pub use summary::*;

use chrono::NaiveDate;
use thiserror::Error;

use crate::db::{Database, DbError};
use crate::inventory::{Inventory, InventoryError};
use crate::notify::EventPublisher;

/// Pharmacy workflow errors.
#[derive(Error, Debug)]
pub enum PharmacyError {
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl From<DbError> for PharmacyError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => PharmacyError::NotFound(what),
            other => PharmacyError::Inventory(InventoryError::Database(other)),
        }
    }
}

pub type PharmacyResult<T> = Result<T, PharmacyError>;

/// Pharmacy workflows bound to a database, a business date and an event sink.
pub struct Pharmacy<'a> {
    inventory: Inventory<'a>,
    publisher: &'a dyn EventPublisher,
}

impl<'a> Pharmacy<'a> {
    pub fn new(db: &'a Database, publisher: &'a dyn EventPublisher) -> Self {
        Self {
            inventory: Inventory::new(db),
            publisher,
        }
    }

    pub fn with_today(
        db: &'a Database,
        today: NaiveDate,
        publisher: &'a dyn EventPublisher,
    ) -> Self {
        Self {
            inventory: Inventory::with_today(db, today),
            publisher,
        }
    }

    pub fn inventory(&self) -> &Inventory<'a> {
        &self.inventory
    }

    fn db(&self) -> &'a Database {
        self.inventory.db()
    }

    fn today(&self) -> NaiveDate {
        self.inventory.today()
    }
}
