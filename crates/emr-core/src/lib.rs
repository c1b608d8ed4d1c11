//! EMR Core Library
//!
//! Pharmacy inventory and dispensing engine for the EMR backend, plus the
//! patient registry it serves.
//!
//! # Architecture
//!
//! ```text
//!  Restock ──► Batches ──────────────┐
//!                 │                  │
//!        FIFO Dispensing Engine      │  status derivation
//!                 │                  ▼
//!  Prescription ──┤            Medication (derived stock + status)
//!     items       │                  │
//!                 ▼                  ▼
//!  Pharmacy Queue ──────────►  Stock Ledger (append-only, hash chained)
//! ```
//!
//! # Core Principle
//!
//! **Batches are the source of truth.** A medication's stock and status are
//! always recomputed from its batches inside the same transaction that
//! changed them, and every stock movement leaves exactly one ledger row.
//!
//! # Modules
//!
//! - [`db`]: SQLite database layer
//! - [`models`]: Domain types (Medication, MedicationBatch, Prescription, etc.)
//! - [`inventory`]: Batch status, FIFO dispensing, restock, alerts, analytics
//! - [`pharmacy`]: Prescription fulfillment and the pharmacy queue
//! - [`notify`]: Event publication seam

pub mod db;
pub mod inventory;
pub mod models;
pub mod notify;
pub mod pharmacy;

// Re-export commonly used types
pub use db::{Database, DbError, DbResult};
pub use inventory::{DispenseOutcome, Inventory, InventoryError, InventoryResult};
pub use models::{
    BatchStatus, ItemStatus, Medication, MedicationBatch, MedicationStatus, Patient, PatientKind,
    PharmacyQueueEntry, Prescription, PrescriptionItem, PrescriptionStatus, Priority,
    QueueStatus, StockTransaction, TransactionContext, TransactionType, Visit, VisitStatus,
    VitalReading,
};
pub use notify::{EventPublisher, NoopPublisher};
pub use pharmacy::{Pharmacy, PharmacyError, PharmacyResult};
