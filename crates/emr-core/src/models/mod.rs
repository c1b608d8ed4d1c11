//! Domain models for the EMR pharmacy backend.

mod ledger;
mod medication;
mod patient;
mod prescription;
mod queue;
mod visit;

pub use ledger::*;
pub use medication::*;
pub use patient::*;
pub use prescription::*;
pub use queue::*;
pub use visit::*;
