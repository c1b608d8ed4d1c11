//! FIFO dispensing.
//!
//! Tablets always leave the shelf from the batch that expires first. The
//! eligibility read, the batch writes, the medication recompute and the
//! ledger append share one transaction, so a shortfall leaves no trace and
//! two concurrent dispenses cannot oversell.

use serde::{Deserialize, Serialize};

use super::{status, Inventory, InventoryError, InventoryResult};
use crate::models::{
    BatchAllocation, Medication, MedicationBatch, StockTransaction, TransactionContext,
    TransactionType,
};

/// Result of a successful dispense.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispenseOutcome {
    pub medication: Medication,
    /// Batches drawn from, in draw order
    pub batches_used: Vec<BatchAllocation>,
    pub transaction: StockTransaction,
}

/// Split `quantity` across `batches` in the given order.
///
/// `batches` must already be the eligible batches in FIFO order. Returns the
/// total available when it does not cover `quantity`.
pub fn plan_allocation(
    batches: &[MedicationBatch],
    quantity: u32,
) -> Result<Vec<BatchAllocation>, u32> {
    let available: u32 = batches.iter().map(|b| b.remaining_tablets).sum();
    if available < quantity {
        return Err(available);
    }

    let mut still_needed = quantity;
    let mut plan = Vec::new();
    for batch in batches {
        if still_needed == 0 {
            break;
        }
        let take = batch.remaining_tablets.min(still_needed);
        if take == 0 {
            continue;
        }
        plan.push(BatchAllocation {
            batch_id: batch.id.clone(),
            batch_number: batch.batch_number.clone(),
            quantity: take,
            expiry_date: batch.expiry_date,
        });
        still_needed -= take;
    }
    Ok(plan)
}

/// Ledger reason for a dispense.
fn dispense_reason(context: &TransactionContext) -> String {
    format!(
        "Dispensed to patient via prescription {}",
        context.prescription_id.as_deref().unwrap_or("N/A")
    )
}

impl<'a> Inventory<'a> {
    /// Dispense `quantity` tablets of a medication using FIFO.
    pub fn dispense(
        &self,
        medication_id: &str,
        quantity: u32,
        performed_by: &str,
        context: &TransactionContext,
    ) -> InventoryResult<DispenseOutcome> {
        self.db
            .atomically(|_| self.dispense_in_tx(medication_id, quantity, performed_by, context))
    }

    /// Dispense inside a transaction the caller already holds.
    pub(crate) fn dispense_in_tx(
        &self,
        medication_id: &str,
        quantity: u32,
        performed_by: &str,
        context: &TransactionContext,
    ) -> InventoryResult<DispenseOutcome> {
        if quantity == 0 {
            return Err(InventoryError::Validation(
                "quantity must be greater than zero".to_string(),
            ));
        }

        let medication = self.db.require_medication(medication_id)?;
        let eligible = self.db.eligible_batches(medication_id, self.today)?;
        debug_assert!(eligible.iter().all(|b| b.is_eligible_on(self.today)));

        let plan = match plan_allocation(&eligible, quantity) {
            Ok(plan) => plan,
            Err(available) => {
                tracing::warn!(
                    medication = %medication.name,
                    requested = quantity,
                    available,
                    "insufficient stock for dispense"
                );
                return Err(InventoryError::InsufficientStock {
                    medication: medication.name,
                    requested: quantity,
                    available,
                });
            }
        };
        let previous_stock: u32 = eligible.iter().map(|b| b.remaining_tablets).sum();

        for allocation in &plan {
            let Some(batch) = eligible.iter().find(|b| b.id == allocation.batch_id) else {
                continue;
            };
            let mut batch = batch.clone();
            batch.remaining_tablets -= allocation.quantity;
            status::settle_batch(&mut batch, self.today);
            self.db.update_batch_stock(&batch)?;
        }

        let (mut medication, _) = self.recompute(medication_id)?;
        medication.last_dispensed = Some(self.today);
        self.db.save_medication_stock(&medication)?;

        let transaction = StockTransaction::new(
            medication_id,
            TransactionType::Dispensed,
            -i64::from(quantity),
            previous_stock,
            medication.current_stock,
            performed_by,
            dispense_reason(context),
        )
        .with_context(context)
        .with_allocations(plan.clone());
        let transaction = self.db.append_transaction(transaction)?;

        tracing::info!(
            medication = %medication.name,
            quantity,
            batches = plan.len(),
            remaining = medication.current_stock,
            "dispensed"
        );

        Ok(DispenseOutcome {
            medication,
            batches_used: plan,
            transaction,
        })
    }
}
