//! Pharmacy counter queue.
//!
//! One entry per prescription. Entries move Pending → Processing → Ready →
//! Partially Dispensed / Dispensed, or to Cancelled from anywhere. Every
//! change is announced as `pharmacy_queue.updated` once it has committed.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{Pharmacy, PharmacyError, PharmacyResult};
use crate::inventory::InventoryError;
use crate::models::{
    ItemStatus, PharmacyQueueEntry, Prescription, PrescriptionStatus, Priority, QueueStatus,
};
use crate::notify::PHARMACY_QUEUE_UPDATED;

const BASE_MINUTES: i64 = 15;
const MINUTES_PER_ITEM: i64 = 5;
const MINUTES_PER_COMPLEX_ITEM: i64 = 5;
const MINUTES_PER_OUT_OF_STOCK_ITEM: i64 = 10;

/// Minutes needed to fill a prescription.
///
/// Complex items are those whose medication needs a prescription; out of
/// stock items usually need a substitution first.
pub fn estimate_minutes(items: usize, complex: usize, out_of_stock: usize) -> i64 {
    BASE_MINUTES
        + MINUTES_PER_ITEM * items as i64
        + MINUTES_PER_COMPLEX_ITEM * complex as i64
        + MINUTES_PER_OUT_OF_STOCK_ITEM * out_of_stock as i64
}

/// One item to hand out from a queue entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemRequest {
    pub item_id: String,
    /// Defaults to the prescribed quantity
    #[serde(default)]
    pub quantity: Option<u32>,
}

/// An item that could not be dispensed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispenseFailure {
    pub item_id: String,
    pub error: String,
}

/// Result of a bulk dispense from the queue.
#[derive(Debug, Clone, Serialize)]
pub struct QueueDispense {
    pub entry: PharmacyQueueEntry,
    pub prescription: Prescription,
    /// Items dispensed by this call
    pub dispensed: Vec<String>,
    pub failures: Vec<DispenseFailure>,
}

fn require_active(entry: &PharmacyQueueEntry) -> PharmacyResult<()> {
    if entry.status.is_closed() {
        return Err(PharmacyError::InvalidState(format!(
            "queue entry {} is {}",
            entry.id,
            entry.status.as_str()
        )));
    }
    Ok(())
}

impl<'a> Pharmacy<'a> {
    /// Put a prescription in the pharmacy queue.
    pub fn enqueue(
        &self,
        prescription_id: &str,
        priority: Priority,
    ) -> PharmacyResult<PharmacyQueueEntry> {
        let entry = self.db().atomically(|db| -> PharmacyResult<PharmacyQueueEntry> {
            let prescription = db.require_prescription(prescription_id)?;
            if prescription.status == PrescriptionStatus::Cancelled {
                return Err(PharmacyError::InvalidState(format!(
                    "prescription {prescription_id} is cancelled"
                )));
            }
            if db.queue_entry_for_prescription(prescription_id)?.is_some() {
                return Err(PharmacyError::InvalidState(format!(
                    "prescription {prescription_id} is already queued"
                )));
            }

            let mut entry = PharmacyQueueEntry::new(
                prescription.id.clone(),
                prescription.patient_id.clone(),
                priority,
            );
            entry.estimated_completion_at = Some(self.estimate_completion(&prescription)?);
            db.insert_queue_entry(&entry)?;
            Ok(entry)
        })?;

        tracing::info!(
            entry = %entry.id,
            prescription = %entry.prescription_id,
            priority = entry.priority.as_str(),
            "prescription queued"
        );
        self.publish_queue_update(&entry);
        Ok(entry)
    }

    /// RFC 3339 time at which the prescription should be ready.
    pub fn estimate_completion(&self, prescription: &Prescription) -> PharmacyResult<String> {
        let mut complex = 0;
        for item in &prescription.items {
            let medication = self.db().require_medication(item.effective_medication_id())?;
            if medication.prescription_required {
                complex += 1;
            }
        }
        let out_of_stock = prescription
            .items
            .iter()
            .filter(|i| i.status == ItemStatus::OutOfStock)
            .count();

        let minutes = estimate_minutes(prescription.items.len(), complex, out_of_stock);
        Ok((Utc::now() + Duration::minutes(minutes)).to_rfc3339())
    }

    /// Take an entry for `pharmacist`.
    ///
    /// Taking an entry you already hold changes nothing.
    pub fn assign_to_me(
        &self,
        entry_id: &str,
        pharmacist: &str,
    ) -> PharmacyResult<PharmacyQueueEntry> {
        if pharmacist.trim().is_empty() {
            return Err(PharmacyError::Validation("pharmacist is required".to_string()));
        }

        let (entry, changed) = self.db().atomically(|db| -> PharmacyResult<_> {
            let mut entry = db.require_queue_entry(entry_id)?;
            require_active(&entry)?;
            if entry.assigned_to.as_deref() == Some(pharmacist) {
                return Ok((entry, false));
            }
            entry.assigned_to = Some(pharmacist.to_string());
            entry.status = QueueStatus::Processing;
            db.update_queue_entry(&entry)?;
            Ok((entry, true))
        })?;

        if changed {
            self.publish_queue_update(&entry);
        }
        Ok(entry)
    }

    /// Mark an entry ready for collection.
    ///
    /// Every item not yet dispensed must be Available or Substituted.
    pub fn mark_ready(&self, entry_id: &str) -> PharmacyResult<PharmacyQueueEntry> {
        let entry = self.db().atomically(|db| -> PharmacyResult<_> {
            let mut entry = db.require_queue_entry(entry_id)?;
            require_active(&entry)?;

            let mut prescription = db.require_prescription(&entry.prescription_id)?;
            self.refresh_in_tx(&mut prescription)?;
            let blocked: Vec<&str> = prescription
                .items
                .iter()
                .filter(|i| {
                    !matches!(
                        i.status,
                        ItemStatus::Available | ItemStatus::Substituted | ItemStatus::Dispensed
                    )
                })
                .map(|i| i.id.as_str())
                .collect();
            if !blocked.is_empty() {
                return Err(PharmacyError::InvalidState(format!(
                    "items not ready: {}",
                    blocked.join(", ")
                )));
            }

            entry.status = QueueStatus::Ready;
            db.update_queue_entry(&entry)?;
            Ok(entry)
        })?;

        self.publish_queue_update(&entry);
        Ok(entry)
    }

    /// Dispense several items of a queued prescription.
    ///
    /// Each item is dispensed in its own transaction. A stock shortfall stops
    /// the call and is returned as the error; items dispensed before it stay
    /// dispensed. Any other per-item failure is skipped and reported in
    /// `failures`.
    pub fn dispense_items(
        &self,
        entry_id: &str,
        requests: &[ItemRequest],
        performed_by: &str,
    ) -> PharmacyResult<QueueDispense> {
        if requests.is_empty() {
            return Err(PharmacyError::Validation("no items to dispense".to_string()));
        }
        let entry = self.db().require_queue_entry(entry_id)?;
        require_active(&entry)?;

        let mut dispensed = Vec::new();
        let mut failures = Vec::new();
        for request in requests {
            let result = self.db().atomically(|db| {
                let item = db.require_prescription_item(&request.item_id)?;
                if item.prescription_id != entry.prescription_id {
                    return Err(PharmacyError::Validation(format!(
                        "item {} is not on prescription {}",
                        request.item_id, entry.prescription_id
                    )));
                }
                self.dispense_item_in_tx(&request.item_id, request.quantity, performed_by)
            });

            match result {
                Ok(_) => dispensed.push(request.item_id.clone()),
                Err(err @ PharmacyError::Inventory(InventoryError::InsufficientStock { .. })) => {
                    if !dispensed.is_empty() {
                        self.settle_entry(entry_id, true)?;
                    }
                    return Err(err);
                }
                Err(err) => {
                    tracing::warn!(
                        entry = %entry_id,
                        item = %request.item_id,
                        error = %err,
                        "skipping item"
                    );
                    failures.push(DispenseFailure {
                        item_id: request.item_id.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }

        let (entry, prescription) = self.settle_entry(entry_id, !dispensed.is_empty())?;
        Ok(QueueDispense {
            entry,
            prescription,
            dispensed,
            failures,
        })
    }

    /// Bring an entry's status in line with its prescription after dispensing.
    fn settle_entry(
        &self,
        entry_id: &str,
        any_dispensed: bool,
    ) -> PharmacyResult<(PharmacyQueueEntry, Prescription)> {
        let (entry, prescription, changed) =
            self.db().atomically(|db| -> PharmacyResult<_> {
                let mut entry = db.require_queue_entry(entry_id)?;
                let prescription = db.require_prescription(&entry.prescription_id)?;

                let status = if prescription.status == PrescriptionStatus::Dispensed {
                    QueueStatus::Dispensed
                } else if any_dispensed {
                    QueueStatus::PartiallyDispensed
                } else {
                    entry.status
                };
                let changed = status != entry.status;
                if changed {
                    entry.status = status;
                    db.update_queue_entry(&entry)?;
                }
                Ok((entry, prescription, changed))
            })?;

        if changed {
            tracing::info!(
                entry = %entry.id,
                status = entry.status.as_str(),
                "queue entry updated"
            );
            self.publish_queue_update(&entry);
        }
        Ok((entry, prescription))
    }

    /// Cancel a queue entry and its prescription.
    pub fn cancel_queue_entry(&self, entry_id: &str) -> PharmacyResult<PharmacyQueueEntry> {
        let entry = self.db().atomically(|db| -> PharmacyResult<_> {
            let entry = db.require_queue_entry(entry_id)?;
            let (_, entry) = self.cancel_in_tx(&entry.prescription_id)?;
            entry.ok_or_else(|| PharmacyError::NotFound(format!("queue entry {entry_id}")))
        })?;
        self.publish_queue_update(&entry);
        Ok(entry)
    }

    /// Cancel a prescription and, if queued, its entry.
    pub(crate) fn cancel_in_tx(
        &self,
        prescription_id: &str,
    ) -> PharmacyResult<(Prescription, Option<PharmacyQueueEntry>)> {
        let db = self.db();
        let mut prescription = db.require_prescription(prescription_id)?;
        prescription.status = PrescriptionStatus::Cancelled;
        prescription.update_rollup();
        db.update_prescription_rollup(&prescription)?;

        let entry = match db.queue_entry_for_prescription(prescription_id)? {
            Some(mut entry) => {
                if entry.status != QueueStatus::Cancelled {
                    entry.status = QueueStatus::Cancelled;
                    db.update_queue_entry(&entry)?;
                }
                Some(entry)
            }
            None => None,
        };

        tracing::info!(prescription = %prescription_id, "prescription cancelled");
        Ok((prescription, entry))
    }

    pub(crate) fn publish_queue_update(&self, entry: &PharmacyQueueEntry) {
        match serde_json::to_value(entry) {
            Ok(payload) => self.publisher.publish(PHARMACY_QUEUE_UPDATED, payload),
            Err(err) => tracing::warn!(error = %err, "could not encode queue event"),
        }
    }
}
