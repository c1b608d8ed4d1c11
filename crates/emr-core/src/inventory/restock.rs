//! Restocking and stock corrections.
//!
//! Each operation writes exactly the ledger rows documented on it, in the
//! same transaction as the batch change.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{status, Inventory, InventoryError, InventoryResult};
use crate::models::{
    BatchAllocation, BatchStatus, Medication, MedicationBatch, StockTransaction, TransactionType,
};

/// A delivery to record as a new batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewBatch {
    pub batch_number: String,
    /// `YYYY-MM-DD`
    pub expiry_date: String,
    /// `YYYY-MM-DD`, defaults to today
    #[serde(default)]
    pub date_received: Option<String>,
    pub total_tablets: u32,
    /// Defaults to the medication's pack size
    #[serde(default)]
    pub pack_size: Option<u32>,
    #[serde(default)]
    pub supplier: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Accept a batch that has already expired (for back-filling records)
    #[serde(default)]
    pub allow_expired: bool,
}

/// A batch change together with the resulting medication and ledger row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockChange {
    pub batch: MedicationBatch,
    pub medication: Medication,
    pub transaction: StockTransaction,
}

/// Expired stock removed from one medication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpiryWriteOff {
    pub medication: Medication,
    /// One Expired row per batch written off
    pub transactions: Vec<StockTransaction>,
}

impl ExpiryWriteOff {
    pub fn tablets_written_off(&self) -> u64 {
        self.transactions
            .iter()
            .map(|t| t.quantity.unsigned_abs())
            .sum()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshSummary {
    pub medications_checked: usize,
    pub status_changes: usize,
}

fn parse_date(field: &str, raw: &str) -> InventoryResult<NaiveDate> {
    raw.trim()
        .parse::<NaiveDate>()
        .map_err(|_| InventoryError::InvalidBatchDate(format!("{field} '{raw}' is not YYYY-MM-DD")))
}

fn require_reason(reason: &str) -> InventoryResult<()> {
    if reason.trim().is_empty() {
        return Err(InventoryError::Validation("a reason is required".to_string()));
    }
    Ok(())
}

fn allocation(batch: &MedicationBatch, quantity: u32) -> BatchAllocation {
    BatchAllocation {
        batch_id: batch.id.clone(),
        batch_number: batch.batch_number.clone(),
        quantity,
        expiry_date: batch.expiry_date,
    }
}

impl<'a> Inventory<'a> {
    /// Record a delivery as a new batch. Appends one Restocked row.
    pub fn add_batch(
        &self,
        medication_id: &str,
        new_batch: NewBatch,
        performed_by: &str,
    ) -> InventoryResult<StockChange> {
        let batch_number = new_batch.batch_number.trim().to_string();
        if batch_number.is_empty() {
            return Err(InventoryError::Validation("batch_number is required".to_string()));
        }
        if new_batch.total_tablets == 0 {
            return Err(InventoryError::Validation(
                "total_tablets must be greater than zero".to_string(),
            ));
        }
        if new_batch.pack_size == Some(0) {
            return Err(InventoryError::Validation(
                "pack_size must be greater than zero".to_string(),
            ));
        }

        let expiry_date = parse_date("expiry_date", &new_batch.expiry_date)?;
        if expiry_date < self.today && !new_batch.allow_expired {
            return Err(InventoryError::InvalidBatchDate(format!(
                "expiry_date {expiry_date} is in the past"
            )));
        }
        let date_received = match new_batch.date_received.as_deref() {
            Some(raw) => parse_date("date_received", raw)?,
            None => self.today,
        };
        if date_received > self.today {
            return Err(InventoryError::InvalidBatchDate(format!(
                "date_received {date_received} is in the future"
            )));
        }

        self.db.atomically(|db| {
            let (before, _) = self.recompute(medication_id)?;

            let mut batch = MedicationBatch::new(
                medication_id.to_string(),
                batch_number.clone(),
                expiry_date,
                date_received,
                new_batch.total_tablets,
                new_batch.pack_size.unwrap_or(before.pack_size),
            );
            batch.supplier = new_batch.supplier.clone().or(before.supplier.clone());
            batch.notes = new_batch.notes.clone();
            status::settle_batch(&mut batch, self.today);
            db.insert_batch(&batch)?;

            let (medication, _) = self.recompute(medication_id)?;
            let transaction = StockTransaction::new(
                medication_id,
                TransactionType::Restocked,
                i64::from(batch.total_tablets),
                before.current_stock,
                medication.current_stock,
                performed_by,
                format!("Restocked batch {}", batch.batch_number),
            )
            .with_batch(&batch.id)
            .with_allocations(vec![allocation(&batch, batch.total_tablets)]);
            let transaction = db.append_transaction(transaction)?;

            tracing::info!(
                medication = %medication.name,
                batch = %batch.batch_number,
                tablets = batch.total_tablets,
                "restocked"
            );
            Ok(StockChange {
                batch,
                medication,
                transaction,
            })
        })
    }

    /// Set a batch's remaining count after a physical count or correction.
    ///
    /// The new count is clamped to the batch total. Appends one Adjusted row
    /// with the signed delta.
    pub fn adjust_batch(
        &self,
        batch_id: &str,
        new_remaining: u32,
        reason: &str,
        performed_by: &str,
    ) -> InventoryResult<StockChange> {
        require_reason(reason)?;

        self.db.atomically(|db| {
            let mut batch = db.require_batch(batch_id)?;
            let (before, _) = self.recompute(&batch.medication_id)?;

            let old_remaining = batch.remaining_tablets;
            batch.remaining_tablets = new_remaining.min(batch.total_tablets);
            let delta = i64::from(batch.remaining_tablets) - i64::from(old_remaining);
            status::settle_batch(&mut batch, self.today);
            db.update_batch_stock(&batch)?;

            let (medication, _) = self.recompute(&batch.medication_id)?;
            let transaction = StockTransaction::new(
                &batch.medication_id,
                TransactionType::Adjusted,
                delta,
                before.current_stock,
                medication.current_stock,
                performed_by,
                reason.trim().to_string(),
            )
            .with_batch(&batch.id)
            .with_allocations(vec![allocation(&batch, delta.unsigned_abs() as u32)]);
            let transaction = db.append_transaction(transaction)?;

            Ok(StockChange {
                batch,
                medication,
                transaction,
            })
        })
    }

    /// Put returned tablets back into a batch. Appends one Returned row.
    pub fn return_to_batch(
        &self,
        batch_id: &str,
        quantity: u32,
        reason: &str,
        performed_by: &str,
    ) -> InventoryResult<StockChange> {
        if quantity == 0 {
            return Err(InventoryError::Validation(
                "quantity must be greater than zero".to_string(),
            ));
        }

        self.db.atomically(|db| {
            let mut batch = db.require_batch(batch_id)?;
            let (before, _) = self.recompute(&batch.medication_id)?;

            let old_remaining = batch.remaining_tablets;
            batch.remaining_tablets = old_remaining.saturating_add(quantity).min(batch.total_tablets);
            let returned = batch.remaining_tablets - old_remaining;
            if returned == 0 {
                return Err(InventoryError::Validation(format!(
                    "batch {} is already full",
                    batch.batch_number
                )));
            }
            status::settle_batch(&mut batch, self.today);
            db.update_batch_stock(&batch)?;

            let reason = if reason.trim().is_empty() {
                "Returned to stock".to_string()
            } else {
                reason.trim().to_string()
            };
            let (medication, _) = self.recompute(&batch.medication_id)?;
            let transaction = StockTransaction::new(
                &batch.medication_id,
                TransactionType::Returned,
                i64::from(returned),
                before.current_stock,
                medication.current_stock,
                performed_by,
                reason,
            )
            .with_batch(&batch.id)
            .with_allocations(vec![allocation(&batch, returned)]);
            let transaction = db.append_transaction(transaction)?;

            Ok(StockChange {
                batch,
                medication,
                transaction,
            })
        })
    }

    /// Write off the remaining tablets of every expired batch of a medication.
    ///
    /// Appends one Expired row per batch written off; none when nothing has
    /// expired.
    pub fn expire_stock(
        &self,
        medication_id: &str,
        performed_by: &str,
    ) -> InventoryResult<ExpiryWriteOff> {
        self.db.atomically(|db| {
            let (mut medication, batches) = self.recompute(medication_id)?;
            let mut transactions = Vec::new();

            for mut batch in batches {
                if batch.expiry_date >= self.today || batch.remaining_tablets == 0 {
                    continue;
                }
                let removed = batch.remaining_tablets;
                batch.remaining_tablets = 0;
                status::settle_batch(&mut batch, self.today);
                db.update_batch_stock(&batch)?;

                // Expired tablets were never part of current stock.
                let transaction = StockTransaction::new(
                    medication_id,
                    TransactionType::Expired,
                    -i64::from(removed),
                    medication.current_stock,
                    medication.current_stock,
                    performed_by,
                    format!(
                        "Batch {} expired on {}",
                        batch.batch_number, batch.expiry_date
                    ),
                )
                .with_batch(&batch.id)
                .with_allocations(vec![allocation(&batch, removed)]);
                transactions.push(db.append_transaction(transaction)?);
            }

            if !transactions.is_empty() {
                medication = self.recompute(medication_id)?.0;
                tracing::info!(
                    medication = %medication.name,
                    batches = transactions.len(),
                    "expired stock written off"
                );
            }
            Ok(ExpiryWriteOff {
                medication,
                transactions,
            })
        })
    }

    /// Write off expired stock across the whole formulary.
    pub fn expire_all(&self, performed_by: &str) -> InventoryResult<Vec<ExpiryWriteOff>> {
        self.db.atomically(|db| {
            let mut write_offs = Vec::new();
            for medication_id in db.medication_ids_with_batches()? {
                let write_off = self.expire_stock(&medication_id, performed_by)?;
                if !write_off.transactions.is_empty() {
                    write_offs.push(write_off);
                }
            }
            Ok(write_offs)
        })
    }

    /// Pull a batch from sale. Appends one Adjusted row for the tablets
    /// removed from current stock.
    pub fn recall_batch(
        &self,
        batch_id: &str,
        reason: &str,
        performed_by: &str,
    ) -> InventoryResult<StockChange> {
        require_reason(reason)?;

        self.db.atomically(|db| {
            let mut batch = db.require_batch(batch_id)?;
            if batch.status == BatchStatus::Recalled {
                return Err(InventoryError::Validation(format!(
                    "batch {} is already recalled",
                    batch.batch_number
                )));
            }
            let (before, _) = self.recompute(&batch.medication_id)?;

            batch.status = BatchStatus::Recalled;
            db.update_batch_stock(&batch)?;

            let (medication, _) = self.recompute(&batch.medication_id)?;
            let removed = before.current_stock.saturating_sub(medication.current_stock);
            let transaction = StockTransaction::new(
                &batch.medication_id,
                TransactionType::Adjusted,
                -i64::from(removed),
                before.current_stock,
                medication.current_stock,
                performed_by,
                format!("Recalled batch {}: {}", batch.batch_number, reason.trim()),
            )
            .with_batch(&batch.id)
            .with_allocations(vec![allocation(&batch, removed)]);
            let transaction = db.append_transaction(transaction)?;

            tracing::warn!(
                medication = %medication.name,
                batch = %batch.batch_number,
                removed,
                "batch recalled"
            );
            Ok(StockChange {
                batch,
                medication,
                transaction,
            })
        })
    }

    /// Re-derive every batch and medication status for today.
    pub fn refresh_statuses(&self) -> InventoryResult<RefreshSummary> {
        self.db.atomically(|db| {
            let medications = db.list_medications(&Default::default())?;
            let mut summary = RefreshSummary::default();
            for before in medications {
                let (after, _) = self.recompute(&before.id)?;
                summary.medications_checked += 1;
                if after.status != before.status || after.current_stock != before.current_stock {
                    summary.status_changes += 1;
                }
            }
            tracing::info!(
                checked = summary.medications_checked,
                changed = summary.status_changes,
                "inventory statuses refreshed"
            );
            Ok(summary)
        })
    }
}
