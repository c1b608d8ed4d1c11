//! Batch and medication status derivation.
//!
//! Everything here is a pure function of stored quantities, dates and
//! `today`, so the write paths and the daily refresh agree by construction.

use chrono::{Duration, NaiveDate};

use crate::models::{BatchStatus, Medication, MedicationBatch, MedicationStatus};

/// Days before expiry at which a batch counts as near expiry.
pub const NEAR_EXPIRY_DAYS: i64 = 30;

/// Status of a batch from its expiry date and remaining tablets.
///
/// Expiry wins over quantity: an expired batch is Expired even when empty.
pub fn derive_batch_status(
    expiry_date: NaiveDate,
    remaining_tablets: u32,
    today: NaiveDate,
) -> BatchStatus {
    if expiry_date < today {
        BatchStatus::Expired
    } else if expiry_date <= today + Duration::days(NEAR_EXPIRY_DAYS) {
        BatchStatus::NearExpiry
    } else if remaining_tablets == 0 {
        BatchStatus::Depleted
    } else {
        BatchStatus::Active
    }
}

/// Re-derive a batch's status in place. Recalled batches stay recalled.
///
/// Returns true when the status changed.
pub fn refresh_batch_status(batch: &mut MedicationBatch, today: NaiveDate) -> bool {
    if batch.status == BatchStatus::Recalled {
        return false;
    }
    let status = derive_batch_status(batch.expiry_date, batch.remaining_tablets, today);
    let changed = status != batch.status;
    batch.status = status;
    changed
}

/// Opened and sealed pack counts for a batch.
///
/// A pack is opened as soon as one tablet is taken from it.
pub fn pack_counts(
    total_tablets: u32,
    remaining_tablets: u32,
    pack_size: u32,
    packs_received: u32,
) -> (u32, u32) {
    let used = total_tablets.saturating_sub(remaining_tablets);
    let opened = used.div_ceil(pack_size.max(1)).min(packs_received);
    (opened, packs_received - opened)
}

/// Recompute pack counters and status after `remaining_tablets` changed.
pub fn settle_batch(batch: &mut MedicationBatch, today: NaiveDate) {
    batch.remaining_tablets = batch.remaining_tablets.min(batch.total_tablets);
    let (opened, sealed) = pack_counts(
        batch.total_tablets,
        batch.remaining_tablets,
        batch.pack_size,
        batch.packs_received,
    );
    batch.opened_packs = opened;
    batch.sealed_packs = sealed;
    refresh_batch_status(batch, today);
}

/// Tablets that can be sold today: dispensable, unexpired batches only.
pub fn compute_current_stock(batches: &[MedicationBatch], today: NaiveDate) -> u32 {
    batches
        .iter()
        .filter(|b| b.status.is_dispensable() && b.expiry_date >= today)
        .map(|b| b.remaining_tablets)
        .sum()
}

/// Status of a medication from its stock level and batches.
///
/// Checked in order: expired stock on the shelf, no stock, stock close to
/// expiry, below the reorder threshold.
pub fn derive_medication_status(
    current_stock: u32,
    minimum_stock: u32,
    batches: &[MedicationBatch],
    today: NaiveDate,
) -> MedicationStatus {
    // Recalled batches still on the shelf count toward expiry.
    let on_shelf = batches.iter().filter(|b| b.remaining_tablets > 0);

    let mut has_expired = false;
    let mut has_near_expiry = false;
    for batch in on_shelf {
        match derive_batch_status(batch.expiry_date, batch.remaining_tablets, today) {
            BatchStatus::Expired => has_expired = true,
            BatchStatus::NearExpiry => has_near_expiry = true,
            _ => {}
        }
    }

    if has_expired {
        MedicationStatus::Expired
    } else if current_stock == 0 {
        MedicationStatus::OutOfStock
    } else if has_near_expiry {
        MedicationStatus::NearExpiry
    } else if current_stock <= minimum_stock {
        MedicationStatus::LowStock
    } else {
        MedicationStatus::InStock
    }
}

/// Latest receipt date among batches that can still be dispensed.
pub fn latest_restock(batches: &[MedicationBatch]) -> Option<NaiveDate> {
    batches
        .iter()
        .filter(|b| b.status.is_dispensable())
        .map(|b| b.date_received)
        .max()
}

/// Recompute the derived fields of `medication` from its batches.
///
/// Batch statuses must already be refreshed for `today`.
pub fn recompute_medication(
    medication: &mut Medication,
    batches: &[MedicationBatch],
    today: NaiveDate,
) {
    medication.current_stock = compute_current_stock(batches, today);
    medication.status = derive_medication_status(
        medication.current_stock,
        medication.minimum_stock,
        batches,
        today,
    );
    if let Some(received) = latest_restock(batches) {
        medication.last_restocked = Some(received);
    }
}
