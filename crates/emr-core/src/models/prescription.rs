//! Prescription models.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Overall status of a prescription.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PrescriptionStatus {
    Pending,
    #[serde(rename = "Partially Dispensed")]
    PartiallyDispensed,
    Dispensed,
    Cancelled,
}

impl PrescriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrescriptionStatus::Pending => "Pending",
            PrescriptionStatus::PartiallyDispensed => "Partially Dispensed",
            PrescriptionStatus::Dispensed => "Dispensed",
            PrescriptionStatus::Cancelled => "Cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(PrescriptionStatus::Pending),
            "Partially Dispensed" => Some(PrescriptionStatus::PartiallyDispensed),
            "Dispensed" => Some(PrescriptionStatus::Dispensed),
            "Cancelled" => Some(PrescriptionStatus::Cancelled),
            _ => None,
        }
    }
}

/// Status of a single prescribed line.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ItemStatus {
    Pending,
    Available,
    #[serde(rename = "Out of Stock")]
    OutOfStock,
    Substituted,
    Dispensed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "Pending",
            ItemStatus::Available => "Available",
            ItemStatus::OutOfStock => "Out of Stock",
            ItemStatus::Substituted => "Substituted",
            ItemStatus::Dispensed => "Dispensed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(ItemStatus::Pending),
            "Available" => Some(ItemStatus::Available),
            "Out of Stock" => Some(ItemStatus::OutOfStock),
            "Substituted" => Some(ItemStatus::Substituted),
            "Dispensed" => Some(ItemStatus::Dispensed),
            _ => None,
        }
    }

    /// Statuses that availability checks may overwrite.
    pub fn is_availability_derived(&self) -> bool {
        matches!(
            self,
            ItemStatus::Pending | ItemStatus::Available | ItemStatus::OutOfStock
        )
    }
}

/// One medication line on a prescription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrescriptionItem {
    pub id: String,
    pub prescription_id: String,
    pub medication_id: String,
    /// e.g. "500mg"
    pub dosage: String,
    /// e.g. "Twice daily"
    pub frequency: String,
    /// e.g. "7 days"
    pub duration: String,
    /// Tablets to hand out
    pub quantity: u32,
    pub instructions: Option<String>,
    pub status: ItemStatus,
    pub substituted_with: Option<String>,
    pub substitution_reason: Option<String>,
    pub dispensed_quantity: Option<u32>,
    pub dispensed_date: Option<NaiveDate>,
    pub dispensed_by: Option<String>,
}

impl PrescriptionItem {
    pub fn new(
        prescription_id: String,
        medication_id: String,
        dosage: String,
        frequency: String,
        duration: String,
        quantity: u32,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            prescription_id,
            medication_id,
            dosage,
            frequency,
            duration,
            quantity,
            instructions: None,
            status: ItemStatus::Pending,
            substituted_with: None,
            substitution_reason: None,
            dispensed_quantity: None,
            dispensed_date: None,
            dispensed_by: None,
        }
    }

    /// The medication that will actually be handed out.
    pub fn effective_medication_id(&self) -> &str {
        self.substituted_with
            .as_deref()
            .unwrap_or(&self.medication_id)
    }

    pub fn is_dispensed(&self) -> bool {
        self.status == ItemStatus::Dispensed
    }
}

/// A prescription issued during a visit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prescription {
    pub id: String,
    /// At most one prescription per visit
    pub visit_id: Option<String>,
    pub patient_id: String,
    pub prescribed_by: String,
    pub status: PrescriptionStatus,
    pub total_items: u32,
    pub available_items: u32,
    pub out_of_stock_items: u32,
    pub dispensed_items: u32,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub items: Vec<PrescriptionItem>,
}

impl Prescription {
    pub fn new(patient_id: String, prescribed_by: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            visit_id: None,
            patient_id,
            prescribed_by,
            status: PrescriptionStatus::Pending,
            total_items: 0,
            available_items: 0,
            out_of_stock_items: 0,
            dispensed_items: 0,
            notes: None,
            created_at: now.clone(),
            updated_at: now,
            items: Vec::new(),
        }
    }

    /// Recompute item counts and status from `items`.
    ///
    /// A cancelled prescription keeps its status.
    pub fn update_rollup(&mut self) {
        let count = |status: ItemStatus| {
            self.items.iter().filter(|i| i.status == status).count() as u32
        };
        self.total_items = self.items.len() as u32;
        self.available_items = count(ItemStatus::Available) + count(ItemStatus::Substituted);
        self.out_of_stock_items = count(ItemStatus::OutOfStock);
        self.dispensed_items = count(ItemStatus::Dispensed);

        if self.status == PrescriptionStatus::Cancelled {
            return;
        }
        self.status = if self.total_items > 0 && self.dispensed_items == self.total_items {
            PrescriptionStatus::Dispensed
        } else if self.dispensed_items > 0 {
            PrescriptionStatus::PartiallyDispensed
        } else {
            PrescriptionStatus::Pending
        };
    }

    pub fn item(&self, item_id: &str) -> Option<&PrescriptionItem> {
        self.items.iter().find(|i| i.id == item_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prescription_with(statuses: &[ItemStatus]) -> Prescription {
        let mut rx = Prescription::new("patient".into(), "Dr. Ade".into());
        for status in statuses {
            let mut item = PrescriptionItem::new(
                rx.id.clone(),
                "med".into(),
                "500mg".into(),
                "Twice daily".into(),
                "5 days".into(),
                10,
            );
            item.status = *status;
            rx.items.push(item);
        }
        rx
    }

    #[test]
    fn test_rollup_counts() {
        let mut rx = prescription_with(&[
            ItemStatus::Available,
            ItemStatus::OutOfStock,
            ItemStatus::Substituted,
        ]);
        rx.update_rollup();
        assert_eq!(rx.total_items, 3);
        assert_eq!(rx.available_items, 2);
        assert_eq!(rx.out_of_stock_items, 1);
        assert_eq!(rx.status, PrescriptionStatus::Pending);
    }

    #[test]
    fn test_rollup_partial_and_full() {
        let mut rx = prescription_with(&[ItemStatus::Dispensed, ItemStatus::Available]);
        rx.update_rollup();
        assert_eq!(rx.status, PrescriptionStatus::PartiallyDispensed);

        rx.items[1].status = ItemStatus::Dispensed;
        rx.update_rollup();
        assert_eq!(rx.status, PrescriptionStatus::Dispensed);
    }

    #[test]
    fn test_empty_prescription_stays_pending() {
        let mut rx = prescription_with(&[]);
        rx.update_rollup();
        assert_eq!(rx.status, PrescriptionStatus::Pending);
    }

    #[test]
    fn test_cancelled_is_sticky() {
        let mut rx = prescription_with(&[ItemStatus::Dispensed]);
        rx.status = PrescriptionStatus::Cancelled;
        rx.update_rollup();
        assert_eq!(rx.status, PrescriptionStatus::Cancelled);
        assert_eq!(rx.dispensed_items, 1);
    }

    #[test]
    fn test_effective_medication() {
        let mut rx = prescription_with(&[ItemStatus::Pending]);
        assert_eq!(rx.items[0].effective_medication_id(), "med");
        rx.items[0].substituted_with = Some("alt".into());
        assert_eq!(rx.items[0].effective_medication_id(), "alt");
    }
}
