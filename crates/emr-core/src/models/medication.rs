//! Medication and batch models.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Stock status of a medication, derived from its batches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MedicationStatus {
    #[serde(rename = "In Stock")]
    InStock,
    #[serde(rename = "Low Stock")]
    LowStock,
    #[serde(rename = "Out of Stock")]
    OutOfStock,
    #[serde(rename = "Near Expiry")]
    NearExpiry,
    Expired,
}

impl MedicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MedicationStatus::InStock => "In Stock",
            MedicationStatus::LowStock => "Low Stock",
            MedicationStatus::OutOfStock => "Out of Stock",
            MedicationStatus::NearExpiry => "Near Expiry",
            MedicationStatus::Expired => "Expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "In Stock" => Some(MedicationStatus::InStock),
            "Low Stock" => Some(MedicationStatus::LowStock),
            "Out of Stock" => Some(MedicationStatus::OutOfStock),
            "Near Expiry" => Some(MedicationStatus::NearExpiry),
            "Expired" => Some(MedicationStatus::Expired),
            _ => None,
        }
    }
}

/// Lifecycle status of a received batch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BatchStatus {
    Active,
    #[serde(rename = "Near Expiry")]
    NearExpiry,
    Expired,
    Depleted,
    Recalled,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Active => "Active",
            BatchStatus::NearExpiry => "Near Expiry",
            BatchStatus::Expired => "Expired",
            BatchStatus::Depleted => "Depleted",
            BatchStatus::Recalled => "Recalled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Active" => Some(BatchStatus::Active),
            "Near Expiry" => Some(BatchStatus::NearExpiry),
            "Expired" => Some(BatchStatus::Expired),
            "Depleted" => Some(BatchStatus::Depleted),
            "Recalled" => Some(BatchStatus::Recalled),
            _ => None,
        }
    }

    /// Whether tablets in a batch with this status may be handed out.
    ///
    /// Near-expiry stock is still sellable and is exactly what FIFO wants
    /// to move first.
    pub fn is_dispensable(&self) -> bool {
        matches!(self, BatchStatus::Active | BatchStatus::NearExpiry)
    }
}

/// A medication in the pharmacy formulary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Medication {
    /// Unique ID (UUID)
    pub id: String,
    /// Brand or display name
    pub name: String,
    /// Generic (INN) name, used for substitute matching
    pub generic_name: Option<String>,
    /// Therapeutic category (e.g., "Antibiotics", "Analgesics")
    pub category: String,
    /// Strength (e.g., "500mg")
    pub strength: Option<String>,
    /// Dosage form (e.g., "Tablet", "Capsule")
    pub dosage_form: Option<String>,
    pub manufacturer: Option<String>,
    pub supplier: Option<String>,
    /// Shelf location in the store
    pub location: Option<String>,
    pub barcode: Option<String>,
    /// Requires a prescription to dispense
    pub prescription_required: bool,
    pub is_generic: bool,
    /// Reorder threshold
    pub minimum_stock: u32,
    pub maximum_stock: u32,
    /// Tablets per pack
    pub pack_size: u32,
    /// Recorded average monthly usage, 0 when unknown
    pub monthly_usage: u32,
    /// Derived: sum of remaining tablets over dispensable, unexpired batches
    pub current_stock: u32,
    /// Derived from stock and batches
    pub status: MedicationStatus,
    pub last_restocked: Option<NaiveDate>,
    pub last_dispensed: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Medication {
    /// Create a new medication with required fields and no stock.
    pub fn new(name: String, category: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            generic_name: None,
            category,
            strength: None,
            dosage_form: None,
            manufacturer: None,
            supplier: None,
            location: None,
            barcode: None,
            prescription_required: false,
            is_generic: false,
            minimum_stock: 0,
            maximum_stock: 0,
            pack_size: 1,
            monthly_usage: 0,
            current_stock: 0,
            status: MedicationStatus::OutOfStock,
            last_restocked: None,
            last_dispensed: None,
            notes: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Name used when matching substitutes: generic name if known.
    pub fn matching_name(&self) -> &str {
        self.generic_name.as_deref().unwrap_or(&self.name)
    }
}

/// A received lot of a medication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MedicationBatch {
    pub id: String,
    pub medication_id: String,
    /// Supplier lot number
    pub batch_number: String,
    pub expiry_date: NaiveDate,
    pub date_received: NaiveDate,
    pub total_tablets: u32,
    /// Never exceeds `total_tablets`
    pub remaining_tablets: u32,
    pub pack_size: u32,
    pub packs_received: u32,
    pub opened_packs: u32,
    pub sealed_packs: u32,
    pub supplier: Option<String>,
    pub status: BatchStatus,
    pub notes: Option<String>,
    pub created_at: String,
}

impl MedicationBatch {
    /// Create a full, sealed batch.
    pub fn new(
        medication_id: String,
        batch_number: String,
        expiry_date: NaiveDate,
        date_received: NaiveDate,
        total_tablets: u32,
        pack_size: u32,
    ) -> Self {
        let pack_size = pack_size.max(1);
        let packs_received = total_tablets.div_ceil(pack_size);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            medication_id,
            batch_number,
            expiry_date,
            date_received,
            total_tablets,
            remaining_tablets: total_tablets,
            pack_size,
            packs_received,
            opened_packs: 0,
            sealed_packs: packs_received,
            supplier: None,
            status: BatchStatus::Active,
            notes: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Tablets taken from this batch so far.
    pub fn tablets_used(&self) -> u32 {
        self.total_tablets - self.remaining_tablets
    }

    /// Whether FIFO may draw from this batch on `today`.
    pub fn is_eligible_on(&self, today: NaiveDate) -> bool {
        self.status.is_dispensable() && self.expiry_date >= today && self.remaining_tablets > 0
    }
}
