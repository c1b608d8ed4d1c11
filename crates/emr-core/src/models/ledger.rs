//! Stock ledger models.
//!
//! Ledger rows are append-only. Each row links to its predecessor through
//! `previous_hash`, so any edit to a stored row breaks the chain.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Kind of stock movement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransactionType {
    Dispensed,
    Restocked,
    Adjusted,
    Expired,
    Returned,
    Substitution,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Dispensed => "Dispensed",
            TransactionType::Restocked => "Restocked",
            TransactionType::Adjusted => "Adjusted",
            TransactionType::Expired => "Expired",
            TransactionType::Returned => "Returned",
            TransactionType::Substitution => "Substitution",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Dispensed" => Some(TransactionType::Dispensed),
            "Restocked" => Some(TransactionType::Restocked),
            "Adjusted" => Some(TransactionType::Adjusted),
            "Expired" => Some(TransactionType::Expired),
            "Returned" => Some(TransactionType::Returned),
            "Substitution" => Some(TransactionType::Substitution),
            _ => None,
        }
    }
}

/// Tablets taken from (or added to) a single batch by one transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchAllocation {
    pub batch_id: String,
    pub batch_number: String,
    pub quantity: u32,
    pub expiry_date: NaiveDate,
}

/// Links from a ledger row to the clinical records that caused it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionContext {
    pub visit_id: Option<String>,
    pub prescription_id: Option<String>,
    pub prescription_item_id: Option<String>,
}

/// An immutable stock ledger row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockTransaction {
    pub id: String,
    pub medication_id: String,
    #[serde(rename = "transaction_type")]
    pub kind: TransactionType,
    /// Signed delta: negative for stock leaving the shelf
    pub quantity: i64,
    pub previous_stock: u32,
    pub new_stock: u32,
    pub performed_by: String,
    pub visit_id: Option<String>,
    pub prescription_id: Option<String>,
    pub prescription_item_id: Option<String>,
    pub batch_id: Option<String>,
    pub batches_affected: Vec<BatchAllocation>,
    pub reason: String,
    pub created_at: String,
    /// Hash of the preceding row, `None` for the first row
    pub previous_hash: Option<String>,
    pub entry_hash: String,
}

/// Fields hashed into `entry_hash`. Field order is fixed by the struct.
#[derive(Serialize)]
struct CanonicalEntry<'a> {
    id: &'a str,
    medication_id: &'a str,
    kind: &'a str,
    quantity: i64,
    previous_stock: u32,
    new_stock: u32,
    performed_by: &'a str,
    visit_id: Option<&'a str>,
    prescription_id: Option<&'a str>,
    prescription_item_id: Option<&'a str>,
    batch_id: Option<&'a str>,
    batches_affected: &'a [BatchAllocation],
    reason: &'a str,
    created_at: &'a str,
}

impl StockTransaction {
    /// Build an unhashed row. The store fills in the hash chain on append.
    pub fn new(
        medication_id: &str,
        kind: TransactionType,
        quantity: i64,
        previous_stock: u32,
        new_stock: u32,
        performed_by: &str,
        reason: String,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            medication_id: medication_id.to_string(),
            kind,
            quantity,
            previous_stock,
            new_stock,
            performed_by: performed_by.to_string(),
            visit_id: None,
            prescription_id: None,
            prescription_item_id: None,
            batch_id: None,
            batches_affected: Vec::new(),
            reason,
            created_at: chrono::Utc::now().to_rfc3339(),
            previous_hash: None,
            entry_hash: String::new(),
        }
    }

    pub fn with_context(mut self, context: &TransactionContext) -> Self {
        self.visit_id = context.visit_id.clone();
        self.prescription_id = context.prescription_id.clone();
        self.prescription_item_id = context.prescription_item_id.clone();
        self
    }

    pub fn with_batch(mut self, batch_id: &str) -> Self {
        self.batch_id = Some(batch_id.to_string());
        self
    }

    pub fn with_allocations(mut self, allocations: Vec<BatchAllocation>) -> Self {
        self.batches_affected = allocations;
        self
    }

    /// Compute the chained hash of this row given its predecessor's hash.
    pub fn compute_hash(&self, previous_hash: Option<&str>) -> String {
        let canonical = CanonicalEntry {
            id: &self.id,
            medication_id: &self.medication_id,
            kind: self.kind.as_str(),
            quantity: self.quantity,
            previous_stock: self.previous_stock,
            new_stock: self.new_stock,
            performed_by: &self.performed_by,
            visit_id: self.visit_id.as_deref(),
            prescription_id: self.prescription_id.as_deref(),
            prescription_item_id: self.prescription_item_id.as_deref(),
            batch_id: self.batch_id.as_deref(),
            batches_affected: &self.batches_affected,
            reason: &self.reason,
            created_at: &self.created_at,
        };
        // Serializing plain strings and integers cannot fail.
        let payload = serde_json::to_vec(&canonical).unwrap_or_default();

        let mut hasher = Sha256::new();
        if let Some(prev) = previous_hash {
            hasher.update(prev.as_bytes());
        }
        hasher.update(&payload);
        hex::encode(hasher.finalize())
    }

    /// Seal the row onto the chain.
    pub fn seal(&mut self, previous_hash: Option<String>) {
        self.entry_hash = self.compute_hash(previous_hash.as_deref());
        self.previous_hash = previous_hash;
    }
}

/// Result of walking the hash chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerVerification {
    pub entries: usize,
    pub valid: bool,
    /// First row whose stored hash or back-link does not match
    pub first_broken: Option<String>,
}
