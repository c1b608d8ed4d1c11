//! Pharmacy queue models.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum QueueStatus {
    Pending,
    Processing,
    Ready,
    #[serde(rename = "Partially Dispensed")]
    PartiallyDispensed,
    Dispensed,
    Cancelled,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "Pending",
            QueueStatus::Processing => "Processing",
            QueueStatus::Ready => "Ready",
            QueueStatus::PartiallyDispensed => "Partially Dispensed",
            QueueStatus::Dispensed => "Dispensed",
            QueueStatus::Cancelled => "Cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(QueueStatus::Pending),
            "Processing" => Some(QueueStatus::Processing),
            "Ready" => Some(QueueStatus::Ready),
            "Partially Dispensed" => Some(QueueStatus::PartiallyDispensed),
            "Dispensed" => Some(QueueStatus::Dispensed),
            "Cancelled" => Some(QueueStatus::Cancelled),
            _ => None,
        }
    }

    /// No further work happens on a closed entry.
    pub fn is_closed(&self) -> bool {
        matches!(self, QueueStatus::Dispensed | QueueStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Priority {
    High,
    Medium,
    #[default]
    Normal,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Normal => "Normal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "High" => Some(Priority::High),
            "Medium" => Some(Priority::Medium),
            "Normal" => Some(Priority::Normal),
            _ => None,
        }
    }

    /// Sort key: lower is served first.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Normal => 2,
        }
    }
}

/// A prescription waiting at the pharmacy counter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PharmacyQueueEntry {
    pub id: String,
    /// One entry per prescription
    pub prescription_id: String,
    pub patient_id: String,
    pub status: QueueStatus,
    pub priority: Priority,
    pub assigned_to: Option<String>,
    /// RFC 3339 timestamp
    pub estimated_completion_at: Option<String>,
    pub pharmacist_notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl PharmacyQueueEntry {
    pub fn new(prescription_id: String, patient_id: String, priority: Priority) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            prescription_id,
            patient_id,
            status: QueueStatus::Pending,
            priority,
            assigned_to: None,
            estimated_completion_at: None,
            pharmacist_notes: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entry_is_pending() {
        let entry = PharmacyQueueEntry::new("rx".into(), "p".into(), Priority::High);
        assert_eq!(entry.status, QueueStatus::Pending);
        assert!(entry.assigned_to.is_none());
    }

    #[test]
    fn test_closed_statuses() {
        assert!(QueueStatus::Dispensed.is_closed());
        assert!(QueueStatus::Cancelled.is_closed());
        assert!(!QueueStatus::PartiallyDispensed.is_closed());
    }

    #[test]
    fn test_priority_rank_order() {
        assert!(Priority::High.rank() < Priority::Medium.rank());
        assert!(Priority::Medium.rank() < Priority::Normal.rank());
        assert_eq!(Priority::default(), Priority::Normal);
    }
}
