//! Visit and vital-sign models.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VisitStatus {
    Scheduled,
    Confirmed,
    #[serde(rename = "In Progress")]
    InProgress,
    #[serde(rename = "In Nursing Pool")]
    InNursingPool,
    Completed,
    Cancelled,
    Rescheduled,
}

impl VisitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisitStatus::Scheduled => "Scheduled",
            VisitStatus::Confirmed => "Confirmed",
            VisitStatus::InProgress => "In Progress",
            VisitStatus::InNursingPool => "In Nursing Pool",
            VisitStatus::Completed => "Completed",
            VisitStatus::Cancelled => "Cancelled",
            VisitStatus::Rescheduled => "Rescheduled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Scheduled" => Some(VisitStatus::Scheduled),
            "Confirmed" => Some(VisitStatus::Confirmed),
            "In Progress" => Some(VisitStatus::InProgress),
            "In Nursing Pool" => Some(VisitStatus::InNursingPool),
            "Completed" => Some(VisitStatus::Completed),
            "Cancelled" => Some(VisitStatus::Cancelled),
            "Rescheduled" => Some(VisitStatus::Rescheduled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum VisitPriority {
    Low,
    #[default]
    Medium,
    High,
    Emergency,
}

impl VisitPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisitPriority::Low => "Low",
            VisitPriority::Medium => "Medium",
            VisitPriority::High => "High",
            VisitPriority::Emergency => "Emergency",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Low" => Some(VisitPriority::Low),
            "Medium" => Some(VisitPriority::Medium),
            "High" => Some(VisitPriority::High),
            "Emergency" => Some(VisitPriority::Emergency),
            _ => None,
        }
    }
}

/// A scheduled or completed clinic visit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Visit {
    pub id: String,
    pub patient_id: String,
    pub visit_date: NaiveDate,
    pub visit_time: NaiveTime,
    /// Clinic site, e.g. "Headquarters"
    pub visit_location: String,
    /// e.g. "consultation", "follow-up"
    pub visit_type: String,
    /// e.g. "General", "Dental"
    pub clinic: String,
    pub priority: VisitPriority,
    pub status: VisitStatus,
    pub special_instructions: Option<String>,
    pub assigned_nurse: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Visit {
    pub fn new(
        patient_id: String,
        visit_date: NaiveDate,
        visit_time: NaiveTime,
        visit_location: String,
        visit_type: String,
        clinic: String,
    ) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            patient_id,
            visit_date,
            visit_time,
            visit_location,
            visit_type,
            clinic,
            priority: VisitPriority::default(),
            status: VisitStatus::Scheduled,
            special_instructions: None,
            assigned_nurse: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// One set of vital signs taken for a patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct VitalReading {
    pub id: String,
    pub patient_id: String,
    pub recorded_at: String,
    pub systolic: Option<i32>,
    pub diastolic: Option<i32>,
    pub heart_rate: Option<i32>,
    /// Fasting blood sugar
    pub blood_sugar: Option<f64>,
    /// Random blood sugar
    pub rbs: Option<f64>,
    pub temperature: Option<f64>,
    /// Kilograms
    pub weight: Option<f64>,
    /// Centimetres
    pub height: Option<f64>,
    pub respiratory_rate: Option<i32>,
    pub oxygen_saturation: Option<f64>,
    /// 0 to 10
    pub pain_scale: Option<i32>,
    pub comment: Option<String>,
    pub recorded_by: String,
}

impl VitalReading {
    pub fn new(patient_id: String, recorded_by: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            patient_id,
            recorded_at: chrono::Utc::now().to_rfc3339(),
            recorded_by,
            ..Default::default()
        }
    }

    /// Body-mass index from weight (kg) and height (cm), one decimal place.
    pub fn bmi(&self) -> Option<f64> {
        let weight = self.weight?;
        let height_m = self.height? / 100.0;
        if height_m <= 0.0 {
            return None;
        }
        Some((weight / (height_m * height_m) * 10.0).round() / 10.0)
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("systolic", self.systolic),
            ("diastolic", self.diastolic),
            ("heart_rate", self.heart_rate),
            ("respiratory_rate", self.respiratory_rate),
        ] {
            if matches!(value, Some(v) if v < 0) {
                return Err(format!("{name} cannot be negative"));
            }
        }
        if matches!(self.pain_scale, Some(p) if !(0..=10).contains(&p)) {
            return Err("pain_scale must be between 0 and 10".to_string());
        }
        if matches!(self.oxygen_saturation, Some(s) if !(0.0..=100.0).contains(&s)) {
            return Err("oxygen_saturation must be a percentage".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bmi() {
        let mut vitals = VitalReading::new("p".into(), "nurse".into());
        vitals.weight = Some(70.0);
        vitals.height = Some(175.0);
        assert_eq!(vitals.bmi(), Some(22.9));

        vitals.height = None;
        assert_eq!(vitals.bmi(), None);
    }

    #[test]
    fn test_negative_systolic_rejected() {
        let mut vitals = VitalReading::new("p".into(), "nurse".into());
        vitals.systolic = Some(-120);
        assert!(vitals.validate().is_err());
        vitals.systolic = Some(120);
        assert!(vitals.validate().is_ok());
    }

    #[test]
    fn test_pain_scale_bounds() {
        let mut vitals = VitalReading::new("p".into(), "nurse".into());
        vitals.pain_scale = Some(11);
        assert!(vitals.validate().is_err());
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(VisitStatus::InNursingPool.as_str(), "In Nursing Pool");
        assert_eq!(VisitStatus::parse("In Progress"), Some(VisitStatus::InProgress));
        let json = serde_json::to_string(&VisitStatus::InProgress).unwrap();
        assert_eq!(json, "\"In Progress\"");
    }
}
