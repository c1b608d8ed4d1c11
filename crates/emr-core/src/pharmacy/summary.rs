//! Printable prescription summary.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Pharmacy, PharmacyResult};
use crate::models::{ItemStatus, PrescriptionStatus};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubstitutionSummary {
    pub original: String,
    pub substitute: String,
    pub reason: String,
    /// Pharmacist who dispensed the substitute, "System" until then
    pub approved_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemSummary {
    pub name: String,
    pub strength: Option<String>,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    pub quantity: u32,
    pub instructions: Option<String>,
    pub status: ItemStatus,
    pub dispensed_quantity: Option<u32>,
    pub dispensed_date: Option<NaiveDate>,
    pub dispensed_by: Option<String>,
    pub substitution: Option<SubstitutionSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrescriptionSummary {
    pub prescription_id: String,
    pub patient_name: String,
    pub personal_number: Option<String>,
    pub prescribed_by: String,
    pub prescription_date: String,
    pub total_items: u32,
    pub status: PrescriptionStatus,
    pub medications: Vec<ItemSummary>,
}

impl<'a> Pharmacy<'a> {
    pub fn prescription_summary(&self, prescription_id: &str) -> PharmacyResult<PrescriptionSummary> {
        let db = self.db();
        let prescription = db.require_prescription(prescription_id)?;
        let patient = db.require_patient(&prescription.patient_id)?;

        let mut medications = Vec::with_capacity(prescription.items.len());
        for item in &prescription.items {
            let medication = db.require_medication(&item.medication_id)?;
            let substitution = match &item.substituted_with {
                Some(substitute_id) => Some(SubstitutionSummary {
                    original: medication.name.clone(),
                    substitute: db.require_medication(substitute_id)?.name,
                    reason: item
                        .substitution_reason
                        .clone()
                        .unwrap_or_else(|| "Stock unavailable".to_string()),
                    approved_by: item
                        .dispensed_by
                        .clone()
                        .unwrap_or_else(|| "System".to_string()),
                }),
                None => None,
            };

            medications.push(ItemSummary {
                name: medication.name,
                strength: medication.strength,
                dosage: item.dosage.clone(),
                frequency: item.frequency.clone(),
                duration: item.duration.clone(),
                quantity: item.quantity,
                instructions: item.instructions.clone(),
                status: item.status,
                dispensed_quantity: item.dispensed_quantity,
                dispensed_date: item.dispensed_date,
                dispensed_by: item.dispensed_by.clone(),
                substitution,
            });
        }

        Ok(PrescriptionSummary {
            prescription_id: prescription.id,
            patient_name: format!("{} {}", patient.surname, patient.first_name),
            personal_number: patient.kind.personal_number().map(str::to_string),
            prescribed_by: prescription.prescribed_by,
            prescription_date: prescription.created_at,
            total_items: prescription.total_items,
            status: prescription.status,
            medications,
        })
    }
}
