//! Drug-interaction screening against a fixed table of known pairs.

use serde::{Deserialize, Serialize};

use super::{Pharmacy, PharmacyResult};
use crate::models::Medication;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum InteractionSeverity {
    Major,
    Moderate,
}

struct InteractionRule {
    first: &'static [&'static str],
    second: &'static [&'static str],
    severity: InteractionSeverity,
    description: &'static str,
    recommendation: &'static str,
}

const RULES: &[InteractionRule] = &[
    InteractionRule {
        first: &["warfarin"],
        second: &["aspirin", "ibuprofen"],
        severity: InteractionSeverity::Major,
        description: "Increased risk of bleeding",
        recommendation: "Monitor INR closely and consider alternative pain management",
    },
    InteractionRule {
        first: &["metformin"],
        second: &["contrast"],
        severity: InteractionSeverity::Major,
        description: "Risk of lactic acidosis",
        recommendation: "Discontinue metformin 48 hours before contrast administration",
    },
    InteractionRule {
        first: &["ace inhibitor", "lisinopril", "losartan"],
        second: &["ibuprofen", "nsaid"],
        severity: InteractionSeverity::Moderate,
        description: "NSAIDs may reduce effectiveness of ACE inhibitors/ARBs",
        recommendation: "Monitor blood pressure and consider alternative pain relief",
    },
    InteractionRule {
        first: &["digoxin"],
        second: &["amiodarone"],
        severity: InteractionSeverity::Major,
        description: "Increased digoxin levels leading to toxicity",
        recommendation: "Reduce digoxin dose and monitor levels closely",
    },
    InteractionRule {
        first: &["lithium"],
        second: &["furosemide", "thiazide"],
        severity: InteractionSeverity::Major,
        description: "Increased risk of lithium toxicity",
        recommendation: "Monitor lithium levels and adjust dose as needed",
    },
];

/// A flagged pair of medications.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DrugInteraction {
    pub drug1: String,
    pub drug2: String,
    pub severity: InteractionSeverity,
    pub description: String,
    pub recommendation: String,
}

fn mentions(haystack: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| haystack.contains(p))
}

/// Lowercased brand and generic name.
fn search_text(medication: &Medication) -> String {
    match &medication.generic_name {
        Some(generic) => format!("{} {}", medication.name, generic).to_lowercase(),
        None => medication.name.to_lowercase(),
    }
}

/// Screen every pair of `medications`, in either order.
pub fn check_interactions(medications: &[Medication]) -> Vec<DrugInteraction> {
    let texts: Vec<String> = medications.iter().map(search_text).collect();
    let mut found = Vec::new();

    for (i, a) in medications.iter().enumerate() {
        for (j, b) in medications.iter().enumerate().skip(i + 1) {
            let (ta, tb) = (&texts[i], &texts[j]);
            for rule in RULES {
                let forward = mentions(ta, rule.first) && mentions(tb, rule.second);
                let reverse = mentions(tb, rule.first) && mentions(ta, rule.second);
                if forward || reverse {
                    found.push(DrugInteraction {
                        drug1: a.name.clone(),
                        drug2: b.name.clone(),
                        severity: rule.severity,
                        description: rule.description.to_string(),
                        recommendation: rule.recommendation.to_string(),
                    });
                }
            }
        }
    }
    found
}

impl<'a> Pharmacy<'a> {
    /// Screen the medications that will actually be handed out.
    pub fn prescription_interactions(
        &self,
        prescription_id: &str,
    ) -> PharmacyResult<Vec<DrugInteraction>> {
        let prescription = self.db().require_prescription(prescription_id)?;
        let medications = prescription
            .items
            .iter()
            .map(|item| self.db().require_medication(item.effective_medication_id()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(check_interactions(&medications))
    }
}
