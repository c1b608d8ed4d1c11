//! Substitute suggestions for items that cannot be filled as written.

use serde::{Deserialize, Serialize};
use strsim::jaro_winkler;

use super::{Pharmacy, PharmacyResult};
use crate::models::Medication;

/// A medication that could stand in for a prescribed one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubstituteSuggestion {
    pub medication: Medication,
    /// Jaro-Winkler similarity of generic names, 0.0 to 1.0
    pub similarity: f64,
}

/// Rank `candidates` as substitutes for `original`.
///
/// Keeps medications in the same category, other than the original, with at
/// least `quantity` tablets on hand. Most similar first.
pub fn rank_substitutes(
    original: &Medication,
    candidates: Vec<Medication>,
    quantity: u32,
) -> Vec<SubstituteSuggestion> {
    let target = original.matching_name().to_lowercase();
    let mut suggestions: Vec<SubstituteSuggestion> = candidates
        .into_iter()
        .filter(|m| m.id != original.id)
        .filter(|m| m.category == original.category)
        .filter(|m| m.current_stock >= quantity)
        .map(|medication| {
            let similarity = jaro_winkler(&target, &medication.matching_name().to_lowercase());
            SubstituteSuggestion {
                medication,
                similarity,
            }
        })
        .collect();

    suggestions.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| a.medication.name.cmp(&b.medication.name))
    });
    suggestions
}

impl<'a> Pharmacy<'a> {
    /// In-stock alternatives for a prescription item.
    pub fn suggest_substitutes(&self, item_id: &str) -> PharmacyResult<Vec<SubstituteSuggestion>> {
        let item = self.db().require_prescription_item(item_id)?;
        let original = self.db().require_medication(&item.medication_id)?;
        let candidates = self.db().medications_in_category(&original.category)?;
        Ok(rank_substitutes(&original, candidates, item.quantity))
    }
}
