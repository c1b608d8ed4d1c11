//! Prescription creation, item availability, substitution and dispensing.

use serde::{Deserialize, Serialize};

use super::{Pharmacy, PharmacyError, PharmacyResult};
use crate::inventory::{DispenseOutcome, InventoryError};
use crate::models::{
    ItemStatus, Prescription, PrescriptionItem, PrescriptionStatus, TransactionContext,
};

/// One line of a new prescription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPrescriptionItem {
    pub medication_id: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    pub quantity: u32,
    #[serde(default)]
    pub instructions: Option<String>,
}

impl NewPrescriptionItem {
    fn to_item(&self, prescription_id: &str) -> PrescriptionItem {
        let mut item = PrescriptionItem::new(
            prescription_id.to_string(),
            self.medication_id.clone(),
            self.dosage.clone(),
            self.frequency.clone(),
            self.duration.clone(),
            self.quantity,
        );
        item.instructions = self.instructions.clone();
        item
    }
}

/// Request to write a prescription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPrescription {
    pub patient_id: String,
    #[serde(default)]
    pub visit_id: Option<String>,
    pub prescribed_by: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub items: Vec<NewPrescriptionItem>,
}

/// Result of dispensing one prescription item.
#[derive(Debug, Clone, Serialize)]
pub struct ItemDispense {
    pub prescription: Prescription,
    pub outcome: DispenseOutcome,
}

/// Ledger context for work done on behalf of a prescription item.
fn item_context(prescription: &Prescription, item_id: &str) -> TransactionContext {
    TransactionContext {
        visit_id: prescription.visit_id.clone(),
        prescription_id: Some(prescription.id.clone()),
        prescription_item_id: Some(item_id.to_string()),
    }
}

fn require_open(prescription: &Prescription) -> PharmacyResult<()> {
    if prescription.status == PrescriptionStatus::Cancelled {
        return Err(PharmacyError::InvalidState(format!(
            "prescription {} is cancelled",
            prescription.id
        )));
    }
    Ok(())
}

fn validate_line(line: &NewPrescriptionItem) -> PharmacyResult<()> {
    if line.quantity == 0 {
        return Err(PharmacyError::Validation(
            "item quantity must be greater than zero".to_string(),
        ));
    }
    if line.dosage.trim().is_empty() {
        return Err(PharmacyError::Validation("item dosage is required".to_string()));
    }
    Ok(())
}

impl<'a> Pharmacy<'a> {
    /// Write a prescription and work out which items can be filled.
    pub fn create_prescription(&self, new: NewPrescription) -> PharmacyResult<Prescription> {
        if new.prescribed_by.trim().is_empty() {
            return Err(PharmacyError::Validation("prescribed_by is required".to_string()));
        }
        if new.items.is_empty() {
            return Err(PharmacyError::Validation(
                "a prescription needs at least one item".to_string(),
            ));
        }
        for line in &new.items {
            validate_line(line)?;
        }

        let prescription = self.db().atomically(|db| -> PharmacyResult<Prescription> {
            db.require_patient(&new.patient_id)?;
            if let Some(visit_id) = &new.visit_id {
                let visit = db.require_visit(visit_id)?;
                if visit.patient_id != new.patient_id {
                    return Err(PharmacyError::Validation(format!(
                        "visit {visit_id} belongs to another patient"
                    )));
                }
                if db.prescription_for_visit(visit_id)?.is_some() {
                    return Err(PharmacyError::InvalidState(format!(
                        "visit {visit_id} already has a prescription"
                    )));
                }
            }

            let mut prescription =
                Prescription::new(new.patient_id.clone(), new.prescribed_by.trim().to_string());
            prescription.visit_id = new.visit_id.clone();
            prescription.notes = new.notes.clone();
            for line in &new.items {
                db.require_medication(&line.medication_id)?;
                prescription.items.push(line.to_item(&prescription.id));
            }
            prescription.update_rollup();
            db.insert_prescription(&prescription)?;

            self.refresh_in_tx(&mut prescription)?;
            Ok(prescription)
        })?;

        tracing::info!(
            prescription = %prescription.id,
            items = prescription.total_items,
            out_of_stock = prescription.out_of_stock_items,
            "prescription created"
        );
        Ok(prescription)
    }

    /// Add a line to an existing prescription.
    pub fn add_item(
        &self,
        prescription_id: &str,
        line: NewPrescriptionItem,
    ) -> PharmacyResult<Prescription> {
        validate_line(&line)?;
        self.db().atomically(|db| {
            let mut prescription = db.require_prescription(prescription_id)?;
            require_open(&prescription)?;
            db.require_medication(&line.medication_id)?;

            let item = line.to_item(&prescription.id);
            db.insert_prescription_item(&item)?;
            prescription.items.push(item);
            self.refresh_in_tx(&mut prescription)?;
            Ok(prescription)
        })
    }

    /// Re-check stock for every item still waiting on availability.
    pub fn refresh_availability(&self, prescription_id: &str) -> PharmacyResult<Prescription> {
        self.db().atomically(|db| {
            let mut prescription = db.require_prescription(prescription_id)?;
            self.refresh_in_tx(&mut prescription)?;
            Ok(prescription)
        })
    }

    /// Availability pass and rollup, inside the caller's transaction.
    ///
    /// Only Pending, Available and Out of Stock items are touched; substituted
    /// and dispensed items keep their status.
    pub(crate) fn refresh_in_tx(&self, prescription: &mut Prescription) -> PharmacyResult<()> {
        if prescription.status == PrescriptionStatus::Cancelled {
            return Ok(());
        }

        for item in &mut prescription.items {
            if !item.status.is_availability_derived() {
                continue;
            }
            let (medication, _) = self.inventory.recompute(&item.medication_id)?;
            let status = if medication.current_stock >= item.quantity {
                ItemStatus::Available
            } else {
                ItemStatus::OutOfStock
            };
            if item.status != status {
                item.status = status;
                self.db().update_prescription_item(item)?;
            }
        }

        prescription.update_rollup();
        self.db().update_prescription_rollup(prescription)?;
        Ok(())
    }

    /// Replace an item's medication with another one that is in stock.
    ///
    /// Writes a Substitution ledger row against the substitute.
    pub fn substitute_item(
        &self,
        item_id: &str,
        substitute_id: &str,
        reason: &str,
        performed_by: &str,
    ) -> PharmacyResult<Prescription> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(PharmacyError::Validation(
                "substitution reason is required".to_string(),
            ));
        }

        self.db().atomically(|db| {
            let mut item = db.require_prescription_item(item_id)?;
            let mut prescription = db.require_prescription(&item.prescription_id)?;
            require_open(&prescription)?;
            if item.is_dispensed() {
                return Err(PharmacyError::InvalidState(format!(
                    "item {item_id} has already been dispensed"
                )));
            }
            if substitute_id == item.medication_id {
                return Err(PharmacyError::Validation(
                    "substitute must differ from the prescribed medication".to_string(),
                ));
            }

            let original = db.require_medication(&item.medication_id)?;
            let (substitute, _) = self.inventory.recompute(substitute_id)?;
            if substitute.current_stock < item.quantity {
                return Err(PharmacyError::from(InventoryError::InsufficientStock {
                    medication: substitute.name,
                    requested: item.quantity,
                    available: substitute.current_stock,
                }));
            }

            item.substituted_with = Some(substitute.id.clone());
            item.substitution_reason = Some(reason.to_string());
            item.status = ItemStatus::Substituted;
            db.update_prescription_item(&item)?;

            self.inventory.record_substitution(
                &substitute.id,
                &item_context(&prescription, &item.id),
                &format!("Substituted for {}: {}", original.name, reason),
                performed_by,
            )?;

            if let Some(slot) = prescription.items.iter_mut().find(|i| i.id == item.id) {
                *slot = item;
            }
            prescription.update_rollup();
            db.update_prescription_rollup(&prescription)?;

            tracing::info!(
                prescription = %prescription.id,
                original = %original.name,
                substitute = %substitute.name,
                "item substituted"
            );
            Ok(prescription)
        })
    }

    /// Dispense one item against its effective medication.
    ///
    /// `quantity` defaults to the prescribed quantity.
    pub fn dispense_item(
        &self,
        item_id: &str,
        quantity: Option<u32>,
        performed_by: &str,
    ) -> PharmacyResult<ItemDispense> {
        self.db()
            .atomically(|_| self.dispense_item_in_tx(item_id, quantity, performed_by))
    }

    pub(crate) fn dispense_item_in_tx(
        &self,
        item_id: &str,
        quantity: Option<u32>,
        performed_by: &str,
    ) -> PharmacyResult<ItemDispense> {
        let db = self.db();
        let mut item = db.require_prescription_item(item_id)?;
        let mut prescription = db.require_prescription(&item.prescription_id)?;
        require_open(&prescription)?;
        if item.is_dispensed() {
            return Err(PharmacyError::InvalidState(format!(
                "item {item_id} has already been dispensed"
            )));
        }

        let quantity = quantity.unwrap_or(item.quantity);
        let outcome = self.inventory.dispense_in_tx(
            item.effective_medication_id(),
            quantity,
            performed_by,
            &item_context(&prescription, &item.id),
        )?;

        item.dispensed_quantity = Some(quantity);
        item.dispensed_date = Some(self.today());
        item.dispensed_by = Some(performed_by.to_string());
        item.status = ItemStatus::Dispensed;
        db.update_prescription_item(&item)?;

        if let Some(slot) = prescription.items.iter_mut().find(|i| i.id == item.id) {
            *slot = item;
        }
        prescription.update_rollup();
        db.update_prescription_rollup(&prescription)?;

        Ok(ItemDispense {
            prescription,
            outcome,
        })
    }

    /// Cancel a prescription and its queue entry, if any.
    pub fn cancel_prescription(&self, prescription_id: &str) -> PharmacyResult<Prescription> {
        let (prescription, entry) = self.db().atomically(|_| self.cancel_in_tx(prescription_id))?;
        if let Some(entry) = entry {
            self.publish_queue_update(&entry);
        }
        Ok(prescription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, TransactionFilter};
    use crate::models::{TransactionType, Visit};
    use crate::notify::NoopPublisher;
    use crate::pharmacy::test_support::*;
    use chrono::{Duration, NaiveTime};

    #[test]
    fn test_create_sets_availability() {
        let db = Database::open_in_memory().unwrap();
        let patient = patient(&db);
        let stocked = medication(&db, "Amoxicillin", "Antibiotics");
        stock(&db, &stocked, "LOT-1", today() + Duration::days(90), 30);
        let empty = medication(&db, "Ampicillin", "Antibiotics");

        let pharmacy = Pharmacy::with_today(&db, today(), &NoopPublisher);
        let rx = pharmacy
            .create_prescription(order(&patient, vec![line(&stocked, 20), line(&empty, 5)]))
            .unwrap();

        assert_eq!(rx.items[0].status, ItemStatus::Available);
        assert_eq!(rx.items[1].status, ItemStatus::OutOfStock);
        assert_eq!(rx.total_items, 2);
        assert_eq!(rx.available_items, 1);
        assert_eq!(rx.out_of_stock_items, 1);
        assert_eq!(rx.status, PrescriptionStatus::Pending);

        let stored = db.require_prescription(&rx.id).unwrap();
        assert_eq!(stored.items[1].status, ItemStatus::OutOfStock);
        assert_eq!(stored.out_of_stock_items, 1);
    }

    #[test]
    fn test_create_validates_input() {
        let db = Database::open_in_memory().unwrap();
        let patient = patient(&db);
        let med = medication(&db, "Amoxicillin", "Antibiotics");
        let pharmacy = Pharmacy::with_today(&db, today(), &NoopPublisher);

        assert!(matches!(
            pharmacy.create_prescription(order(&patient, vec![])),
            Err(PharmacyError::Validation(_))
        ));
        assert!(matches!(
            pharmacy.create_prescription(order(&patient, vec![line(&med, 0)])),
            Err(PharmacyError::Validation(_))
        ));

        let mut unknown = line(&med, 1);
        unknown.medication_id = "missing".into();
        assert!(matches!(
            pharmacy.create_prescription(order(&patient, vec![unknown])),
            Err(PharmacyError::NotFound(_))
        ));
        assert!(db.list_prescriptions(None, None).unwrap().is_empty());
    }

    #[test]
    fn test_one_prescription_per_visit() {
        let db = Database::open_in_memory().unwrap();
        let patient = patient(&db);
        let med = medication(&db, "Amoxicillin", "Antibiotics");
        let visit = Visit::new(
            patient.id.clone(),
            today(),
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            "Headquarters".into(),
            "consultation".into(),
            "General".into(),
        );
        db.insert_visit(&visit).unwrap();

        let pharmacy = Pharmacy::with_today(&db, today(), &NoopPublisher);
        let mut request = order(&patient, vec![line(&med, 1)]);
        request.visit_id = Some(visit.id.clone());
        pharmacy.create_prescription(request.clone()).unwrap();

        assert!(matches!(
            pharmacy.create_prescription(request),
            Err(PharmacyError::InvalidState(_))
        ));
    }

    #[test]
    fn test_refresh_after_restock() {
        let db = Database::open_in_memory().unwrap();
        let patient = patient(&db);
        let med = medication(&db, "Amoxicillin", "Antibiotics");
        let pharmacy = Pharmacy::with_today(&db, today(), &NoopPublisher);
        let rx = pharmacy
            .create_prescription(order(&patient, vec![line(&med, 10)]))
            .unwrap();
        assert_eq!(rx.items[0].status, ItemStatus::OutOfStock);

        stock(&db, &med, "LOT-1", today() + Duration::days(90), 10);
        let rx = pharmacy.refresh_availability(&rx.id).unwrap();
        assert_eq!(rx.items[0].status, ItemStatus::Available);
        assert_eq!(rx.available_items, 1);
        assert_eq!(rx.out_of_stock_items, 0);
    }

    #[test]
    fn test_substitution_records_ledger_row() {
        let db = Database::open_in_memory().unwrap();
        let patient = patient(&db);
        let original = medication(&db, "Amoxicillin", "Antibiotics");
        let substitute = medication(&db, "Ampicillin", "Antibiotics");
        stock(&db, &substitute, "LOT-9", today() + Duration::days(90), 40);

        let pharmacy = Pharmacy::with_today(&db, today(), &NoopPublisher);
        let rx = pharmacy
            .create_prescription(order(&patient, vec![line(&original, 10)]))
            .unwrap();
        let item_id = rx.items[0].id.clone();

        let rx = pharmacy
            .substitute_item(&item_id, &substitute.id, "Original out of stock", "pharmacist")
            .unwrap();
        let item = rx.item(&item_id).unwrap();
        assert_eq!(item.status, ItemStatus::Substituted);
        assert_eq!(item.substituted_with.as_deref(), Some(substitute.id.as_str()));
        assert_eq!(rx.available_items, 1);

        let rows = db
            .list_transactions(&TransactionFilter {
                medication_id: Some(substitute.id.clone()),
                kind: Some(TransactionType::Substitution),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].quantity, 0);
        assert_eq!(rows[0].prescription_item_id.as_deref(), Some(item_id.as_str()));
        assert_eq!(rows[0].reason, "Substituted for Amoxicillin: Original out of stock");
    }

    #[test]
    fn test_substitution_rules() {
        let db = Database::open_in_memory().unwrap();
        let patient = patient(&db);
        let original = medication(&db, "Amoxicillin", "Antibiotics");
        let thin = medication(&db, "Ampicillin", "Antibiotics");
        stock(&db, &thin, "LOT-9", today() + Duration::days(90), 5);

        let pharmacy = Pharmacy::with_today(&db, today(), &NoopPublisher);
        let rx = pharmacy
            .create_prescription(order(&patient, vec![line(&original, 10)]))
            .unwrap();
        let item_id = rx.items[0].id.clone();

        assert!(matches!(
            pharmacy.substitute_item(&item_id, &thin.id, "", "pharmacist"),
            Err(PharmacyError::Validation(_))
        ));
        assert!(matches!(
            pharmacy.substitute_item(&item_id, &original.id, "same", "pharmacist"),
            Err(PharmacyError::Validation(_))
        ));
        assert!(matches!(
            pharmacy.substitute_item(&item_id, &thin.id, "short", "pharmacist"),
            Err(PharmacyError::Inventory(InventoryError::InsufficientStock { .. }))
        ));
        assert_eq!(db.count_transactions().unwrap(), 1);
    }

    #[test]
    fn test_dispense_item_uses_substitute() {
        let db = Database::open_in_memory().unwrap();
        let patient = patient(&db);
        let original = medication(&db, "Amoxicillin", "Antibiotics");
        let substitute = medication(&db, "Ampicillin", "Antibiotics");
        stock(&db, &substitute, "LOT-9", today() + Duration::days(90), 40);

        let pharmacy = Pharmacy::with_today(&db, today(), &NoopPublisher);
        let rx = pharmacy
            .create_prescription(order(&patient, vec![line(&original, 10)]))
            .unwrap();
        let item_id = rx.items[0].id.clone();
        pharmacy
            .substitute_item(&item_id, &substitute.id, "Original out of stock", "pharmacist")
            .unwrap();

        let result = pharmacy.dispense_item(&item_id, None, "pharmacist").unwrap();
        assert_eq!(result.outcome.medication.id, substitute.id);
        assert_eq!(result.outcome.medication.current_stock, 30);
        assert_eq!(result.prescription.status, PrescriptionStatus::Dispensed);

        let item = db.require_prescription_item(&item_id).unwrap();
        assert_eq!(item.status, ItemStatus::Dispensed);
        assert_eq!(item.dispensed_quantity, Some(10));
        assert_eq!(item.dispensed_date, Some(today()));
        assert_eq!(item.dispensed_by.as_deref(), Some("pharmacist"));

        assert!(matches!(
            pharmacy.dispense_item(&item_id, None, "pharmacist"),
            Err(PharmacyError::InvalidState(_))
        ));
        assert!(matches!(
            pharmacy.substitute_item(&item_id, &original.id, "late", "pharmacist"),
            Err(PharmacyError::InvalidState(_))
        ));
    }

    #[test]
    fn test_dispense_item_shortfall_leaves_item_pending() {
        let db = Database::open_in_memory().unwrap();
        let patient = patient(&db);
        let med = medication(&db, "Amoxicillin", "Antibiotics");
        stock(&db, &med, "LOT-1", today() + Duration::days(90), 5);

        let pharmacy = Pharmacy::with_today(&db, today(), &NoopPublisher);
        let rx = pharmacy
            .create_prescription(order(&patient, vec![line(&med, 10)]))
            .unwrap();
        let err = pharmacy
            .dispense_item(&rx.items[0].id, None, "pharmacist")
            .unwrap_err();
        assert!(matches!(
            err,
            PharmacyError::Inventory(InventoryError::InsufficientStock { requested: 10, available: 5, .. })
        ));

        let item = db.require_prescription_item(&rx.items[0].id).unwrap();
        assert_eq!(item.status, ItemStatus::OutOfStock);
        assert!(item.dispensed_quantity.is_none());
        assert_eq!(db.require_medication(&med.id).unwrap().current_stock, 5);
    }

    #[test]
    fn test_cancelled_prescription_rejects_work() {
        let db = Database::open_in_memory().unwrap();
        let patient = patient(&db);
        let med = medication(&db, "Amoxicillin", "Antibiotics");
        stock(&db, &med, "LOT-1", today() + Duration::days(90), 50);

        let pharmacy = Pharmacy::with_today(&db, today(), &NoopPublisher);
        let rx = pharmacy
            .create_prescription(order(&patient, vec![line(&med, 10)]))
            .unwrap();
        let rx = pharmacy.cancel_prescription(&rx.id).unwrap();
        assert_eq!(rx.status, PrescriptionStatus::Cancelled);

        assert!(matches!(
            pharmacy.dispense_item(&rx.items[0].id, None, "pharmacist"),
            Err(PharmacyError::InvalidState(_))
        ));
        assert!(matches!(
            pharmacy.add_item(&rx.id, line(&med, 1)),
            Err(PharmacyError::InvalidState(_))
        ));
    }

    #[test]
    fn test_add_item_reruns_availability() {
        let db = Database::open_in_memory().unwrap();
        let patient = patient(&db);
        let med = medication(&db, "Amoxicillin", "Antibiotics");
        stock(&db, &med, "LOT-1", today() + Duration::days(90), 50);

        let pharmacy = Pharmacy::with_today(&db, today(), &NoopPublisher);
        let rx = pharmacy
            .create_prescription(order(&patient, vec![line(&med, 10)]))
            .unwrap();
        let rx = pharmacy.add_item(&rx.id, line(&med, 60)).unwrap();
        assert_eq!(rx.total_items, 2);
        assert_eq!(rx.items[1].status, ItemStatus::OutOfStock);
        assert_eq!(rx.out_of_stock_items, 1);
    }
}
