//! End-to-end pharmacy workflow: prescribe, queue, substitute, dispense.

use chrono::{Duration, NaiveDate};

use emr_core::db::{Database, TransactionFilter};
use emr_core::inventory::NewBatch;
use emr_core::models::{
    ItemStatus, Medication, Patient, PatientKind, PrescriptionStatus, Priority, QueueStatus,
    TransactionType,
};
use emr_core::notify::{RecordingPublisher, PHARMACY_QUEUE_UPDATED};
use emr_core::pharmacy::{ItemRequest, NewPrescription, NewPrescriptionItem, Pharmacy};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()
}

fn make_patient(db: &Database) -> Patient {
    let patient = Patient::new(
        "Bello".to_string(),
        "Tunde".to_string(),
        PatientKind::Retiree {
            personal_number: "NPA-2040".to_string(),
            retirement_date: None,
            former_division: None,
            former_location: None,
        },
    );
    db.insert_patient(&patient).unwrap();
    patient
}

fn make_medication(db: &Database, name: &str, generic: &str, category: &str) -> Medication {
    let mut med = Medication::new(name.to_string(), category.to_string());
    med.generic_name = Some(generic.to_string());
    med.prescription_required = true;
    db.insert_medication(&med).unwrap();
    med
}

fn restock(pharmacy: &Pharmacy<'_>, med: &Medication, number: &str, tablets: u32) {
    pharmacy
        .inventory()
        .add_batch(
            &med.id,
            NewBatch {
                batch_number: number.to_string(),
                expiry_date: (today() + Duration::days(180)).to_string(),
                total_tablets: tablets,
                ..Default::default()
            },
            "storekeeper",
        )
        .unwrap();
}

fn line(med: &Medication, quantity: u32) -> NewPrescriptionItem {
    NewPrescriptionItem {
        medication_id: med.id.clone(),
        dosage: "1 tablet".to_string(),
        frequency: "Three times daily".to_string(),
        duration: "5 days".to_string(),
        quantity,
        instructions: Some("After meals".to_string()),
    }
}

#[test]
fn test_full_counter_workflow() {
    let db = Database::open_in_memory().unwrap();
    let publisher = RecordingPublisher::new();
    let pharmacy = Pharmacy::with_today(&db, today(), &publisher);

    let patient = make_patient(&db);
    let amoxil = make_medication(&db, "Amoxil", "amoxicillin", "Antibiotics");
    let generic = make_medication(&db, "Amoxicillin Caps", "amoxicillin", "Antibiotics");
    let panadol = make_medication(&db, "Panadol", "paracetamol", "Analgesics");
    restock(&pharmacy, &generic, "GEN-1", 100);
    restock(&pharmacy, &panadol, "PAN-1", 100);

    let rx = pharmacy
        .create_prescription(NewPrescription {
            patient_id: patient.id.clone(),
            visit_id: None,
            prescribed_by: "Dr. Eze".to_string(),
            notes: None,
            items: vec![line(&amoxil, 15), line(&panadol, 15)],
        })
        .unwrap();
    assert_eq!(rx.items[0].status, ItemStatus::OutOfStock);
    assert_eq!(rx.items[1].status, ItemStatus::Available);

    let entry = pharmacy.enqueue(&rx.id, Priority::High).unwrap();
    let entry = pharmacy.assign_to_me(&entry.id, "pharm-ola").unwrap();
    assert_eq!(entry.status, QueueStatus::Processing);
    assert!(pharmacy.mark_ready(&entry.id).is_err());

    let suggestions = pharmacy.suggest_substitutes(&rx.items[0].id).unwrap();
    assert_eq!(suggestions[0].medication.id, generic.id);
    pharmacy
        .substitute_item(
            &rx.items[0].id,
            &generic.id,
            "Brand out of stock",
            "pharm-ola",
        )
        .unwrap();

    let entry = pharmacy.mark_ready(&entry.id).unwrap();
    assert_eq!(entry.status, QueueStatus::Ready);

    let requests: Vec<ItemRequest> = rx
        .items
        .iter()
        .map(|item| ItemRequest {
            item_id: item.id.clone(),
            quantity: None,
        })
        .collect();
    let outcome = pharmacy
        .dispense_items(&entry.id, &requests, "pharm-ola")
        .unwrap();
    assert!(outcome.failures.is_empty());
    assert_eq!(outcome.entry.status, QueueStatus::Dispensed);
    assert_eq!(outcome.prescription.status, PrescriptionStatus::Dispensed);
    assert_eq!(outcome.prescription.dispensed_items, 2);

    assert_eq!(db.require_medication(&generic.id).unwrap().current_stock, 85);
    assert_eq!(db.require_medication(&panadol.id).unwrap().current_stock, 85);
    assert_eq!(db.require_medication(&amoxil.id).unwrap().current_stock, 0);

    let linked = db
        .list_transactions(&TransactionFilter {
            prescription_id: Some(rx.id.clone()),
            ..Default::default()
        })
        .unwrap();
    let kinds: Vec<TransactionType> = linked.iter().map(|t| t.kind).collect();
    assert_eq!(kinds.len(), 3);
    assert_eq!(
        kinds
            .iter()
            .filter(|k| **k == TransactionType::Dispensed)
            .count(),
        2
    );
    assert!(kinds.contains(&TransactionType::Substitution));
    assert!(pharmacy.inventory().verify_ledger().unwrap().valid);

    // enqueue, assign, ready, dispensed
    assert_eq!(
        publisher.names(),
        vec![PHARMACY_QUEUE_UPDATED; 4]
    );

    let summary = pharmacy.prescription_summary(&rx.id).unwrap();
    assert_eq!(summary.patient_name, "Bello Tunde");
    assert_eq!(summary.personal_number.as_deref(), Some("NPA-2040"));
    assert_eq!(
        summary.medications[0]
            .substitution
            .as_ref()
            .unwrap()
            .approved_by,
        "pharm-ola"
    );
}

#[test]
fn test_queue_serves_high_priority_first() {
    let db = Database::open_in_memory().unwrap();
    let publisher = RecordingPublisher::new();
    let pharmacy = Pharmacy::with_today(&db, today(), &publisher);
    let patient = make_patient(&db);
    let med = make_medication(&db, "Panadol", "paracetamol", "Analgesics");

    let mut entries = Vec::new();
    for priority in [Priority::Normal, Priority::High, Priority::Medium] {
        let rx = pharmacy
            .create_prescription(NewPrescription {
                patient_id: patient.id.clone(),
                visit_id: None,
                prescribed_by: "Dr. Eze".to_string(),
                notes: None,
                items: vec![line(&med, 5)],
            })
            .unwrap();
        entries.push(pharmacy.enqueue(&rx.id, priority).unwrap());
    }

    let order: Vec<Priority> = db
        .list_queue(None)
        .unwrap()
        .into_iter()
        .map(|e| e.priority)
        .collect();
    assert_eq!(order, vec![Priority::High, Priority::Medium, Priority::Normal]);

    pharmacy.cancel_queue_entry(&entries[0].id).unwrap();
    let pending = db.list_queue(Some(QueueStatus::Pending)).unwrap();
    assert_eq!(pending.len(), 2);
}
