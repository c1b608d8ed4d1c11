//! FIFO dispensing integration tests.

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;

use emr_core::db::{Database, TransactionFilter};
use emr_core::inventory::{Inventory, InventoryError, NewBatch};
use emr_core::models::{
    BatchStatus, Medication, MedicationBatch, MedicationStatus, TransactionContext,
    TransactionType,
};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()
}

fn make_medication(db: &Database, name: &str) -> Medication {
    let mut med = Medication::new(name.to_string(), "Antibiotics".to_string());
    med.minimum_stock = 10;
    med.pack_size = 10;
    db.insert_medication(&med).unwrap();
    med
}

fn receive(
    inventory: &Inventory<'_>,
    med: &Medication,
    number: &str,
    expires_in_days: i64,
    tablets: u32,
) -> MedicationBatch {
    inventory
        .add_batch(
            &med.id,
            NewBatch {
                batch_number: number.to_string(),
                expiry_date: (today() + Duration::days(expires_in_days)).to_string(),
                total_tablets: tablets,
                ..Default::default()
            },
            "storekeeper",
        )
        .unwrap()
        .batch
}

fn remaining(db: &Database, med: &Medication) -> u32 {
    db.batches_for_medication(&med.id)
        .unwrap()
        .iter()
        .map(|b| b.remaining_tablets)
        .sum()
}

#[test]
fn test_near_expiry_batch_is_drawn_first() {
    let db = Database::open_in_memory().unwrap();
    let inventory = Inventory::with_today(&db, today());
    let med = make_medication(&db, "Amoxicillin 500mg");
    let a = receive(&inventory, &med, "A", 5, 3);
    let c = receive(&inventory, &med, "C", 60, 20);
    assert_eq!(db.require_batch(&a.id).unwrap().status, BatchStatus::NearExpiry);

    let outcome = inventory
        .dispense(&med.id, 10, "pharmacist", &TransactionContext::default())
        .unwrap();

    assert_eq!(db.require_batch(&a.id).unwrap().remaining_tablets, 0);
    assert_eq!(db.require_batch(&c.id).unwrap().remaining_tablets, 13);
    assert_eq!(outcome.medication.current_stock, 13);

    let dispensed = db
        .list_transactions(&TransactionFilter {
            medication_id: Some(med.id.clone()),
            kind: Some(TransactionType::Dispensed),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(dispensed.len(), 1);
    assert_eq!(dispensed[0].quantity, -10);
}

#[test]
fn test_expired_stock_is_never_dispensed() {
    let db = Database::open_in_memory().unwrap();
    let inventory = Inventory::with_today(&db, today());
    let med = make_medication(&db, "Amoxicillin 500mg");
    inventory
        .add_batch(
            &med.id,
            NewBatch {
                batch_number: "OLD".to_string(),
                expiry_date: (today() - Duration::days(1)).to_string(),
                total_tablets: 50,
                allow_expired: true,
                ..Default::default()
            },
            "storekeeper",
        )
        .unwrap();

    let medication = db.require_medication(&med.id).unwrap();
    assert_eq!(medication.current_stock, 0);
    assert_eq!(medication.status, MedicationStatus::Expired);

    let err = inventory
        .dispense(&med.id, 1, "pharmacist", &TransactionContext::default())
        .unwrap_err();
    assert!(matches!(
        err,
        InventoryError::InsufficientStock { available: 0, .. }
    ));
}

#[test]
fn test_ledger_rows_cannot_be_changed() {
    let db = Database::open_in_memory().unwrap();
    let inventory = Inventory::with_today(&db, today());
    let med = make_medication(&db, "Amoxicillin 500mg");
    receive(&inventory, &med, "B1", 90, 40);
    inventory
        .dispense(&med.id, 5, "pharmacist", &TransactionContext::default())
        .unwrap();
    assert_eq!(db.count_transactions().unwrap(), 2);

    let update = db
        .conn()
        .execute("UPDATE stock_transactions SET quantity = 0", []);
    assert!(update.is_err());
    let delete = db.conn().execute("DELETE FROM stock_transactions", []);
    assert!(delete.is_err());

    assert_eq!(db.count_transactions().unwrap(), 2);
    let report = inventory.verify_ledger().unwrap();
    assert!(report.valid);
    assert_eq!(report.entries, 2);
}

#[test]
fn test_shortfall_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("emr.db");

    let med = {
        let db = Database::open(&path).unwrap();
        let inventory = Inventory::with_today(&db, today());
        let med = make_medication(&db, "Amoxicillin 500mg");
        receive(&inventory, &med, "B1", 90, 5);
        receive(&inventory, &med, "B2", 120, 5);

        let err = inventory
            .dispense(&med.id, 11, "pharmacist", &TransactionContext::default())
            .unwrap_err();
        assert!(matches!(
            err,
            InventoryError::InsufficientStock {
                requested: 11,
                available: 10,
                ..
            }
        ));
        med
    };

    let db = Database::open(&path).unwrap();
    assert_eq!(remaining(&db, &med), 10);
    assert_eq!(db.require_medication(&med.id).unwrap().current_stock, 10);
    assert_eq!(db.count_transactions().unwrap(), 2);
    assert!(Inventory::with_today(&db, today())
        .verify_ledger()
        .unwrap()
        .valid);
}

#[test]
fn test_dispense_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("emr.db");

    let med = {
        let db = Database::open(&path).unwrap();
        let inventory = Inventory::with_today(&db, today());
        let med = make_medication(&db, "Amoxicillin 500mg");
        receive(&inventory, &med, "B1", 90, 30);
        inventory
            .dispense(&med.id, 12, "pharmacist", &TransactionContext::default())
            .unwrap();
        med
    };

    let db = Database::open(&path).unwrap();
    let medication = db.require_medication(&med.id).unwrap();
    assert_eq!(medication.current_stock, 18);
    assert_eq!(medication.last_dispensed, Some(today()));
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    })]

    /// Property: a successful dispense removes exactly the requested tablets,
    /// and a batch is only touched once every earlier-expiring batch is empty.
    #[test]
    fn dispense_conserves_tablets_in_fifo_order(
        sizes in prop::collection::vec(1u32..60, 1..6),
        request_share in 0.0f64..1.0,
    ) {
        let db = Database::open_in_memory().unwrap();
        let inventory = Inventory::with_today(&db, today());
        let med = make_medication(&db, "Paracetamol 500mg");

        // Received latest-expiring first so insertion order differs from FIFO order.
        let count = sizes.len() as i64;
        for (i, size) in sizes.iter().enumerate() {
            let days = 40 + 10 * (count - i as i64);
            receive(&inventory, &med, &format!("LOT-{i}"), days, *size);
        }

        let total: u32 = sizes.iter().sum();
        let quantity = ((f64::from(total) * request_share) as u32).clamp(1, total);

        let outcome = inventory
            .dispense(&med.id, quantity, "pharmacist", &TransactionContext::default())
            .unwrap();

        prop_assert_eq!(remaining(&db, &med), total - quantity);
        prop_assert_eq!(outcome.medication.current_stock, total - quantity);
        prop_assert_eq!(
            outcome.batches_used.iter().map(|a| a.quantity).sum::<u32>(),
            quantity
        );

        let by_expiry = db.batches_for_medication(&med.id).unwrap();
        let mut seen_partial = false;
        for batch in &by_expiry {
            if seen_partial {
                prop_assert_eq!(batch.remaining_tablets, batch.total_tablets);
            } else if batch.remaining_tablets > 0 {
                seen_partial = true;
            }
        }
        for pair in outcome.batches_used.windows(2) {
            prop_assert!(pair[0].expiry_date <= pair[1].expiry_date);
        }
    }

    /// Property: asking for more than is on hand changes nothing.
    #[test]
    fn shortfall_changes_nothing(
        sizes in prop::collection::vec(1u32..60, 1..6),
        extra in 1u32..20,
    ) {
        let db = Database::open_in_memory().unwrap();
        let inventory = Inventory::with_today(&db, today());
        let med = make_medication(&db, "Paracetamol 500mg");
        for (i, size) in sizes.iter().enumerate() {
            receive(&inventory, &med, &format!("LOT-{i}"), 60 + i as i64, *size);
        }
        let total: u32 = sizes.iter().sum();
        let ledger_before = db.count_transactions().unwrap();

        let result = inventory.dispense(
            &med.id,
            total + extra,
            "pharmacist",
            &TransactionContext::default(),
        );

        let is_shortfall = matches!(result, Err(InventoryError::InsufficientStock { .. }));
        prop_assert!(is_shortfall);
        prop_assert_eq!(remaining(&db, &med), total);
        prop_assert_eq!(db.count_transactions().unwrap(), ledger_before);
    }
}
