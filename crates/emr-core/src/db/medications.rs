//! Medication database operations.

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};

use super::{decode_enum, Database, DbError, DbResult};
use crate::models::{Medication, MedicationStatus};

const MEDICATION_COLUMNS: &str = r#"
    id, name, generic_name, category, strength, dosage_form, manufacturer,
    supplier, location, barcode, prescription_required, is_generic,
    minimum_stock, maximum_stock, pack_size, monthly_usage, current_stock,
    status, last_restocked, last_dispensed, notes, created_at, updated_at
"#;

fn row_to_medication(row: &Row<'_>) -> rusqlite::Result<Medication> {
    Ok(Medication {
        id: row.get(0)?,
        name: row.get(1)?,
        generic_name: row.get(2)?,
        category: row.get(3)?,
        strength: row.get(4)?,
        dosage_form: row.get(5)?,
        manufacturer: row.get(6)?,
        supplier: row.get(7)?,
        location: row.get(8)?,
        barcode: row.get(9)?,
        prescription_required: row.get(10)?,
        is_generic: row.get(11)?,
        minimum_stock: row.get(12)?,
        maximum_stock: row.get(13)?,
        pack_size: row.get(14)?,
        monthly_usage: row.get(15)?,
        current_stock: row.get(16)?,
        status: decode_enum(17, row.get(17)?, MedicationStatus::parse)?,
        last_restocked: row.get(18)?,
        last_dispensed: row.get(19)?,
        notes: row.get(20)?,
        created_at: row.get(21)?,
        updated_at: row.get(22)?,
    })
}

/// Filter for listing medications.
#[derive(Debug, Clone, Default)]
pub struct MedicationFilter {
    /// Case-insensitive substring of name, generic name or barcode
    pub search: Option<String>,
    pub category: Option<String>,
    pub status: Option<MedicationStatus>,
}

impl Database {
    /// Insert a new medication.
    pub fn insert_medication(&self, medication: &Medication) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO medications (
                id, name, generic_name, category, strength, dosage_form, manufacturer,
                supplier, location, barcode, prescription_required, is_generic,
                minimum_stock, maximum_stock, pack_size, monthly_usage, current_stock,
                status, last_restocked, last_dispensed, notes, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                      ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)
            "#,
            params![
                medication.id,
                medication.name,
                medication.generic_name,
                medication.category,
                medication.strength,
                medication.dosage_form,
                medication.manufacturer,
                medication.supplier,
                medication.location,
                medication.barcode,
                medication.prescription_required,
                medication.is_generic,
                medication.minimum_stock,
                medication.maximum_stock,
                medication.pack_size,
                medication.monthly_usage,
                medication.current_stock,
                medication.status.as_str(),
                medication.last_restocked,
                medication.last_dispensed,
                medication.notes,
                medication.created_at,
                medication.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Update the descriptive fields of a medication.
    ///
    /// Stock and status are derived and only change through
    /// [`Database::save_medication_stock`].
    pub fn update_medication(&self, medication: &Medication) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE medications SET
                name = ?2,
                generic_name = ?3,
                category = ?4,
                strength = ?5,
                dosage_form = ?6,
                manufacturer = ?7,
                supplier = ?8,
                location = ?9,
                barcode = ?10,
                prescription_required = ?11,
                is_generic = ?12,
                minimum_stock = ?13,
                maximum_stock = ?14,
                pack_size = ?15,
                monthly_usage = ?16,
                notes = ?17,
                updated_at = ?18
            WHERE id = ?1
            "#,
            params![
                medication.id,
                medication.name,
                medication.generic_name,
                medication.category,
                medication.strength,
                medication.dosage_form,
                medication.manufacturer,
                medication.supplier,
                medication.location,
                medication.barcode,
                medication.prescription_required,
                medication.is_generic,
                medication.minimum_stock,
                medication.maximum_stock,
                medication.pack_size,
                medication.monthly_usage,
                medication.notes,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Persist the derived stock fields of a medication.
    pub fn save_medication_stock(&self, medication: &Medication) -> DbResult<()> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE medications SET
                current_stock = ?2,
                status = ?3,
                last_restocked = ?4,
                last_dispensed = ?5,
                updated_at = ?6
            WHERE id = ?1
            "#,
            params![
                medication.id,
                medication.current_stock,
                medication.status.as_str(),
                medication.last_restocked,
                medication.last_dispensed,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        if rows_affected == 0 {
            return Err(DbError::NotFound(format!("medication {}", medication.id)));
        }
        Ok(())
    }

    /// Get a medication by ID.
    pub fn get_medication(&self, id: &str) -> DbResult<Option<Medication>> {
        self.conn
            .query_row(
                &format!("SELECT {MEDICATION_COLUMNS} FROM medications WHERE id = ?"),
                [id],
                row_to_medication,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Get a medication by ID, failing if absent.
    pub fn require_medication(&self, id: &str) -> DbResult<Medication> {
        self.get_medication(id)?
            .ok_or_else(|| DbError::NotFound(format!("medication {id}")))
    }

    /// List medications matching `filter`, ordered by name.
    pub fn list_medications(&self, filter: &MedicationFilter) -> DbResult<Vec<Medication>> {
        let pattern = filter
            .search
            .as_ref()
            .map(|s| format!("%{}%", s.to_lowercase()));
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {MEDICATION_COLUMNS}
            FROM medications
            WHERE (?1 IS NULL OR lower(name) LIKE ?1 OR lower(generic_name) LIKE ?1
                   OR lower(barcode) LIKE ?1)
              AND (?2 IS NULL OR category = ?2)
              AND (?3 IS NULL OR status = ?3)
            ORDER BY name
            "#
        ))?;

        let rows = stmt.query_map(
            params![
                pattern,
                filter.category,
                filter.status.map(|s| s.as_str())
            ],
            row_to_medication,
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// All medications in a category, ordered by name.
    pub fn medications_in_category(&self, category: &str) -> DbResult<Vec<Medication>> {
        self.list_medications(&MedicationFilter {
            category: Some(category.to_string()),
            ..Default::default()
        })
    }

    /// Delete a medication that has never held stock.
    pub fn delete_medication(&self, id: &str) -> DbResult<bool> {
        let referenced: i64 = self.conn.query_row(
            r#"
            SELECT (SELECT COUNT(*) FROM medication_batches WHERE medication_id = ?1)
                 + (SELECT COUNT(*) FROM stock_transactions WHERE medication_id = ?1)
                 + (SELECT COUNT(*) FROM prescription_items
                    WHERE medication_id = ?1 OR substituted_with = ?1)
            "#,
            [id],
            |row| row.get(0),
        )?;
        if referenced > 0 {
            return Err(DbError::Constraint(format!(
                "medication {id} has batches, transactions or prescriptions"
            )));
        }
        let rows_affected = self
            .conn
            .execute("DELETE FROM medications WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }

    /// Total tablets dispensed for a medication on or after `since`.
    pub fn dispensed_since(&self, medication_id: &str, since: NaiveDate) -> DbResult<u64> {
        let total: i64 = self.conn.query_row(
            r#"
            SELECT COALESCE(SUM(-quantity), 0)
            FROM stock_transactions
            WHERE medication_id = ?1
              AND transaction_type = 'Dispensed'
              AND substr(created_at, 1, 10) >= ?2
            "#,
            params![medication_id, since],
            |row| row.get(0),
        )?;
        Ok(total.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(name: &str, category: &str) -> Medication {
        let mut med = Medication::new(name.into(), category.into());
        med.generic_name = Some(name.to_lowercase());
        med.pack_size = 10;
        med.minimum_stock = 20;
        med
    }

    #[test]
    fn test_insert_and_get_medication() {
        let db = Database::open_in_memory().unwrap();
        let med = sample("Amoxicillin", "Antibiotics");
        db.insert_medication(&med).unwrap();

        let fetched = db.get_medication(&med.id).unwrap().unwrap();
        assert_eq!(fetched, med);
    }

    #[test]
    fn test_update_does_not_touch_stock() {
        let db = Database::open_in_memory().unwrap();
        let mut med = sample("Amoxicillin", "Antibiotics");
        db.insert_medication(&med).unwrap();

        med.location = Some("Shelf A".into());
        med.current_stock = 500;
        assert!(db.update_medication(&med).unwrap());

        let fetched = db.require_medication(&med.id).unwrap();
        assert_eq!(fetched.location.as_deref(), Some("Shelf A"));
        assert_eq!(fetched.current_stock, 0);
    }

    #[test]
    fn test_list_with_filters() {
        let db = Database::open_in_memory().unwrap();
        db.insert_medication(&sample("Amoxicillin", "Antibiotics"))
            .unwrap();
        db.insert_medication(&sample("Ampiclox", "Antibiotics"))
            .unwrap();
        db.insert_medication(&sample("Paracetamol", "Analgesics"))
            .unwrap();

        let all = db.list_medications(&MedicationFilter::default()).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].name, "Amoxicillin");

        let search = db
            .list_medications(&MedicationFilter {
                search: Some("AMP".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(search.len(), 1);

        assert_eq!(db.medications_in_category("Antibiotics").unwrap().len(), 2);
    }

    #[test]
    fn test_require_missing_medication() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.require_medication("nope"),
            Err(DbError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_unused_medication() {
        let db = Database::open_in_memory().unwrap();
        let med = sample("Amoxicillin", "Antibiotics");
        db.insert_medication(&med).unwrap();
        assert!(db.delete_medication(&med.id).unwrap());
        assert!(db.get_medication(&med.id).unwrap().is_none());
    }
}
