//! Prescription database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{decode_enum, Database, DbError, DbResult};
use crate::models::{ItemStatus, Prescription, PrescriptionItem, PrescriptionStatus};

const PRESCRIPTION_COLUMNS: &str = r#"
    id, visit_id, patient_id, prescribed_by, status, total_items, available_items,
    out_of_stock_items, dispensed_items, notes, created_at, updated_at
"#;

const ITEM_COLUMNS: &str = r#"
    id, prescription_id, medication_id, dosage, frequency, duration, quantity,
    instructions, status, substituted_with, substitution_reason, dispensed_quantity,
    dispensed_date, dispensed_by
"#;

fn row_to_prescription(row: &Row<'_>) -> rusqlite::Result<Prescription> {
    Ok(Prescription {
        id: row.get(0)?,
        visit_id: row.get(1)?,
        patient_id: row.get(2)?,
        prescribed_by: row.get(3)?,
        status: decode_enum(4, row.get(4)?, PrescriptionStatus::parse)?,
        total_items: row.get(5)?,
        available_items: row.get(6)?,
        out_of_stock_items: row.get(7)?,
        dispensed_items: row.get(8)?,
        notes: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
        items: Vec::new(),
    })
}

fn row_to_item(row: &Row<'_>) -> rusqlite::Result<PrescriptionItem> {
    Ok(PrescriptionItem {
        id: row.get(0)?,
        prescription_id: row.get(1)?,
        medication_id: row.get(2)?,
        dosage: row.get(3)?,
        frequency: row.get(4)?,
        duration: row.get(5)?,
        quantity: row.get(6)?,
        instructions: row.get(7)?,
        status: decode_enum(8, row.get(8)?, ItemStatus::parse)?,
        substituted_with: row.get(9)?,
        substitution_reason: row.get(10)?,
        dispensed_quantity: row.get(11)?,
        dispensed_date: row.get(12)?,
        dispensed_by: row.get(13)?,
    })
}

impl Database {
    /// Insert a prescription and its items.
    ///
    /// Fails with `Constraint` if the visit already has a prescription.
    pub fn insert_prescription(&self, prescription: &Prescription) -> DbResult<()> {
        if let Some(visit_id) = &prescription.visit_id {
            if self.prescription_for_visit(visit_id)?.is_some() {
                return Err(DbError::Constraint(format!(
                    "visit {visit_id} already has a prescription"
                )));
            }
        }

        self.conn.execute(
            r#"
            INSERT INTO prescriptions (
                id, visit_id, patient_id, prescribed_by, status, total_items, available_items,
                out_of_stock_items, dispensed_items, notes, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                prescription.id,
                prescription.visit_id,
                prescription.patient_id,
                prescription.prescribed_by,
                prescription.status.as_str(),
                prescription.total_items,
                prescription.available_items,
                prescription.out_of_stock_items,
                prescription.dispensed_items,
                prescription.notes,
                prescription.created_at,
                prescription.updated_at,
            ],
        )?;

        for item in &prescription.items {
            self.insert_prescription_item(item)?;
        }
        Ok(())
    }

    pub fn insert_prescription_item(&self, item: &PrescriptionItem) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO prescription_items (
                id, prescription_id, medication_id, dosage, frequency, duration, quantity,
                instructions, status, substituted_with, substitution_reason, dispensed_quantity,
                dispensed_date, dispensed_by
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                item.id,
                item.prescription_id,
                item.medication_id,
                item.dosage,
                item.frequency,
                item.duration,
                item.quantity,
                item.instructions,
                item.status.as_str(),
                item.substituted_with,
                item.substitution_reason,
                item.dispensed_quantity,
                item.dispensed_date,
                item.dispensed_by,
            ],
        )?;
        Ok(())
    }

    /// Persist an item's workflow fields.
    pub fn update_prescription_item(&self, item: &PrescriptionItem) -> DbResult<()> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE prescription_items SET
                status = ?2,
                substituted_with = ?3,
                substitution_reason = ?4,
                dispensed_quantity = ?5,
                dispensed_date = ?6,
                dispensed_by = ?7,
                instructions = ?8
            WHERE id = ?1
            "#,
            params![
                item.id,
                item.status.as_str(),
                item.substituted_with,
                item.substitution_reason,
                item.dispensed_quantity,
                item.dispensed_date,
                item.dispensed_by,
                item.instructions,
            ],
        )?;
        if rows_affected == 0 {
            return Err(DbError::NotFound(format!("prescription item {}", item.id)));
        }
        Ok(())
    }

    /// Persist the status and rollup counters of a prescription.
    pub fn update_prescription_rollup(&self, prescription: &Prescription) -> DbResult<()> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE prescriptions SET
                status = ?2,
                total_items = ?3,
                available_items = ?4,
                out_of_stock_items = ?5,
                dispensed_items = ?6,
                notes = ?7,
                updated_at = ?8
            WHERE id = ?1
            "#,
            params![
                prescription.id,
                prescription.status.as_str(),
                prescription.total_items,
                prescription.available_items,
                prescription.out_of_stock_items,
                prescription.dispensed_items,
                prescription.notes,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        if rows_affected == 0 {
            return Err(DbError::NotFound(format!("prescription {}", prescription.id)));
        }
        Ok(())
    }

    /// Items of a prescription in the order they were written.
    pub fn prescription_items(&self, prescription_id: &str) -> DbResult<Vec<PrescriptionItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM prescription_items WHERE prescription_id = ? ORDER BY rowid"
        ))?;
        let rows = stmt.query_map([prescription_id], row_to_item)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn get_prescription_item(&self, id: &str) -> DbResult<Option<PrescriptionItem>> {
        self.conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM prescription_items WHERE id = ?"),
                [id],
                row_to_item,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn require_prescription_item(&self, id: &str) -> DbResult<PrescriptionItem> {
        self.get_prescription_item(id)?
            .ok_or_else(|| DbError::NotFound(format!("prescription item {id}")))
    }

    /// Get a prescription with its items.
    pub fn get_prescription(&self, id: &str) -> DbResult<Option<Prescription>> {
        let prescription = self
            .conn
            .query_row(
                &format!("SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions WHERE id = ?"),
                [id],
                row_to_prescription,
            )
            .optional()?;

        match prescription {
            Some(mut prescription) => {
                prescription.items = self.prescription_items(&prescription.id)?;
                Ok(Some(prescription))
            }
            None => Ok(None),
        }
    }

    pub fn require_prescription(&self, id: &str) -> DbResult<Prescription> {
        self.get_prescription(id)?
            .ok_or_else(|| DbError::NotFound(format!("prescription {id}")))
    }

    pub fn prescription_for_visit(&self, visit_id: &str) -> DbResult<Option<Prescription>> {
        let id: Option<String> = self
            .conn
            .query_row(
                "SELECT id FROM prescriptions WHERE visit_id = ?",
                [visit_id],
                |row| row.get(0),
            )
            .optional()?;
        match id {
            Some(id) => self.get_prescription(&id),
            None => Ok(None),
        }
    }

    /// Prescriptions, newest first, optionally for one patient and status.
    pub fn list_prescriptions(
        &self,
        patient_id: Option<&str>,
        status: Option<PrescriptionStatus>,
    ) -> DbResult<Vec<Prescription>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {PRESCRIPTION_COLUMNS}
            FROM prescriptions
            WHERE (?1 IS NULL OR patient_id = ?1)
              AND (?2 IS NULL OR status = ?2)
            ORDER BY created_at DESC
            "#
        ))?;
        let rows = stmt.query_map(params![patient_id, status.map(|s| s.as_str())], row_to_prescription)?;
        let mut prescriptions = rows.collect::<Result<Vec<_>, _>>()?;
        for prescription in &mut prescriptions {
            prescription.items = self.prescription_items(&prescription.id)?;
        }
        Ok(prescriptions)
    }
}
