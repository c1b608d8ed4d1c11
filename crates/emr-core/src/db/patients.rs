//! Patient database operations.
//!
//! The full patient record is stored as JSON next to a `kind` column and the
//! identifiers needed for lookups.

use rusqlite::{params, OptionalExtension};

use super::{decode_json, Database, DbError, DbResult};
use crate::models::Patient;

impl Database {
    /// Insert a new patient.
    pub fn insert_patient(&self, patient: &Patient) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO patients (
                id, kind, surname, first_name, personal_number, sponsor_personal_number,
                record, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                patient.id,
                patient.kind.as_str(),
                patient.surname,
                patient.first_name,
                patient.kind.personal_number(),
                patient.kind.sponsor_personal_number(),
                serde_json::to_string(patient)?,
                patient.created_at,
                patient.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Update an existing patient.
    pub fn update_patient(&self, patient: &Patient) -> DbResult<bool> {
        let mut stored = patient.clone();
        stored.updated_at = chrono::Utc::now().to_rfc3339();
        let rows_affected = self.conn.execute(
            r#"
            UPDATE patients SET
                kind = ?2,
                surname = ?3,
                first_name = ?4,
                personal_number = ?5,
                sponsor_personal_number = ?6,
                record = ?7,
                updated_at = ?8
            WHERE id = ?1
            "#,
            params![
                stored.id,
                stored.kind.as_str(),
                stored.surname,
                stored.first_name,
                stored.kind.personal_number(),
                stored.kind.sponsor_personal_number(),
                serde_json::to_string(&stored)?,
                stored.updated_at,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a patient by ID.
    pub fn get_patient(&self, id: &str) -> DbResult<Option<Patient>> {
        self.conn
            .query_row("SELECT record FROM patients WHERE id = ?", [id], |row| {
                decode_json(0, row.get(0)?)
            })
            .optional()
            .map_err(Into::into)
    }

    pub fn require_patient(&self, id: &str) -> DbResult<Patient> {
        self.get_patient(id)?
            .ok_or_else(|| DbError::NotFound(format!("patient {id}")))
    }

    /// Search patients by name prefix or personal number.
    pub fn search_patients(&self, query: &str, limit: usize) -> DbResult<Vec<Patient>> {
        let pattern = format!("{}%", query.trim());
        let mut stmt = self.conn.prepare(
            r#"
            SELECT record
            FROM patients
            WHERE surname LIKE ?1
               OR first_name LIKE ?1
               OR personal_number LIKE ?1
               OR sponsor_personal_number LIKE ?1
            ORDER BY surname, first_name
            LIMIT ?2
            "#,
        )?;

        let rows = stmt.query_map(params![pattern, limit as i64], |row| {
            decode_json(0, row.get(0)?)
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Patients of one kind, newest first.
    pub fn list_patients(&self, kind: Option<&str>) -> DbResult<Vec<Patient>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT record FROM patients
            WHERE (?1 IS NULL OR kind = ?1)
            ORDER BY created_at DESC
            "#,
        )?;
        let rows = stmt.query_map([kind], |row| decode_json(0, row.get(0)?))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Dependents sponsored by the holder of `personal_number`.
    pub fn dependents_of(&self, personal_number: &str) -> DbResult<Vec<Patient>> {
        let mut stmt = self.conn.prepare(
            "SELECT record FROM patients WHERE sponsor_personal_number = ? ORDER BY surname, first_name",
        )?;
        let rows = stmt.query_map([personal_number], |row| decode_json(0, row.get(0)?))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Delete a patient with no clinical history.
    pub fn delete_patient(&self, id: &str) -> DbResult<bool> {
        let referenced: i64 = self.conn.query_row(
            r#"
            SELECT (SELECT COUNT(*) FROM visits WHERE patient_id = ?1)
                 + (SELECT COUNT(*) FROM vital_readings WHERE patient_id = ?1)
                 + (SELECT COUNT(*) FROM prescriptions WHERE patient_id = ?1)
            "#,
            [id],
            |row| row.get(0),
        )?;
        if referenced > 0 {
            return Err(DbError::Constraint(format!(
                "patient {id} has visits, vitals or prescriptions"
            )));
        }
        let rows_affected = self.conn.execute("DELETE FROM patients WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }
}
