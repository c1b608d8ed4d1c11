//! Visit and vital-sign database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{decode_enum, Database, DbError, DbResult};
use crate::models::{Visit, VisitPriority, VisitStatus, VitalReading};

const VISIT_COLUMNS: &str = r#"
    id, patient_id, visit_date, visit_time, visit_location, visit_type, clinic,
    priority, status, special_instructions, assigned_nurse, created_at, updated_at
"#;

const VITAL_COLUMNS: &str = r#"
    id, patient_id, recorded_at, systolic, diastolic, heart_rate, blood_sugar, rbs,
    temperature, weight, height, respiratory_rate, oxygen_saturation, pain_scale,
    comment, recorded_by
"#;

fn row_to_visit(row: &Row<'_>) -> rusqlite::Result<Visit> {
    Ok(Visit {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        visit_date: row.get(2)?,
        visit_time: row.get(3)?,
        visit_location: row.get(4)?,
        visit_type: row.get(5)?,
        clinic: row.get(6)?,
        priority: decode_enum(7, row.get(7)?, VisitPriority::parse)?,
        status: decode_enum(8, row.get(8)?, VisitStatus::parse)?,
        special_instructions: row.get(9)?,
        assigned_nurse: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn row_to_vitals(row: &Row<'_>) -> rusqlite::Result<VitalReading> {
    Ok(VitalReading {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        recorded_at: row.get(2)?,
        systolic: row.get(3)?,
        diastolic: row.get(4)?,
        heart_rate: row.get(5)?,
        blood_sugar: row.get(6)?,
        rbs: row.get(7)?,
        temperature: row.get(8)?,
        weight: row.get(9)?,
        height: row.get(10)?,
        respiratory_rate: row.get(11)?,
        oxygen_saturation: row.get(12)?,
        pain_scale: row.get(13)?,
        comment: row.get(14)?,
        recorded_by: row.get(15)?,
    })
}

impl Database {
    pub fn insert_visit(&self, visit: &Visit) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO visits (
                id, patient_id, visit_date, visit_time, visit_location, visit_type, clinic,
                priority, status, special_instructions, assigned_nurse, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                visit.id,
                visit.patient_id,
                visit.visit_date,
                visit.visit_time,
                visit.visit_location,
                visit.visit_type,
                visit.clinic,
                visit.priority.as_str(),
                visit.status.as_str(),
                visit.special_instructions,
                visit.assigned_nurse,
                visit.created_at,
                visit.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn update_visit(&self, visit: &Visit) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE visits SET
                visit_date = ?2,
                visit_time = ?3,
                visit_location = ?4,
                visit_type = ?5,
                clinic = ?6,
                priority = ?7,
                status = ?8,
                special_instructions = ?9,
                assigned_nurse = ?10,
                updated_at = ?11
            WHERE id = ?1
            "#,
            params![
                visit.id,
                visit.visit_date,
                visit.visit_time,
                visit.visit_location,
                visit.visit_type,
                visit.clinic,
                visit.priority.as_str(),
                visit.status.as_str(),
                visit.special_instructions,
                visit.assigned_nurse,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    pub fn get_visit(&self, id: &str) -> DbResult<Option<Visit>> {
        self.conn
            .query_row(
                &format!("SELECT {VISIT_COLUMNS} FROM visits WHERE id = ?"),
                [id],
                row_to_visit,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn require_visit(&self, id: &str) -> DbResult<Visit> {
        self.get_visit(id)?
            .ok_or_else(|| DbError::NotFound(format!("visit {id}")))
    }

    /// Visits, most recent first, optionally for one patient and status.
    pub fn list_visits(
        &self,
        patient_id: Option<&str>,
        status: Option<VisitStatus>,
    ) -> DbResult<Vec<Visit>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {VISIT_COLUMNS}
            FROM visits
            WHERE (?1 IS NULL OR patient_id = ?1)
              AND (?2 IS NULL OR status = ?2)
            ORDER BY visit_date DESC, visit_time DESC
            "#
        ))?;
        let rows = stmt.query_map(params![patient_id, status.map(|s| s.as_str())], row_to_visit)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn insert_vitals(&self, vitals: &VitalReading) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO vital_readings (
                id, patient_id, recorded_at, systolic, diastolic, heart_rate, blood_sugar, rbs,
                temperature, weight, height, respiratory_rate, oxygen_saturation, pain_scale,
                comment, recorded_by
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
            params![
                vitals.id,
                vitals.patient_id,
                vitals.recorded_at,
                vitals.systolic,
                vitals.diastolic,
                vitals.heart_rate,
                vitals.blood_sugar,
                vitals.rbs,
                vitals.temperature,
                vitals.weight,
                vitals.height,
                vitals.respiratory_rate,
                vitals.oxygen_saturation,
                vitals.pain_scale,
                vitals.comment,
                vitals.recorded_by,
            ],
        )?;
        Ok(())
    }

    /// Vital readings for a patient, newest first.
    pub fn vitals_for_patient(&self, patient_id: &str) -> DbResult<Vec<VitalReading>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {VITAL_COLUMNS} FROM vital_readings WHERE patient_id = ? ORDER BY recorded_at DESC"
        ))?;
        let rows = stmt.query_map([patient_id], row_to_vitals)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Patient, PatientKind};
    use chrono::{NaiveDate, NaiveTime};

    fn setup() -> (Database, Patient) {
        let db = Database::open_in_memory().unwrap();
        let patient = Patient::new(
            "Okafor".into(),
            "Ada".into(),
            PatientKind::Employee {
                personal_number: "NPA-1".into(),
                employee_type: None,
                division: None,
                location: None,
            },
        );
        db.insert_patient(&patient).unwrap();
        (db, patient)
    }

    fn visit(patient: &Patient, day: u32) -> Visit {
        Visit::new(
            patient.id.clone(),
            NaiveDate::from_ymd_opt(2026, 3, day).unwrap(),
            NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            "Headquarters".into(),
            "consultation".into(),
            "General".into(),
        )
    }

    #[test]
    fn test_visit_roundtrip_and_status_update() {
        let (db, patient) = setup();
        let mut v = visit(&patient, 2);
        db.insert_visit(&v).unwrap();
        assert_eq!(db.require_visit(&v.id).unwrap().visit_time, v.visit_time);

        v.status = VisitStatus::InNursingPool;
        assert!(db.update_visit(&v).unwrap());
        assert_eq!(
            db.require_visit(&v.id).unwrap().status,
            VisitStatus::InNursingPool
        );
    }

    #[test]
    fn test_list_visits_newest_first() {
        let (db, patient) = setup();
        let early = visit(&patient, 1);
        let late = visit(&patient, 20);
        db.insert_visit(&early).unwrap();
        db.insert_visit(&late).unwrap();

        let visits = db.list_visits(Some(&patient.id), None).unwrap();
        assert_eq!(visits[0].id, late.id);
        assert_eq!(visits[1].id, early.id);
    }

    #[test]
    fn test_vitals_roundtrip() {
        let (db, patient) = setup();
        let mut vitals = VitalReading::new(patient.id.clone(), "Nurse Ada".into());
        vitals.systolic = Some(120);
        vitals.diastolic = Some(80);
        vitals.weight = Some(70.0);
        vitals.height = Some(175.0);
        db.insert_vitals(&vitals).unwrap();

        let stored = db.vitals_for_patient(&patient.id).unwrap();
        assert_eq!(stored, vec![vitals]);
        assert_eq!(stored[0].bmi(), Some(22.9));
    }

    #[test]
    fn test_negative_systolic_rejected_by_store() {
        let (db, patient) = setup();
        let mut vitals = VitalReading::new(patient.id.clone(), "Nurse Ada".into());
        vitals.systolic = Some(-5);
        assert!(db.insert_vitals(&vitals).is_err());
    }
}
