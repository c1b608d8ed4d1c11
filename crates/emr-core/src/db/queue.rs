//! Pharmacy queue database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{decode_enum, Database, DbError, DbResult};
use crate::models::{PharmacyQueueEntry, Priority, QueueStatus};

const QUEUE_COLUMNS: &str = r#"
    id, prescription_id, patient_id, status, priority, assigned_to,
    estimated_completion_at, pharmacist_notes, created_at, updated_at
"#;

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<PharmacyQueueEntry> {
    Ok(PharmacyQueueEntry {
        id: row.get(0)?,
        prescription_id: row.get(1)?,
        patient_id: row.get(2)?,
        status: decode_enum(3, row.get(3)?, QueueStatus::parse)?,
        priority: decode_enum(4, row.get(4)?, Priority::parse)?,
        assigned_to: row.get(5)?,
        estimated_completion_at: row.get(6)?,
        pharmacist_notes: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

impl Database {
    pub fn insert_queue_entry(&self, entry: &PharmacyQueueEntry) -> DbResult<()> {
        if self.queue_entry_for_prescription(&entry.prescription_id)?.is_some() {
            return Err(DbError::Constraint(format!(
                "prescription {} is already queued",
                entry.prescription_id
            )));
        }
        self.conn.execute(
            r#"
            INSERT INTO pharmacy_queue (
                id, prescription_id, patient_id, status, priority, assigned_to,
                estimated_completion_at, pharmacist_notes, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                entry.id,
                entry.prescription_id,
                entry.patient_id,
                entry.status.as_str(),
                entry.priority.as_str(),
                entry.assigned_to,
                entry.estimated_completion_at,
                entry.pharmacist_notes,
                entry.created_at,
                entry.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn update_queue_entry(&self, entry: &PharmacyQueueEntry) -> DbResult<()> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE pharmacy_queue SET
                status = ?2,
                priority = ?3,
                assigned_to = ?4,
                estimated_completion_at = ?5,
                pharmacist_notes = ?6,
                updated_at = ?7
            WHERE id = ?1
            "#,
            params![
                entry.id,
                entry.status.as_str(),
                entry.priority.as_str(),
                entry.assigned_to,
                entry.estimated_completion_at,
                entry.pharmacist_notes,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        if rows_affected == 0 {
            return Err(DbError::NotFound(format!("queue entry {}", entry.id)));
        }
        Ok(())
    }

    pub fn get_queue_entry(&self, id: &str) -> DbResult<Option<PharmacyQueueEntry>> {
        self.conn
            .query_row(
                &format!("SELECT {QUEUE_COLUMNS} FROM pharmacy_queue WHERE id = ?"),
                [id],
                row_to_entry,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn require_queue_entry(&self, id: &str) -> DbResult<PharmacyQueueEntry> {
        self.get_queue_entry(id)?
            .ok_or_else(|| DbError::NotFound(format!("queue entry {id}")))
    }

    pub fn queue_entry_for_prescription(
        &self,
        prescription_id: &str,
    ) -> DbResult<Option<PharmacyQueueEntry>> {
        self.conn
            .query_row(
                &format!("SELECT {QUEUE_COLUMNS} FROM pharmacy_queue WHERE prescription_id = ?"),
                [prescription_id],
                row_to_entry,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Queue entries in serving order: priority, then arrival.
    pub fn list_queue(&self, status: Option<QueueStatus>) -> DbResult<Vec<PharmacyQueueEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {QUEUE_COLUMNS}
            FROM pharmacy_queue
            WHERE (?1 IS NULL OR status = ?1)
            ORDER BY CASE priority WHEN 'High' THEN 0 WHEN 'Medium' THEN 1 ELSE 2 END,
                     created_at ASC, rowid ASC
            "#
        ))?;
        let rows = stmt.query_map([status.map(|s| s.as_str())], row_to_entry)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}
