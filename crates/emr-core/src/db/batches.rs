//! Medication batch database operations.
//!
//! Batches are listed in FIFO order: earliest expiry first, then insertion
//! order for equal expiry dates.

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};

use super::{decode_enum, Database, DbError, DbResult};
use crate::models::{BatchStatus, MedicationBatch};

const BATCH_COLUMNS: &str = r#"
    id, medication_id, batch_number, expiry_date, date_received, total_tablets,
    remaining_tablets, pack_size, packs_received, opened_packs, sealed_packs,
    supplier, status, notes, created_at
"#;

fn row_to_batch(row: &Row<'_>) -> rusqlite::Result<MedicationBatch> {
    Ok(MedicationBatch {
        id: row.get(0)?,
        medication_id: row.get(1)?,
        batch_number: row.get(2)?,
        expiry_date: row.get(3)?,
        date_received: row.get(4)?,
        total_tablets: row.get(5)?,
        remaining_tablets: row.get(6)?,
        pack_size: row.get(7)?,
        packs_received: row.get(8)?,
        opened_packs: row.get(9)?,
        sealed_packs: row.get(10)?,
        supplier: row.get(11)?,
        status: decode_enum(12, row.get(12)?, BatchStatus::parse)?,
        notes: row.get(13)?,
        created_at: row.get(14)?,
    })
}

impl Database {
    /// Insert a new batch.
    pub fn insert_batch(&self, batch: &MedicationBatch) -> DbResult<()> {
        let result = self.conn.execute(
            r#"
            INSERT INTO medication_batches (
                id, medication_id, batch_number, expiry_date, date_received, total_tablets,
                remaining_tablets, pack_size, packs_received, opened_packs, sealed_packs,
                supplier, status, notes, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
            params![
                batch.id,
                batch.medication_id,
                batch.batch_number,
                batch.expiry_date,
                batch.date_received,
                batch.total_tablets,
                batch.remaining_tablets.min(batch.total_tablets),
                batch.pack_size,
                batch.packs_received,
                batch.opened_packs,
                batch.sealed_packs,
                batch.supplier,
                batch.status.as_str(),
                batch.notes,
                batch.created_at,
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                Err(DbError::Constraint(format!(
                    "batch {} already exists for this medication",
                    batch.batch_number
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Persist the mutable state of a batch.
    ///
    /// `remaining_tablets` is clamped to `total_tablets` on write.
    pub fn update_batch_stock(&self, batch: &MedicationBatch) -> DbResult<()> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE medication_batches SET
                remaining_tablets = ?2,
                opened_packs = ?3,
                sealed_packs = ?4,
                status = ?5,
                notes = ?6
            WHERE id = ?1
            "#,
            params![
                batch.id,
                batch.remaining_tablets.min(batch.total_tablets),
                batch.opened_packs,
                batch.sealed_packs,
                batch.status.as_str(),
                batch.notes,
            ],
        )?;
        if rows_affected == 0 {
            return Err(DbError::NotFound(format!("batch {}", batch.id)));
        }
        Ok(())
    }

    /// Get a batch by ID.
    pub fn get_batch(&self, id: &str) -> DbResult<Option<MedicationBatch>> {
        self.conn
            .query_row(
                &format!("SELECT {BATCH_COLUMNS} FROM medication_batches WHERE id = ?"),
                [id],
                row_to_batch,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn require_batch(&self, id: &str) -> DbResult<MedicationBatch> {
        self.get_batch(id)?
            .ok_or_else(|| DbError::NotFound(format!("batch {id}")))
    }

    /// All batches of a medication in FIFO order.
    pub fn batches_for_medication(&self, medication_id: &str) -> DbResult<Vec<MedicationBatch>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {BATCH_COLUMNS}
            FROM medication_batches
            WHERE medication_id = ?
            ORDER BY expiry_date ASC, rowid ASC
            "#
        ))?;
        let rows = stmt.query_map([medication_id], row_to_batch)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Batches FIFO may draw from on `today`, in draw order.
    pub fn eligible_batches(
        &self,
        medication_id: &str,
        today: NaiveDate,
    ) -> DbResult<Vec<MedicationBatch>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {BATCH_COLUMNS}
            FROM medication_batches
            WHERE medication_id = ?1
              AND status IN ('Active', 'Near Expiry')
              AND expiry_date >= ?2
              AND remaining_tablets > 0
            ORDER BY expiry_date ASC, rowid ASC
            "#
        ))?;
        let rows = stmt.query_map(params![medication_id, today], row_to_batch)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// IDs of every medication that has at least one batch.
    pub fn medication_ids_with_batches(&self) -> DbResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT medication_id FROM medication_batches ORDER BY medication_id")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}
