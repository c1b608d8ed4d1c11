//! Stock ledger database operations.
//!
//! Rows are only ever appended. The table's triggers reject UPDATE and
//! DELETE; `append_transaction` links each new row to the previous one.

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};

use super::{decode_enum, decode_json, Database, DbResult};
use crate::models::{LedgerVerification, StockTransaction, TransactionType};

const TRANSACTION_COLUMNS: &str = r#"
    id, medication_id, transaction_type, quantity, previous_stock, new_stock,
    performed_by, visit_id, prescription_id, prescription_item_id, batch_id,
    batches_affected, reason, created_at, previous_hash, entry_hash
"#;

fn row_to_transaction(row: &Row<'_>) -> rusqlite::Result<StockTransaction> {
    Ok(StockTransaction {
        id: row.get(0)?,
        medication_id: row.get(1)?,
        kind: decode_enum(2, row.get(2)?, TransactionType::parse)?,
        quantity: row.get(3)?,
        previous_stock: row.get(4)?,
        new_stock: row.get(5)?,
        performed_by: row.get(6)?,
        visit_id: row.get(7)?,
        prescription_id: row.get(8)?,
        prescription_item_id: row.get(9)?,
        batch_id: row.get(10)?,
        batches_affected: decode_json(11, row.get(11)?)?,
        reason: row.get(12)?,
        created_at: row.get(13)?,
        previous_hash: row.get(14)?,
        entry_hash: row.get(15)?,
    })
}

/// Filter for ledger queries.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub medication_id: Option<String>,
    pub kind: Option<TransactionType>,
    pub prescription_id: Option<String>,
    /// Inclusive lower bound on the transaction date
    pub since: Option<NaiveDate>,
    pub limit: Option<usize>,
}

impl Database {
    /// Hash of the most recent ledger row.
    pub fn ledger_head(&self) -> DbResult<Option<String>> {
        self.conn
            .query_row(
                "SELECT entry_hash FROM stock_transactions ORDER BY seq DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    /// Seal `transaction` onto the chain and insert it.
    ///
    /// Must run inside the same transaction as the stock change it records.
    pub fn append_transaction(&self, mut transaction: StockTransaction) -> DbResult<StockTransaction> {
        let head = self.ledger_head()?;
        transaction.seal(head);

        self.conn.execute(
            r#"
            INSERT INTO stock_transactions (
                id, medication_id, transaction_type, quantity, previous_stock, new_stock,
                performed_by, visit_id, prescription_id, prescription_item_id, batch_id,
                batches_affected, reason, created_at, previous_hash, entry_hash
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
            params![
                transaction.id,
                transaction.medication_id,
                transaction.kind.as_str(),
                transaction.quantity,
                transaction.previous_stock,
                transaction.new_stock,
                transaction.performed_by,
                transaction.visit_id,
                transaction.prescription_id,
                transaction.prescription_item_id,
                transaction.batch_id,
                serde_json::to_string(&transaction.batches_affected)?,
                transaction.reason,
                transaction.created_at,
                transaction.previous_hash,
                transaction.entry_hash,
            ],
        )?;
        Ok(transaction)
    }

    /// Ledger rows matching `filter`, newest first.
    pub fn list_transactions(&self, filter: &TransactionFilter) -> DbResult<Vec<StockTransaction>> {
        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM stock_transactions
            WHERE (?1 IS NULL OR medication_id = ?1)
              AND (?2 IS NULL OR transaction_type = ?2)
              AND (?3 IS NULL OR prescription_id = ?3)
              AND (?4 IS NULL OR substr(created_at, 1, 10) >= ?4)
            ORDER BY seq DESC
            LIMIT ?5
            "#
        ))?;
        let rows = stmt.query_map(
            params![
                filter.medication_id,
                filter.kind.map(|k| k.as_str()),
                filter.prescription_id,
                filter.since,
                limit,
            ],
            row_to_transaction,
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn count_transactions(&self) -> DbResult<usize> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM stock_transactions", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Walk the whole ledger in append order and check every link.
    pub fn verify_ledger(&self) -> DbResult<LedgerVerification> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM stock_transactions ORDER BY seq ASC"
        ))?;
        let rows = stmt.query_map([], row_to_transaction)?;

        let mut expected_previous: Option<String> = None;
        let mut entries = 0;
        for row in rows {
            let transaction = row?;
            entries += 1;
            let linked = transaction.previous_hash == expected_previous;
            let hashed =
                transaction.compute_hash(expected_previous.as_deref()) == transaction.entry_hash;
            if !(linked && hashed) {
                return Ok(LedgerVerification {
                    entries,
                    valid: false,
                    first_broken: Some(transaction.id),
                });
            }
            expected_previous = Some(transaction.entry_hash);
        }

        Ok(LedgerVerification {
            entries,
            valid: true,
            first_broken: None,
        })
    }

    /// Tablets dispensed per day for a medication, oldest day first.
    pub fn daily_dispensed(
        &self,
        medication_id: &str,
        since: NaiveDate,
    ) -> DbResult<Vec<(NaiveDate, u64)>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT substr(created_at, 1, 10) AS day, SUM(-quantity)
            FROM stock_transactions
            WHERE medication_id = ?1
              AND transaction_type = 'Dispensed'
              AND substr(created_at, 1, 10) >= ?2
            GROUP BY day
            ORDER BY day ASC
            "#,
        )?;
        let rows = stmt.query_map(params![medication_id, since], |row| {
            let day: NaiveDate = row.get(0)?;
            let total: i64 = row.get(1)?;
            Ok((day, total.max(0) as u64))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Tablets dispensed per medication since `since`, largest first.
    pub fn dispensed_by_medication(&self, since: NaiveDate) -> DbResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT medication_id, SUM(-quantity) AS total
            FROM stock_transactions
            WHERE transaction_type = 'Dispensed'
              AND substr(created_at, 1, 10) >= ?1
            GROUP BY medication_id
            ORDER BY total DESC, medication_id ASC
            "#,
        )?;
        let rows = stmt.query_map([since], |row| {
            let total: i64 = row.get(1)?;
            Ok((row.get(0)?, total.max(0) as u64))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Medication;

    fn setup() -> (Database, Medication) {
        let db = Database::open_in_memory().unwrap();
        let med = Medication::new("Amoxicillin".into(), "Antibiotics".into());
        db.insert_medication(&med).unwrap();
        (db, med)
    }

    fn restock(med: &Medication, qty: i64) -> StockTransaction {
        StockTransaction::new(
            &med.id,
            TransactionType::Restocked,
            qty,
            0,
            qty as u32,
            "admin",
            "Initial stock".into(),
        )
    }

    #[test]
    fn test_append_links_chain() {
        let (db, med) = setup();
        let first = db.append_transaction(restock(&med, 10)).unwrap();
        let second = db.append_transaction(restock(&med, 5)).unwrap();

        assert!(first.previous_hash.is_none());
        assert_eq!(second.previous_hash.as_deref(), Some(first.entry_hash.as_str()));
        assert_eq!(db.ledger_head().unwrap(), Some(second.entry_hash));
    }

    #[test]
    fn test_verify_empty_and_valid_chain() {
        let (db, med) = setup();
        let report = db.verify_ledger().unwrap();
        assert!(report.valid);
        assert_eq!(report.entries, 0);

        for qty in [10, 20, 30] {
            db.append_transaction(restock(&med, qty)).unwrap();
        }
        let report = db.verify_ledger().unwrap();
        assert!(report.valid);
        assert_eq!(report.entries, 3);
    }

    #[test]
    fn test_verify_detects_tampering() {
        let (db, med) = setup();
        let first = db.append_transaction(restock(&med, 10)).unwrap();
        db.append_transaction(restock(&med, 20)).unwrap();

        // Bypass the immutability trigger to simulate out-of-band edits.
        db.conn()
            .execute_batch(
                "DROP TRIGGER stock_transactions_no_update;
                 UPDATE stock_transactions SET quantity = 1000 WHERE seq = 1;",
            )
            .unwrap();

        let report = db.verify_ledger().unwrap();
        assert!(!report.valid);
        assert_eq!(report.first_broken, Some(first.id));
    }

    #[test]
    fn test_list_filters_by_kind() {
        let (db, med) = setup();
        db.append_transaction(restock(&med, 10)).unwrap();
        let dispense = StockTransaction::new(
            &med.id,
            TransactionType::Dispensed,
            -4,
            10,
            6,
            "pharmacist",
            "Dispensed to patient via prescription N/A".into(),
        );
        db.append_transaction(dispense).unwrap();

        let filter = TransactionFilter {
            kind: Some(TransactionType::Dispensed),
            ..Default::default()
        };
        let rows = db.list_transactions(&filter).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].quantity, -4);
        assert_eq!(db.count_transactions().unwrap(), 2);

        let today = chrono::Utc::now().date_naive();
        assert_eq!(db.dispensed_since(&med.id, today).unwrap(), 4);
        assert_eq!(db.daily_dispensed(&med.id, today).unwrap(), vec![(today, 4)]);
        assert_eq!(
            db.dispensed_by_medication(today).unwrap(),
            vec![(med.id.clone(), 4)]
        );
    }
}
