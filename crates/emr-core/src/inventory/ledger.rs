//! Stock ledger access for the inventory manager.

use super::{Inventory, InventoryError, InventoryResult};
use crate::db::TransactionFilter;
use crate::models::{LedgerVerification, StockTransaction, TransactionContext, TransactionType};

impl<'a> Inventory<'a> {
    /// Ledger rows for one medication, newest first.
    pub fn stock_history(
        &self,
        medication_id: &str,
        limit: Option<usize>,
    ) -> InventoryResult<Vec<StockTransaction>> {
        self.db.require_medication(medication_id)?;
        Ok(self.db.list_transactions(&TransactionFilter {
            medication_id: Some(medication_id.to_string()),
            limit,
            ..Default::default()
        })?)
    }

    /// Check the hash chain over the whole ledger.
    pub fn verify_ledger(&self) -> InventoryResult<LedgerVerification> {
        let report = self.db.verify_ledger()?;
        if !report.valid {
            tracing::error!(
                first_broken = ?report.first_broken,
                entries = report.entries,
                "stock ledger hash chain is broken"
            );
        }
        Ok(report)
    }

    /// Record that `medication_id` was chosen as a substitute.
    ///
    /// Stock does not move, so the row carries quantity 0 and an unchanged
    /// stock snapshot. Runs inside the caller's transaction.
    pub(crate) fn record_substitution(
        &self,
        medication_id: &str,
        context: &TransactionContext,
        reason: &str,
        performed_by: &str,
    ) -> InventoryResult<StockTransaction> {
        if reason.trim().is_empty() {
            return Err(InventoryError::Validation(
                "substitution reason is required".to_string(),
            ));
        }
        let (medication, _) = self.recompute(medication_id)?;
        let transaction = StockTransaction::new(
            medication_id,
            TransactionType::Substitution,
            0,
            medication.current_stock,
            medication.current_stock,
            performed_by,
            reason.trim().to_string(),
        )
        .with_context(context);
        Ok(self.db.append_transaction(transaction)?)
    }
}
