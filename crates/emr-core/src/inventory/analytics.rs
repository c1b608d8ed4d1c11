//! Read-only usage analytics over the stock ledger.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use super::{Inventory, InventoryError, InventoryResult};
use crate::models::Medication;

pub const DEFAULT_TREND_DAYS: i64 = 90;
pub const DEFAULT_SLOW_MOVING_DAYS: i64 = 180;
pub const DEFAULT_FAST_MOVING_DAYS: i64 = 30;
pub const DEFAULT_FAST_MOVING_THRESHOLD: u64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyUsage {
    pub date: NaiveDate,
    pub dispensed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageTrend {
    pub medication_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Days with at least one dispense, oldest first
    pub daily: Vec<DailyUsage>,
    pub total_dispensed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FastMover {
    pub medication_id: String,
    pub medication_name: String,
    pub total_dispensed: u64,
}

impl<'a> Inventory<'a> {
    /// First day of a window covering the last `days` days.
    fn window_start(&self, days: i64) -> InventoryResult<NaiveDate> {
        Duration::try_days(days.max(0))
            .and_then(|span| self.today.checked_sub_signed(span))
            .ok_or_else(|| InventoryError::Validation(format!("days out of range: {days}")))
    }

    /// Daily dispensed totals for a medication over the last `days` days.
    pub fn usage_trends(&self, medication_id: &str, days: i64) -> InventoryResult<UsageTrend> {
        self.db.require_medication(medication_id)?;
        let start_date = self.window_start(days)?;

        let daily: Vec<DailyUsage> = self
            .db
            .daily_dispensed(medication_id, start_date)?
            .into_iter()
            .map(|(date, dispensed)| DailyUsage { date, dispensed })
            .collect();
        let total_dispensed = daily.iter().map(|d| d.dispensed).sum();

        Ok(UsageTrend {
            medication_id: medication_id.to_string(),
            start_date,
            end_date: self.today,
            daily,
            total_dispensed,
        })
    }

    /// Medications with stock on hand but no dispensing in the last `days` days.
    pub fn slow_moving(&self, days: i64) -> InventoryResult<Vec<Medication>> {
        let since = self.window_start(days)?;
        let moving: Vec<String> = self
            .db
            .dispensed_by_medication(since)?
            .into_iter()
            .map(|(id, _)| id)
            .collect();

        Ok(self
            .db
            .list_medications(&Default::default())?
            .into_iter()
            .filter(|m| m.current_stock > 0 && !moving.contains(&m.id))
            .collect())
    }

    /// Medications whose dispensed total over the last `days` days exceeds
    /// `threshold`, busiest first.
    pub fn fast_moving(&self, days: i64, threshold: u64) -> InventoryResult<Vec<FastMover>> {
        let since = self.window_start(days)?;
        let mut movers = Vec::new();
        for (medication_id, total_dispensed) in self.db.dispensed_by_medication(since)? {
            if total_dispensed <= threshold {
                continue;
            }
            let medication = self.db.require_medication(&medication_id)?;
            movers.push(FastMover {
                medication_id,
                medication_name: medication.name,
                total_dispensed,
            });
        }
        Ok(movers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::inventory::test_support::*;
    use crate::inventory::NewBatch;

    /// Analytics read ledger timestamps, so these tests run on the real date.
    fn stocked(db: &Database, name: &str, tablets: u32) -> Medication {
        let med = medication(db, name, "Analgesics");
        let inventory = Inventory::new(db);
        inventory
            .add_batch(
                &med.id,
                NewBatch {
                    batch_number: format!("{name}-1"),
                    expiry_date: (inventory.today() + Duration::days(365)).to_string(),
                    total_tablets: tablets,
                    ..Default::default()
                },
                "storekeeper",
            )
            .unwrap();
        med
    }

    #[test]
    fn test_usage_trends_groups_by_day() {
        let db = Database::open_in_memory().unwrap();
        let med = stocked(&db, "Paracetamol", 500);
        let inventory = Inventory::new(&db);
        inventory.dispense(&med.id, 20, "pharm", &no_context()).unwrap();
        inventory.dispense(&med.id, 30, "pharm", &no_context()).unwrap();

        let trend = inventory
            .usage_trends(&med.id, DEFAULT_TREND_DAYS)
            .unwrap();
        assert_eq!(trend.total_dispensed, 50);
        assert!(trend.daily.len() <= 2);
        assert_eq!(trend.end_date, inventory.today());
    }

    #[test]
    fn test_slow_and_fast_movers() {
        let db = Database::open_in_memory().unwrap();
        let busy = stocked(&db, "Paracetamol", 500);
        let idle = stocked(&db, "Ibuprofen", 200);
        medication(&db, "Empty", "Analgesics");

        let inventory = Inventory::new(&db);
        inventory.dispense(&busy.id, 150, "pharm", &no_context()).unwrap();

        let slow = inventory.slow_moving(DEFAULT_SLOW_MOVING_DAYS).unwrap();
        assert_eq!(slow.len(), 1);
        assert_eq!(slow[0].id, idle.id);

        let fast = inventory
            .fast_moving(DEFAULT_FAST_MOVING_DAYS, DEFAULT_FAST_MOVING_THRESHOLD)
            .unwrap();
        assert_eq!(fast.len(), 1);
        assert_eq!(fast[0].medication_name, "Paracetamol");
        assert_eq!(fast[0].total_dispensed, 150);

        assert!(inventory.fast_moving(30, 150).unwrap().is_empty());
    }

    #[test]
    fn test_today_matches_ledger_day() {
        let db = Database::open_in_memory().unwrap();
        let med = stocked(&db, "Paracetamol", 50);
        let inventory = Inventory::new(&db);
        let outcome = inventory.dispense(&med.id, 7, "pharm", &no_context()).unwrap();

        let stamped: NaiveDate = outcome.transaction.created_at[..10].parse().unwrap();
        assert_eq!(stamped, inventory.today());

        let trend = inventory.usage_trends(&med.id, 0).unwrap();
        assert_eq!(
            trend.daily,
            vec![DailyUsage {
                date: inventory.today(),
                dispensed: 7
            }]
        );
    }

    #[test]
    fn test_window_out_of_range_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let med = stocked(&db, "Paracetamol", 50);
        let inventory = Inventory::new(&db);

        assert!(matches!(
            inventory.usage_trends(&med.id, i64::MAX),
            Err(InventoryError::Validation(_))
        ));
        assert!(matches!(
            inventory.slow_moving(i64::MAX),
            Err(InventoryError::Validation(_))
        ));
        assert!(matches!(
            inventory.fast_moving(i64::MAX, 0),
            Err(InventoryError::Validation(_))
        ));

        // Negative windows collapse to today.
        let trend = inventory.usage_trends(&med.id, -5).unwrap();
        assert_eq!(trend.start_date, inventory.today());
    }
}
