//! Stock alerts and reorder suggestions.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use super::status::NEAR_EXPIRY_DAYS;
use super::{Inventory, InventoryResult};
use crate::models::{Medication, MedicationBatch};

/// Months of usage used when nothing is recorded and nothing was dispensed.
const DEFAULT_MONTHLY_USAGE: u32 = 10;
/// Window used to estimate monthly usage from dispensing history.
const USAGE_WINDOW_DAYS: i64 = 90;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Critical,
    Warning,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    OutOfStock,
    LowStock,
    NearExpiry,
    ExpiredStock,
}

/// Something about a medication's stock that needs attention.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockAlert {
    pub medication_id: String,
    pub medication_name: String,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    pub action_required: String,
    /// The batch concerned, for batch-level alerts
    pub batch_id: Option<String>,
}

/// Alerts for one medication, most urgent stock condition first.
pub fn medication_alerts(
    medication: &Medication,
    batches: &[MedicationBatch],
    today: NaiveDate,
) -> Vec<StockAlert> {
    let alert = |kind, severity, message: String, action: &str, batch_id: Option<String>| {
        StockAlert {
            medication_id: medication.id.clone(),
            medication_name: medication.name.clone(),
            kind,
            severity,
            message,
            action_required: action.to_string(),
            batch_id,
        }
    };
    let mut alerts = Vec::new();

    if medication.current_stock == 0 {
        alerts.push(alert(
            AlertKind::OutOfStock,
            AlertSeverity::Critical,
            format!("{} is out of stock", medication.name),
            "Reorder immediately",
            None,
        ));
    } else if medication.current_stock <= medication.minimum_stock {
        alerts.push(alert(
            AlertKind::LowStock,
            AlertSeverity::Warning,
            format!("{} stock is below minimum level", medication.name),
            "Consider reordering soon",
            None,
        ));
    }

    let on_shelf = || batches.iter().filter(|b| b.remaining_tablets > 0);

    let horizon = today + Duration::days(NEAR_EXPIRY_DAYS);
    if let Some(batch) = on_shelf()
        .filter(|b| b.expiry_date > today && b.expiry_date <= horizon)
        .min_by_key(|b| b.expiry_date)
    {
        let days = (batch.expiry_date - today).num_days();
        alerts.push(alert(
            AlertKind::NearExpiry,
            AlertSeverity::Warning,
            format!("Batch {} expires in {} days", batch.batch_number, days),
            "Use this batch first (FIFO)",
            Some(batch.id.clone()),
        ));
    }

    let expired = on_shelf().filter(|b| b.expiry_date < today).count();
    if expired > 0 {
        alerts.push(alert(
            AlertKind::ExpiredStock,
            AlertSeverity::Critical,
            format!("{expired} expired batch(es) with remaining stock"),
            "Remove expired stock immediately",
            None,
        ));
    }

    alerts
}

/// Where a monthly usage figure came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UsageSource {
    Recorded,
    DispensingHistory,
    Default,
}

/// Suggested reorder thresholds for a medication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockLevelSuggestion {
    pub medication_id: String,
    pub monthly_usage: u32,
    pub usage_source: UsageSource,
    pub current_minimum: u32,
    pub suggested_minimum: u32,
    pub current_maximum: u32,
    pub suggested_maximum: u32,
    /// Reorder when roughly two and a half months of stock remain
    pub reorder_point: u32,
}

/// Round `value` up to a whole number of packs.
fn round_up_to_pack(value: u32, pack_size: u32) -> u32 {
    let pack_size = pack_size.max(1);
    value.div_ceil(pack_size).saturating_mul(pack_size)
}

/// Two months minimum and six months maximum, in whole packs.
///
/// Returns `(minimum, maximum, reorder_point)`. Saturates at `u32::MAX`.
pub fn suggest_levels(monthly_usage: u32, pack_size: u32) -> (u32, u32, u32) {
    let minimum = round_up_to_pack(monthly_usage.saturating_mul(2), pack_size);
    let maximum = round_up_to_pack(monthly_usage.saturating_mul(6), pack_size);
    (minimum, maximum, minimum.saturating_add(monthly_usage / 2))
}

impl<'a> Inventory<'a> {
    /// Current alerts for one medication.
    pub fn check_medication_alerts(&self, medication_id: &str) -> InventoryResult<Vec<StockAlert>> {
        let (medication, batches) = self.db.atomically(|_| self.recompute(medication_id))?;
        Ok(medication_alerts(&medication, &batches, self.today))
    }

    /// Alerts across the whole formulary, critical first.
    pub fn all_alerts(&self) -> InventoryResult<Vec<StockAlert>> {
        let mut alerts = Vec::new();
        for medication in self.db.list_medications(&Default::default())? {
            alerts.extend(self.check_medication_alerts(&medication.id)?);
        }
        alerts.sort_by_key(|a| a.severity != AlertSeverity::Critical);
        Ok(alerts)
    }

    /// Suggest reorder thresholds from recorded or observed usage.
    pub fn suggest_stock_levels(&self, medication_id: &str) -> InventoryResult<StockLevelSuggestion> {
        let medication = self.db.require_medication(medication_id)?;

        let (monthly_usage, usage_source) = if medication.monthly_usage > 0 {
            (medication.monthly_usage, UsageSource::Recorded)
        } else {
            let since = self.today - Duration::days(USAGE_WINDOW_DAYS);
            let dispensed = self.db.dispensed_since(medication_id, since)?;
            if dispensed > 0 {
                let monthly = u32::try_from(dispensed / 3).unwrap_or(u32::MAX);
                (monthly, UsageSource::DispensingHistory)
            } else {
                (DEFAULT_MONTHLY_USAGE, UsageSource::Default)
            }
        };

        let (suggested_minimum, suggested_maximum, reorder_point) =
            suggest_levels(monthly_usage, medication.pack_size);

        Ok(StockLevelSuggestion {
            medication_id: medication.id,
            monthly_usage,
            usage_source,
            current_minimum: medication.minimum_stock,
            suggested_minimum,
            current_maximum: medication.maximum_stock,
            suggested_maximum,
            reorder_point,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::inventory::test_support::*;
    use crate::inventory::NewBatch;

    #[test]
    fn test_suggest_levels_rounds_to_packs() {
        assert_eq!(suggest_levels(10, 1), (20, 60, 25));
        assert_eq!(suggest_levels(10, 28), (28, 84, 33));
        assert_eq!(suggest_levels(0, 10), (0, 0, 0));
    }

    #[test]
    fn test_suggest_levels_saturates() {
        assert_eq!(
            suggest_levels(1_000_000_000, 10),
            (2_000_000_000, u32::MAX, 2_500_000_000)
        );
        assert_eq!(suggest_levels(u32::MAX, 28), (u32::MAX, u32::MAX, u32::MAX));
    }

    #[test]
    fn test_out_of_stock_alert() {
        let db = Database::open_in_memory().unwrap();
        let med = medication(&db, "Amoxicillin", "Antibiotics");
        let alerts = Inventory::with_today(&db, today())
            .check_medication_alerts(&med.id)
            .unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::OutOfStock);
        assert_eq!(alerts[0].message, "Amoxicillin is out of stock");
        assert_eq!(alerts[0].action_required, "Reorder immediately");
    }

    #[test]
    fn test_low_stock_and_near_expiry_alerts() {
        let db = Database::open_in_memory().unwrap();
        let med = medication(&db, "Amoxicillin", "Antibiotics");
        stock(&db, &med, "SOON", today() + Duration::days(12), 4);
        stock(&db, &med, "LATER", today() + Duration::days(20), 4);

        let alerts = Inventory::with_today(&db, today())
            .check_medication_alerts(&med.id)
            .unwrap();
        let kinds: Vec<AlertKind> = alerts.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![AlertKind::LowStock, AlertKind::NearExpiry]);
        assert_eq!(alerts[1].message, "Batch SOON expires in 12 days");
        assert_eq!(alerts[1].action_required, "Use this batch first (FIFO)");
    }

    #[test]
    fn test_expired_stock_alert() {
        let db = Database::open_in_memory().unwrap();
        let med = medication(&db, "Amoxicillin", "Antibiotics");
        Inventory::with_today(&db, today())
            .add_batch(
                &med.id,
                NewBatch {
                    batch_number: "OLD".into(),
                    expiry_date: "2026-05-01".into(),
                    total_tablets: 10,
                    allow_expired: true,
                    ..Default::default()
                },
                "storekeeper",
            )
            .unwrap();
        stock(&db, &med, "FRESH", today() + Duration::days(200), 100);

        let alerts = Inventory::with_today(&db, today())
            .check_medication_alerts(&med.id)
            .unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::ExpiredStock);
        assert_eq!(alerts[0].severity, AlertSeverity::Critical);
        assert_eq!(alerts[0].message, "1 expired batch(es) with remaining stock");
    }

    #[test]
    fn test_suggestion_sources() {
        let db = Database::open_in_memory().unwrap();
        let med = medication(&db, "Amoxicillin", "Antibiotics");
        let inventory = Inventory::new(&db);

        let default = inventory.suggest_stock_levels(&med.id).unwrap();
        assert_eq!(default.usage_source, UsageSource::Default);
        assert_eq!(default.monthly_usage, 10);
        assert_eq!(default.suggested_minimum, 20);
        assert_eq!(default.suggested_maximum, 60);
        assert_eq!(default.reorder_point, 25);

        let mut recorded = med.clone();
        recorded.monthly_usage = 45;
        db.update_medication(&recorded).unwrap();
        let suggestion = inventory.suggest_stock_levels(&med.id).unwrap();
        assert_eq!(suggestion.usage_source, UsageSource::Recorded);
        assert_eq!(suggestion.suggested_minimum, 90);
        assert_eq!(suggestion.suggested_maximum, 270);
        assert_eq!(suggestion.reorder_point, 112);
    }

    #[test]
    fn test_suggestion_from_dispensing_history() {
        let db = Database::open_in_memory().unwrap();
        let med = medication(&db, "Amoxicillin", "Antibiotics");
        let inventory = Inventory::new(&db);
        let expiry = inventory.today() + Duration::days(365);
        inventory
            .add_batch(
                &med.id,
                NewBatch {
                    batch_number: "LOT-1".into(),
                    expiry_date: expiry.to_string(),
                    total_tablets: 500,
                    ..Default::default()
                },
                "storekeeper",
            )
            .unwrap();
        inventory
            .dispense(&med.id, 90, "pharmacist", &no_context())
            .unwrap();

        let suggestion = inventory.suggest_stock_levels(&med.id).unwrap();
        assert_eq!(suggestion.usage_source, UsageSource::DispensingHistory);
        assert_eq!(suggestion.monthly_usage, 30);
    }
}
