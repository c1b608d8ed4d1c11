//! SQLite schema definition.

/// Complete database schema for the EMR pharmacy backend.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Patient Registry
-- ============================================================================

CREATE TABLE IF NOT EXISTS patients (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL CHECK (kind IN ('Employee', 'Retiree', 'Dependent', 'NonNpa')),
    surname TEXT NOT NULL,
    first_name TEXT NOT NULL,
    personal_number TEXT,                        -- Employee / Retiree only
    sponsor_personal_number TEXT,                -- Dependent only
    record TEXT NOT NULL,                        -- JSON Patient, including kind payload
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_patients_name ON patients(surname, first_name);
CREATE INDEX IF NOT EXISTS idx_patients_personal_number ON patients(personal_number);
CREATE INDEX IF NOT EXISTS idx_patients_sponsor ON patients(sponsor_personal_number);

CREATE TABLE IF NOT EXISTS visits (
    id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES patients(id),
    visit_date TEXT NOT NULL,
    visit_time TEXT NOT NULL,
    visit_location TEXT NOT NULL,
    visit_type TEXT NOT NULL,
    clinic TEXT NOT NULL,
    priority TEXT NOT NULL DEFAULT 'Medium',
    status TEXT NOT NULL DEFAULT 'Scheduled',
    special_instructions TEXT,
    assigned_nurse TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_visits_patient ON visits(patient_id, visit_date);
CREATE INDEX IF NOT EXISTS idx_visits_status ON visits(status);

CREATE TABLE IF NOT EXISTS vital_readings (
    id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES patients(id),
    recorded_at TEXT NOT NULL,
    systolic INTEGER CHECK (systolic IS NULL OR systolic >= 0),
    diastolic INTEGER CHECK (diastolic IS NULL OR diastolic >= 0),
    heart_rate INTEGER,
    blood_sugar REAL,
    rbs REAL,
    temperature REAL,
    weight REAL,
    height REAL,
    respiratory_rate INTEGER,
    oxygen_saturation REAL,
    pain_scale INTEGER,
    comment TEXT,
    recorded_by TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_vitals_patient ON vital_readings(patient_id, recorded_at);

-- ============================================================================
-- Medications and Batches
-- ============================================================================

CREATE TABLE IF NOT EXISTS medications (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    generic_name TEXT,
    category TEXT NOT NULL,
    strength TEXT,
    dosage_form TEXT,
    manufacturer TEXT,
    supplier TEXT,
    location TEXT,
    barcode TEXT UNIQUE,
    prescription_required INTEGER NOT NULL DEFAULT 0,
    is_generic INTEGER NOT NULL DEFAULT 0,
    minimum_stock INTEGER NOT NULL DEFAULT 0 CHECK (minimum_stock >= 0),
    maximum_stock INTEGER NOT NULL DEFAULT 0 CHECK (maximum_stock >= 0),
    pack_size INTEGER NOT NULL DEFAULT 1 CHECK (pack_size > 0),
    monthly_usage INTEGER NOT NULL DEFAULT 0 CHECK (monthly_usage >= 0),
    current_stock INTEGER NOT NULL DEFAULT 0 CHECK (current_stock >= 0),
    status TEXT NOT NULL DEFAULT 'Out of Stock'
        CHECK (status IN ('In Stock', 'Low Stock', 'Out of Stock', 'Near Expiry', 'Expired')),
    last_restocked TEXT,
    last_dispensed TEXT,
    notes TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_medications_category ON medications(category);
CREATE INDEX IF NOT EXISTS idx_medications_name ON medications(name);
CREATE INDEX IF NOT EXISTS idx_medications_status ON medications(status);

-- Batches are never deleted; rowid gives insertion order for FIFO ties.
CREATE TABLE IF NOT EXISTS medication_batches (
    id TEXT PRIMARY KEY,
    medication_id TEXT NOT NULL REFERENCES medications(id),
    batch_number TEXT NOT NULL,
    expiry_date TEXT NOT NULL,
    date_received TEXT NOT NULL,
    total_tablets INTEGER NOT NULL CHECK (total_tablets >= 0),
    remaining_tablets INTEGER NOT NULL
        CHECK (remaining_tablets >= 0 AND remaining_tablets <= total_tablets),
    pack_size INTEGER NOT NULL CHECK (pack_size > 0),
    packs_received INTEGER NOT NULL DEFAULT 0,
    opened_packs INTEGER NOT NULL DEFAULT 0,
    sealed_packs INTEGER NOT NULL DEFAULT 0,
    supplier TEXT,
    status TEXT NOT NULL DEFAULT 'Active'
        CHECK (status IN ('Active', 'Near Expiry', 'Expired', 'Depleted', 'Recalled')),
    notes TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (medication_id, batch_number)
);

CREATE INDEX IF NOT EXISTS idx_batches_fifo ON medication_batches(medication_id, expiry_date);

-- ============================================================================
-- Stock Ledger (Append-Only - Immutable after creation)
-- ============================================================================

CREATE TABLE IF NOT EXISTS stock_transactions (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    medication_id TEXT NOT NULL REFERENCES medications(id),
    transaction_type TEXT NOT NULL
        CHECK (transaction_type IN ('Dispensed', 'Restocked', 'Adjusted', 'Expired', 'Returned', 'Substitution')),
    quantity INTEGER NOT NULL,
    previous_stock INTEGER NOT NULL,
    new_stock INTEGER NOT NULL,
    performed_by TEXT NOT NULL,
    visit_id TEXT,
    prescription_id TEXT,
    prescription_item_id TEXT,
    batch_id TEXT,
    batches_affected TEXT NOT NULL DEFAULT '[]',  -- JSON array of BatchAllocation
    reason TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    previous_hash TEXT,                           -- NULL for the first row
    entry_hash TEXT NOT NULL UNIQUE
);

CREATE INDEX IF NOT EXISTS idx_transactions_medication ON stock_transactions(medication_id, created_at);
CREATE INDEX IF NOT EXISTS idx_transactions_type ON stock_transactions(transaction_type, created_at);

CREATE TRIGGER IF NOT EXISTS stock_transactions_no_update BEFORE UPDATE ON stock_transactions
BEGIN
    SELECT RAISE(ABORT, 'Stock transactions are immutable');
END;

CREATE TRIGGER IF NOT EXISTS stock_transactions_no_delete BEFORE DELETE ON stock_transactions
BEGIN
    SELECT RAISE(ABORT, 'Stock transactions cannot be deleted');
END;

-- ============================================================================
-- Prescriptions and Pharmacy Queue
-- ============================================================================

CREATE TABLE IF NOT EXISTS prescriptions (
    id TEXT PRIMARY KEY,
    visit_id TEXT UNIQUE REFERENCES visits(id),  -- one prescription per visit
    patient_id TEXT NOT NULL REFERENCES patients(id),
    prescribed_by TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'Pending'
        CHECK (status IN ('Pending', 'Partially Dispensed', 'Dispensed', 'Cancelled')),
    total_items INTEGER NOT NULL DEFAULT 0,
    available_items INTEGER NOT NULL DEFAULT 0,
    out_of_stock_items INTEGER NOT NULL DEFAULT 0,
    dispensed_items INTEGER NOT NULL DEFAULT 0,
    notes TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_prescriptions_patient ON prescriptions(patient_id);

CREATE TABLE IF NOT EXISTS prescription_items (
    id TEXT PRIMARY KEY,
    prescription_id TEXT NOT NULL REFERENCES prescriptions(id),
    medication_id TEXT NOT NULL REFERENCES medications(id),
    dosage TEXT NOT NULL,
    frequency TEXT NOT NULL,
    duration TEXT NOT NULL,
    quantity INTEGER NOT NULL CHECK (quantity > 0),
    instructions TEXT,
    status TEXT NOT NULL DEFAULT 'Pending'
        CHECK (status IN ('Pending', 'Available', 'Out of Stock', 'Substituted', 'Dispensed')),
    substituted_with TEXT REFERENCES medications(id),
    substitution_reason TEXT,
    dispensed_quantity INTEGER,
    dispensed_date TEXT,
    dispensed_by TEXT
);

CREATE INDEX IF NOT EXISTS idx_items_prescription ON prescription_items(prescription_id);

CREATE TABLE IF NOT EXISTS pharmacy_queue (
    id TEXT PRIMARY KEY,
    prescription_id TEXT NOT NULL UNIQUE REFERENCES prescriptions(id),
    patient_id TEXT NOT NULL REFERENCES patients(id),
    status TEXT NOT NULL DEFAULT 'Pending'
        CHECK (status IN ('Pending', 'Processing', 'Ready', 'Partially Dispensed', 'Dispensed', 'Cancelled')),
    priority TEXT NOT NULL DEFAULT 'Normal' CHECK (priority IN ('High', 'Medium', 'Normal')),
    assigned_to TEXT,
    estimated_completion_at TEXT,
    pharmacist_notes TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_queue_status ON pharmacy_queue(status, priority);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn conn_with_medication() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute(
            "INSERT INTO medications (id, name, category) VALUES ('m1', 'Amoxicillin', 'Antibiotics')",
            [],
        )
        .unwrap();
        conn
    }

    fn insert_transaction(conn: &Connection) {
        conn.execute(
            r#"INSERT INTO stock_transactions
               (id, medication_id, transaction_type, quantity, previous_stock, new_stock,
                performed_by, created_at, entry_hash)
               VALUES ('t1', 'm1', 'Restocked', 10, 0, 10, 'admin', '2026-01-01T00:00:00Z', 'h1')"#,
            [],
        )
        .unwrap();
    }

    #[test]
    fn test_schema_valid() {
        let conn = Connection::open_in_memory().unwrap();
        let result = conn.execute_batch(SCHEMA);
        assert!(result.is_ok(), "Schema should be valid SQL: {:?}", result);
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        assert!(conn.execute_batch(SCHEMA).is_ok());
    }

    #[test]
    fn test_ledger_rejects_update() {
        let conn = conn_with_medication();
        insert_transaction(&conn);

        let result = conn.execute("UPDATE stock_transactions SET quantity = 99", []);
        assert!(result.is_err());
    }

    #[test]
    fn test_ledger_rejects_delete() {
        let conn = conn_with_medication();
        insert_transaction(&conn);

        let result = conn.execute("DELETE FROM stock_transactions", []);
        assert!(result.is_err());

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM stock_transactions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_batch_remaining_cannot_exceed_total() {
        let conn = conn_with_medication();
        let result = conn.execute(
            r#"INSERT INTO medication_batches
               (id, medication_id, batch_number, expiry_date, date_received,
                total_tablets, remaining_tablets, pack_size)
               VALUES ('b1', 'm1', 'LOT-1', '2027-01-01', '2026-01-01', 10, 11, 10)"#,
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_status_rejected() {
        let conn = conn_with_medication();
        let result = conn.execute("UPDATE medications SET status = 'Plentiful'", []);
        assert!(result.is_err());
    }
}
