//! SQLite persistence for the aid network: typed key columns next to a JSON
//! payload per row, idempotent `INSERT OR IGNORE` deltas for the append-only
//! ledger, and plain upserts for the small entity tables.

use std::fmt;
use std::path::Path;

use contracts::{Beneficiary, Institution, LedgerEntry, StockItem};
use rusqlite::{params, Connection, ErrorCode};

#[derive(Debug)]
pub enum PersistenceError {
    Sqlite(rusqlite::Error),
    Serde(serde_json::Error),
}

impl PersistenceError {
    /// A concurrent writer holds the store; the check-then-commit sequence
    /// may be retried once.
    pub fn is_busy(&self) -> bool {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => {
                matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
            }
            _ => false,
        }
    }
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite error: {err}"),
            Self::Serde(err) => write!(f, "serde error: {err}"),
        }
    }
}

impl std::error::Error for PersistenceError {}

impl From<rusqlite::Error> for PersistenceError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

/// Everything needed to reassemble an [`abrigo_core::AidNetwork`].
#[derive(Debug, Default)]
pub struct PersistedNetwork {
    pub institutions: Vec<Institution>,
    pub beneficiaries: Vec<Beneficiary>,
    pub items: Vec<StockItem>,
    pub entries: Vec<LedgerEntry>,
}

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let conn = Connection::open(path)?;
        let mut store = Self { conn };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    fn configure(&mut self) -> Result<(), PersistenceError> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "busy_timeout", 250)?;
        Ok(())
    }

    fn migrate(&mut self) -> Result<(), PersistenceError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS institutions (
                id INTEGER PRIMARY KEY,
                username TEXT NOT NULL,
                email TEXT NOT NULL,
                payload_json TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS beneficiaries (
                national_id TEXT PRIMARY KEY,
                registered_by INTEGER,
                payload_json TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS stock_items (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                payload_json TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS ledger_entries (
                entry_id INTEGER PRIMARY KEY,
                item_id INTEGER NOT NULL,
                direction TEXT NOT NULL,
                beneficiary_id TEXT,
                recorded_at TEXT NOT NULL,
                payload_json TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    pub fn load_network(&self) -> Result<PersistedNetwork, PersistenceError> {
        let mut network = PersistedNetwork::default();

        let mut stmt = self
            .conn
            .prepare("SELECT payload_json FROM institutions ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        for row in rows {
            network.institutions.push(serde_json::from_str(&row?)?);
        }

        let mut stmt = self
            .conn
            .prepare("SELECT payload_json FROM beneficiaries ORDER BY national_id ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        for row in rows {
            network.beneficiaries.push(serde_json::from_str(&row?)?);
        }

        let mut stmt = self
            .conn
            .prepare("SELECT payload_json FROM stock_items ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        for row in rows {
            network.items.push(serde_json::from_str(&row?)?);
        }

        let mut stmt = self
            .conn
            .prepare("SELECT payload_json FROM ledger_entries ORDER BY entry_id ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        for row in rows {
            network.entries.push(serde_json::from_str(&row?)?);
        }

        Ok(network)
    }

    /// Appends new ledger rows in one transaction. `INSERT OR IGNORE` keeps
    /// the flush idempotent when a previous attempt already landed.
    pub fn append_entries(&mut self, entries: &[LedgerEntry]) -> Result<(), PersistenceError> {
        let tx = self.conn.transaction()?;
        for entry in entries {
            let payload_json = serde_json::to_string(entry)?;
            tx.execute(
                "INSERT OR IGNORE INTO ledger_entries (
                    entry_id,
                    item_id,
                    direction,
                    beneficiary_id,
                    recorded_at,
                    payload_json
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    i64::try_from(entry.entry_id).unwrap_or(i64::MAX),
                    entry.item_id,
                    match entry.movement.direction() {
                        contracts::Direction::Entry => "entry",
                        contracts::Direction::Exit => "exit",
                    },
                    entry.movement.beneficiary_id(),
                    entry.recorded_at.to_rfc3339(),
                    payload_json,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Rewrites one existing ledger row (annotation, orphaning). The key
    /// columns stay as written; only attribution and free text change inside
    /// the payload.
    pub fn rewrite_entry(&mut self, entry: &LedgerEntry) -> Result<(), PersistenceError> {
        let payload_json = serde_json::to_string(entry)?;
        self.conn.execute(
            "UPDATE ledger_entries SET payload_json = ?2 WHERE entry_id = ?1",
            params![
                i64::try_from(entry.entry_id).unwrap_or(i64::MAX),
                payload_json
            ],
        )?;
        Ok(())
    }

    pub fn upsert_institution(&mut self, institution: &Institution) -> Result<(), PersistenceError> {
        let payload_json = serde_json::to_string(institution)?;
        self.conn.execute(
            "INSERT INTO institutions (id, username, email, payload_json)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                username = excluded.username,
                email = excluded.email,
                payload_json = excluded.payload_json",
            params![
                institution.id,
                institution.username,
                institution.email,
                payload_json
            ],
        )?;
        Ok(())
    }

    pub fn delete_institution(&mut self, id: i64) -> Result<(), PersistenceError> {
        self.conn
            .execute("DELETE FROM institutions WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn upsert_beneficiary(&mut self, beneficiary: &Beneficiary) -> Result<(), PersistenceError> {
        let payload_json = serde_json::to_string(beneficiary)?;
        self.conn.execute(
            "INSERT INTO beneficiaries (national_id, registered_by, payload_json)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(national_id) DO UPDATE SET
                registered_by = excluded.registered_by,
                payload_json = excluded.payload_json",
            params![
                beneficiary.national_id,
                beneficiary.registered_by,
                payload_json
            ],
        )?;
        Ok(())
    }

    pub fn upsert_item(&mut self, item: &StockItem) -> Result<(), PersistenceError> {
        let payload_json = serde_json::to_string(item)?;
        self.conn.execute(
            "INSERT INTO stock_items (id, name, payload_json)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                payload_json = excluded.payload_json",
            params![item.id, item.name, payload_json],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use contracts::{Attribution, InstitutionKind, MovementKind, SCHEMA_VERSION_V1};

    fn temp_store(tag: &str) -> SqliteStore {
        let path = std::env::temp_dir().join(format!(
            "abrigo_persistence_{tag}_{}.sqlite",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        SqliteStore::open(&path).expect("store opens")
    }

    fn sample_institution() -> Institution {
        Institution {
            id: 1,
            name: "Caritas".to_string(),
            username: "caritas".to_string(),
            email: "caritas@relief.cv".to_string(),
            phone: None,
            address: None,
            responsible: "Director".to_string(),
            kind: InstitutionKind::Religious,
            legal_document: None,
            description: None,
            approved: true,
            active: true,
            administrative: true,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
            approved_at: None,
            approved_by: None,
            admin_notes: None,
        }
    }

    fn sample_entry(entry_id: u64) -> LedgerEntry {
        LedgerEntry {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            entry_id,
            item_id: 3,
            attribution: Attribution::Institution { id: 1 },
            movement: MovementKind::Exit {
                beneficiary_id: "111".to_string(),
                delivery_location: Some("school".to_string()),
            },
            quantity: 2.5,
            recorded_at: Utc.with_ymd_and_hms(2024, 5, 2, 9, 30, 0).unwrap(),
            reason: Some("storm relief".to_string()),
            observations: None,
        }
    }

    #[test]
    fn round_trips_entities_and_ledger_rows() {
        let mut store = temp_store("round_trip");
        store
            .upsert_institution(&sample_institution())
            .expect("institution persists");
        store
            .append_entries(&[sample_entry(1), sample_entry(2)])
            .expect("entries persist");

        let loaded = store.load_network().expect("loads");
        assert_eq!(loaded.institutions, vec![sample_institution()]);
        assert_eq!(loaded.entries, vec![sample_entry(1), sample_entry(2)]);
    }

    #[test]
    fn append_is_idempotent_per_entry_id() {
        let mut store = temp_store("idempotent");
        store
            .append_entries(&[sample_entry(1)])
            .expect("first flush");
        store
            .append_entries(&[sample_entry(1), sample_entry(2)])
            .expect("second flush ignores the duplicate");

        let loaded = store.load_network().expect("loads");
        assert_eq!(loaded.entries.len(), 2);
    }

    #[test]
    fn rewrite_updates_the_payload_in_place() {
        let mut store = temp_store("rewrite");
        store
            .append_entries(&[sample_entry(1)])
            .expect("entry persists");

        let mut orphaned = sample_entry(1);
        orphaned.attribution = Attribution::Orphaned;
        store.rewrite_entry(&orphaned).expect("rewrite persists");

        let loaded = store.load_network().expect("loads");
        assert_eq!(loaded.entries[0].attribution, Attribution::Orphaned);
        assert_eq!(loaded.entries.len(), 1);
    }
}
