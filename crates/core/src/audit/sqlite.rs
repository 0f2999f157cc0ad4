use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};

use super::{AuditError, AuditEvent, AuditFilter, AuditRecord, AuditStore};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS audit_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        event_type TEXT NOT NULL,
        run_id TEXT NOT NULL,
        file TEXT,
        identifier_hash TEXT,
        data TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_audit_run ON audit_events(run_id, event_type);
    CREATE INDEX IF NOT EXISTS idx_audit_file ON audit_events(file);
    CREATE INDEX IF NOT EXISTS idx_audit_identifier ON audit_events(identifier_hash);
    CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_events(timestamp);
"#;

const COLUMNS: &str = "id, timestamp, event_type, run_id, file, identifier_hash, data";

fn db(e: impl std::fmt::Display) -> AuditError {
    AuditError::Database(e.to_string())
}

/// Audit store in a single SQLite table.
///
/// The full event is kept as JSON in `data`; the other columns duplicate the
/// fields queries filter on. Card identifiers only ever appear hashed.
pub struct SqliteAuditStore {
    conn: Mutex<Connection>,
}

impl SqliteAuditStore {
    /// Open or create the database file and its tables
    pub fn new(path: &Path) -> Result<Self, AuditError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(db)?;
        }
        let conn = Connection::open(path).map_err(db)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")
            .map_err(db)?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self, AuditError> {
        Self::with_connection(Connection::open_in_memory().map_err(db)?)
    }

    fn with_connection(conn: Connection) -> Result<Self, AuditError> {
        conn.execute_batch(SCHEMA).map_err(db)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, AuditError> {
        self.conn.lock().map_err(|_| db("connection mutex poisoned"))
    }
}

/// `WHERE` clause and its positional values for `filter`, paging excluded.
fn where_clause(filter: &AuditFilter) -> (String, Vec<Value>) {
    let text = |v: &Option<String>| v.clone().map(Value::Text);
    let time = |v: &Option<DateTime<Utc>>| v.map(|t| Value::Text(t.to_rfc3339()));

    let criteria = [
        ("run_id = ?", text(&filter.run_id)),
        ("file = ?", text(&filter.file)),
        ("event_type = ?", text(&filter.event_type)),
        ("identifier_hash = ?", text(&filter.identifier_hash)),
        ("timestamp >= ?", time(&filter.since)),
        ("timestamp <= ?", time(&filter.until)),
    ];

    let (sql, values): (Vec<&str>, Vec<Value>) = criteria
        .into_iter()
        .filter_map(|(sql, value)| value.map(|v| (sql, v)))
        .unzip();

    if sql.is_empty() {
        (String::new(), values)
    } else {
        (format!("WHERE {}", sql.join(" AND ")), values)
    }
}

/// Columns as stored, before the timestamp and payload are decoded.
struct StoredRow {
    id: i64,
    timestamp: String,
    event_type: String,
    run_id: String,
    file: Option<String>,
    identifier_hash: Option<String>,
    data: String,
}

impl StoredRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            event_type: row.get(2)?,
            run_id: row.get(3)?,
            file: row.get(4)?,
            identifier_hash: row.get(5)?,
            data: row.get(6)?,
        })
    }

    fn decode(self) -> Result<AuditRecord, AuditError> {
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|e| db(format!("invalid timestamp {:?}: {e}", self.timestamp)))?
            .with_timezone(&Utc);
        let data: AuditEvent = serde_json::from_str(&self.data)
            .map_err(|e| AuditError::Serialization(e.to_string()))?;
        Ok(AuditRecord {
            id: self.id,
            timestamp,
            event_type: self.event_type,
            run_id: self.run_id,
            file: self.file,
            identifier_hash: self.identifier_hash,
            data,
        })
    }
}

impl AuditStore for SqliteAuditStore {
    fn insert(&self, record: &AuditRecord) -> Result<i64, AuditError> {
        let data = serde_json::to_string(&record.data)
            .map_err(|e| AuditError::Serialization(e.to_string()))?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO audit_events (timestamp, event_type, run_id, file, identifier_hash, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.timestamp.to_rfc3339(),
                record.event_type,
                record.run_id,
                record.file,
                record.identifier_hash,
                data,
            ],
        )
        .map_err(db)?;
        Ok(conn.last_insert_rowid())
    }

    fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditError> {
        let (clause, mut values) = where_clause(filter);
        values.push(Value::Integer(filter.limit));
        values.push(Value::Integer(filter.offset));

        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM audit_events {clause} ORDER BY id LIMIT ? OFFSET ?"
            ))
            .map_err(db)?;

        let rows = stmt
            .query_map(params_from_iter(values), StoredRow::read)
            .map_err(db)?;
        rows.map(|row| row.map_err(db).and_then(StoredRow::decode))
            .collect()
    }

    fn count(&self, filter: &AuditFilter) -> Result<i64, AuditError> {
        let (clause, values) = where_clause(filter);
        self.conn()?
            .query_row(
                &format!("SELECT COUNT(*) FROM audit_events {clause}"),
                params_from_iter(values),
                |row| row.get(0),
            )
            .map_err(db)
    }
}
