//! Gateway SQLite database — the persistent record store.
//!
//! Every entity kind shares one `records` table. The record body is stored as
//! JSON next to the columns the store owns (`kind`, `id`, `version`), and the
//! autoincrement `seq` keeps listing in insertion order.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde_json::Value;

use frontdesk_core::error::{FrontDeskError, Result};
use frontdesk_core::store::{
    EntityKind, Filter, RecordStore, merge_fields, prepare_new_record, record_id,
};

/// SQLite-backed [`RecordStore`]. Each call holds the connection lock for
/// its whole read-modify-write, so callers get read-your-writes per call.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database. `:memory:` gives a throwaway store.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| FrontDeskError::Store(format!("DB open error: {e}")))?;

        // WAL for concurrent readers; a no-op for in-memory databases.
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(db_err)?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS records (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                id TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 1,
                data TEXT NOT NULL,
                updated_at TEXT DEFAULT (datetime('now')),
                UNIQUE (kind, id)
            );

            CREATE INDEX IF NOT EXISTS idx_records_kind ON records (kind, seq);

            -- One token per number per day, across every process sharing the file.
            CREATE UNIQUE INDEX IF NOT EXISTS idx_token_day_number ON records (
                json_extract(data, '$.date'),
                json_extract(data, '$.token_number')
            ) WHERE kind = 'token';

            CREATE INDEX IF NOT EXISTS idx_records_token_date
                ON records (json_extract(data, '$.date')) WHERE kind = 'token';
            CREATE INDEX IF NOT EXISTS idx_records_task_assignee
                ON records (json_extract(data, '$.assigned_to')) WHERE kind = 'task';
        ",
        )
        .map_err(|e| FrontDeskError::Store(format!("Migration error: {e}")))?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| FrontDeskError::Store(format!("Lock: {e}")))
    }

    /// Number of stored records of one kind.
    pub fn count(&self, kind: EntityKind) -> Result<usize> {
        let conn = self.lock()?;
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM records WHERE kind = ?1",
                params![kind.as_str()],
                |r| r.get(0),
            )
            .map_err(db_err)?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    fn load(conn: &Connection, kind: EntityKind, id: &str) -> Result<Option<Value>> {
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM records WHERE kind = ?1 AND id = ?2",
                params![kind.as_str(), id],
                |r| r.get(0),
            )
            .optional()
            .map_err(db_err)?;
        data.map(|d| serde_json::from_str(&d).map_err(FrontDeskError::from))
            .transpose()
    }
}

/// Busy/locked databases are worth retrying; uniqueness violations are the
/// caller's fault; everything else is permanent.
fn db_err(e: rusqlite::Error) -> FrontDeskError {
    match e.sqlite_error_code() {
        Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked) => {
            FrontDeskError::TransientStore(e.to_string())
        }
        Some(rusqlite::ErrorCode::ConstraintViolation) => {
            FrontDeskError::Validation(format!("duplicate record: {e}"))
        }
        _ => FrontDeskError::Store(e.to_string()),
    }
}

/// SQL for `list`. Conditions on plain field names with string, integer or
/// bool values are matched by SQLite; the caller still runs `Filter::matches`
/// on every row, so anything not pushed down is filtered in memory.
fn list_query(kind: EntityKind, filter: &Filter) -> (String, Vec<SqlValue>) {
    let mut sql = String::from("SELECT data FROM records WHERE kind = ?1");
    let mut args = vec![SqlValue::Text(kind.as_str().to_string())];
    for (field, expected) in filter.conditions() {
        if field.is_empty() || !field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            continue;
        }
        let bound = match expected {
            Value::String(s) => SqlValue::Text(s.clone()),
            Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Integer(i),
                None => continue,
            },
            _ => continue,
        };
        args.push(bound);
        sql.push_str(&format!(" AND json_extract(data, '$.{field}') = ?{}", args.len()));
    }
    sql.push_str(" ORDER BY seq");
    (sql, args)
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn create(&self, kind: EntityKind, fields: Value) -> Result<Value> {
        let record = prepare_new_record(kind, fields)?;
        let id = record_id(&record).unwrap_or_default().to_string();
        let data = serde_json::to_string(&record)?;

        let conn = self.lock()?;
        if Self::load(&conn, kind, &id)?.is_some() {
            return Err(FrontDeskError::Validation(format!("{kind} '{id}' already exists")));
        }
        conn.execute(
            "INSERT INTO records (kind, id, version, data) VALUES (?1, ?2, 1, ?3)",
            params![kind.as_str(), id, data],
        )
        .map_err(db_err)?;
        Ok(record)
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: &str,
        fields: Value,
        expected_version: Option<u64>,
    ) -> Result<Value> {
        let conn = self.lock()?;
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT data, version FROM records WHERE kind = ?1 AND id = ?2",
                params![kind.as_str(), id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()
            .map_err(db_err)?;
        let Some((data, version)) = row else {
            return Err(FrontDeskError::not_found(kind, id));
        };

        let found = u64::try_from(version).unwrap_or(0);
        if let Some(expected) = expected_version
            && expected != found
        {
            return Err(FrontDeskError::Conflict {
                kind,
                id: id.to_string(),
                expected,
                found,
            });
        }

        let mut record: Value = serde_json::from_str(&data)?;
        merge_fields(&mut record, &fields);
        let next = found + 1;
        record["version"] = Value::from(next);

        conn.execute(
            "UPDATE records SET data = ?1, version = ?2, updated_at = datetime('now')
             WHERE kind = ?3 AND id = ?4",
            params![serde_json::to_string(&record)?, next as i64, kind.as_str(), id],
        )
        .map_err(db_err)?;
        Ok(record)
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<()> {
        let conn = self.lock()?;
        let removed = conn
            .execute(
                "DELETE FROM records WHERE kind = ?1 AND id = ?2",
                params![kind.as_str(), id],
            )
            .map_err(db_err)?;
        if removed == 0 {
            return Err(FrontDeskError::not_found(kind, id));
        }
        Ok(())
    }

    async fn list(&self, kind: EntityKind, filter: &Filter) -> Result<Vec<Value>> {
        let (sql, args) = list_query(kind, filter);
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params_from_iter(args), |r| r.get::<_, String>(0))
            .map_err(db_err)?;

        let mut records = Vec::new();
        for row in rows {
            let record: Value = serde_json::from_str(&row.map_err(db_err)?)?;
            if filter.matches(&record) {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn get(&self, kind: EntityKind, id: &str) -> Result<Value> {
        let conn = self.lock()?;
        Self::load(&conn, kind, id)?.ok_or_else(|| FrontDeskError::not_found(kind, id))
    }
}
