//! Schema creation and connection setup

use std::path::Path;
use std::time::Duration;

use contracts::{ControlState, QueueError};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

/// Schema version written to `store_meta`.
pub(crate) const SCHEMA_VERSION: i64 = 1;

/// In-memory database path marker
pub(crate) const MEMORY_PATH: &str = ":memory:";

/// Columns selected for every record query, in `RawRecord` order.
pub(crate) const RECORD_COLUMNS: &str =
    "id, payload, created_at, source, metadata, sent, attempts, priority, evicted";

pub(crate) fn db_err(context: &'static str) -> impl FnOnce(rusqlite::Error) -> QueueError {
    move |err| QueueError::storage(context, err)
}

/// Opens a connection and applies durability pragmas.
pub(crate) fn open_connection(path: &Path, busy_timeout: Duration) -> Result<Connection, QueueError> {
    let connection = if path.as_os_str() == MEMORY_PATH {
        Connection::open_in_memory().map_err(db_err("open in-memory database"))?
    } else {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        Connection::open_with_flags(path, flags).map_err(db_err("open database"))?
    };

    connection
        .execute_batch("PRAGMA journal_mode = wal;")
        .map_err(db_err("set journal mode"))?;
    connection
        .execute_batch("PRAGMA synchronous = full;")
        .map_err(db_err("set synchronous mode"))?;
    connection
        .busy_timeout(busy_timeout)
        .map_err(db_err("set busy timeout"))?;

    Ok(connection)
}

/// Creates tables on first open and validates the version afterwards.
pub(crate) fn initialize(connection: &mut Connection) -> Result<(), QueueError> {
    let tx = connection.transaction().map_err(db_err("begin schema transaction"))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(db_err("create store_meta"))?;

    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(db_err("read schema version"))?;

    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(db_err("write schema version"))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS messages (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    id TEXT NOT NULL UNIQUE,
                    payload TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    source TEXT NOT NULL,
                    metadata TEXT,
                    sent INTEGER NOT NULL DEFAULT 0,
                    attempts INTEGER NOT NULL DEFAULT 0,
                    priority INTEGER NOT NULL DEFAULT 0,
                    evicted INTEGER NOT NULL DEFAULT 0
                );
                CREATE INDEX IF NOT EXISTS idx_messages_dispatch
                    ON messages (sent, priority DESC, created_at, seq);
                CREATE INDEX IF NOT EXISTS idx_messages_recent
                    ON messages (created_at DESC, seq DESC);
                CREATE TABLE IF NOT EXISTS control_plane (
                    id INTEGER PRIMARY KEY CHECK (id = 1),
                    state_json TEXT NOT NULL
                );",
            )
            .map_err(db_err("create tables"))?;

            let initial = serde_json::to_string(&ControlState::default())
                .map_err(|e| QueueError::storage("serialize control state", e))?;
            tx.execute(
                "INSERT INTO control_plane (id, state_json) VALUES (1, ?1)",
                params![initial],
            )
            .map_err(db_err("seed control plane"))?;
        }
        Some(SCHEMA_VERSION) => {}
        Some(other) => {
            return Err(QueueError::storage_message(format!(
                "unsupported schema version {other} (expected {SCHEMA_VERSION})"
            )));
        }
    }

    tx.commit().map_err(db_err("commit schema"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_is_idempotent() {
        let mut conn = open_connection(Path::new(MEMORY_PATH), Duration::from_millis(100)).unwrap();
        initialize(&mut conn).unwrap();
        initialize(&mut conn).unwrap();

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM control_plane", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_rejects_future_schema() {
        let mut conn = open_connection(Path::new(MEMORY_PATH), Duration::from_millis(100)).unwrap();
        initialize(&mut conn).unwrap();
        conn.execute("UPDATE store_meta SET version = 99", []).unwrap();

        let err = initialize(&mut conn).unwrap_err();
        assert!(err.to_string().contains("storage error"));
    }
}
