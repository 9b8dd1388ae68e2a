//! Pooled `SQLite` connections and schema bootstrap.

use r2d2_sqlite::SqliteConnectionManager;

use crate::errors::StorageError;

/// A pooled connection handle, cloned cheaply and shared across tasks.
pub type Pool = r2d2::Pool<SqliteConnectionManager>;

/// Build a connection pool from a DSN.
///
/// The DSN is a filesystem path (`:memory:` is accepted for tests); this
/// engine doesn't speak a network SQL protocol.
///
/// # Errors
///
/// Returns an error if the pool cannot be constructed or the schema
/// migration fails against the first connection.
pub fn build_pool(dsn: &str) -> Result<Pool, StorageError> {
    let manager = SqliteConnectionManager::file(dsn).with_init(|conn| {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
    });
    let pool = r2d2::Pool::new(manager)?;
    let conn = pool.get()?;
    run_migrations(&conn)?;
    Ok(pool)
}

/// Apply the schema migration. Idempotent: uses `CREATE TABLE IF NOT EXISTS`.
pub fn run_migrations(conn: &rusqlite::Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            role TEXT NOT NULL,
            limits TEXT NOT NULL,
            provider_group TEXT NOT NULL DEFAULT '',
            enabled INTEGER NOT NULL DEFAULT 1,
            expires_at TEXT
        );
        CREATE TABLE IF NOT EXISTS keys (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id),
            key_hash TEXT NOT NULL UNIQUE,
            enabled INTEGER NOT NULL DEFAULT 1,
            expires_at TEXT,
            limits TEXT NOT NULL,
            daily_reset_mode TEXT NOT NULL DEFAULT 'fixed',
            daily_reset_time TEXT NOT NULL DEFAULT '00:00',
            provider_group TEXT NOT NULL DEFAULT ''
        );
        CREATE INDEX IF NOT EXISTS idx_keys_user_id ON keys(user_id);
        CREATE TABLE IF NOT EXISTS providers (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            vendor_id TEXT NOT NULL,
            provider_type TEXT NOT NULL,
            url TEXT NOT NULL,
            group_tag TEXT NOT NULL DEFAULT '',
            weight REAL NOT NULL DEFAULT 1.0,
            priority INTEGER NOT NULL DEFAULT 0,
            enabled INTEGER NOT NULL DEFAULT 1,
            deleted INTEGER NOT NULL DEFAULT 0,
            config TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS provider_endpoints (
            id TEXT PRIMARY KEY,
            vendor_id TEXT NOT NULL,
            provider_type TEXT NOT NULL,
            url TEXT NOT NULL,
            label TEXT NOT NULL DEFAULT '',
            weight REAL NOT NULL DEFAULT 1.0,
            sort_order INTEGER NOT NULL DEFAULT 0,
            enabled INTEGER NOT NULL DEFAULT 1,
            deleted INTEGER NOT NULL DEFAULT 0,
            UNIQUE(vendor_id, provider_type, url)
        );
        CREATE TABLE IF NOT EXISTS message_requests (
            id TEXT PRIMARY KEY,
            request_id TEXT NOT NULL,
            key_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            provider_id TEXT,
            model TEXT NOT NULL,
            status_code INTEGER,
            cost_usd REAL NOT NULL DEFAULT 0,
            input_tokens INTEGER NOT NULL DEFAULT 0,
            output_tokens INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_message_requests_key_id ON message_requests(key_id);
        CREATE TABLE IF NOT EXISTS logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            level TEXT NOT NULL,
            level_num INTEGER NOT NULL,
            component TEXT NOT NULL DEFAULT '',
            message TEXT DEFAULT '',
            request_id TEXT,
            session_id TEXT,
            key_id TEXT,
            provider TEXT,
            trace_id TEXT,
            data TEXT,
            error_message TEXT,
            error_stack TEXT
        );
        CREATE VIRTUAL TABLE IF NOT EXISTS logs_fts USING fts5(
            log_id UNINDEXED,
            request_id UNINDEXED,
            component,
            message,
            error_message,
            tokenize='porter unicode61'
        );",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='keys'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn build_pool_against_in_memory_dsn() {
        let pool = build_pool("file::memory:?cache=shared").unwrap();
        let conn = pool.get().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
