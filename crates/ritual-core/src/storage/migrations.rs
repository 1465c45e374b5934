//! Database schema migrations for the ritual store.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult, Transaction, TransactionBehavior};

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const SCHEMA_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// Several connections may open the same file at once; the version is
/// re-read under the write lock so only one of them migrates.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    if get_schema_version(conn) >= SCHEMA_VERSION {
        return Ok(());
    }

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let current_version = get_schema_version(&tx);

    if current_version < 1 {
        migrate_v1(&tx)?;
    }
    if current_version < 2 {
        migrate_v2(&tx)?;
    }

    tx.commit()
}

/// Create the schema_version table if it doesn't exist.
fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
pub(crate) fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            tracing::warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

/// Set the schema version in the database.
fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: rituals, completions, streak states and badge awards.
///
/// The unique key on `completions` is the idempotency gate for completion
/// requests; the one on `badge_awards` keeps awards single per user.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS rituals (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            category    TEXT NOT NULL DEFAULT 'general',
            description TEXT NOT NULL DEFAULT '',
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS completions (
            id             TEXT PRIMARY KEY,
            user_id        TEXT NOT NULL,
            ritual_id      TEXT NOT NULL REFERENCES rituals(id),
            completed_date TEXT NOT NULL,
            completed_at   TEXT NOT NULL,
            streak_current INTEGER NOT NULL DEFAULT 0,
            streak_longest INTEGER NOT NULL DEFAULT 0,
            UNIQUE (user_id, ritual_id, completed_date)
        );

        CREATE TABLE IF NOT EXISTS streak_states (
            user_id              TEXT PRIMARY KEY,
            current_streak       INTEGER NOT NULL CHECK (current_streak >= 0),
            longest_streak       INTEGER NOT NULL CHECK (longest_streak >= current_streak),
            last_completion_date TEXT,
            updated_at           TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS badge_awards (
            seq           INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id       TEXT NOT NULL,
            badge_id      TEXT NOT NULL,
            awarded_date  TEXT NOT NULL,
            completion_id TEXT REFERENCES completions(id),
            UNIQUE (user_id, badge_id)
        );",
    )?;
    set_schema_version(conn, 1)
}

/// Migration v2: indexes for per-user aggregate and award lookups.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_completions_user_date
            ON completions(user_id, completed_date);
         CREATE INDEX IF NOT EXISTS idx_badge_awards_completion
            ON badge_awards(completion_id);",
    )?;
    set_schema_version(conn, 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get::<_, i32>(0),
        )
        .unwrap()
            > 0
    }

    #[test]
    fn test_migrate_from_scratch() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
        for table in ["rituals", "completions", "streak_states", "badge_awards"] {
            assert!(table_exists(&conn, table), "missing table {table}");
        }
    }

    #[test]
    fn test_migrate_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
    }

    #[test]
    fn test_incremental_migration() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema_version_table(&conn).unwrap();
        migrate_v1(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), 1);

        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), 2);

        let index_count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master
                 WHERE type = 'index' AND name = 'idx_completions_user_date'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(index_count, 1);
    }

    #[test]
    fn test_completion_key_is_unique() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn.execute(
            "INSERT INTO rituals (id, name, created_at) VALUES ('r1', 'Stretch', '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();

        let insert = "INSERT INTO completions (id, user_id, ritual_id, completed_date, completed_at)
                      VALUES (?1, 'u1', 'r1', '2024-01-01', '2024-01-01T08:00:00Z')";
        conn.execute(insert, ["c1"]).unwrap();
        assert!(conn.execute(insert, ["c2"]).is_err());
    }
}
