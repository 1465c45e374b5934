//! SQLite-based storage for rituals, completions, streaks and badge awards.
//!
//! Write paths used by the completion engine are free functions over a
//! `&Connection` so they run unchanged inside a transaction; [`Database`]
//! wraps one connection and exposes the read side.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};

use super::migrations;
use crate::badges::AwardStore;
use crate::error::DatabaseError;
use crate::ritual::{
    BadgeAward, Completion, CompletionAggregates, Ritual, StreakState, StreakSummary,
};

/// Busy timeout applied when none is configured.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// SQLite database for the ritual engine.
///
/// A `Database` owns one connection. Concurrent callers each open their
/// own `Database` on the same file; SQLite serializes their writers.
pub struct Database {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// File backing this database, `None` when in memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Open (creating if needed) the database file at `path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: &Path, busy_timeout: Duration) -> Result<Self, DatabaseError> {
        let open_failed = |source: rusqlite::Error| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        };

        let conn = Connection::open(path).map_err(open_failed)?;
        conn.busy_timeout(busy_timeout).map_err(open_failed)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(open_failed)?;

        let db = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let db = Self { conn, path: None };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), DatabaseError> {
        migrations::migrate(&self.conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))
    }

    /// Start a write transaction holding SQLite's writer lock.
    pub fn begin_immediate(&self) -> Result<Transaction<'_>, DatabaseError> {
        Ok(Transaction::new_unchecked(
            &self.conn,
            TransactionBehavior::Immediate,
        )?)
    }

    /// Start a read transaction so multi-query reads see one snapshot.
    pub fn begin_read(&self) -> Result<Transaction<'_>, DatabaseError> {
        Ok(Transaction::new_unchecked(
            &self.conn,
            TransactionBehavior::Deferred,
        )?)
    }

    // === Rituals ===

    /// Register a ritual definition.
    pub fn create_ritual(&self, ritual: &Ritual) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT INTO rituals (id, name, category, description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                ritual.id,
                ritual.name,
                ritual.category,
                ritual.description,
                ritual.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_ritual(&self, id: &str) -> Result<Option<Ritual>, DatabaseError> {
        get_ritual(&self.conn, id)
    }

    pub fn list_rituals(&self) -> Result<Vec<Ritual>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, category, description, created_at
             FROM rituals ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map([], row_to_ritual)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // === Reads ===

    pub fn find_completion(
        &self,
        user_id: &str,
        ritual_id: &str,
        completed_date: NaiveDate,
    ) -> Result<Option<Completion>, DatabaseError> {
        find_completion(&self.conn, user_id, ritual_id, completed_date)
    }

    pub fn completion_badge_ids(&self, completion_id: &str) -> Result<Vec<String>, DatabaseError> {
        completion_badge_ids(&self.conn, completion_id)
    }

    pub fn streak_state(&self, user_id: &str) -> Result<Option<StreakState>, DatabaseError> {
        load_streak_state(&self.conn, user_id)
    }

    pub fn aggregates(&self, user_id: &str) -> Result<CompletionAggregates, DatabaseError> {
        completion_aggregates(&self.conn, user_id)
    }

    pub fn badge_awards(&self, user_id: &str) -> Result<Vec<BadgeAward>, DatabaseError> {
        badge_awards(&self.conn, user_id)
    }

    /// Completions for a user, oldest first.
    pub fn completions(&self, user_id: &str) -> Result<Vec<Completion>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, ritual_id, completed_date, completed_at,
                    streak_current, streak_longest
             FROM completions
             WHERE user_id = ?1
             ORDER BY completed_date, completed_at, id",
        )?;
        let rows = stmt.query_map(params![user_id], row_to_completion)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

// === Row mapping ===

fn row_to_ritual(row: &rusqlite::Row) -> Result<Ritual, rusqlite::Error> {
    Ok(Ritual {
        id: row.get(0)?,
        name: row.get(1)?,
        category: row.get(2)?,
        description: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn row_to_completion(row: &rusqlite::Row) -> Result<Completion, rusqlite::Error> {
    Ok(Completion {
        id: row.get(0)?,
        user_id: row.get(1)?,
        ritual_id: row.get(2)?,
        completed_date: row.get(3)?,
        completed_at: row.get(4)?,
        streak: StreakSummary {
            current: row.get(5)?,
            longest: row.get(6)?,
        },
    })
}

// === Queries usable inside a transaction ===

pub fn get_ritual(conn: &Connection, id: &str) -> Result<Option<Ritual>, DatabaseError> {
    let ritual = conn
        .query_row(
            "SELECT id, name, category, description, created_at
             FROM rituals WHERE id = ?1",
            params![id],
            row_to_ritual,
        )
        .optional()?;
    Ok(ritual)
}

pub fn find_completion(
    conn: &Connection,
    user_id: &str,
    ritual_id: &str,
    completed_date: NaiveDate,
) -> Result<Option<Completion>, DatabaseError> {
    let completion = conn
        .query_row(
            "SELECT id, user_id, ritual_id, completed_date, completed_at,
                    streak_current, streak_longest
             FROM completions
             WHERE user_id = ?1 AND ritual_id = ?2 AND completed_date = ?3",
            params![user_id, ritual_id, completed_date],
            row_to_completion,
        )
        .optional()?;
    Ok(completion)
}

/// Insert a completion unless one exists for the same key.
///
/// Returns `false` when another writer already holds the key.
pub fn insert_completion(
    conn: &Connection,
    id: &str,
    user_id: &str,
    ritual_id: &str,
    completed_date: NaiveDate,
    completed_at: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let inserted = conn.execute(
        "INSERT INTO completions (id, user_id, ritual_id, completed_date, completed_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (user_id, ritual_id, completed_date) DO NOTHING",
        params![id, user_id, ritual_id, completed_date, completed_at],
    )?;
    Ok(inserted == 1)
}

/// Record the streak as it stood once this completion was applied.
pub fn set_completion_streak(
    conn: &Connection,
    completion_id: &str,
    streak: StreakSummary,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE completions SET streak_current = ?2, streak_longest = ?3 WHERE id = ?1",
        params![completion_id, streak.current, streak.longest],
    )?;
    Ok(())
}

pub fn load_streak_state(
    conn: &Connection,
    user_id: &str,
) -> Result<Option<StreakState>, DatabaseError> {
    let state = conn
        .query_row(
            "SELECT user_id, current_streak, longest_streak, last_completion_date
             FROM streak_states WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok(StreakState {
                    user_id: row.get(0)?,
                    current_streak: row.get(1)?,
                    longest_streak: row.get(2)?,
                    last_completion_date: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(state)
}

pub fn save_streak_state(
    conn: &Connection,
    state: &StreakState,
    updated_at: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO streak_states
            (user_id, current_streak, longest_streak, last_completion_date, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (user_id) DO UPDATE SET
            current_streak = excluded.current_streak,
            longest_streak = excluded.longest_streak,
            last_completion_date = excluded.last_completion_date,
            updated_at = excluded.updated_at",
        params![
            state.user_id,
            state.current_streak,
            state.longest_streak,
            state.last_completion_date,
            updated_at,
        ],
    )?;
    Ok(())
}

pub fn completion_aggregates(
    conn: &Connection,
    user_id: &str,
) -> Result<CompletionAggregates, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT r.category, COUNT(*), COUNT(DISTINCT c.ritual_id)
         FROM completions c
         JOIN rituals r ON r.id = c.ritual_id
         WHERE c.user_id = ?1
         GROUP BY r.category",
    )?;
    let rows = stmt.query_map(params![user_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, u64>(1)?,
            row.get::<_, u64>(2)?,
        ))
    })?;

    let mut aggregates = CompletionAggregates::default();
    let mut by_category = BTreeMap::new();
    for row in rows {
        let (category, count, distinct) = row?;
        aggregates.total_completions += count;
        // A ritual has exactly one category, so per-category distinct counts sum.
        aggregates.distinct_rituals += distinct;
        by_category.insert(category, count);
    }
    aggregates.by_category = by_category;
    Ok(aggregates)
}

pub fn completion_badge_ids(
    conn: &Connection,
    completion_id: &str,
) -> Result<Vec<String>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT badge_id FROM badge_awards WHERE completion_id = ?1 ORDER BY seq",
    )?;
    let rows = stmt.query_map(params![completion_id], |row| row.get::<_, String>(0))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn badge_awards(conn: &Connection, user_id: &str) -> Result<Vec<BadgeAward>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT user_id, badge_id, awarded_date, completion_id
         FROM badge_awards WHERE user_id = ?1 ORDER BY seq",
    )?;
    let rows = stmt.query_map(params![user_id], |row| {
        Ok(BadgeAward {
            user_id: row.get(0)?,
            badge_id: row.get(1)?,
            awarded_date: row.get(2)?,
            completion_id: row.get(3)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

impl AwardStore for Connection {
    fn awarded_badge_ids(&self, user_id: &str) -> Result<HashSet<String>, DatabaseError> {
        let mut stmt = self.prepare("SELECT badge_id FROM badge_awards WHERE user_id = ?1")?;
        let rows = stmt.query_map(params![user_id], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<HashSet<_>, _>>()?)
    }

    fn insert_award(&self, award: &BadgeAward) -> Result<bool, DatabaseError> {
        let inserted = self.execute(
            "INSERT INTO badge_awards (user_id, badge_id, awarded_date, completion_id)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (user_id, badge_id) DO NOTHING",
            params![
                award.user_id,
                award.badge_id,
                award.awarded_date,
                award.completion_id,
            ],
        )?;
        Ok(inserted == 1)
    }
}
