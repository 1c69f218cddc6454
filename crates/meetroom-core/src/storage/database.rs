//! SQLite-backed reservation ledger.
//!
//! Owns the three persisted tables:
//! - `reservations` -- the conflict-free ledger of accepted slots
//! - `requesters` -- everyone who has ever interacted, upserted on contact
//! - `usage_stats` -- per-requester monthly rollups (written via
//!   [`crate::stats::StatsAggregator`])
//!
//! The handle is cheap to clone and shares one connection behind a mutex,
//! so interaction handlers and the reminder task see a single source of
//! truth. Admission runs its overlap check and insert inside one
//! IMMEDIATE transaction under that lock; nothing can interleave between
//! the check and the insert.
//!
//! Dates are stored as `%Y-%m-%d` and times as `%H:%M` TEXT, so lexical
//! SQL comparison equals calendar/time order.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};

use super::migrations;
use crate::error::{AdmitError, ConflictError, DatabaseError, ValidationError};
use crate::slots::WorkingHours;
use crate::stats::{LeaderboardEntry, RankBy, StatPeriod, UsageStat};

const DATE_FMT: &str = "%Y-%m-%d";
const TIME_FMT: &str = "%H:%M";

/// An accepted reservation of the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: i64,
    pub requester_id: i64,
    /// Display name at the time of booking, denormalized for history.
    pub requester_name: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub reminded: bool,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    /// Length of the slot in whole minutes.
    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }

    /// The start instant in the room's local calendar.
    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }
}

/// Anyone who has ever talked to the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Requester {
    pub id: i64,
    pub display_name: String,
    pub first_seen_at: DateTime<Utc>,
}

/// Shared handle to the SQLite ledger.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

fn parse_date(idx: usize, s: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_time(idx: usize, s: &str) -> rusqlite::Result<NaiveTime> {
    NaiveTime::parse_from_str(s, TIME_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Parse an RFC 3339 timestamp with fallback to the current time.
fn parse_datetime_fallback(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_reservation(row: &rusqlite::Row) -> rusqlite::Result<Reservation> {
    let date_s: String = row.get(3)?;
    let start_s: String = row.get(4)?;
    let end_s: String = row.get(5)?;
    Ok(Reservation {
        id: row.get(0)?,
        requester_id: row.get(1)?,
        requester_name: row.get(2)?,
        date: parse_date(3, &date_s)?,
        start_time: parse_time(4, &start_s)?,
        end_time: parse_time(5, &end_s)?,
        reminded: row.get::<_, i64>(6)? != 0,
        created_at: parse_datetime_fallback(&row.get::<_, String>(7)?),
    })
}

const RESERVATION_COLUMNS: &str =
    "id, requester_id, requester_name, date, start_time, end_time, reminded, created_at";

impl Database {
    /// Open the database at the given path, creating schema as needed.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: PathBuf::from(path),
            source,
        })?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests and tooling).
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory().map_err(|source| DatabaseError::OpenFailed {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn migrate(&self) -> Result<(), DatabaseError> {
        let conn = self.conn();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS reservations (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                requester_id   INTEGER NOT NULL,
                requester_name TEXT NOT NULL DEFAULT '',
                date           TEXT NOT NULL,
                start_time     TEXT NOT NULL,
                end_time       TEXT NOT NULL,
                reminded       INTEGER NOT NULL DEFAULT 0,
                created_at     TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS requesters (
                id            INTEGER PRIMARY KEY,
                display_name  TEXT NOT NULL DEFAULT '',
                first_seen_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS usage_stats (
                requester_id           INTEGER NOT NULL,
                year                   INTEGER NOT NULL,
                month                  INTEGER NOT NULL,
                total_reservations     INTEGER NOT NULL DEFAULT 0,
                total_duration_minutes INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (requester_id, year, month)
            );

            CREATE INDEX IF NOT EXISTS idx_reservations_date_start
                ON reservations(date, start_time);
            CREATE INDEX IF NOT EXISTS idx_reservations_reminded
                ON reservations(reminded, date);",
        )
        .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;

        migrations::migrate(&conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(())
    }

    // === Admission ===

    /// Atomically admit a reservation, or report the blocking one.
    ///
    /// The overlap check and the insert run in one IMMEDIATE transaction
    /// under the connection lock; concurrent admissions for the same date
    /// resolve to at most one winner. `[start, end)` is half-open, so a
    /// slot ending exactly when another starts is not a conflict.
    ///
    /// Past dates are admittable; listing, not admission, filters by
    /// "future".
    ///
    /// # Errors
    /// `AdmitError::Validation` for an empty interval or one outside
    /// `hours`, `AdmitError::Conflict` with the blocking reservation's
    /// owner and interval, `AdmitError::Database` on storage failure.
    pub fn admit(
        &self,
        requester_id: i64,
        requester_name: &str,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        hours: &WorkingHours,
    ) -> Result<Reservation, AdmitError> {
        if end <= start {
            return Err(ValidationError::EmptyInterval { start, end }.into());
        }
        if !hours.contains_interval(start, end) {
            return Err(ValidationError::OutsideWorkingHours { start, end }.into());
        }

        let date_s = date.format(DATE_FMT).to_string();
        let start_s = start.format(TIME_FMT).to_string();
        let end_s = end.format(TIME_FMT).to_string();
        let created_at = Utc::now();

        let mut conn = self.conn();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(DatabaseError::from)?;

        let blocking = tx
            .query_row(
                "SELECT requester_name, start_time, end_time
                 FROM reservations
                 WHERE date = ?1 AND start_time < ?2 AND end_time > ?3
                 ORDER BY start_time
                 LIMIT 1",
                params![date_s, end_s, start_s],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()
            .map_err(DatabaseError::from)?;

        if let Some((reserved_by, b_start, b_end)) = blocking {
            let start = NaiveTime::parse_from_str(&b_start, TIME_FMT)
                .map_err(|_| DatabaseError::QueryFailed("malformed time in ledger".into()))?;
            let end = NaiveTime::parse_from_str(&b_end, TIME_FMT)
                .map_err(|_| DatabaseError::QueryFailed("malformed time in ledger".into()))?;
            return Err(AdmitError::Conflict(ConflictError {
                reserved_by,
                date,
                start,
                end,
            }));
        }

        tx.execute(
            "INSERT INTO reservations
                 (requester_id, requester_name, date, start_time, end_time, reminded, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
            params![
                requester_id,
                requester_name,
                date_s,
                start_s,
                end_s,
                created_at.to_rfc3339(),
            ],
        )
        .map_err(DatabaseError::from)?;
        let id = tx.last_insert_rowid();
        tx.commit().map_err(DatabaseError::from)?;

        Ok(Reservation {
            id,
            requester_id,
            requester_name: requester_name.to_string(),
            date,
            start_time: start,
            end_time: end,
            reminded: false,
            created_at,
        })
    }

    // === Queries ===

    /// All reservations at or after `as_of`, ordered by date then start.
    ///
    /// The comparison is joint over (calendar day, start time): a slot
    /// today starting at or after `as_of`'s time is included, an earlier
    /// one today is not, and any later date is included regardless of
    /// time.
    pub fn list_upcoming(&self, as_of: NaiveDateTime) -> Result<Vec<Reservation>, DatabaseError> {
        let date_s = as_of.date().format(DATE_FMT).to_string();
        let time_s = as_of.time().format(TIME_FMT).to_string();
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations
             WHERE date > ?1 OR (date = ?1 AND start_time >= ?2)
             ORDER BY date, start_time"
        ))?;
        let rows = stmt.query_map(params![date_s, time_s], row_to_reservation)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Same filter as [`list_upcoming`](Self::list_upcoming), scoped to
    /// one requester.
    pub fn list_upcoming_for(
        &self,
        requester_id: i64,
        as_of: NaiveDateTime,
    ) -> Result<Vec<Reservation>, DatabaseError> {
        let date_s = as_of.date().format(DATE_FMT).to_string();
        let time_s = as_of.time().format(TIME_FMT).to_string();
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations
             WHERE requester_id = ?1 AND (date > ?2 OR (date = ?2 AND start_time >= ?3))
             ORDER BY date, start_time"
        ))?;
        let rows = stmt.query_map(params![requester_id, date_s, time_s], row_to_reservation)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Every reservation in the ledger, ordered by date then start.
    /// Used by the stats rebuild tool.
    pub fn all_reservations(&self) -> Result<Vec<Reservation>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations ORDER BY date, start_time"
        ))?;
        let rows = stmt.query_map([], row_to_reservation)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Remove every reservation belonging to `requester_id`, past and
    /// future. Returns how many were removed; 0 is a success, not an
    /// error.
    pub fn cancel_all(&self, requester_id: i64) -> Result<usize, DatabaseError> {
        let removed = self.conn().execute(
            "DELETE FROM reservations WHERE requester_id = ?1",
            params![requester_id],
        )?;
        Ok(removed)
    }

    // === Reminders ===

    /// Unreminded reservations whose start instant falls within
    /// `[now, now + lookahead_min]`.
    ///
    /// When the window crosses midnight, today's slice and tomorrow's
    /// slice are each checked against their own time bound.
    pub fn due_for_reminder(
        &self,
        now: NaiveDateTime,
        lookahead_min: u32,
    ) -> Result<Vec<Reservation>, DatabaseError> {
        let window_end = now + Duration::minutes(i64::from(lookahead_min));
        let from_date = now.date().format(DATE_FMT).to_string();
        let from_time = now.time().format(TIME_FMT).to_string();
        let to_date = window_end.date().format(DATE_FMT).to_string();
        let to_time = window_end.time().format(TIME_FMT).to_string();

        let conn = self.conn();
        let rows = if window_end.date() == now.date() {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RESERVATION_COLUMNS} FROM reservations
                 WHERE reminded = 0
                   AND date = ?1 AND start_time >= ?2 AND start_time <= ?3
                 ORDER BY date, start_time"
            ))?;
            let rows = stmt.query_map(params![from_date, from_time, to_time], row_to_reservation)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        } else {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RESERVATION_COLUMNS} FROM reservations
                 WHERE reminded = 0
                   AND ((date = ?1 AND start_time >= ?2) OR (date = ?3 AND start_time <= ?4))
                 ORDER BY date, start_time"
            ))?;
            let rows = stmt.query_map(
                params![from_date, from_time, to_date, to_time],
                row_to_reservation,
            )?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
    }

    /// Flip `reminded` to true. Idempotent: marking an already-reminded
    /// or unknown reservation is a no-op, not an error.
    pub fn mark_reminded(&self, reservation_id: i64) -> Result<(), DatabaseError> {
        self.conn().execute(
            "UPDATE reservations SET reminded = 1 WHERE id = ?1",
            params![reservation_id],
        )?;
        Ok(())
    }

    // === Requesters ===

    /// Insert or refresh a requester. The display name follows the latest
    /// interaction; `first_seen_at` is kept from the first contact.
    pub fn upsert_requester(&self, id: i64, display_name: &str) -> Result<(), DatabaseError> {
        self.conn().execute(
            "INSERT INTO requesters (id, display_name, first_seen_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET display_name = excluded.display_name",
            params![id, display_name, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Look up a requester by id.
    pub fn requester(&self, id: i64) -> Result<Option<Requester>, DatabaseError> {
        let conn = self.conn();
        let result = conn
            .query_row(
                "SELECT id, display_name, first_seen_at FROM requesters WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Requester {
                        id: row.get(0)?,
                        display_name: row.get(1)?,
                        first_seen_at: parse_datetime_fallback(&row.get::<_, String>(2)?),
                    })
                },
            )
            .optional()?;
        Ok(result)
    }

    // === Usage stats ===

    /// Upsert one completed reservation into the monthly rollup.
    pub fn record_usage(
        &self,
        requester_id: i64,
        year: i32,
        month: u32,
        duration_min: i64,
    ) -> Result<(), DatabaseError> {
        self.conn().execute(
            "INSERT INTO usage_stats
                 (requester_id, year, month, total_reservations, total_duration_minutes, updated_at)
             VALUES (?1, ?2, ?3, 1, ?4, ?5)
             ON CONFLICT(requester_id, year, month) DO UPDATE SET
                 total_reservations = total_reservations + 1,
                 total_duration_minutes = total_duration_minutes + excluded.total_duration_minutes,
                 updated_at = excluded.updated_at",
            params![requester_id, year, month, duration_min, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Wipe the rollup table. Returns the number of rows removed.
    pub fn clear_usage(&self) -> Result<usize, DatabaseError> {
        Ok(self.conn().execute("DELETE FROM usage_stats", [])?)
    }

    /// Raw rollup rows, newest period first.
    pub fn usage_rows(&self) -> Result<Vec<UsageStat>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT requester_id, year, month, total_reservations, total_duration_minutes
             FROM usage_stats
             ORDER BY year DESC, month DESC, total_reservations DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(UsageStat {
                requester_id: row.get(0)?,
                year: row.get(1)?,
                month: row.get(2)?,
                total_reservations: row.get(3)?,
                total_duration_minutes: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Ranked usage totals for a period, descending, ties broken by
    /// ascending requester id for reproducible output.
    pub fn top_usage(
        &self,
        rank: RankBy,
        period: StatPeriod,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, DatabaseError> {
        let metric = match rank {
            RankBy::Count => "total_reservations",
            RankBy::Duration => "total_duration_minutes",
        };
        let filter = match period {
            StatPeriod::Month { .. } => "WHERE s.year = ?1 AND s.month = ?2",
            StatPeriod::Year(_) => "WHERE s.year = ?1",
            StatPeriod::AllTime => "",
        };
        let sql = format!(
            "SELECT s.requester_id, COALESCE(r.display_name, ''), SUM(s.{metric}) AS total
             FROM usage_stats s
             LEFT JOIN requesters r ON r.id = s.requester_id
             {filter}
             GROUP BY s.requester_id
             ORDER BY total DESC, s.requester_id ASC
             LIMIT {limit}"
        );

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let map_row = |row: &rusqlite::Row| -> rusqlite::Result<LeaderboardEntry> {
            Ok(LeaderboardEntry {
                requester_id: row.get(0)?,
                display_name: row.get(1)?,
                total: row.get(2)?,
            })
        };
        let rows = match period {
            StatPeriod::Month { year, month } => stmt
                .query_map(params![year, month], map_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
            StatPeriod::Year(year) => stmt
                .query_map(params![year], map_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
            StatPeriod::AllTime => stmt
                .query_map([], map_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
        };
        Ok(rows)
    }
}
