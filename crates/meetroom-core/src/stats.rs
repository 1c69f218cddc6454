//! Usage statistics: incremental monthly rollups and top-K rankings.
//!
//! The aggregator owns the `usage_stats` table exclusively. Rollups are
//! maintained incrementally on every successful admission rather than
//! recomputed from the ledger per query; `rebuild` replays the ledger for
//! operators who need to reconstruct the table.
//!
//! Cancellations never decrement a rollup: the leaderboard counts
//! historical activity, not currently-live reservations.

use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::DatabaseError;
use crate::storage::Database;

/// Period filter for ranking queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatPeriod {
    /// A single month's totals.
    Month { year: i32, month: u32 },
    /// Sum across one year's months.
    Year(i32),
    /// Sum across all history.
    AllTime,
}

/// Which rollup column a ranking is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankBy {
    Count,
    Duration,
}

/// One monthly rollup row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStat {
    pub requester_id: i64,
    pub year: i32,
    pub month: u32,
    pub total_reservations: i64,
    pub total_duration_minutes: i64,
}

/// One ranked leaderboard row. `total` is a reservation count or summed
/// minutes depending on the query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub requester_id: i64,
    pub display_name: String,
    pub total: i64,
}

/// Outcome of a full ledger replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildSummary {
    pub processed: usize,
    pub failed: usize,
}

/// Ranking limits are clamped to this range.
const LIMIT_MIN: usize = 1;
const LIMIT_MAX: usize = 50;

/// Incremental usage-statistics aggregator over the shared ledger handle.
#[derive(Clone)]
pub struct StatsAggregator {
    db: Database,
}

impl StatsAggregator {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Fold one admitted reservation into its (requester, year, month)
    /// rollup.
    ///
    /// Called synchronously right after a successful admission. The
    /// reservation is already durably committed at that point, so a
    /// failure here is logged and swallowed -- it must never unwind the
    /// admission.
    pub fn record_completion(
        &self,
        requester_id: i64,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    ) {
        let duration_min = (end - start).num_minutes();
        if let Err(e) = self
            .db
            .record_usage(requester_id, date.year(), date.month(), duration_min)
        {
            warn!(
                error = %e,
                requester_id,
                "usage stat update failed; reservation is already committed"
            );
        }
    }

    /// Top requesters by reservation count, descending, ties broken by
    /// ascending requester id. `limit` is clamped to `[1, 50]`.
    pub fn top_by_count(
        &self,
        period: StatPeriod,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, DatabaseError> {
        self.db
            .top_usage(RankBy::Count, period, limit.clamp(LIMIT_MIN, LIMIT_MAX))
    }

    /// Top requesters by summed duration minutes; same contract as
    /// [`top_by_count`](Self::top_by_count).
    pub fn top_by_duration(
        &self,
        period: StatPeriod,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, DatabaseError> {
        self.db
            .top_usage(RankBy::Duration, period, limit.clamp(LIMIT_MIN, LIMIT_MAX))
    }

    /// Raw rollup rows for inspection tooling.
    pub fn rows(&self) -> Result<Vec<UsageStat>, DatabaseError> {
        self.db.usage_rows()
    }

    /// Clear the rollups and replay every reservation in the ledger.
    ///
    /// Rows that fail to fold are counted and skipped, matching the
    /// incremental path's swallow-and-continue behavior.
    pub fn rebuild(&self) -> Result<RebuildSummary, DatabaseError> {
        self.db.clear_usage()?;
        let mut summary = RebuildSummary {
            processed: 0,
            failed: 0,
        };
        for r in self.db.all_reservations()? {
            let duration_min = r.duration_minutes();
            match self
                .db
                .record_usage(r.requester_id, r.date.year(), r.date.month(), duration_min)
            {
                Ok(()) => summary.processed += 1,
                Err(e) => {
                    warn!(error = %e, reservation = r.id, "rebuild: skipping reservation");
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }
}
