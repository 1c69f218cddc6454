//! Core error types for meetroom-core.
//!
//! This module defines the error hierarchy using thiserror. Validation
//! failures are rejected before the store is touched; conflicts carry the
//! blocking reservation so the transport can render who holds the slot.

use std::path::PathBuf;

use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;

/// Core error type for meetroom-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// Validation errors
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("database is locked")]
    Locked,
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

/// Input validation errors.
///
/// These are raised before any ledger mutation; a booking session that
/// triggers one stays at its current step.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Date is outside the offered booking horizon
    #[error("date {0} is not open for booking")]
    DateNotOffered(NaiveDate),

    /// Start time does not lie on the booking grid
    #[error("start time {0} is not on the booking grid")]
    TimeOffGrid(NaiveTime),

    /// Duration is not in the configured set
    #[error("a duration of {0} minutes is not offered")]
    DurationNotOffered(u32),

    /// Interval is empty or inverted
    #[error("end time {end} must be after start time {start}")]
    EmptyInterval { start: NaiveTime, end: NaiveTime },

    /// Interval does not fit the working-hours window
    #[error("interval {start}-{end} lies outside working hours")]
    OutsideWorkingHours { start: NaiveTime, end: NaiveTime },

    /// A time-of-day string did not parse
    #[error("cannot parse '{0}' as an HH:MM time")]
    BadTimeFormat(String),

    /// Working hours are inverted or empty
    #[error("working hours end {end} must be after start {start}")]
    InvalidWorkingHours { start: NaiveTime, end: NaiveTime },
}

/// An admission was blocked by an existing overlapping reservation.
///
/// Carries the identity and interval of the blocking reservation for
/// user-facing messaging.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("slot on {date} is taken {start}-{end} by {reserved_by}")]
pub struct ConflictError {
    pub reserved_by: String,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// Errors from the atomic admission operation.
#[derive(Error, Debug)]
pub enum AdmitError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("reservation conflict: {0}")]
    Conflict(ConflictError),

    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
