//! # Meetroom Core Library
//!
//! This library provides the core business logic for the Meetroom shared
//! meeting-room service: a conflict-free reservation ledger, the
//! multi-step booking wizard, a background reminder scheduler, and
//! per-requester usage statistics. Chat transports and CLIs are thin
//! layers over the same core.
//!
//! ## Architecture
//!
//! - **Storage**: one SQLite ledger shared by every component; admission
//!   runs its overlap check and insert as a single atomic unit
//! - **Session machine**: per-requester wizard collecting date, start
//!   time, and duration, submitting one admission at the end
//! - **Reminder scheduler**: a cancellable periodic task that delivers
//!   each reminder at most once
//! - **Stats**: incremental monthly rollups with top-K ranking queries
//!
//! ## Key Components
//!
//! - [`BookingService`]: one typed entry point per inbound interaction
//! - [`Database`]: the reservation ledger
//! - [`ReminderScheduler`]: background reminder delivery
//! - [`StatsAggregator`]: usage rollups and leaderboards
//! - [`Config`]: application configuration

pub mod error;
pub mod reminder;
pub mod service;
pub mod session;
pub mod slots;
pub mod stats;
pub mod storage;

pub use error::{AdmitError, ConflictError, CoreError, DatabaseError, ValidationError};
pub use reminder::{Notifier, ReminderConfig, ReminderScheduler};
pub use service::{BookingService, BookingStep, Leaderboard, ServiceInfo};
pub use session::{BookingSession, SessionRegistry, SessionState};
pub use slots::WorkingHours;
pub use stats::{LeaderboardEntry, RankBy, RebuildSummary, StatPeriod, StatsAggregator, UsageStat};
pub use storage::{Config, Database, Requester, Reservation};
