//! Interaction entry points.
//!
//! One method per inbound transport event. Every method returns structured
//! data -- dates, times, the blocking owner of a conflicting slot -- and
//! never user-facing text; rendering belongs to the transport.
//!
//! All parts are constructor-injected: the ledger handle, the stats
//! aggregator, the session registry, and the configuration snapshot. A
//! transport embeds one `BookingService` and calls it from however many
//! concurrent handlers it runs.

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AdmitError, ConflictError, CoreError, ValidationError};
use crate::session::{SessionRegistry, SessionState};
use crate::slots::{self, WorkingHours};
use crate::stats::{LeaderboardEntry, StatPeriod, StatsAggregator};
use crate::storage::{Config, Database, RemindersConfig, Reservation};

/// Reply to a wizard interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingStep {
    /// The input did not match an active session at this step; stale or
    /// duplicate interactions are dropped, never an error.
    Ignored,
    /// Pick a date from the offered horizon.
    ChooseDate { dates: Vec<NaiveDate> },
    /// Pick a start time on the grid.
    ChooseStart {
        date: NaiveDate,
        times: Vec<NaiveTime>,
    },
    /// Pick a duration from the offered set.
    ChooseDuration {
        date: NaiveDate,
        start: NaiveTime,
        durations: Vec<u32>,
    },
    /// The chosen duration runs past closing; the session stays at the
    /// duration step awaiting a shorter choice.
    TooLong {
        date: NaiveDate,
        start: NaiveTime,
        closes_at: NaiveTime,
    },
    /// The reservation was admitted; the wizard is done.
    Confirmed(Reservation),
    /// The slot was taken; the wizard terminates with the blocker's
    /// details.
    Conflict(ConflictError),
}

/// Both room-usage rankings for one period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leaderboard {
    pub by_count: Vec<LeaderboardEntry>,
    pub by_duration: Vec<LeaderboardEntry>,
}

/// Static facts a transport needs to render menus and help.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub hours_start: NaiveTime,
    pub hours_end: NaiveTime,
    pub booking_horizon_days: u32,
    pub durations_min: Vec<u32>,
    pub reminders_enabled: bool,
    pub reminder_lookahead_min: u32,
}

/// The core service behind the transport.
pub struct BookingService {
    db: Database,
    stats: StatsAggregator,
    sessions: SessionRegistry,
    hours: WorkingHours,
    horizon_days: u32,
    durations_min: Vec<u32>,
    reminders: RemindersConfig,
}

impl BookingService {
    /// Wire the service from its injected parts.
    ///
    /// # Errors
    /// Returns a [`ValidationError`] when the configured working hours do
    /// not parse or are inverted.
    pub fn new(
        db: Database,
        stats: StatsAggregator,
        sessions: SessionRegistry,
        config: &Config,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            db,
            stats,
            sessions,
            hours: config.working_hours()?,
            horizon_days: config.booking_horizon_days,
            durations_min: config.durations_min.clone(),
            reminders: config.reminders.clone(),
        })
    }

    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    /// Begin (or restart) the booking wizard.
    ///
    /// Any wizard already in progress for this requester is discarded --
    /// last write wins.
    pub fn start_booking(
        &self,
        requester_id: i64,
        display_name: &str,
    ) -> Result<BookingStep, CoreError> {
        self.db.upsert_requester(requester_id, display_name)?;
        self.sessions.begin(requester_id);
        Ok(BookingStep::ChooseDate {
            dates: slots::available_dates(self.now().date(), self.horizon_days),
        })
    }

    /// Explicit restart command: discard whatever wizard is in progress
    /// and offer dates afresh. Identical to starting a booking.
    pub fn restart(
        &self,
        requester_id: i64,
        display_name: &str,
    ) -> Result<BookingStep, CoreError> {
        self.start_booking(requester_id, display_name)
    }

    /// Date selected: advance to the start-time step.
    pub fn select_date(
        &self,
        requester_id: i64,
        display_name: &str,
        date: NaiveDate,
    ) -> Result<BookingStep, CoreError> {
        self.db.upsert_requester(requester_id, display_name)?;
        match self.sessions.state_of(requester_id) {
            Some(SessionState::AwaitingDate) => {}
            _ => return Ok(BookingStep::Ignored),
        }

        let offered = slots::available_dates(self.now().date(), self.horizon_days);
        if !offered.contains(&date) {
            return Err(ValidationError::DateNotOffered(date).into());
        }

        self.sessions
            .advance(requester_id, SessionState::AwaitingStartTime { date });
        Ok(BookingStep::ChooseStart {
            date,
            times: self.hours.time_grid(),
        })
    }

    /// Start time selected: advance to the duration step.
    pub fn select_start_time(
        &self,
        requester_id: i64,
        display_name: &str,
        start: NaiveTime,
    ) -> Result<BookingStep, CoreError> {
        self.db.upsert_requester(requester_id, display_name)?;
        let date = match self.sessions.state_of(requester_id) {
            Some(SessionState::AwaitingStartTime { date }) => date,
            _ => return Ok(BookingStep::Ignored),
        };

        if !self.hours.time_grid().contains(&start) {
            return Err(ValidationError::TimeOffGrid(start).into());
        }

        self.sessions
            .advance(requester_id, SessionState::AwaitingDuration { date, start });
        Ok(BookingStep::ChooseDuration {
            date,
            start,
            durations: self.durations_min.clone(),
        })
    }

    /// Duration selected: submit the admission.
    ///
    /// An end time past closing keeps the session at the duration step;
    /// success and conflict both destroy it.
    pub fn select_duration(
        &self,
        requester_id: i64,
        display_name: &str,
        minutes: u32,
    ) -> Result<BookingStep, CoreError> {
        self.db.upsert_requester(requester_id, display_name)?;
        let (date, start) = match self.sessions.state_of(requester_id) {
            Some(SessionState::AwaitingDuration { date, start }) => (date, start),
            _ => return Ok(BookingStep::Ignored),
        };

        if !self.durations_min.contains(&minutes) {
            return Err(ValidationError::DurationNotOffered(minutes).into());
        }

        let end = match slots::end_of(start, minutes) {
            Some(end) if end <= self.hours.end => end,
            _ => {
                return Ok(BookingStep::TooLong {
                    date,
                    start,
                    closes_at: self.hours.end,
                })
            }
        };

        match self
            .db
            .admit(requester_id, display_name, date, start, end, &self.hours)
        {
            Ok(reservation) => {
                self.sessions.remove(requester_id);
                self.stats
                    .record_completion(requester_id, date, start, end);
                info!(
                    reservation = reservation.id,
                    requester = requester_id,
                    %date,
                    "reservation admitted"
                );
                Ok(BookingStep::Confirmed(reservation))
            }
            Err(AdmitError::Conflict(conflict)) => {
                self.sessions.remove(requester_id);
                Ok(BookingStep::Conflict(conflict))
            }
            Err(AdmitError::Validation(e)) => Err(e.into()),
            Err(AdmitError::Database(e)) => Err(e.into()),
        }
    }

    /// Everyone's upcoming reservations, ordered by date then start.
    pub fn list_schedule(&self) -> Result<Vec<Reservation>, CoreError> {
        Ok(self.db.list_upcoming(self.now())?)
    }

    /// The requester's own upcoming reservations.
    pub fn list_mine(
        &self,
        requester_id: i64,
        display_name: &str,
    ) -> Result<Vec<Reservation>, CoreError> {
        self.db.upsert_requester(requester_id, display_name)?;
        Ok(self.db.list_upcoming_for(requester_id, self.now())?)
    }

    /// Cancel every reservation the requester owns. Zero removed is a
    /// success.
    pub fn cancel_mine(
        &self,
        requester_id: i64,
        display_name: &str,
    ) -> Result<usize, CoreError> {
        self.db.upsert_requester(requester_id, display_name)?;
        let removed = self.db.cancel_all(requester_id)?;
        if removed > 0 {
            info!(requester = requester_id, removed, "reservations cancelled");
        }
        Ok(removed)
    }

    /// Top-K usage rankings for a period, by count and by duration.
    pub fn leaderboard(&self, period: StatPeriod, limit: usize) -> Result<Leaderboard, CoreError> {
        Ok(Leaderboard {
            by_count: self.stats.top_by_count(period, limit)?,
            by_duration: self.stats.top_by_duration(period, limit)?,
        })
    }

    /// Configuration facts for the transport's menus and help text.
    pub fn info(&self) -> ServiceInfo {
        ServiceInfo {
            hours_start: self.hours.start,
            hours_end: self.hours.end,
            booking_horizon_days: self.horizon_days,
            durations_min: self.durations_min.clone(),
            reminders_enabled: self.reminders.enabled,
            reminder_lookahead_min: self.reminders.lookahead_min,
        }
    }
}
