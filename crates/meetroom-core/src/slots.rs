//! Slot arithmetic for the booking grid.
//!
//! The room is booked in discrete calendar-day/time-of-day slots: dates are
//! offered over a rolling horizon starting today, start times lie on the
//! hour and half-hour marks inside the working-hours window, and durations
//! come from a configured set. All helpers here are pure -- `today` and
//! `now` are parameters, never read from the wall clock.

use chrono::{Days, Duration, NaiveDate, NaiveTime, Timelike};

use crate::error::ValidationError;

/// The working-hours window the room can be reserved within.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkingHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl WorkingHours {
    /// Build a window, rejecting inverted or empty ranges.
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, ValidationError> {
        if end <= start {
            return Err(ValidationError::InvalidWorkingHours { start, end });
        }
        Ok(Self { start, end })
    }

    /// Parse a window from two "HH:MM" strings.
    pub fn parse(start: &str, end: &str) -> Result<Self, ValidationError> {
        Self::new(parse_hhmm(start)?, parse_hhmm(end)?)
    }

    /// Whether a half-open interval `[start, end)` fits inside the window.
    pub fn contains_interval(&self, start: NaiveTime, end: NaiveTime) -> bool {
        start >= self.start && end <= self.end && start < end
    }

    /// Start times offered to requesters: every :00 and :30 mark from the
    /// opening hour through the closing hour. The closing time itself is
    /// offered; any duration chosen from it runs past the window and is
    /// rejected at the duration step.
    pub fn time_grid(&self) -> Vec<NaiveTime> {
        let start_hour = self.start.hour();
        let end_hour = self.end.hour();
        let mut times = Vec::new();
        for hour in start_hour..=end_hour {
            if let Some(t) = NaiveTime::from_hms_opt(hour, 0, 0) {
                times.push(t);
            }
            if hour < end_hour {
                if let Some(t) = NaiveTime::from_hms_opt(hour, 30, 0) {
                    times.push(t);
                }
            }
        }
        times
    }
}

/// Parse an "HH:MM" time-of-day string.
pub fn parse_hhmm(s: &str) -> Result<NaiveTime, ValidationError> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .map_err(|_| ValidationError::BadTimeFormat(s.to_string()))
}

/// Dates currently open for booking: `today + 0..horizon_days`.
pub fn available_dates(today: NaiveDate, horizon_days: u32) -> Vec<NaiveDate> {
    (0..horizon_days)
        .filter_map(|offset| today.checked_add_days(Days::new(u64::from(offset))))
        .collect()
}

/// End time of a slot starting at `start` and lasting `minutes`.
///
/// Returns `None` when the interval would wrap past midnight; callers treat
/// that the same as running past the working-hours end.
pub fn end_of(start: NaiveTime, minutes: u32) -> Option<NaiveTime> {
    let (end, wrapped) = start.overflowing_add_signed(Duration::minutes(i64::from(minutes)));
    if wrapped != 0 {
        None
    } else {
        Some(end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hours() -> WorkingHours {
        WorkingHours::parse("08:00", "20:00").unwrap()
    }

    #[test]
    fn grid_covers_hour_and_half_hour_marks() {
        let grid = hours().time_grid();
        // 08:00..19:30 on both marks, plus the bare closing hour.
        assert_eq!(grid.len(), 12 * 2 + 1);
        assert_eq!(grid.first().copied(), NaiveTime::from_hms_opt(8, 0, 0));
        assert!(grid.contains(&NaiveTime::from_hms_opt(13, 30, 0).unwrap()));
        assert_eq!(grid.last().copied(), NaiveTime::from_hms_opt(20, 0, 0));
        assert!(!grid.contains(&NaiveTime::from_hms_opt(20, 30, 0).unwrap()));
    }

    #[test]
    fn window_rejects_inverted_range() {
        let start = NaiveTime::from_hms_opt(20, 0, 0).unwrap();
        let end = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
        assert!(matches!(
            WorkingHours::new(start, end),
            Err(ValidationError::InvalidWorkingHours { .. })
        ));
    }

    #[test]
    fn contains_interval_is_half_open_and_bounded() {
        let h = hours();
        let t = |hh, mm| NaiveTime::from_hms_opt(hh, mm, 0).unwrap();
        assert!(h.contains_interval(t(8, 0), t(9, 0)));
        assert!(h.contains_interval(t(19, 0), t(20, 0)));
        assert!(!h.contains_interval(t(19, 30), t(20, 30)));
        assert!(!h.contains_interval(t(7, 30), t(8, 30)));
        assert!(!h.contains_interval(t(9, 0), t(9, 0)));
    }

    #[test]
    fn horizon_starts_today() {
        let today = NaiveDate::from_ymd_opt(2025, 10, 15).unwrap();
        let dates = available_dates(today, 14);
        assert_eq!(dates.len(), 14);
        assert_eq!(dates[0], today);
        assert_eq!(dates[13], NaiveDate::from_ymd_opt(2025, 10, 28).unwrap());
    }

    #[test]
    fn end_of_detects_midnight_wrap() {
        let t = |hh, mm| NaiveTime::from_hms_opt(hh, mm, 0).unwrap();
        assert_eq!(end_of(t(9, 0), 90), Some(t(10, 30)));
        assert_eq!(end_of(t(23, 30), 60), None);
        assert_eq!(end_of(t(23, 0), 60), None); // exactly midnight wraps too
    }

    #[test]
    fn parse_hhmm_rejects_garbage() {
        assert!(parse_hhmm("8 o'clock").is_err());
        assert_eq!(parse_hhmm("08:30").unwrap(), NaiveTime::from_hms_opt(8, 30, 0).unwrap());
    }
}
