//! End-to-end flows across the core: wizard, admission races, reminders.

use std::sync::Arc;
use std::thread;
use std::time::Duration as StdDuration;

use chrono::{Days, Local, NaiveDate, NaiveTime};

use meetroom_core::reminder::{Notifier, ReminderConfig, ReminderScheduler};
use meetroom_core::{
    BookingService, BookingStep, Config, Database, Reservation, SessionRegistry, StatsAggregator,
    WorkingHours,
};

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn tomorrow() -> NaiveDate {
    Local::now()
        .date_naive()
        .checked_add_days(Days::new(1))
        .unwrap()
}

#[derive(Default)]
struct CountingNotifier {
    delivered: std::sync::Mutex<Vec<i64>>,
}

impl Notifier for CountingNotifier {
    fn notify(
        &self,
        _requester_id: i64,
        reservation: &Reservation,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.delivered.lock().unwrap().push(reservation.id);
        Ok(())
    }
}

#[test]
fn wizard_to_reminder_round_trip() {
    let db = Database::open_memory().unwrap();
    let stats = StatsAggregator::new(db.clone());
    let service =
        BookingService::new(db.clone(), stats, SessionRegistry::new(), &Config::default())
            .unwrap();

    service.start_booking(1, "alice").unwrap();
    service.select_date(1, "alice", tomorrow()).unwrap();
    service.select_start_time(1, "alice", t(10, 0)).unwrap();
    let step = service.select_duration(1, "alice", 90).unwrap();
    let reservation = match step {
        BookingStep::Confirmed(r) => r,
        other => panic!("expected confirmation, got {other:?}"),
    };
    assert_eq!(reservation.end_time, t(11, 30));

    let notifier = Arc::new(CountingNotifier::default());
    let scheduler = ReminderScheduler::new(
        db,
        notifier.clone(),
        ReminderConfig {
            enabled: true,
            lookahead_min: 15,
            tick: StdDuration::from_secs(60),
        },
    );

    let before_window = tomorrow().and_time(t(9, 30));
    assert_eq!(scheduler.scan_once(before_window), 0);

    let in_window = tomorrow().and_time(t(9, 50));
    assert_eq!(scheduler.scan_once(in_window), 1);
    assert_eq!(*notifier.delivered.lock().unwrap(), vec![reservation.id]);

    // At most once: the same window yields nothing on a second pass.
    assert_eq!(scheduler.scan_once(in_window), 0);
}

#[test]
fn racing_admissions_admit_exactly_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(&dir.path().join("race.db")).unwrap();
    let hours = WorkingHours::parse("08:00", "20:00").unwrap();
    let date = NaiveDate::from_ymd_opt(2025, 10, 15).unwrap();

    let mut handles = Vec::new();
    for i in 0..8i64 {
        let db = db.clone();
        handles.push(thread::spawn(move || {
            db.admit(i, &format!("user-{i}"), date, t(9, 0), t(10, 0), &hours)
                .is_ok()
        }));
    }
    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);

    let ledger = db.all_reservations().unwrap();
    assert_eq!(ledger.len(), 1);
}

#[test]
fn racing_overlapping_mix_leaves_a_disjoint_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(&dir.path().join("mix.db")).unwrap();
    let hours = WorkingHours::parse("08:00", "20:00").unwrap();
    let date = NaiveDate::from_ymd_opt(2025, 10, 15).unwrap();

    // Staggered starts every 30 minutes, each one hour long: neighbors
    // overlap, every second one can coexist.
    let mut handles = Vec::new();
    for i in 0..10u32 {
        let db = db.clone();
        handles.push(thread::spawn(move || {
            let start = t(9, 0) + chrono::Duration::minutes(i64::from(i) * 30);
            let end = start + chrono::Duration::minutes(60);
            let _ = db.admit(i64::from(i), "racer", date, start, end, &hours);
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    let ledger = db.all_reservations().unwrap();
    assert!(!ledger.is_empty());
    for (i, a) in ledger.iter().enumerate() {
        for b in ledger.iter().skip(i + 1) {
            assert!(
                a.end_time <= b.start_time || b.end_time <= a.start_time,
                "{a:?} overlaps {b:?}"
            );
        }
    }
}
