//! Background reminder delivery.
//!
//! A single periodic task polls the ledger for reservations entering the
//! lookahead window and pushes each one through the transport-supplied
//! [`Notifier`]. A reservation is marked reminded only after a delivery
//! attempt succeeds, so a failed delivery is retried naturally on a later
//! tick and `mark_reminded` is the exactly-once gate even if ticks ever
//! overlap. One failed delivery never blocks the rest of the batch.
//!
//! The loop is stopped through an mpsc channel and exits between
//! iterations; since the only mutation is the idempotent reminded flag,
//! abrupt shutdown is always safe.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::storage::{Database, Reservation};

/// Transport-supplied delivery callback.
///
/// Implementations send "your slot starts soon" to the requester over
/// whatever channel the embedding application speaks.
pub trait Notifier: Send + Sync {
    /// Deliver a reminder for one reservation.
    fn notify(
        &self,
        requester_id: i64,
        reservation: &Reservation,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Scheduler knobs, typically derived from
/// [`RemindersConfig`](crate::storage::RemindersConfig).
#[derive(Debug, Clone, Copy)]
pub struct ReminderConfig {
    pub enabled: bool,
    pub lookahead_min: u32,
    pub tick: Duration,
}

impl From<&crate::storage::RemindersConfig> for ReminderConfig {
    fn from(cfg: &crate::storage::RemindersConfig) -> Self {
        Self {
            enabled: cfg.enabled,
            lookahead_min: cfg.lookahead_min,
            tick: Duration::from_secs(cfg.tick_secs),
        }
    }
}

/// The periodic reminder task.
pub struct ReminderScheduler {
    db: Database,
    notifier: Arc<dyn Notifier>,
    config: ReminderConfig,
}

impl ReminderScheduler {
    pub fn new(db: Database, notifier: Arc<dyn Notifier>, config: ReminderConfig) -> Self {
        Self {
            db,
            notifier,
            config,
        }
    }

    /// One polling pass at the given instant. Returns how many reminders
    /// were delivered and marked.
    ///
    /// Split out from the loop so tests can drive it with simulated
    /// clocks.
    pub fn scan_once(&self, now: NaiveDateTime) -> usize {
        if !self.config.enabled {
            return 0;
        }

        let due = match self.db.due_for_reminder(now, self.config.lookahead_min) {
            Ok(due) => due,
            Err(e) => {
                warn!(error = %e, "reminder scan failed");
                return 0;
            }
        };

        let mut delivered = 0;
        for reservation in &due {
            match self.notifier.notify(reservation.requester_id, reservation) {
                Ok(()) => {
                    if let Err(e) = self.db.mark_reminded(reservation.id) {
                        // Not marked: the next tick retries the delivery.
                        warn!(error = %e, reservation = reservation.id, "failed to mark reminded");
                    } else {
                        debug!(
                            reservation = reservation.id,
                            requester = reservation.requester_id,
                            "reminder delivered"
                        );
                        delivered += 1;
                    }
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        reservation = reservation.id,
                        requester = reservation.requester_id,
                        "reminder delivery failed; will retry next tick"
                    );
                }
            }
        }
        delivered
    }

    /// Run until a stop signal arrives on `shutdown`.
    ///
    /// The first tick fires immediately; the loop exits after completing
    /// the current iteration, never mid-scan.
    pub async fn run(self, mut shutdown: mpsc::Receiver<()>) {
        info!(
            enabled = self.config.enabled,
            lookahead_min = self.config.lookahead_min,
            tick_secs = self.config.tick.as_secs(),
            "reminder scheduler starting"
        );
        let mut interval = tokio::time::interval(self.config.tick);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.scan_once(Local::now().naive_local());
                }
                _ = shutdown.recv() => {
                    info!("reminder scheduler stopping");
                    break;
                }
            }
        }
    }

    /// Spawn the loop onto the current tokio runtime. Dropping or sending
    /// on the returned sender stops it.
    pub fn spawn(self) -> (JoinHandle<()>, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel(1);
        let handle = tokio::spawn(self.run(rx));
        (handle, tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use chrono::{NaiveDate, NaiveTime};

    use crate::slots::WorkingHours;

    /// Records deliveries; fails those whose requester id is listed.
    #[derive(Default)]
    struct RecordingNotifier {
        delivered: Mutex<Vec<i64>>,
        fail_for: Vec<i64>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(
            &self,
            requester_id: i64,
            _reservation: &Reservation,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            if self.fail_for.contains(&requester_id) {
                return Err("transport unavailable".into());
            }
            self.delivered
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(requester_id);
            Ok(())
        }
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn config() -> ReminderConfig {
        ReminderConfig {
            enabled: true,
            lookahead_min: 15,
            tick: Duration::from_secs(60),
        }
    }

    fn seeded_db() -> Database {
        let db = Database::open_memory().unwrap();
        let hours = WorkingHours::parse("08:00", "20:00").unwrap();
        db.admit(1, "alice", d(2025, 10, 15), t(10, 0), t(11, 0), &hours)
            .unwrap();
        db.admit(2, "bob", d(2025, 10, 15), t(11, 0), t(12, 0), &hours)
            .unwrap();
        db
    }

    #[test]
    fn delivers_once_per_reservation() {
        let db = seeded_db();
        let notifier = Arc::new(RecordingNotifier::default());
        let scheduler = ReminderScheduler::new(db, notifier.clone(), config());

        let now = d(2025, 10, 15).and_time(t(9, 50));
        assert_eq!(scheduler.scan_once(now), 1);
        // Same instant again: already marked, nothing to do.
        assert_eq!(scheduler.scan_once(now), 0);
        assert_eq!(*notifier.delivered.lock().unwrap(), vec![1]);
    }

    #[test]
    fn failed_delivery_is_retried_and_does_not_block_the_batch() {
        let db = seeded_db();
        let hours = WorkingHours::parse("08:00", "20:00").unwrap();
        db.admit(3, "carol", d(2025, 10, 15), t(10, 0), t(10, 30), &hours)
            .unwrap_err(); // taken by alice
        db.admit(3, "carol", d(2025, 10, 15), t(9, 55), t(10, 0), &hours)
            .unwrap();

        let notifier = Arc::new(RecordingNotifier {
            delivered: Mutex::new(Vec::new()),
            fail_for: vec![3],
        });
        let scheduler = ReminderScheduler::new(db, notifier.clone(), config());

        let now = d(2025, 10, 15).and_time(t(9, 50));
        // carol's delivery fails but alice's still goes out.
        assert_eq!(scheduler.scan_once(now), 1);
        assert_eq!(*notifier.delivered.lock().unwrap(), vec![1]);

        // carol is retried on the next tick once the transport recovers.
        let recovered = Arc::new(RecordingNotifier::default());
        let scheduler = ReminderScheduler::new(scheduler.db.clone(), recovered.clone(), config());
        assert_eq!(scheduler.scan_once(now), 1);
        assert_eq!(*recovered.delivered.lock().unwrap(), vec![3]);
    }

    #[test]
    fn disabled_scheduler_skips_the_tick() {
        let db = seeded_db();
        let notifier = Arc::new(RecordingNotifier::default());
        let mut cfg = config();
        cfg.enabled = false;
        let scheduler = ReminderScheduler::new(db, notifier.clone(), cfg);

        let now = d(2025, 10, 15).and_time(t(9, 50));
        assert_eq!(scheduler.scan_once(now), 0);
        assert!(notifier.delivered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn run_stops_on_shutdown_signal() {
        let db = Database::open_memory().unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let scheduler = ReminderScheduler::new(db, notifier, config());

        let (handle, stop) = scheduler.spawn();
        stop.send(()).await.unwrap();
        handle.await.unwrap();
    }
}
