mod bookings;
mod conflict;
mod error;
mod locks;
mod mutations;
mod queries;
mod resolver;
mod store;
mod week;
#[cfg(test)]
mod tests;

pub use bookings::BookingStore;
pub use error::EngineError;
pub use locks::{KeyedLocks, LockKey, LockSet};
pub use mutations::ReservationRequest;
pub use resolver::{StaticTimezones, TimezoneSource, display_start, display_zone, resolve};
pub use store::{AvailabilityStore, DAYS_PER_WEEK, WeekState, day_index, week_dates, week_start_of};
pub use week::{ScheduleEntry, WeekView, WeekWrite, WritePrecondition, compute_etag, etag_matches};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::info;

use crate::limits::DEFAULT_LOCK_WAIT_MS;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    /// Start collecting every later append so a snapshot taken after this
    /// point can be completed when `Compact` arrives.
    BeginCompaction {
        response: oneshot::Sender<()>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
    #[cfg(test)]
    FailAppends {
        fail: bool,
        response: oneshot::Sender<()>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

struct WalWriter {
    wal: Wal,
    /// Appends committed since `BeginCompaction`.
    tail: Option<Vec<Event>>,
}

/// Owns the WAL. Takes one append, drains whatever else is already queued,
/// then pays for a single fsync and answers the whole batch.
async fn wal_writer_loop(wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    let mut writer = WalWriter { wal, tail: None };
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                writer.handle_non_append(other);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }
        writer.commit_batch(batch);
        if let Some(other) = deferred {
            writer.handle_non_append(other);
        }
    }
}

impl WalWriter {
    fn commit_batch(&mut self, batch: Vec<PendingAppend>) {
        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let started = std::time::Instant::now();

        let wal = &mut self.wal;
        let mut result = batch
            .iter()
            .try_for_each(|(event, _)| wal.append_buffered(event));
        // Flush even after a failed append so stray buffered bytes are not
        // carried into the next batch.
        let flushed = wal.flush_sync();
        if result.is_ok() {
            result = flushed;
        }
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(()) => {
                if let Some(tail) = self.tail.as_mut() {
                    tail.extend(batch.iter().map(|(event, _)| event.clone()));
                }
            }
            Err(e) => tracing::error!("WAL commit of {} events failed: {e}", batch.len()),
        }
        for (_, tx) in batch {
            let reply = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = tx.send(reply);
        }
    }

    fn handle_non_append(&mut self, cmd: WalCommand) {
        match cmd {
            WalCommand::BeginCompaction { response } => {
                self.tail = Some(Vec::new());
                let _ = response.send(());
            }
            WalCommand::Compact { mut events, response } => {
                events.extend(self.tail.take().unwrap_or_default());
                let result = Wal::write_compact_file(self.wal.path(), &events)
                    .and_then(|()| self.wal.swap_compact_file());
                let _ = response.send(result);
            }
            WalCommand::AppendsSinceCompact { response } => {
                let _ = response.send(self.wal.appends_since_compact());
            }
            #[cfg(test)]
            WalCommand::FailAppends { fail, response } => {
                self.wal.set_fail_appends(fail);
                let _ = response.send(());
            }
            WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
        }
    }
}

// ── Engine ───────────────────────────────────────────────

/// Knobs the engine takes from outside. Nothing here is process-global; each
/// engine (and each test) carries its own.
#[derive(Clone)]
pub struct EngineConfig {
    /// Bounded wait for the reservation critical section.
    pub lock_wait: Duration,
    /// Surfaced to clients for UX; not enforced.
    pub allow_past: bool,
    pub timezones: Arc<dyn TimezoneSource>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_wait: Duration::from_millis(DEFAULT_LOCK_WAIT_MS),
            allow_past: false,
            timezones: Arc::new(StaticTimezones::utc()),
        }
    }
}

pub struct Engine {
    pub(super) availability: AvailabilityStore,
    pub(super) bookings: BookingStore,
    pub(super) locks: KeyedLocks,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    pub(super) config: EngineConfig,
    /// Held shared by every WAL-append-then-apply, exclusively while a
    /// compaction marks its starting point.
    pub(super) commit_gate: RwLock<()>,
}

impl Engine {
    /// Replay the WAL at `wal_path` and start its writer task. Must run inside a
    /// tokio runtime.
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>, config: EngineConfig) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            availability: AvailabilityStore::new(),
            bookings: BookingStore::new(),
            locks: KeyedLocks::new(),
            wal_tx,
            notify,
            config,
            commit_gate: RwLock::new(()),
        };
        for event in &events {
            engine.replay_event(event);
        }
        info!(
            "replayed {} events from {}: {} weeks, {} bookings",
            events.len(),
            wal_path.display(),
            engine.availability.week_count(),
            engine.bookings.len()
        );
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn replay_event(&self, event: &Event) {
        match event {
            Event::WeekUpserted {
                instructor_id,
                week_start,
                version,
                updated_at,
                days,
            } => self
                .availability
                .restore(*instructor_id, *week_start, days, *version, *updated_at),
            other => self.apply_booking_event(other),
        }
    }

    /// Booking rows only; week events are applied under the week guard.
    fn apply_booking_event(&self, event: &Event) {
        match event {
            Event::BookingCreated { booking } => self.bookings.insert(booking.clone()),
            Event::BookingStatusChanged { id, status, .. } => {
                self.bookings.set_status(id, *status);
            }
            Event::WeekUpserted { .. } => {}
        }
    }

    /// Hand an event to the group-commit writer and wait until it is durable.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    #[cfg(test)]
    pub(super) async fn set_wal_failing(&self, fail: bool) {
        let (tx, rx) = oneshot::channel();
        if self.wal_tx.send(WalCommand::FailAppends { fail, response: tx }).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// WAL-append, apply, publish. A failed append changes nothing.
    pub(super) async fn persist_booking_event(&self, event: &Event) -> Result<(), EngineError> {
        let _gate = self.commit_gate.read().await;
        self.wal_append(event).await?;
        self.apply_booking_event(event);
        self.notify.send(event);
        Ok(())
    }
}
