use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Deserialize;
use tokio::sync::OwnedRwLockWriteGuard;
use tracing::{debug, info};

use crate::bitmap::{self, DayBitmap, TimeOfDay, TimeWindow};
use crate::limits::MAX_SCHEDULE_ENTRIES;
use crate::model::*;

use super::conflict::now_ms;
use super::store::{DAYS_PER_WEEK, WeekState, day_index, week_dates, week_start_of};
use super::{Engine, EngineError};

/// Concurrency token for one week: the version in clear plus a CRC32 over the
/// instructor, the Monday, all seven bitmaps and the version. Not a security
/// token.
pub fn compute_etag(
    instructor_id: InstructorId,
    week_start: NaiveDate,
    days: &[DayBitmap; DAYS_PER_WEEK],
    version: u64,
) -> String {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&instructor_id.to_bytes());
    hasher.update(week_start.to_string().as_bytes());
    for day in days {
        hasher.update(day.as_bytes());
    }
    hasher.update(&version.to_le_bytes());
    format!("{version}-{:08x}", hasher.finalize())
}

fn normalize_etag(token: &str) -> &str {
    let token = token.trim();
    let token = token.strip_prefix("W/").unwrap_or(token);
    token.trim_matches('"')
}

/// `If-Match` comparison. `*` matches any current version; a comma-separated
/// list matches if any member does.
pub fn etag_matches(expected: &str, current: &str) -> bool {
    let current = normalize_etag(current);
    expected
        .split(',')
        .map(normalize_etag)
        .any(|candidate| candidate == "*" || candidate == current)
}

/// A week as clients see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekView {
    pub instructor_id: InstructorId,
    pub week_start: NaiveDate,
    /// All seven dates, empty vectors included.
    pub days: BTreeMap<NaiveDate, Vec<TimeWindow>>,
    pub etag: String,
    pub version: u64,
    pub last_modified: Option<Ms>,
    pub allow_past: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ScheduleEntry {
    pub date: NaiveDate,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WritePrecondition {
    /// No `If-Match` sent: plain write.
    None,
    IfMatch(String),
    /// Write regardless of concurrent edits.
    Override,
}

#[derive(Debug, Clone)]
pub struct WeekWrite {
    pub week_start: NaiveDate,
    /// Replace listed days instead of merging into them.
    pub clear_existing: bool,
    pub schedule: Vec<ScheduleEntry>,
    pub precondition: WritePrecondition,
}

impl Engine {
    fn week_view(&self, instructor_id: InstructorId, week_start: NaiveDate, state: &WeekState) -> WeekView {
        let days = week_dates(week_start)
            .zip(state.days.iter())
            .map(|(date, bits)| (date, bitmap::decode(bits)))
            .collect();
        WeekView {
            instructor_id,
            week_start,
            days,
            etag: compute_etag(instructor_id, week_start, &state.days, state.version),
            version: state.version,
            last_modified: state.updated_at,
            allow_past: self.config.allow_past,
        }
    }

    /// Decoded week containing `start_date`, with its current ETag.
    pub async fn read_week(&self, instructor_id: InstructorId, start_date: NaiveDate) -> WeekView {
        let week_start = week_start_of(start_date);
        let state = self.availability.snapshot(instructor_id, week_start).await;
        self.week_view(instructor_id, week_start, &state)
    }

    /// Conditional week write. The precondition is evaluated and the upsert
    /// committed under one write lock on the week, so a stale token is reported
    /// immediately and can never race a concurrent writer.
    pub async fn write_week(
        &self,
        instructor_id: InstructorId,
        write: WeekWrite,
    ) -> Result<WeekView, EngineError> {
        let week_start = week_start_of(write.week_start);
        let encoded = encode_schedule(week_start, &write.schedule)?;

        let mut guard = self.availability.lock_week(instructor_id, week_start).await;
        match &write.precondition {
            WritePrecondition::IfMatch(expected) => {
                let current = compute_etag(instructor_id, week_start, &guard.days, guard.version);
                if !etag_matches(expected, &current) {
                    debug!(%instructor_id, %week_start, expected = %expected, %current, "week write rejected: version conflict");
                    metrics::counter!(crate::observability::WEEK_WRITES_TOTAL, "outcome" => "conflict")
                        .increment(1);
                    return Err(EngineError::VersionConflict { current_etag: current });
                }
            }
            WritePrecondition::Override => {
                info!(%instructor_id, %week_start, "week write with override; concurrent edits discarded");
            }
            WritePrecondition::None => {}
        }

        let days: Vec<(NaiveDate, DayBitmap)> = encoded
            .into_iter()
            .map(|(date, bits)| {
                if write.clear_existing {
                    (date, bits)
                } else {
                    (date, guard.day(week_start, date).union(&bits))
                }
            })
            .collect();
        self.commit_week(instructor_id, week_start, &mut guard, days).await?;
        metrics::counter!(crate::observability::WEEK_WRITES_TOTAL, "outcome" => "ok").increment(1);

        Ok(self.week_view(instructor_id, week_start, &guard))
    }

    /// Replace the listed days of one week; unlisted days keep their bits.
    /// Every call advances the version, identical content or not.
    pub async fn upsert_week(
        &self,
        instructor_id: InstructorId,
        week_start: NaiveDate,
        days: Vec<(NaiveDate, DayBitmap)>,
    ) -> Result<u64, EngineError> {
        let week_start = week_start_of(week_start);
        for (date, _) in &days {
            if day_index(week_start, *date).is_none() {
                return Err(EngineError::DateOutsideWeek { date: *date, week_start });
            }
        }
        let mut guard = self.availability.lock_week(instructor_id, week_start).await;
        self.commit_week(instructor_id, week_start, &mut guard, days).await
    }

    async fn commit_week(
        &self,
        instructor_id: InstructorId,
        week_start: NaiveDate,
        guard: &mut OwnedRwLockWriteGuard<WeekState>,
        days: Vec<(NaiveDate, DayBitmap)>,
    ) -> Result<u64, EngineError> {
        let version = guard.version + 1;
        let updated_at = now_ms();
        let event = Event::WeekUpserted {
            instructor_id,
            week_start,
            version,
            updated_at,
            days,
        };
        {
            let _gate = self.commit_gate.read().await;
            self.wal_append(&event).await?;
            if let Event::WeekUpserted { days, .. } = &event {
                guard.apply(week_start, days, version, updated_at);
            }
        }
        self.notify.send(&event);
        info!(%instructor_id, %week_start, version, "week availability updated");
        Ok(version)
    }
}

/// Group entries by date and encode each day. Nothing is locked yet, so a bad
/// entry costs no one else anything.
fn encode_schedule(
    week_start: NaiveDate,
    schedule: &[ScheduleEntry],
) -> Result<Vec<(NaiveDate, DayBitmap)>, EngineError> {
    if schedule.len() > MAX_SCHEDULE_ENTRIES {
        return Err(EngineError::LimitExceeded("too many schedule entries"));
    }
    let mut per_day: BTreeMap<NaiveDate, Vec<TimeWindow>> = BTreeMap::new();
    for entry in schedule {
        if day_index(week_start, entry.date).is_none() {
            return Err(EngineError::DateOutsideWeek {
                date: entry.date,
                week_start,
            });
        }
        per_day
            .entry(entry.date)
            .or_default()
            .push(TimeWindow::new(entry.start_time, entry.end_time));
    }
    per_day
        .into_iter()
        .map(|(date, windows)| -> Result<_, EngineError> {
            Ok((date, bitmap::encode(&windows)?))
        })
        .collect()
}
