use std::sync::Arc;

use chrono::{Datelike, Days, NaiveDate};
use dashmap::DashMap;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

use crate::bitmap::DayBitmap;
use crate::model::{InstructorId, Ms};

pub const DAYS_PER_WEEK: usize = 7;

/// Monday on or before `date`.
pub fn week_start_of(date: NaiveDate) -> NaiveDate {
    let offset = u64::from(date.weekday().num_days_from_monday());
    date.checked_sub_days(Days::new(offset)).unwrap_or(date)
}

/// Position of `date` inside the week beginning at `week_start`.
pub fn day_index(week_start: NaiveDate, date: NaiveDate) -> Option<usize> {
    let offset = date.signed_duration_since(week_start).num_days();
    (0..DAYS_PER_WEEK as i64).contains(&offset).then_some(offset as usize)
}

pub fn week_dates(week_start: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    week_start.iter_days().take(DAYS_PER_WEEK)
}

/// Seven day bitmaps plus the version that every upsert advances.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeekState {
    pub days: [DayBitmap; DAYS_PER_WEEK],
    pub version: u64,
    pub updated_at: Option<Ms>,
}

impl WeekState {
    pub fn day(&self, week_start: NaiveDate, date: NaiveDate) -> DayBitmap {
        day_index(week_start, date)
            .map(|i| self.days[i])
            .unwrap_or(DayBitmap::EMPTY)
    }

    /// Replace the listed days and adopt `version`. Days outside the week were
    /// rejected before the event was written and are skipped here.
    pub fn apply(
        &mut self,
        week_start: NaiveDate,
        days: &[(NaiveDate, DayBitmap)],
        version: u64,
        updated_at: Ms,
    ) {
        for (date, bitmap) in days {
            if let Some(i) = day_index(week_start, *date) {
                self.days[i] = *bitmap;
            }
        }
        self.version = version;
        self.updated_at = Some(updated_at);
    }
}

pub type SharedWeekState = Arc<RwLock<WeekState>>;

/// One `WeekState` per (instructor, Monday). A week nobody has written reads as
/// all-zero at version 0 and is not materialised.
pub struct AvailabilityStore {
    weeks: DashMap<(InstructorId, NaiveDate), SharedWeekState>,
}

impl Default for AvailabilityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AvailabilityStore {
    pub fn new() -> Self {
        Self {
            weeks: DashMap::new(),
        }
    }

    fn existing(&self, instructor_id: InstructorId, week_start: NaiveDate) -> Option<SharedWeekState> {
        self.weeks
            .get(&(instructor_id, week_start))
            .map(|e| e.value().clone())
    }

    pub async fn get_day(&self, instructor_id: InstructorId, date: NaiveDate) -> DayBitmap {
        let week_start = week_start_of(date);
        match self.existing(instructor_id, week_start) {
            Some(week) => week.read().await.day(week_start, date),
            None => DayBitmap::EMPTY,
        }
    }

    pub async fn get_week(
        &self,
        instructor_id: InstructorId,
        week_start: NaiveDate,
    ) -> [DayBitmap; DAYS_PER_WEEK] {
        self.snapshot(instructor_id, week_start).await.days
    }

    /// Days and version read under one lock.
    pub async fn snapshot(&self, instructor_id: InstructorId, week_start: NaiveDate) -> WeekState {
        match self.existing(instructor_id, week_start) {
            Some(week) => week.read().await.clone(),
            None => WeekState::default(),
        }
    }

    /// Exclusive access to a week for a check-then-write. Readers wait until the
    /// guard drops, so they see either none or all of an upsert.
    pub async fn lock_week(
        &self,
        instructor_id: InstructorId,
        week_start: NaiveDate,
    ) -> OwnedRwLockWriteGuard<WeekState> {
        let week = self
            .weeks
            .entry((instructor_id, week_start))
            .or_default()
            .value()
            .clone();
        week.write_owned().await
    }

    /// Replay path: the engine owns every Arc, so the lock is uncontended.
    pub(super) fn restore(
        &self,
        instructor_id: InstructorId,
        week_start: NaiveDate,
        days: &[(NaiveDate, DayBitmap)],
        version: u64,
        updated_at: Ms,
    ) {
        let week = self
            .weeks
            .entry((instructor_id, week_start))
            .or_default()
            .value()
            .clone();
        let mut guard = week.try_write().expect("replay: uncontended write");
        guard.apply(week_start, days, version, updated_at);
    }

    /// Materialised weeks, for compaction.
    pub(super) async fn all_weeks(&self) -> Vec<(InstructorId, NaiveDate, WeekState)> {
        let handles: Vec<_> = self
            .weeks
            .iter()
            .map(|e| (e.key().0, e.key().1, e.value().clone()))
            .collect();
        let mut out = Vec::with_capacity(handles.len());
        for (instructor_id, week_start, week) in handles {
            let state = week.read().await.clone();
            if state.version > 0 {
                out.push((instructor_id, week_start, state));
            }
        }
        out
    }

    pub fn week_count(&self) -> usize {
        self.weeks.len()
    }
}
