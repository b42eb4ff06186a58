//! Fixed-granularity day bitmaps and their conversion to and from time windows.
//!
//! A day is cut into [`SLOTS_PER_DAY`] slots of [`SLOT_MINUTES`] minutes each.
//! Slot `i` covers `[i * SLOT_MINUTES, (i + 1) * SLOT_MINUTES)` minutes after
//! local midnight. Windows that do not sit on slot boundaries are widened to the
//! enclosing slots: every slot intersecting `[start, end)` is marked.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub const SLOT_MINUTES: u16 = 30;
pub const MINUTES_PER_DAY: u16 = 24 * 60;
pub const SLOTS_PER_DAY: usize = (MINUTES_PER_DAY / SLOT_MINUTES) as usize;
pub const BITMAP_BYTES: usize = SLOTS_PER_DAY.div_ceil(8);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BitmapError {
    #[error("invalid window {start}-{end}: end must be after start")]
    InvalidWindow { start: TimeOfDay, end: TimeOfDay },
    #[error("invalid time of day: {0:?}")]
    InvalidTime(String),
}

// ── TimeOfDay ────────────────────────────────────────────

/// Wall-clock minute offset from local midnight, `0..=1440`.
///
/// `1440` is the end-of-day boundary and renders as `24:00:00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub const MIDNIGHT: TimeOfDay = TimeOfDay(0);
    pub const END_OF_DAY: TimeOfDay = TimeOfDay(MINUTES_PER_DAY);

    pub fn from_minutes(minutes: u16) -> Option<Self> {
        (minutes <= MINUTES_PER_DAY).then_some(Self(minutes))
    }

    /// Panics on out-of-range input; meant for literals.
    pub fn hm(hour: u16, minute: u16) -> Self {
        assert!(minute < 60, "minute out of range");
        Self::from_minutes(hour * 60 + minute).expect("time of day out of range")
    }

    pub fn minutes(self) -> u16 {
        self.0
    }

    pub fn from_naive(time: NaiveTime) -> Self {
        Self((time.hour() * 60 + time.minute()) as u16)
    }

    /// `None` for the end-of-day boundary, which has no `NaiveTime`.
    pub fn to_naive(self) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(u32::from(self.0 / 60), u32::from(self.0 % 60), 0)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:00", self.0 / 60, self.0 % 60)
    }
}

impl FromStr for TimeOfDay {
    type Err = BitmapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "24:00" || s == "24:00:00" {
            return Ok(Self::END_OF_DAY);
        }
        let time = NaiveTime::parse_from_str(s, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
            .map_err(|_| BitmapError::InvalidTime(s.to_string()))?;
        if time.second() != 0 || time.nanosecond() != 0 {
            return Err(BitmapError::InvalidTime(s.to_string()));
        }
        Ok(Self::from_naive(time))
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ── TimeWindow ───────────────────────────────────────────

/// Half-open wall-clock window `[start, end)` within one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WindowFields")]
pub struct TimeWindow {
    #[serde(rename = "start_time")]
    pub start: TimeOfDay,
    #[serde(rename = "end_time")]
    pub end: TimeOfDay,
}

#[derive(Deserialize)]
struct WindowFields {
    start_time: TimeOfDay,
    end_time: TimeOfDay,
}

impl From<WindowFields> for TimeWindow {
    fn from(fields: WindowFields) -> Self {
        TimeWindow::new(fields.start_time, fields.end_time)
    }
}

impl TimeWindow {
    /// An end of `00:00` after a later start means midnight at the close of the
    /// same day, never the start of the next one.
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Self {
        let end = if end == TimeOfDay::MIDNIGHT && start > TimeOfDay::MIDNIGHT {
            TimeOfDay::END_OF_DAY
        } else {
            end
        };
        Self { start, end }
    }

    pub fn validate(&self) -> Result<(), BitmapError> {
        if self.end <= self.start {
            return Err(BitmapError::InvalidWindow {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Slots `[first, last)` intersecting this window.
    pub fn slot_range(&self) -> (usize, usize) {
        let first = usize::from(self.start.minutes() / SLOT_MINUTES);
        let last = usize::from(self.end.minutes().div_ceil(SLOT_MINUTES));
        (first.min(SLOTS_PER_DAY), last.min(SLOTS_PER_DAY))
    }
}

// ── DayBitmap ────────────────────────────────────────────

/// One day of availability, one bit per slot, slot 0 in the low bit of byte 0.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DayBitmap([u8; BITMAP_BYTES]);

impl DayBitmap {
    pub const EMPTY: DayBitmap = DayBitmap([0; BITMAP_BYTES]);

    /// Bits past the last slot are dropped, as are bytes past the fixed width.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut buf = [0u8; BITMAP_BYTES];
        let n = bytes.len().min(BITMAP_BYTES);
        buf[..n].copy_from_slice(&bytes[..n]);
        let tail_bits = SLOTS_PER_DAY % 8;
        if tail_bits != 0 {
            buf[BITMAP_BYTES - 1] &= (1u8 << tail_bits) - 1;
        }
        Self(buf)
    }

    pub fn as_bytes(&self) -> &[u8; BITMAP_BYTES] {
        &self.0
    }

    pub fn is_set(&self, slot: usize) -> bool {
        slot < SLOTS_PER_DAY && self.0[slot / 8] & (1u8 << (slot % 8)) != 0
    }

    pub fn set(&mut self, slot: usize) {
        assert!(slot < SLOTS_PER_DAY);
        self.0[slot / 8] |= 1u8 << (slot % 8);
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    pub fn count(&self) -> u32 {
        self.0.iter().map(|b| b.count_ones()).sum()
    }

    pub fn union(&self, other: &DayBitmap) -> DayBitmap {
        let mut out = *self;
        for (a, b) in out.0.iter_mut().zip(other.0.iter()) {
            *a |= *b;
        }
        out
    }

    /// True if every slot the window touches is available.
    pub fn covers(&self, window: &TimeWindow) -> bool {
        if window.validate().is_err() {
            return false;
        }
        let (first, last) = window.slot_range();
        (first..last).all(|slot| self.is_set(slot))
    }
}

impl fmt::Debug for DayBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DayBitmap(")?;
        for slot in 0..SLOTS_PER_DAY {
            f.write_str(if self.is_set(slot) { "1" } else { "0" })?;
        }
        f.write_str(")")
    }
}

// ── Codec ────────────────────────────────────────────────

pub fn encode(windows: &[TimeWindow]) -> Result<DayBitmap, BitmapError> {
    let mut bitmap = DayBitmap::EMPTY;
    for window in windows {
        window.validate()?;
        let (first, last) = window.slot_range();
        for slot in first..last {
            bitmap.set(slot);
        }
    }
    Ok(bitmap)
}

/// Maximal runs of set slots, ascending.
pub fn decode(bitmap: &DayBitmap) -> Vec<TimeWindow> {
    let mut windows = Vec::new();
    let mut run_start: Option<usize> = None;
    for slot in 0..=SLOTS_PER_DAY {
        let set = slot < SLOTS_PER_DAY && bitmap.is_set(slot);
        match (set, run_start) {
            (true, None) => run_start = Some(slot),
            (false, Some(first)) => {
                windows.push(TimeWindow {
                    start: slot_boundary(first),
                    end: slot_boundary(slot),
                });
                run_start = None;
            }
            _ => {}
        }
    }
    windows
}

fn slot_boundary(slot: usize) -> TimeOfDay {
    TimeOfDay(slot as u16 * SLOT_MINUTES)
}
