// Hard caps on request shape and per-key growth.

/// Windows accepted in a single week write.
pub const MAX_SCHEDULE_ENTRIES: usize = 7 * 48;

/// Active bookings allowed under one (instructor, date) or (student, date)
/// key. Cancelled and finished rows do not count.
pub const MAX_BOOKINGS_PER_DAY: usize = 512;

/// Default bounded wait for the reservation critical section.
pub const DEFAULT_LOCK_WAIT_MS: u64 = 2_000;

pub const MAX_LOCK_WAIT_MS: u64 = 60_000;

/// Body size limit for the HTTP surface.
pub const MAX_BODY_BYTES: usize = 64 * 1024;
