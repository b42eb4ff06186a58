use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;

use crate::model::{BookingId, InstructorId, StudentId};

use super::EngineError;

/// Serialization scope. The derived `Ord` is the global acquisition order:
/// instructor keys, then student keys, then single bookings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockKey {
    Instructor(InstructorId, NaiveDate),
    Student(StudentId, NaiveDate),
    Booking(BookingId),
}

/// Keyed mutex manager. Keys that never collide never wait on each other.
pub struct KeyedLocks {
    slots: DashMap<LockKey, Arc<Mutex<()>>>,
}

/// Held keys. Dropping releases all of them and prunes idle slots.
pub struct LockSet<'a> {
    locks: &'a KeyedLocks,
    guards: Vec<(LockKey, OwnedMutexGuard<()>)>,
}

impl Default for KeyedLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// Lock every key in global order, giving up with `Busy` once `wait` has
    /// elapsed. Keys taken before the timeout are released on the way out.
    pub async fn acquire_all(
        &self,
        keys: &[LockKey],
        wait: Duration,
    ) -> Result<LockSet<'_>, EngineError> {
        let mut keys = keys.to_vec();
        keys.sort();
        keys.dedup();

        let deadline = Instant::now() + wait;
        let mut set = LockSet {
            locks: self,
            guards: Vec::with_capacity(keys.len()),
        };
        for key in keys {
            let slot = self.slots.entry(key).or_default().value().clone();
            let acquired = tokio::time::timeout_at(deadline, slot.lock_owned()).await;
            match acquired {
                Ok(guard) => set.guards.push((key, guard)),
                Err(_) => {
                    self.prune(&key);
                    return Err(EngineError::Busy);
                }
            }
        }
        Ok(set)
    }

    fn prune(&self, key: &LockKey) {
        // The map's own Arc is the last one: nobody holds or waits on it.
        self.slots.remove_if(key, |_, slot| Arc::strong_count(slot) == 1);
    }

    pub fn live_keys(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
impl LockSet<'_> {
    fn keys(&self) -> impl Iterator<Item = &LockKey> {
        self.guards.iter().map(|(k, _)| k)
    }
}

impl Drop for LockSet<'_> {
    fn drop(&mut self) {
        for (key, guard) in self.guards.drain(..).rev() {
            drop(guard);
            self.locks.prune(&key);
        }
    }
}
