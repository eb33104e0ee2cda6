//! One-shot deadlines owned by a room.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::trace;

/// A deadline that fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expired<K> {
    pub key: K,
    /// The value [`DeadlineTimers::arm`] returned for this deadline.
    pub generation: u64,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    deadline: Instant,
    generation: u64,
}

/// A keyed set of one-shot deadlines.
///
/// At most one deadline exists per key: arming an armed key replaces its
/// deadline. [`next_expired`](Self::next_expired) is cancel-safe; if it
/// loses a `select!` race nothing is consumed.
pub struct DeadlineTimers<K> {
    entries: HashMap<K, Entry>,
    next_generation: u64,
}

impl<K> DeadlineTimers<K>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next_generation: 1,
        }
    }

    /// Arms `key` to fire `after` from now. Returns the new generation.
    pub fn arm(&mut self, key: K, after: Duration) -> u64 {
        self.arm_at(key, Instant::now() + after)
    }

    pub fn arm_at(&mut self, key: K, deadline: Instant) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        trace!(?key, generation, "timer armed");
        self.entries.insert(key, Entry { deadline, generation });
        generation
    }

    /// Returns `true` if the key was armed.
    pub fn cancel(&mut self, key: &K) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            trace!(?key, "timer cancelled");
        }
        removed
    }

    pub fn is_armed(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn deadline(&self, key: &K) -> Option<Instant> {
        self.entries.get(key).map(|e| e.deadline)
    }

    /// Time left before `key` fires, saturating at zero.
    pub fn remaining(&self, key: &K) -> Option<Duration> {
        self.deadline(key)
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Waits for the earliest deadline, disarms it and returns it.
    /// Pends forever while nothing is armed.
    ///
    /// Deadlines due at the same instant fire in arming order.
    pub async fn next_expired(&mut self) -> Expired<K> {
        let earliest = self
            .entries
            .iter()
            .min_by_key(|(_, e)| (e.deadline, e.generation))
            .map(|(k, e)| (k.clone(), *e));
        let Some((key, entry)) = earliest else {
            return std::future::pending().await;
        };

        time::sleep_until(entry.deadline).await;

        self.entries.remove(&key);
        trace!(?key, generation = entry.generation, "timer fired");
        Expired {
            key,
            generation: entry.generation,
        }
    }
}

impl<K> Default for DeadlineTimers<K>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    fn default() -> Self {
        Self::new()
    }
}
