//! Settle detection for snapshot writes.
//!
//! A pure state machine over [`Instant`]: the watcher feeds it observed
//! mtimes and asks which keys are due. Nothing here sleeps or touches the
//! filesystem.

use std::{
  collections::BTreeMap,
  time::{Duration, Instant, SystemTime},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pending {
  deadline: Instant,
  mtime:    SystemTime,
}

#[derive(Debug)]
pub struct Debouncer<K> {
  cooldown: Duration,
  pending:  BTreeMap<K, Pending>,
}

impl<K: Ord + Clone> Debouncer<K> {
  pub fn new(cooldown: Duration) -> Self {
    Self { cooldown, pending: BTreeMap::new() }
  }

  /// Record an observed mtime. A new or changed mtime (re)starts the
  /// cooldown; seeing the same mtime again leaves the deadline alone.
  pub fn touch(&mut self, key: K, mtime: SystemTime, now: Instant) {
    let deadline = now + self.cooldown;
    self
      .pending
      .entry(key)
      .and_modify(|p| {
        if p.mtime != mtime {
          *p = Pending { deadline, mtime };
        }
      })
      .or_insert(Pending { deadline, mtime });
  }

  /// Schedule `key` for an explicit deadline, e.g. a retry after backoff.
  pub fn retry_at(&mut self, key: K, mtime: SystemTime, deadline: Instant) {
    self.pending.insert(key, Pending { deadline, mtime });
  }

  /// Remove and return every key whose deadline has passed, with the mtime
  /// it was scheduled for.
  pub fn due(&mut self, now: Instant) -> Vec<(K, SystemTime)> {
    let ready: Vec<K> = self
      .pending
      .iter()
      .filter(|(_, p)| p.deadline <= now)
      .map(|(k, _)| k.clone())
      .collect();
    ready
      .into_iter()
      .filter_map(|k| self.pending.remove(&k).map(|p| (k, p.mtime)))
      .collect()
  }

  pub fn is_pending(&self, key: &K) -> bool { self.pending.contains_key(key) }

  pub fn cancel(&mut self, key: &K) { self.pending.remove(key); }

  pub fn next_deadline(&self) -> Option<Instant> {
    self.pending.values().map(|p| p.deadline).min()
  }

  pub fn len(&self) -> usize { self.pending.len() }

  pub fn is_empty(&self) -> bool { self.pending.is_empty() }
}
