//! Time-windowed duplicate suppression.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// A queue of recently seen items where each item is forgotten once `timeout` has passed since it
/// was inserted.
///
/// Expired items aren't removed by a timer; they're dropped lazily whenever the queue is mutated
/// and ignored by read-only queries.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use bitbucket_snarfer::dedup::TimeoutQueue;
///
/// let mut seen = TimeoutQueue::new(Duration::from_secs(60));
/// assert!(seen.check_and_mark(42));
/// assert!(!seen.check_and_mark(42));
/// assert!(seen.check_and_mark(43));
/// ```
#[derive(Debug, Clone)]
pub struct TimeoutQueue<T> {
    /// How long an item is remembered.
    timeout: Duration,
    /// Items in insertion order, oldest first.
    entries: VecDeque<(T, Instant)>,
}

impl<T: PartialEq> TimeoutQueue<T> {
    /// Creates an empty queue that remembers items for `timeout`.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            entries: VecDeque::new(),
        }
    }

    /// Returns the duration items are remembered for.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Changes the duration items are remembered for. This applies to items already in the queue.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Records `item` and returns `true` if it hasn't been seen within the timeout. Returns `false`
    /// and leaves the queue untouched if it has.
    pub fn check_and_mark(&mut self, item: T) -> bool {
        self.check_and_mark_at(item, Instant::now())
    }

    fn check_and_mark_at(&mut self, item: T, now: Instant) -> bool {
        self.expire(now);

        if self.entries.iter().any(|(seen, _)| *seen == item) {
            return false;
        }

        self.entries.push_back((item, now));

        true
    }

    /// Returns whether `item` was seen within the timeout.
    #[must_use]
    pub fn contains(&self, item: &T) -> bool {
        let now = Instant::now();

        self.live(now).any(|seen| seen == item)
    }

    /// Returns the number of items seen within the timeout.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live(Instant::now()).count()
    }

    /// Returns `true` if no items were seen within the timeout.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets every item.
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    fn is_expired(&self, inserted_at: Instant, now: Instant) -> bool {
        now.saturating_duration_since(inserted_at) >= self.timeout
    }

    fn live(&self, now: Instant) -> impl Iterator<Item = &T> {
        self.entries
            .iter()
            .filter(move |(_, inserted_at)| !self.is_expired(*inserted_at, now))
            .map(|(item, _)| item)
    }

    /// Drops expired items from the front of the queue. Insertion times are monotonic, so the
    /// first live item ends the scan.
    fn expire(&mut self, now: Instant) {
        while let Some(&(_, inserted_at)) = self.entries.front() {
            if !self.is_expired(inserted_at, now) {
                break;
            }

            self.entries.pop_front();
        }
    }
}
