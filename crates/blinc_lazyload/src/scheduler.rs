//! Visibility scheduling primitives
//!
//! - [`Throttle`] - rate limits viewport signals, coalescing bursts into a
//!   single deferred tick
//! - [`CandidateSet`] - ordered, duplicate-free set of elements awaiting
//!   activation
//! - [`is_within_region`] - the containment test deciding visibility
//!
//! The tick itself lives on [`LazyLoad`](crate::LazyLoad), which owns one of
//! each and wires them to the environment.

use std::hash::Hash;
use std::time::Duration;

use rustc_hash::FxHashSet;

use crate::environment::TimerId;
use crate::geometry::Rect;

// ============================================================================
// Throttle
// ============================================================================

/// What to do with an incoming viewport signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// Tick now. A stale deferred tick, if any, must be cancelled first.
    RunNow { cancel: Option<TimerId> },
    /// Schedule one deferred tick after the given wait
    Defer(Duration),
    /// A deferred tick is already scheduled; drop the signal
    Coalesce,
}

/// Tick timing state
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last_tick: Option<Duration>,
    deferred: Option<TimerId>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_tick: None,
            deferred: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Time of the last signal-driven tick
    pub fn last_tick(&self) -> Option<Duration> {
        self.last_tick
    }

    /// Handle of the scheduled deferred tick
    pub fn deferred(&self) -> Option<TimerId> {
        self.deferred
    }

    /// Decide how to handle a signal arriving at `now`
    ///
    /// A zero interval disables throttling entirely. A clock reading earlier
    /// than the last tick counts as ready.
    pub fn on_signal(&mut self, now: Duration) -> ThrottleDecision {
        if self.interval.is_zero() {
            return ThrottleDecision::RunNow { cancel: None };
        }

        let wait = self
            .last_tick
            .and_then(|last| now.checked_sub(last))
            .map_or(Duration::ZERO, |elapsed| {
                self.interval.saturating_sub(elapsed)
            });

        if wait.is_zero() {
            self.last_tick = Some(now);
            ThrottleDecision::RunNow {
                cancel: self.deferred.take(),
            }
        } else if self.deferred.is_some() {
            ThrottleDecision::Coalesce
        } else {
            ThrottleDecision::Defer(wait)
        }
    }

    /// Record the timer backing a [`ThrottleDecision::Defer`]
    pub fn set_deferred(&mut self, timer: TimerId) {
        self.deferred = Some(timer);
    }

    /// The deferred tick fired at `now`
    pub fn deferred_fired(&mut self, now: Duration) {
        self.last_tick = Some(now);
        self.deferred = None;
    }

    /// Forget the deferred tick, returning its handle for cancellation
    pub fn take_deferred(&mut self) -> Option<TimerId> {
        self.deferred.take()
    }
}

// ============================================================================
// Candidate Set
// ============================================================================

/// Ordered collection of elements awaiting activation
///
/// Each element appears at most once; insertion order is discovery order.
#[derive(Debug, Clone)]
pub struct CandidateSet<E> {
    items: Vec<E>,
}

impl<E> Default for CandidateSet<E> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<E: Clone + Eq + Hash> CandidateSet<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents, dropping duplicates after their first occurrence
    pub fn replace(&mut self, elements: impl IntoIterator<Item = E>) {
        let mut seen = FxHashSet::default();
        self.items.clear();
        for element in elements {
            if seen.insert(element.clone()) {
                self.items.push(element);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, element: &E) -> bool {
        self.items.contains(element)
    }

    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.items.iter()
    }

    /// Copy of the current contents, in order
    pub fn snapshot(&self) -> Vec<E> {
        self.items.clone()
    }

    /// Remove every element of `removed`, last position first
    ///
    /// Returns the set size after each individual removal. Elements no longer
    /// present are skipped.
    pub fn remove_batch(&mut self, removed: &[E]) -> Vec<usize> {
        let mut indices: Vec<usize> = removed
            .iter()
            .filter_map(|element| self.items.iter().position(|e| e == element))
            .collect();
        indices.sort_unstable();
        indices.dedup();

        let mut remaining = Vec::with_capacity(indices.len());
        while let Some(index) = indices.pop() {
            self.items.remove(index);
            remaining.push(self.items.len());
        }
        remaining
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

// ============================================================================
// Visibility
// ============================================================================

/// Whether `bounds` lies entirely inside `region` grown by `threshold` pixels
pub fn is_within_region(bounds: &Rect, region: &Rect, threshold: f32) -> bool {
    region.inflate(threshold).contains_rect(bounds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use slotmap::SlotMap;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn timer() -> TimerId {
        let mut timers: SlotMap<TimerId, ()> = SlotMap::with_key();
        timers.insert(())
    }

    #[test]
    fn test_first_signal_runs_immediately() {
        let mut t = Throttle::new(ms(150));
        assert_eq!(t.on_signal(ms(0)), ThrottleDecision::RunNow { cancel: None });
        assert_eq!(t.last_tick(), Some(ms(0)));
    }

    #[test]
    fn test_signal_inside_window_defers_remaining_time() {
        let mut t = Throttle::new(ms(150));
        t.on_signal(ms(1000));
        assert_eq!(t.on_signal(ms(1040)), ThrottleDecision::Defer(ms(110)));

        t.set_deferred(timer());
        assert_eq!(t.on_signal(ms(1080)), ThrottleDecision::Coalesce);
        assert_eq!(t.on_signal(ms(1149)), ThrottleDecision::Coalesce);
    }

    #[test]
    fn test_deferred_fire_updates_timestamp() {
        let mut t = Throttle::new(ms(150));
        t.on_signal(ms(1000));
        t.on_signal(ms(1040));
        t.set_deferred(timer());

        t.deferred_fired(ms(1150));
        assert_eq!(t.last_tick(), Some(ms(1150)));
        assert_eq!(t.deferred(), None);
        assert_eq!(t.on_signal(ms(1200)), ThrottleDecision::Defer(ms(100)));
    }

    #[test]
    fn test_ready_signal_cancels_stale_deferred() {
        let mut t = Throttle::new(ms(150));
        t.on_signal(ms(1000));
        t.on_signal(ms(1010));
        let id = timer();
        t.set_deferred(id);

        assert_eq!(
            t.on_signal(ms(1200)),
            ThrottleDecision::RunNow { cancel: Some(id) }
        );
        assert_eq!(t.deferred(), None);
    }

    #[test]
    fn test_clock_going_backwards_is_ready() {
        let mut t = Throttle::new(ms(150));
        t.on_signal(ms(1000));
        assert_eq!(t.on_signal(ms(500)), ThrottleDecision::RunNow { cancel: None });
        assert_eq!(t.last_tick(), Some(ms(500)));
    }

    #[test]
    fn test_zero_interval_never_defers() {
        let mut t = Throttle::new(Duration::ZERO);
        for now in [0, 0, 1, 1, 2] {
            assert_eq!(t.on_signal(ms(now)), ThrottleDecision::RunNow { cancel: None });
        }
    }

    #[test]
    fn test_candidate_set_dedups_in_order() {
        let mut set = CandidateSet::new();
        set.replace([3, 1, 3, 2, 1]);
        assert_eq!(set.snapshot(), vec![3, 1, 2]);
        assert!(set.contains(&2));
        assert!(!set.contains(&4));
    }

    #[test]
    fn test_remove_batch_reports_shrinking_sizes() {
        let mut set = CandidateSet::new();
        set.replace([10, 20, 30, 40, 50]);

        let remaining = set.remove_batch(&[20, 40, 99]);
        assert_eq!(remaining, vec![4, 3]);
        assert_eq!(set.snapshot(), vec![10, 30, 50]);
    }

    #[test]
    fn test_region_threshold() {
        let region = Rect::new(0.0, 0.0, 800.0, 600.0);
        let below = Rect::new(0.0, 650.0, 100.0, 100.0);
        assert!(!is_within_region(&below, &region, 0.0));
        assert!(is_within_region(&below, &region, 150.0));
        assert!(is_within_region(&Rect::new(0.0, 0.0, 800.0, 600.0), &region, 0.0));
    }

    proptest! {
        #[test]
        fn prop_burst_within_window_schedules_once(
            offsets in proptest::collection::vec(1u64..150, 1..20)
        ) {
            let mut t = Throttle::new(ms(150));
            let start = ms(10_000);
            prop_assert_eq!(t.on_signal(start), ThrottleDecision::RunNow { cancel: None });

            let mut offsets = offsets;
            offsets.sort_unstable();

            let mut deferred = 0;
            for (i, offset) in offsets.iter().enumerate() {
                match t.on_signal(start + ms(*offset)) {
                    ThrottleDecision::Defer(wait) => {
                        prop_assert_eq!(i, 0);
                        prop_assert_eq!(wait, ms(150 - offsets[0]));
                        t.set_deferred(timer());
                        deferred += 1;
                    }
                    ThrottleDecision::Coalesce => {}
                    other => prop_assert!(false, "unexpected {:?}", other),
                }
            }
            prop_assert_eq!(deferred, 1);
        }

        #[test]
        fn prop_remove_batch_partitions(
            len in 0usize..30,
            picks in proptest::collection::vec(any::<bool>(), 30)
        ) {
            let elements: Vec<usize> = (0..len).collect();
            let removed: Vec<usize> =
                elements.iter().copied().filter(|e| picks[*e]).collect();

            let mut set = CandidateSet::new();
            set.replace(elements.clone());
            let sizes = set.remove_batch(&removed);

            prop_assert_eq!(sizes.len(), removed.len());
            for e in &elements {
                prop_assert_eq!(set.contains(e), !removed.contains(e));
            }
            prop_assert_eq!(set.len(), len - removed.len());
        }
    }
}
