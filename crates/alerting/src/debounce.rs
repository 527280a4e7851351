//! Debounce Engine
//!
//! Keeps a waiting registry of keys whose observation currently differs from
//! what was last notified, together with the instant each one started to
//! differ. A notification is due once the *oldest* waiting key has waited for
//! the whole delay window; every key waiting at that moment is reported in
//! the same batch, and the registry starts over.
//!
//! ```text
//!   register_abnormal(set)          should_notify(oldest)
//!   ──────────────────────►  oldest  ─────────────────────►  Decision
//!   + new keys stamped now            None         -> (false, reset)
//!   - keys that reverted              waited >= d  -> (notify, reset)
//!                                     otherwise    -> (false, keep)
//! ```
//!
//! When a cycle only observes part of the keys (a failed batch), waiting
//! keys outside the observed set keep their clock: missing data is not a
//! recovery.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Outcome of [`DebounceEngine::should_notify`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// The changes have persisted long enough and must be notified now
    pub notify: bool,
    /// The waiting registry must be cleared before the next cycle
    pub should_reset: bool,
}

impl Decision {
    const IDLE: Self = Self {
        notify: false,
        should_reset: true,
    };
    const WAIT: Self = Self {
        notify: false,
        should_reset: false,
    };
    const NOTIFY: Self = Self {
        notify: true,
        should_reset: true,
    };
}

/// Hysteresis tracker over keys of type `K`
#[derive(Debug)]
pub struct DebounceEngine<K> {
    /// Name used in logs (e.g. "status")
    name: &'static str,
    /// Minimum continuous time before notifying
    delay: Duration,
    /// Keys waiting to be notified, with the instant they started waiting
    waiting: BTreeMap<K, Instant>,
}

impl<K: Ord + Clone + Display> DebounceEngine<K> {
    /// Create a new engine with the given delay window
    pub fn new(name: &'static str, delay: Duration) -> Self {
        debug!("Creating {} debounce engine with a {:?} window", name, delay);
        Self {
            name,
            delay,
            waiting: BTreeMap::new(),
        }
    }

    /// Whether a key is currently waiting to be notified
    pub fn is_waiting(&self, key: &K) -> bool {
        self.waiting.contains_key(key)
    }

    /// Number of keys waiting to be notified
    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    /// Update the registry with the keys currently abnormal and return the
    /// instant the longest-waiting key started waiting.
    pub fn register_abnormal(&mut self, current: &BTreeSet<K>) -> Option<Instant> {
        self.register_abnormal_at(current, Instant::now())
    }

    /// [`register_abnormal`](Self::register_abnormal) with an explicit clock
    pub fn register_abnormal_at(&mut self, current: &BTreeSet<K>, now: Instant) -> Option<Instant> {
        let recovered: Vec<K> = self
            .waiting
            .keys()
            .filter(|key| !current.contains(*key))
            .cloned()
            .collect();

        if !recovered.is_empty() {
            info!(
                "💖 {} {} changes recovered. No need to notify anymore: {}",
                recovered.len(),
                self.name,
                join(&recovered)
            );
            for key in &recovered {
                self.waiting.remove(key);
            }
        }

        for key in current {
            self.waiting.entry(key.clone()).or_insert(now);
        }

        self.waiting.values().min().copied()
    }

    /// Decide whether to notify now, based on the oldest waiting instant
    pub fn should_notify(&self, oldest: Option<Instant>) -> Decision {
        self.should_notify_at(oldest, Instant::now())
    }

    /// [`should_notify`](Self::should_notify) with an explicit clock
    pub fn should_notify_at(&self, oldest: Option<Instant>, now: Instant) -> Decision {
        let Some(since) = oldest else {
            return Decision::IDLE;
        };

        let waited = now.saturating_duration_since(since);
        if waited >= self.delay {
            info!("✉️ Waited enough! The {} changes will be notified", self.name);
            Decision::NOTIFY
        } else {
            info!(
                "⏱ Waiting {}s more before notifying {} changes. Waited for {}s",
                (self.delay - waited).as_secs(),
                self.name,
                waited.as_secs()
            );
            Decision::WAIT
        }
    }

    /// Clear the waiting registry, restarting the clock for future changes
    pub fn reset(&mut self) {
        self.waiting.clear();
    }

    /// Register, decide and reset when required, in one step
    pub fn evaluate(&mut self, current: &BTreeSet<K>) -> Decision {
        self.evaluate_at(current, Instant::now())
    }

    /// [`evaluate`](Self::evaluate) with an explicit clock
    pub fn evaluate_at(&mut self, current: &BTreeSet<K>, now: Instant) -> Decision {
        let oldest = self.register_abnormal_at(current, now);
        let decision = self.should_notify_at(oldest, now);
        if decision.should_reset {
            self.reset();
        }
        decision
    }

    /// [`evaluate`](Self::evaluate) for a cycle that only observed `observed`.
    /// Waiting keys outside it keep waiting with their original instant, and
    /// survive a notification since they were not part of it.
    pub fn evaluate_observed(&mut self, current: &BTreeSet<K>, observed: &BTreeSet<K>) -> Decision {
        self.evaluate_observed_at(current, observed, Instant::now())
    }

    /// [`evaluate_observed`](Self::evaluate_observed) with an explicit clock
    pub fn evaluate_observed_at(
        &mut self,
        current: &BTreeSet<K>,
        observed: &BTreeSet<K>,
        now: Instant,
    ) -> Decision {
        let unobserved: Vec<(K, Instant)> = self
            .waiting
            .iter()
            .filter(|(key, _)| !observed.contains(*key))
            .map(|(key, since)| (key.clone(), *since))
            .collect();

        if unobserved.is_empty() {
            return self.evaluate_at(current, now);
        }

        let keys: Vec<K> = unobserved.iter().map(|(key, _)| key.clone()).collect();
        debug!(
            "{} {} changes not observed this cycle, still waiting: {}",
            keys.len(),
            self.name,
            join(&keys)
        );

        let mut abnormal = current.clone();
        abnormal.extend(keys);
        let decision = self.evaluate_at(&abnormal, now);
        if decision.notify {
            self.waiting.extend(unobserved);
        }
        decision
    }
}

fn join<K: Display>(keys: &[K]) -> String {
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tokio::time;

    fn set(keys: &[u64]) -> BTreeSet<u64> {
        keys.iter().copied().collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_waiting_resets() {
        let mut engine = DebounceEngine::<u64>::new("status", Duration::from_secs(300));
        assert_eq!(engine.register_abnormal(&set(&[])), None);
        assert_eq!(engine.should_notify(None), Decision::IDLE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_window() {
        let mut engine = DebounceEngine::new("status", Duration::from_secs(300));
        let started = Instant::now();

        let oldest = engine.register_abnormal(&set(&[1]));
        assert_eq!(oldest, Some(started));
        assert_eq!(engine.should_notify(oldest), Decision::WAIT);

        time::advance(Duration::from_secs(299)).await;
        let oldest = engine.register_abnormal(&set(&[1]));
        assert_eq!(oldest, Some(started));
        assert_eq!(engine.should_notify(oldest), Decision::WAIT);

        time::advance(Duration::from_secs(1)).await;
        let oldest = engine.register_abnormal(&set(&[1]));
        assert_eq!(engine.should_notify(oldest), Decision::NOTIFY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_revert_removes_immediately() {
        let mut engine = DebounceEngine::new("effectiveness", Duration::from_secs(60));
        assert!(!engine.evaluate(&set(&[7])).notify);
        assert!(engine.is_waiting(&7));

        time::advance(Duration::from_secs(30)).await;
        let decision = engine.evaluate(&set(&[]));
        assert_eq!(decision, Decision::IDLE);
        assert!(!engine.is_waiting(&7));

        // Diverging again starts a fresh clock
        time::advance(Duration::from_secs(40)).await;
        assert!(!engine.evaluate(&set(&[7])).notify);
        time::advance(Duration::from_secs(59)).await;
        assert!(!engine.evaluate(&set(&[7])).notify);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovered_entity_is_not_reported() {
        // A diverges at t=0, B at t=100, B reverts at t=250, A is due at t=300
        let mut engine = DebounceEngine::new("status", Duration::from_secs(300));

        assert!(!engine.evaluate(&set(&[1])).notify);
        time::advance(Duration::from_secs(100)).await;
        assert!(!engine.evaluate(&set(&[1, 2])).notify);
        time::advance(Duration::from_secs(150)).await;

        let decision = engine.evaluate(&set(&[1]));
        assert!(!decision.notify);
        assert!(!engine.is_waiting(&2));
        assert!(engine.is_waiting(&1));

        time::advance(Duration::from_secs(50)).await;
        assert_eq!(engine.evaluate(&set(&[1])), Decision::NOTIFY);
        assert_eq!(engine.waiting_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_joiners_are_batched_with_oldest() {
        let mut engine = DebounceEngine::new("status", Duration::from_secs(300));
        engine.evaluate(&set(&[1]));
        time::advance(Duration::from_secs(200)).await;
        engine.evaluate(&set(&[1, 2, 3]));
        time::advance(Duration::from_secs(100)).await;

        let oldest = engine.register_abnormal(&set(&[1, 2, 3]));
        assert_eq!(engine.waiting_len(), 3);
        assert!(engine.should_notify(oldest).notify);
    }

    #[tokio::test(start_paused = true)]
    async fn test_notification_restarts_clock() {
        let mut engine = DebounceEngine::new("status", Duration::from_secs(60));
        engine.evaluate(&set(&[1]));
        time::advance(Duration::from_secs(60)).await;
        assert!(engine.evaluate(&set(&[1])).notify);

        // Still abnormal relative to a baseline the caller did not commit
        assert!(!engine.evaluate(&set(&[1])).notify);
        time::advance(Duration::from_secs(59)).await;
        assert!(!engine.evaluate(&set(&[1])).notify);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unobserved_key_keeps_its_clock() {
        let mut engine = DebounceEngine::new("status", Duration::from_secs(300));
        let all = set(&[1, 2]);

        engine.evaluate_observed(&set(&[1]), &all);
        time::advance(Duration::from_secs(180)).await;

        // Key 1 sits in a batch that failed this cycle
        let decision = engine.evaluate_observed(&set(&[]), &set(&[2]));
        assert_eq!(decision, Decision::WAIT);
        assert!(engine.is_waiting(&1));

        time::advance(Duration::from_secs(120)).await;
        assert_eq!(engine.evaluate_observed(&set(&[1]), &all), Decision::NOTIFY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unobserved_key_survives_notification() {
        let mut engine = DebounceEngine::new("status", Duration::from_secs(300));
        let all = set(&[1, 2]);

        engine.evaluate_observed(&set(&[1, 2]), &all);
        time::advance(Duration::from_secs(300)).await;

        // Only key 1 was observed, so only key 1 is notified
        let decision = engine.evaluate_observed(&set(&[1]), &set(&[1]));
        assert_eq!(decision, Decision::NOTIFY);
        assert!(!engine.is_waiting(&1));
        assert!(engine.is_waiting(&2));

        // Key 2 already waited the whole window
        time::advance(Duration::from_secs(60)).await;
        assert!(engine.evaluate_observed(&set(&[2]), &all).notify);
        assert_eq!(engine.waiting_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_observed_revert_still_removes() {
        let mut engine = DebounceEngine::new("effectiveness", Duration::from_secs(60));
        let all = set(&[1, 2]);

        engine.evaluate_observed(&set(&[1, 2]), &all);
        time::advance(Duration::from_secs(30)).await;
        engine.evaluate_observed(&set(&[]), &set(&[1]));
        assert!(!engine.is_waiting(&1));
        assert!(engine.is_waiting(&2));
    }

    proptest! {
        /// Notify iff the longest continuous divergence since the last
        /// reset reaches the window, and the registry only ever holds
        /// keys from the current abnormal set.
        #[test]
        fn prop_matches_reference_model(
            steps in prop::collection::vec(
                (0u64..120, prop::collection::btree_set(0u64..6, 0..4)),
                1..40,
            )
        ) {
            let delay = Duration::from_secs(150);
            let origin = Instant::now();
            let mut engine = DebounceEngine::new("prop", delay);
            let mut model: BTreeMap<u64, Duration> = BTreeMap::new();
            let mut clock = Duration::ZERO;

            for (step, current) in steps {
                clock += Duration::from_secs(step);
                let now = origin + clock;

                model.retain(|key, _| current.contains(key));
                for key in &current {
                    model.entry(*key).or_insert(clock);
                }
                let expected = model
                    .values()
                    .min()
                    .map(|since| clock - *since >= delay)
                    .unwrap_or(false);

                let decision = engine.evaluate_at(&current, now);
                prop_assert_eq!(decision.notify, expected);

                if decision.should_reset {
                    model.clear();
                    prop_assert_eq!(engine.waiting_len(), 0);
                } else {
                    prop_assert_eq!(engine.waiting_len(), current.len());
                    for key in &current {
                        prop_assert!(engine.is_waiting(key));
                    }
                }
            }
        }
    }
}
