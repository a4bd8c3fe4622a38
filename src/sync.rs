//! Sync engine: delivery sinks, retry backoff, and flush scheduling.
//!
//! Delivery is at-least-once: a batch counts as synced only when every
//! registered sink accepts it, and failed batches stay queued indefinitely.
//! Retries back off exponentially with jitter, per destination; a manual
//! flush cancels the timers and tries immediately. The sink result, not the
//! network state observed at schedule time, is what marks events synced.

use crate::error::Result;
use crate::types::{Config, NetworkState, TransitionEvent};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// External delivery destination for transition batches.
///
/// Implementations perform the actual I/O (webhook POST, database write,
/// message bus publish). `deliver` must be atomic from the engine's view:
/// return `Ok` only if the whole batch was accepted.
pub trait DeliverySink: Send + Sync {
    /// Stable name used in logs and per-destination retry state.
    fn name(&self) -> &str;

    /// Deliver a batch of transitions. Duplicate redelivery of an event id
    /// must be tolerated downstream.
    fn deliver(&self, batch: &[TransitionEvent]) -> Result<()>;
}

/// Exponential backoff calculator with jitter.
///
/// `delay = min(base * 2^(attempt-1), max) + jitter`, where jitter adds up
/// to a quarter of the capped delay. Consecutive delays never shrink, so a
/// retry is never scheduled sooner than the previous attempt's delay.
#[derive(Debug)]
pub struct Backoff {
    base_ms: u64,
    max_ms: u64,
    attempt: u32,
    last_delay_ms: u64,
}

impl Backoff {
    /// Create a new backoff starting at `base_ms` with a cap of `max_ms`.
    pub fn new(base_ms: u64, max_ms: u64) -> Self {
        Self {
            base_ms,
            max_ms,
            attempt: 0,
            last_delay_ms: 0,
        }
    }

    /// Get the next delay duration and increment the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let exp = if self.attempt >= 63 {
            self.max_ms
        } else {
            self.base_ms.saturating_mul(1u64 << self.attempt)
        };
        let capped = exp.min(self.max_ms);
        let jitter = rand::random::<u64>() % (capped / 4 + 1);
        let delay = (capped + jitter).max(self.last_delay_ms);

        self.attempt = self.attempt.saturating_add(1);
        self.last_delay_ms = delay;
        Duration::from_millis(delay)
    }

    /// Reset the backoff (e.g., after a successful delivery).
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.last_delay_ms = 0;
    }

    /// Failed attempts since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// Per-destination retry state.
struct Destination {
    sink: Arc<dyn DeliverySink>,
    backoff: Backoff,
    next_attempt_at: Option<Instant>,
}

/// Schedules and performs batch delivery to the registered sinks.
pub struct SyncEngine {
    destinations: Vec<Destination>,
    network: NetworkState,
    backoff_base_ms: u64,
    backoff_max_ms: u64,
}

impl SyncEngine {
    pub fn new(config: &Config) -> Self {
        Self {
            destinations: Vec::new(),
            network: NetworkState::default(),
            backoff_base_ms: config.backoff_base_ms,
            backoff_max_ms: config.backoff_max_ms,
        }
    }

    /// Register a delivery sink.
    pub fn add_sink(&mut self, sink: Arc<dyn DeliverySink>) {
        self.destinations.push(Destination {
            sink,
            backoff: Backoff::new(self.backoff_base_ms, self.backoff_max_ms),
            next_attempt_at: None,
        });
    }

    pub fn sink_count(&self) -> usize {
        self.destinations.len()
    }

    /// Record a connectivity change. Returns true on a disconnected →
    /// connected transition, the cue for an automatic flush attempt.
    pub fn observe_network(&mut self, state: NetworkState) -> bool {
        let reconnected = !self.network.connected && state.connected;
        self.network = state;
        reconnected
    }

    pub fn network(&self) -> NetworkState {
        self.network
    }

    /// Whether an automatic flush may run now: connected, sinks present,
    /// and every destination outside its backoff window.
    pub fn auto_flush_due(&self, now: Instant) -> bool {
        self.network.connected
            && !self.destinations.is_empty()
            && self
                .destinations
                .iter()
                .all(|d| d.next_attempt_at.is_none_or(|t| t <= now))
    }

    /// Cancel all backoff timers, as when a manual flush supersedes the
    /// schedule.
    pub fn cancel_backoff(&mut self) {
        for destination in &mut self.destinations {
            destination.backoff.reset();
            destination.next_attempt_at = None;
        }
    }

    /// Earliest instant at which every destination is due again.
    pub fn next_attempt_at(&self) -> Option<Instant> {
        self.destinations
            .iter()
            .filter_map(|d| d.next_attempt_at)
            .max()
    }

    /// Deliver a batch to every sink. Returns true only if all sinks
    /// accepted it; destinations that failed have their retry rescheduled,
    /// destinations that succeeded are reset.
    ///
    /// With no sinks registered this is a no-op returning false, so events
    /// stay queued until a sink exists.
    pub fn attempt_delivery(&mut self, batch: &[TransitionEvent]) -> bool {
        if self.destinations.is_empty() {
            log::debug!("flush skipped: no delivery sinks registered");
            return false;
        }

        let now = Instant::now();
        let mut all_ok = true;

        for destination in &mut self.destinations {
            match destination.sink.deliver(batch) {
                Ok(()) => {
                    destination.backoff.reset();
                    destination.next_attempt_at = None;
                }
                Err(err) => {
                    all_ok = false;
                    let delay = destination.backoff.next_delay();
                    destination.next_attempt_at = Some(now + delay);
                    log::warn!(
                        "sink '{}' rejected batch of {} (attempt {}), retry in {:?}: {err}",
                        destination.sink.name(),
                        batch.len(),
                        destination.backoff.attempt(),
                        delay,
                    );
                }
            }
        }

        all_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PerimeterError;
    use crate::types::{LocationFix, NetworkClass, TransitionKind};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakySink {
        fail_first: usize,
        attempts: AtomicUsize,
    }

    impl FlakySink {
        fn new(fail_first: usize) -> Self {
            Self {
                fail_first,
                attempts: AtomicUsize::new(0),
            }
        }
    }

    impl DeliverySink for FlakySink {
        fn name(&self) -> &str {
            "flaky"
        }

        fn deliver(&self, _batch: &[TransitionEvent]) -> Result<()> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.fail_first {
                Err(PerimeterError::DeliveryFailed("simulated outage".into()))
            } else {
                Ok(())
            }
        }
    }

    fn sample_batch() -> Vec<TransitionEvent> {
        let fix = LocationFix::new(-74.0, 40.7, 5.0);
        vec![TransitionEvent::new("r", TransitionKind::Enter, &fix)]
    }

    #[test]
    fn test_backoff_increases_and_caps() {
        let mut backoff = Backoff::new(100, 1_000);

        let mut previous = Duration::ZERO;
        for _ in 0..12 {
            let delay = backoff.next_delay();
            // Never sooner than the previous attempt's delay.
            assert!(delay >= previous);
            // Capped at max plus a quarter jitter.
            assert!(delay.as_millis() <= 1_250);
            previous = delay;
        }
        assert!(previous.as_millis() >= 1_000);
    }

    #[test]
    fn test_backoff_base_doubles() {
        let mut backoff = Backoff::new(100, 1_000_000);
        let d1 = backoff.next_delay();
        let d2 = backoff.next_delay();
        let d3 = backoff.next_delay();

        assert!(d1.as_millis() >= 100);
        assert!(d2.as_millis() >= 200);
        assert!(d3.as_millis() >= 400);
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = Backoff::new(100, 10_000);
        backoff.next_delay();
        backoff.next_delay();
        backoff.next_delay();

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);

        let delay = backoff.next_delay();
        assert!(delay.as_millis() < 200);
    }

    #[test]
    fn test_observe_network_reconnect() {
        let mut sync = SyncEngine::new(&Config::default());

        assert!(!sync.observe_network(NetworkState::disconnected(NetworkClass::Unmetered)));
        assert!(sync.observe_network(NetworkState::connected(NetworkClass::Unmetered)));
        // Already connected: not a transition.
        assert!(!sync.observe_network(NetworkState::connected(NetworkClass::Metered)));
        assert_eq!(sync.network().class, NetworkClass::Metered);
    }

    #[test]
    fn test_delivery_all_sinks_must_accept() {
        let mut sync = SyncEngine::new(&Config::default());
        sync.add_sink(Arc::new(FlakySink::new(0)));
        sync.add_sink(Arc::new(FlakySink::new(1)));

        let batch = sample_batch();
        assert!(!sync.attempt_delivery(&batch));
        // Second try: the failing sink recovers.
        assert!(sync.attempt_delivery(&batch));
    }

    #[test]
    fn test_failed_delivery_schedules_retry() {
        let mut sync = SyncEngine::new(&Config::default());
        sync.add_sink(Arc::new(FlakySink::new(10)));
        sync.observe_network(NetworkState::connected(NetworkClass::Unmetered));

        assert!(sync.auto_flush_due(Instant::now()));
        assert!(!sync.attempt_delivery(&sample_batch()));

        // Inside the backoff window now.
        assert!(!sync.auto_flush_due(Instant::now()));
        assert!(sync.next_attempt_at().is_some());

        // Manual flush cancels the timers.
        sync.cancel_backoff();
        assert!(sync.auto_flush_due(Instant::now()));
    }

    #[test]
    fn test_no_sinks_is_not_success() {
        let mut sync = SyncEngine::new(&Config::default());
        assert!(!sync.attempt_delivery(&sample_batch()));
        assert!(!sync.auto_flush_due(Instant::now()));
    }
}
