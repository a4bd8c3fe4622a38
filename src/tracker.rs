//! Per-region occupancy state and transition derivation.
//!
//! The tracker is the single authority for "currently inside": every region
//! starts Outside, and a transition event exists only because the tracker
//! observed a state flip. Occupancy is tracked even when a region's
//! notification flags suppress the event, so a later flip is still
//! detected.

use crate::types::TransitionKind;
use rustc_hash::FxHashMap;
use std::time::SystemTime;

/// Stored state for one region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionState {
    pub inside: bool,
    pub last_evaluated: Option<SystemTime>,
}

impl Default for RegionState {
    fn default() -> Self {
        Self {
            inside: false,
            last_evaluated: None,
        }
    }
}

/// Tracks inside/outside state per region id.
#[derive(Debug, Default)]
pub struct StateTracker {
    states: FxHashMap<String, RegionState>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a containment observation and derive the transition, if any.
    ///
    /// State is always updated; the notification flags only gate whether the
    /// flip is reported. Callers must skip this entirely for gate-ineligible
    /// regions so their stored state is preserved.
    pub fn observe(
        &mut self,
        region_id: &str,
        is_inside: bool,
        notify_on_entry: bool,
        notify_on_exit: bool,
        at: SystemTime,
    ) -> Option<TransitionKind> {
        let state = self.states.entry(region_id.to_string()).or_default();
        let was_inside = state.inside;
        state.inside = is_inside;
        state.last_evaluated = Some(at);

        match (was_inside, is_inside) {
            (false, true) if notify_on_entry => Some(TransitionKind::Enter),
            (true, false) if notify_on_exit => Some(TransitionKind::Exit),
            _ => None,
        }
    }

    /// Current occupancy for a region; absent means never evaluated
    /// (Outside).
    pub fn is_inside(&self, region_id: &str) -> bool {
        self.states.get(region_id).map(|s| s.inside).unwrap_or(false)
    }

    pub fn state(&self, region_id: &str) -> Option<RegionState> {
        self.states.get(region_id).copied()
    }

    /// Drop stored state when a region is removed.
    pub fn remove(&mut self, region_id: &str) {
        self.states.remove(region_id);
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> SystemTime {
        SystemTime::now()
    }

    #[test]
    fn test_initial_state_is_outside() {
        let tracker = StateTracker::new();
        assert!(!tracker.is_inside("r"));
        assert!(tracker.state("r").is_none());
    }

    #[test]
    fn test_enter_and_exit() {
        let mut tracker = StateTracker::new();

        let enter = tracker.observe("r", true, true, true, now());
        assert_eq!(enter, Some(TransitionKind::Enter));
        assert!(tracker.is_inside("r"));

        let exit = tracker.observe("r", false, true, true, now());
        assert_eq!(exit, Some(TransitionKind::Exit));
        assert!(!tracker.is_inside("r"));
    }

    #[test]
    fn test_repeat_observation_is_idempotent() {
        let mut tracker = StateTracker::new();

        assert!(tracker.observe("r", true, true, true, now()).is_some());
        // Same containment again: no additional event.
        assert!(tracker.observe("r", true, true, true, now()).is_none());
        assert!(tracker.observe("r", true, true, true, now()).is_none());
    }

    #[test]
    fn test_suppressed_notification_still_tracks() {
        let mut tracker = StateTracker::new();

        // Entry suppressed, but occupancy must still flip to inside.
        assert!(tracker.observe("r", true, false, true, now()).is_none());
        assert!(tracker.is_inside("r"));

        // So the subsequent exit is detected and reported.
        let exit = tracker.observe("r", false, false, true, now());
        assert_eq!(exit, Some(TransitionKind::Exit));
    }

    #[test]
    fn test_last_evaluated_updates() {
        let mut tracker = StateTracker::new();
        let t = now();
        tracker.observe("r", false, true, true, t);
        assert_eq!(tracker.state("r").unwrap().last_evaluated, Some(t));
    }

    #[test]
    fn test_remove_resets_state() {
        let mut tracker = StateTracker::new();
        tracker.observe("r", true, true, true, now());
        tracker.remove("r");
        assert!(!tracker.is_inside("r"));

        // Re-added region starts Outside again.
        let enter = tracker.observe("r", true, true, true, now());
        assert_eq!(enter, Some(TransitionKind::Enter));
    }
}
