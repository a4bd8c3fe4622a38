//! Core engine implementation for perimeter.
//!
//! The engine owns the region set, grid index, state tracker, hierarchy
//! ledger, offline queue, and sync scheduler as one explicit instance —
//! there is no process-wide singleton. Evaluation of a fix runs to
//! completion under a single write lock so two fixes are never interleaved
//! against the same region's state; flushing happens off that lock and
//! never blocks evaluation.

use crate::builder::EngineBuilder;
use crate::error::{PerimeterError, Result};
use crate::grid::GridIndex;
use crate::hierarchy::HierarchyLedger;
use crate::queue::OfflineQueue;
use crate::region::{Region, RegionShape, validate_point};
use crate::rules::{AlwaysHolds, ConditionEvaluator, gate_eligible};
use crate::sync::{DeliverySink, SyncEngine};
use crate::tracker::StateTracker;
use crate::types::{
    Config, EngineStats, FlushOutcome, LocationFix, NetworkState, TransitionEvent,
};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Instant, SystemTime};
use uuid::Uuid;

/// Geofence evaluation engine with an offline transition queue.
///
/// Cloning is cheap and shares state: hand clones to the location callback,
/// the connectivity observer, and the flush timer.
///
/// # Examples
///
/// ```rust
/// use perimeter::{Engine, LocationFix, Region, TransitionKind};
/// use geo::Point;
///
/// let engine = Engine::new();
/// engine.add_region(Region::circle("office", Point::new(-74.0060, 40.7128), 200.0)?)?;
///
/// let events = engine.evaluate(&LocationFix::new(-74.0060, 40.7128, 10.0))?;
/// assert_eq!(events[0].kind, TransitionKind::Enter);
/// # Ok::<(), perimeter::PerimeterError>(())
/// ```
#[derive(Clone)]
pub struct Engine {
    inner: Arc<RwLock<EngineInner>>,
    queue: Arc<Mutex<OfflineQueue>>,
    sync: Arc<Mutex<SyncEngine>>,
    flush_in_progress: Arc<AtomicBool>,
}

pub(crate) struct EngineInner {
    pub regions: FxHashMap<String, Region>,
    pub grid: GridIndex,
    pub tracker: StateTracker,
    pub ledger: HierarchyLedger,
    pub evaluator: Arc<dyn ConditionEvaluator>,
    pub config: Config,
    pub closed: bool,
    pub evaluations: u64,
    pub transitions_emitted: u64,
}

impl EngineInner {
    pub(crate) fn new_with_config(config: Config) -> Self {
        Self {
            regions: FxHashMap::default(),
            grid: GridIndex::new(config.cell_size_deg),
            tracker: StateTracker::new(),
            ledger: HierarchyLedger::new(),
            evaluator: Arc::new(AlwaysHolds),
            config,
            closed: false,
            evaluations: 0,
            transitions_emitted: 0,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(PerimeterError::EngineClosed);
        }
        Ok(())
    }

    /// Radius cap lives in config, so it is enforced here rather than in the
    /// shape constructors.
    fn check_radius_cap(&self, region: &Region) -> Result<()> {
        if let Some(radius) = region.radius_m()
            && radius > self.config.max_radius_m
        {
            return Err(PerimeterError::InvalidRadius(radius));
        }
        Ok(())
    }
}

/// Notification flags and rules for a region, following the parent when the
/// region inherits settings. Geometry always stays the region's own.
fn effective_settings<'a>(
    region: &'a Region,
    regions: &'a FxHashMap<String, Region>,
    ledger: &HierarchyLedger,
) -> &'a Region {
    if region.inherit_settings
        && let Some(parent) = ledger.parent(&region.id)
        && let Some(parent_region) = regions.get(parent)
    {
        return parent_region;
    }
    region
}

impl Engine {
    /// Create an in-memory engine with default configuration.
    pub fn new() -> Self {
        Self::from_parts(
            EngineInner::new_with_config(Config::default()),
            OfflineQueue::in_memory(),
        )
    }

    /// Create an in-memory engine with custom configuration.
    pub fn with_config(config: Config) -> Result<Self> {
        config.validate().map_err(PerimeterError::InvalidInput)?;
        Ok(Self::from_parts(
            EngineInner::new_with_config(config),
            OfflineQueue::in_memory(),
        ))
    }

    /// Open an engine whose queue is journaled at `path`. Unsynced events
    /// from a previous run are restored.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::builder().journal_path(path.as_ref()).build()
    }

    /// Open a journaled engine with custom configuration.
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: Config) -> Result<Self> {
        Self::builder().journal_path(path.as_ref()).config(config).build()
    }

    /// Create an engine builder for advanced configuration.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub(crate) fn from_parts(inner: EngineInner, queue: OfflineQueue) -> Self {
        let sync = SyncEngine::new(&inner.config);
        Self {
            inner: Arc::new(RwLock::new(inner)),
            queue: Arc::new(Mutex::new(queue)),
            sync: Arc::new(Mutex::new(sync)),
            flush_in_progress: Arc::new(AtomicBool::new(false)),
        }
    }

    // ===== Region CRUD =====

    /// Register a region.
    ///
    /// # Errors
    ///
    /// `DuplicateRegion` if the id is already live, `InvalidRadius` if a
    /// circle exceeds the configured cap.
    pub fn add_region(&self, region: Region) -> Result<()> {
        let mut inner = self.inner.write();
        inner.ensure_open()?;
        inner.check_radius_cap(&region)?;
        if inner.regions.contains_key(&region.id) {
            return Err(PerimeterError::DuplicateRegion(region.id));
        }

        inner.grid.add(&region);
        inner.regions.insert(region.id.clone(), region);
        Ok(())
    }

    /// Replace a region's definition, re-indexing if the bounding box
    /// changed. Occupancy state is preserved; the next evaluation flips it
    /// naturally if the new geometry disagrees.
    pub fn update_region(&self, region: Region) -> Result<()> {
        let mut inner = self.inner.write();
        inner.ensure_open()?;
        inner.check_radius_cap(&region)?;

        let Some(old) = inner.regions.remove(&region.id) else {
            return Err(PerimeterError::UnknownRegion(region.id));
        };
        inner.grid.remove(&old);
        inner.grid.add(&region);
        inner.regions.insert(region.id.clone(), region);
        Ok(())
    }

    /// Remove a region: de-indexed, state dropped, detached from the
    /// hierarchy (children are orphaned, not removed).
    pub fn remove_region(&self, region_id: &str) -> Result<()> {
        let mut inner = self.inner.write();
        inner.ensure_open()?;

        let Some(region) = inner.regions.remove(region_id) else {
            return Err(PerimeterError::UnknownRegion(region_id.to_string()));
        };
        inner.grid.remove(&region);
        inner.tracker.remove(region_id);
        inner.ledger.unlink(region_id);
        Ok(())
    }

    /// A copy of a region's current definition.
    pub fn region(&self, region_id: &str) -> Option<Region> {
        self.inner.read().regions.get(region_id).cloned()
    }

    pub fn region_count(&self) -> usize {
        self.inner.read().regions.len()
    }

    // ===== Hierarchy =====

    /// Link `child` under `parent`. Both must be live regions; links that
    /// would create a cycle are rejected.
    pub fn link_regions(&self, child: &str, parent: &str) -> Result<()> {
        let mut inner = self.inner.write();
        inner.ensure_open()?;
        for id in [child, parent] {
            if !inner.regions.contains_key(id) {
                return Err(PerimeterError::UnknownRegion(id.to_string()));
            }
        }
        inner.ledger.link(child, parent)
    }

    /// Detach a region from the hierarchy, orphaning its children.
    pub fn unlink_region(&self, region_id: &str) -> Result<()> {
        let mut inner = self.inner.write();
        inner.ensure_open()?;
        if !inner.regions.contains_key(region_id) {
            return Err(PerimeterError::UnknownRegion(region_id.to_string()));
        }
        inner.ledger.unlink(region_id);
        Ok(())
    }

    pub fn children_of(&self, region_id: &str) -> Vec<String> {
        self.inner.read().ledger.children(region_id)
    }

    pub fn parent_of(&self, region_id: &str) -> Option<String> {
        self.inner.read().ledger.parent(region_id).map(String::from)
    }

    /// Install the evaluator consulted for conditional rules.
    pub fn set_condition_evaluator(&self, evaluator: Arc<dyn ConditionEvaluator>) {
        self.inner.write().evaluator = evaluator;
    }

    // ===== Evaluation =====

    /// Evaluate a location fix against all candidate regions.
    ///
    /// Runs the whole pipeline — index lookup, activation gate, containment,
    /// state update, enqueue — as one atomic unit; concurrent calls are
    /// serialized. Returns the transitions emitted for this fix (they are
    /// also queued for sync). Regions failing the activation gate are
    /// skipped with their stored state untouched.
    pub fn evaluate(&self, fix: &LocationFix) -> Result<Vec<TransitionEvent>> {
        validate_point(&fix.point)?;

        let mut inner = self.inner.write();
        inner.ensure_open()?;

        let EngineInner {
            regions,
            grid,
            tracker,
            ledger,
            evaluator,
            evaluations,
            transitions_emitted,
            ..
        } = &mut *inner;

        let mut candidate_ids: Vec<String> = grid.candidates(&fix.point).into_iter().collect();
        candidate_ids.sort();

        let mut emitted = Vec::new();
        for id in candidate_ids {
            let Some(region) = regions.get(&id) else {
                log::warn!("skipping stale index entry for region '{id}'");
                continue;
            };

            let settings = effective_settings(region, regions, ledger);
            if !gate_eligible(
                &id,
                &settings.time_rules,
                &settings.conditional_rules,
                fix.timestamp,
                evaluator.as_ref(),
            ) {
                continue;
            }

            let inside = region.contains(&fix.point);
            if let Some(kind) = tracker.observe(
                &id,
                inside,
                settings.notify_on_entry,
                settings.notify_on_exit,
                fix.timestamp,
            ) {
                emitted.push(TransitionEvent::new(id, kind, fix));
            }
        }

        *evaluations += 1;
        *transitions_emitted += emitted.len() as u64;
        drop(inner);

        if !emitted.is_empty() {
            let mut queue = self.queue.lock();
            for event in &emitted {
                queue.enqueue(event.clone())?;
            }
        }

        Ok(emitted)
    }

    /// Current occupancy for a region (false if never evaluated).
    pub fn is_inside(&self, region_id: &str) -> bool {
        self.inner.read().tracker.is_inside(region_id)
    }

    // ===== Sync =====

    /// Register a delivery sink for synced batches.
    pub fn add_sink(&self, sink: Arc<dyn DeliverySink>) {
        self.sync.lock().add_sink(sink);
    }

    /// Report a connectivity change. A disconnected → connected transition
    /// triggers an automatic flush attempt.
    pub fn on_network_change(&self, state: NetworkState) -> Result<Option<FlushOutcome>> {
        let reconnected = self.sync.lock().observe_network(state);
        if reconnected {
            self.try_flush().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Manual flush: cancels per-destination backoff timers and attempts
    /// delivery immediately, regardless of the recorded network state — the
    /// sinks' results are authoritative.
    pub fn flush(&self) -> Result<FlushOutcome> {
        self.sync.lock().cancel_backoff();
        self.run_flush()
    }

    /// Scheduled flush: runs only when connected and every destination is
    /// outside its backoff window. Call from a periodic timer.
    pub fn try_flush(&self) -> Result<FlushOutcome> {
        if !self.sync.lock().auto_flush_due(Instant::now()) {
            return Ok(FlushOutcome::default());
        }
        self.run_flush()
    }

    fn run_flush(&self) -> Result<FlushOutcome> {
        // Concurrent flushes coalesce instead of running in parallel.
        if self.flush_in_progress.swap(true, Ordering::SeqCst) {
            log::debug!("flush already in progress, coalescing");
            return Ok(FlushOutcome::default());
        }
        let result = self.flush_once();
        self.flush_in_progress.store(false, Ordering::SeqCst);
        result
    }

    fn flush_once(&self) -> Result<FlushOutcome> {
        let class = self.sync.lock().network().class;
        let limit = self.inner.read().config.batch_size_for(class);

        let batch = self.queue.lock().unsynced_batch(limit);
        if batch.is_empty() {
            return Ok(FlushOutcome::default());
        }

        // Delivery happens without the evaluation lock held.
        let all_ok = self.sync.lock().attempt_delivery(&batch);

        if all_ok {
            let ids: Vec<Uuid> = batch.iter().map(|e| e.id).collect();
            let synced = self.queue.lock().mark_synced(&ids)?;
            Ok(FlushOutcome { synced, failed: 0 })
        } else {
            Ok(FlushOutcome {
                synced: 0,
                failed: batch.len(),
            })
        }
    }

    // ===== Queries =====

    /// Ids of regions that pass the activation gate at the given time.
    pub fn active_regions(&self, at: SystemTime) -> Vec<String> {
        let inner = self.inner.read();
        let mut ids: Vec<String> = inner
            .regions
            .values()
            .filter(|region| {
                let settings = effective_settings(region, &inner.regions, &inner.ledger);
                gate_eligible(
                    &region.id,
                    &settings.time_rules,
                    &settings.conditional_rules,
                    at,
                    inner.evaluator.as_ref(),
                )
            })
            .map(|region| region.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Unsynced transitions waiting for delivery, oldest first.
    pub fn pending_transitions(&self, limit: usize) -> Vec<TransitionEvent> {
        self.queue.lock().unsynced_batch(limit)
    }

    pub fn pending_events(&self) -> usize {
        self.queue.lock().pending()
    }

    /// Drop already-confirmed events from the queue.
    pub fn clear_synced_events(&self) {
        self.queue.lock().clear_synced();
    }

    /// Administrative purge of the queue, delivered or not.
    pub fn purge_queue(&self) -> Result<usize> {
        self.queue.lock().purge()
    }

    /// Diagnostics snapshot.
    pub fn statistics(&self) -> EngineStats {
        let inner = self.inner.read();
        let mut stats = EngineStats {
            region_count: inner.regions.len(),
            index_bucket_count: inner.grid.bucket_count(),
            evaluations: inner.evaluations,
            transitions_emitted: inner.transitions_emitted,
            ..EngineStats::default()
        };
        for region in inner.regions.values() {
            match region.shape {
                RegionShape::Circle { .. } => stats.circle_count += 1,
                RegionShape::Polygon { .. } => stats.polygon_count += 1,
            }
            stats.time_rule_count += region.time_rules.len();
            stats.conditional_rule_count += region.conditional_rules.len();
        }
        drop(inner);

        stats.pending_events = self.queue.lock().pending();
        stats
    }

    /// Close the engine: further mutations fail with `EngineClosed` and the
    /// journal is synced to disk.
    pub fn close(&self) -> Result<()> {
        self.inner.write().closed = true;
        self.queue.lock().sync_journal()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

// Ensure Engine is Send + Sync
const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    let _ = assert_send_sync::<Engine>;
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{ConditionKind, ConditionalRule, RuleOperator, RuleValue, TimeRule};
    use crate::types::TransitionKind;
    use geo::Point;

    fn fix_at(lon: f64, lat: f64) -> LocationFix {
        LocationFix::new(lon, lat, 10.0)
    }

    #[test]
    fn test_enter_exit_cycle() {
        let engine = Engine::new();
        engine
            .add_region(Region::circle("home", Point::new(-74.0, 40.7), 500.0).unwrap())
            .unwrap();

        let inside = engine.evaluate(&fix_at(-74.0, 40.7)).unwrap();
        assert_eq!(inside.len(), 1);
        assert_eq!(inside[0].kind, TransitionKind::Enter);
        assert!(engine.is_inside("home"));

        // Same fix again: idempotent, no new events.
        assert!(engine.evaluate(&fix_at(-74.0, 40.7)).unwrap().is_empty());

        // ~1km east of the center: outside the radius, still an index candidate.
        let outside = engine.evaluate(&fix_at(-74.012, 40.7)).unwrap();
        assert_eq!(outside.len(), 1);
        assert_eq!(outside[0].kind, TransitionKind::Exit);
        assert!(!engine.is_inside("home"));

        assert_eq!(engine.pending_events(), 2);
    }

    #[test]
    fn test_duplicate_region_rejected() {
        let engine = Engine::new();
        let region = Region::circle("r", Point::new(0.0, 0.0), 100.0).unwrap();
        engine.add_region(region.clone()).unwrap();

        let err = engine.add_region(region).unwrap_err();
        assert!(matches!(err, PerimeterError::DuplicateRegion(_)));
    }

    #[test]
    fn test_radius_cap_enforced() {
        let engine = Engine::with_config(Config::default().with_max_radius(1_000.0)).unwrap();
        let big = Region::circle("big", Point::new(0.0, 0.0), 5_000.0).unwrap();
        assert!(matches!(
            engine.add_region(big),
            Err(PerimeterError::InvalidRadius(_))
        ));
    }

    #[test]
    fn test_remove_unknown_region() {
        let engine = Engine::new();
        assert!(matches!(
            engine.remove_region("ghost"),
            Err(PerimeterError::UnknownRegion(_))
        ));
    }

    #[test]
    fn test_update_reindexes() {
        let engine = Engine::new();
        engine
            .add_region(Region::circle("r", Point::new(-74.0, 40.7), 200.0).unwrap())
            .unwrap();
        engine.evaluate(&fix_at(-74.0, 40.7)).unwrap();
        assert!(engine.is_inside("r"));

        // Move the region far away; state is preserved until re-evaluated.
        engine
            .update_region(Region::circle("r", Point::new(-75.0, 41.7), 200.0).unwrap())
            .unwrap();
        assert!(engine.is_inside("r"));

        let events = engine.evaluate(&fix_at(-75.0, 41.7)).unwrap();
        // Already inside per stored state, now inside the moved region: no event.
        assert!(events.is_empty());

        // A fix near the new location but ~400m outside the 200m radius.
        let events = engine.evaluate(&fix_at(-75.005, 41.7)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, TransitionKind::Exit);
    }

    #[test]
    fn test_suppressed_notifications_still_track() {
        let engine = Engine::new();
        engine
            .add_region(
                Region::circle("quiet", Point::new(0.0, 0.0), 500.0)
                    .unwrap()
                    .with_notifications(false, true),
            )
            .unwrap();

        // Entry suppressed.
        assert!(engine.evaluate(&fix_at(0.0, 0.0)).unwrap().is_empty());
        assert!(engine.is_inside("quiet"));

        // Exit still fires because occupancy was tracked.
        let events = engine.evaluate(&fix_at(0.012, 0.0)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, TransitionKind::Exit);
    }

    #[test]
    fn test_gate_skip_preserves_state() {
        let engine = Engine::new();
        engine
            .add_region(Region::circle("office", Point::new(0.0, 0.0), 500.0).unwrap())
            .unwrap();

        // Enter while eligible.
        engine.evaluate(&fix_at(0.0, 0.0)).unwrap();
        assert!(engine.is_inside("office"));

        // Make the region time-ineligible; evaluation skips it entirely.
        let mut region = engine.region("office").unwrap();
        region.time_rules = vec![TimeRule::window(0, 1).unwrap()];
        engine.update_region(region).unwrap();

        // The device actually leaves (candidate cell, outside the radius),
        // but the gate skips the region: state preserved.
        engine.evaluate(&fix_at(0.012, 0.0)).unwrap();
        assert!(engine.is_inside("office"));

        // Back to eligible with the device inside again: no spurious Enter.
        let mut region = engine.region("office").unwrap();
        region.time_rules.clear();
        engine.update_region(region).unwrap();

        let events = engine.evaluate(&fix_at(0.0, 0.0)).unwrap();
        assert!(events.is_empty());
    }

    struct DenyAll;

    impl ConditionEvaluator for DenyAll {
        fn holds(&self, _region_id: &str, _rule: &ConditionalRule) -> bool {
            false
        }
    }

    #[test]
    fn test_conditional_gate_uses_injected_evaluator() {
        let engine = Engine::new();
        engine
            .add_region(
                Region::circle("cond", Point::new(0.0, 0.0), 500.0)
                    .unwrap()
                    .with_conditional_rule(ConditionalRule::new(
                        ConditionKind::Weather,
                        RuleOperator::Eq,
                        RuleValue::Text("clear".into()),
                    )),
            )
            .unwrap();

        engine.set_condition_evaluator(Arc::new(DenyAll));
        assert!(engine.evaluate(&fix_at(0.0, 0.0)).unwrap().is_empty());
        assert!(!engine.is_inside("cond"));

        engine.set_condition_evaluator(Arc::new(AlwaysHolds));
        let events = engine.evaluate(&fix_at(0.0, 0.0)).unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_hierarchy_inheritance() {
        let engine = Engine::new();
        engine
            .add_region(
                Region::circle("campus", Point::new(0.0, 0.0), 10_000.0)
                    .unwrap()
                    .with_notifications(false, false),
            )
            .unwrap();
        engine
            .add_region(
                Region::circle("lab", Point::new(0.0, 0.0), 200.0)
                    .unwrap()
                    .with_inherited_settings(),
            )
            .unwrap();
        engine.link_regions("lab", "campus").unwrap();

        // The lab inherits the campus' all-off notification flags.
        let events = engine.evaluate(&fix_at(0.0, 0.0)).unwrap();
        assert!(events.iter().all(|e| e.region_id != "lab"));
        // Occupancy still tracked.
        assert!(engine.is_inside("lab"));
    }

    #[test]
    fn test_hierarchy_cycle_rejected() {
        let engine = Engine::new();
        for id in ["a", "b"] {
            engine
                .add_region(Region::circle(id, Point::new(0.0, 0.0), 100.0).unwrap())
                .unwrap();
        }
        engine.link_regions("b", "a").unwrap();
        assert!(matches!(
            engine.link_regions("a", "b"),
            Err(PerimeterError::HierarchyCycle { .. })
        ));
    }

    #[test]
    fn test_remove_region_orphans_children() {
        let engine = Engine::new();
        for id in ["parent", "child"] {
            engine
                .add_region(Region::circle(id, Point::new(0.0, 0.0), 100.0).unwrap())
                .unwrap();
        }
        engine.link_regions("child", "parent").unwrap();
        engine.remove_region("parent").unwrap();

        assert_eq!(engine.parent_of("child"), None);
        assert!(engine.region("child").is_some());
    }

    #[test]
    fn test_active_regions() {
        let engine = Engine::new();
        engine
            .add_region(Region::circle("always", Point::new(0.0, 0.0), 100.0).unwrap())
            .unwrap();
        engine
            .add_region(
                Region::circle("never", Point::new(0.0, 0.0), 100.0)
                    .unwrap()
                    .with_time_rule(TimeRule::window(0, 1).unwrap()),
            )
            .unwrap();

        // One minute past midnight, any day, is outside [0, 1).
        let at = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(90);
        assert_eq!(engine.active_regions(at), vec!["always"]);
    }

    #[test]
    fn test_statistics() {
        let engine = Engine::new();
        engine
            .add_region(Region::circle("c", Point::new(0.0, 0.0), 100.0).unwrap())
            .unwrap();
        engine
            .add_region(
                Region::polygon("p", vec![(1.0, 1.0), (1.0, 1.1), (1.1, 1.1)])
                    .unwrap()
                    .with_time_rule(TimeRule::window(0, 720).unwrap()),
            )
            .unwrap();
        engine.evaluate(&fix_at(0.0, 0.0)).unwrap();

        let stats = engine.statistics();
        assert_eq!(stats.region_count, 2);
        assert_eq!(stats.circle_count, 1);
        assert_eq!(stats.polygon_count, 1);
        assert_eq!(stats.time_rule_count, 1);
        assert_eq!(stats.evaluations, 1);
        assert!(stats.index_bucket_count > 0);
    }

    #[test]
    fn test_invalid_fix_rejected() {
        let engine = Engine::new();
        let bad = LocationFix::new(-200.0, 95.0, 1.0);
        assert!(matches!(
            engine.evaluate(&bad),
            Err(PerimeterError::InvalidCoordinate { .. })
        ));
    }

    #[test]
    fn test_closed_engine_rejects_operations() {
        let engine = Engine::new();
        engine.close().unwrap();

        let region = Region::circle("r", Point::new(0.0, 0.0), 100.0).unwrap();
        assert!(matches!(
            engine.add_region(region),
            Err(PerimeterError::EngineClosed)
        ));
        assert!(matches!(
            engine.evaluate(&fix_at(0.0, 0.0)),
            Err(PerimeterError::EngineClosed)
        ));
    }

    #[test]
    fn test_clone_shares_state() {
        let engine = Engine::new();
        let handle = engine.clone();

        handle
            .add_region(Region::circle("shared", Point::new(0.0, 0.0), 100.0).unwrap())
            .unwrap();
        assert_eq!(engine.region_count(), 1);
    }
}
