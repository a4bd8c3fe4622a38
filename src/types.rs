//! Core types and configuration for the perimeter engine.
//!
//! This module provides the serializable configuration plus the small value
//! types that flow through evaluation and sync: location fixes, network
//! state, and transition events.

use geo::Point;
use serde::de::Error;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

/// Synchronization policy for the event journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncPolicy {
    /// Never fsync; rely on OS buffering (fastest, least safe)
    Never,
    /// Fsync at most once per second (recommended default)
    #[default]
    EverySecond,
    /// Fsync after every appended record (slowest, safest)
    Always,
}

/// File synchronization strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Call `fsync` / `File::sync_all` to persist metadata + data.
    #[default]
    All,
    /// Call `fdatasync` / `File::sync_data` to persist data only.
    Data,
}

/// Network link classification reported by the connectivity observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NetworkClass {
    /// Wi-Fi or other unrestricted link; large sync batches are fine.
    #[default]
    Unmetered,
    /// Cellular or otherwise expensive link; keep batches small.
    Metered,
}

/// Connectivity snapshot, externally reported and read-only to the core.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkState {
    pub connected: bool,
    pub class: NetworkClass,
    pub last_connected_at: Option<SystemTime>,
}

impl NetworkState {
    /// A connected state with the given classification, stamped now.
    pub fn connected(class: NetworkClass) -> Self {
        Self {
            connected: true,
            class,
            last_connected_at: Some(SystemTime::now()),
        }
    }

    /// A disconnected state. The classification of the last link is retained.
    pub fn disconnected(class: NetworkClass) -> Self {
        Self {
            connected: false,
            class,
            last_connected_at: None,
        }
    }
}

impl Default for NetworkState {
    fn default() -> Self {
        Self::disconnected(NetworkClass::Unmetered)
    }
}

/// Engine configuration.
///
/// Designed to be easily serializable and loadable from JSON while keeping
/// complexity minimal.
///
/// # Example
///
/// ```rust
/// use perimeter::Config;
///
/// let config = Config::default();
///
/// let json = r#"{
///     "cell_size_deg": 0.02,
///     "backoff_base_ms": 500,
///     "batch_size_metered": 5
/// }"#;
/// let config: Config = serde_json::from_str(json).unwrap();
/// assert_eq!(config.batch_size_metered, 5);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Grid cell size in degrees for the spatial index.
    ///
    /// Cells are fixed in degrees, so their physical size shrinks toward the
    /// poles; acceptable for moderate latitudes.
    #[serde(default = "Config::default_cell_size_deg")]
    pub cell_size_deg: f64,

    /// Upper bound for circle radii in meters. Regions above this are
    /// rejected at creation so a single region cannot span an unbounded
    /// number of grid cells.
    #[serde(default = "Config::default_max_radius_m")]
    pub max_radius_m: f64,

    /// Base delay for sync retry backoff, in milliseconds.
    #[serde(default = "Config::default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Cap for sync retry backoff, in milliseconds. Jitter may add up to a
    /// quarter on top.
    #[serde(default = "Config::default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Events per flush batch on unmetered links.
    #[serde(default = "Config::default_batch_size_unmetered")]
    pub batch_size_unmetered: usize,

    /// Events per flush batch on metered links.
    #[serde(default = "Config::default_batch_size_metered")]
    pub batch_size_metered: usize,

    /// How often the journal is synced to disk.
    #[serde(default)]
    pub sync_policy: SyncPolicy,

    /// Controls whether the journal issues `fsync` or `fdatasync`.
    #[serde(default)]
    pub sync_mode: SyncMode,

    /// Journal size in bytes above which a compaction is attempted.
    #[serde(default = "Config::default_journal_compact_bytes")]
    pub journal_compact_bytes: u64,
}

impl Config {
    const fn default_cell_size_deg() -> f64 {
        0.01
    }

    const fn default_max_radius_m() -> f64 {
        1_000_000.0
    }

    const fn default_backoff_base_ms() -> u64 {
        1_000
    }

    const fn default_backoff_max_ms() -> u64 {
        300_000
    }

    const fn default_batch_size_unmetered() -> usize {
        50
    }

    const fn default_batch_size_metered() -> usize {
        10
    }

    const fn default_journal_compact_bytes() -> u64 {
        16 * 1024 * 1024
    }

    pub fn with_cell_size(mut self, cell_size_deg: f64) -> Self {
        assert!(
            cell_size_deg > 0.0 && cell_size_deg <= 1.0,
            "Cell size must be in (0, 1] degrees"
        );
        self.cell_size_deg = cell_size_deg;
        self
    }

    pub fn with_max_radius(mut self, max_radius_m: f64) -> Self {
        assert!(max_radius_m > 0.0, "Max radius must be positive");
        self.max_radius_m = max_radius_m;
        self
    }

    pub fn with_backoff(mut self, base_ms: u64, max_ms: u64) -> Self {
        assert!(base_ms > 0, "Backoff base must be greater than zero");
        assert!(max_ms >= base_ms, "Backoff cap must be >= base");
        self.backoff_base_ms = base_ms;
        self.backoff_max_ms = max_ms;
        self
    }

    pub fn with_batch_sizes(mut self, unmetered: usize, metered: usize) -> Self {
        assert!(unmetered > 0 && metered > 0, "Batch sizes must be > 0");
        self.batch_size_unmetered = unmetered;
        self.batch_size_metered = metered;
        self
    }

    pub fn with_sync_policy(mut self, policy: SyncPolicy) -> Self {
        self.sync_policy = policy;
        self
    }

    pub fn with_sync_mode(mut self, mode: SyncMode) -> Self {
        self.sync_mode = mode;
        self
    }

    /// Batch size for the given network classification.
    pub fn batch_size_for(&self, class: NetworkClass) -> usize {
        match class {
            NetworkClass::Unmetered => self.batch_size_unmetered,
            NetworkClass::Metered => self.batch_size_metered,
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.cell_size_deg.is_finite() || self.cell_size_deg <= 0.0 || self.cell_size_deg > 1.0
        {
            return Err("Cell size must be in (0, 1] degrees".to_string());
        }

        if !self.max_radius_m.is_finite() || self.max_radius_m <= 0.0 {
            return Err("Max radius must be positive and finite".to_string());
        }

        if self.backoff_base_ms == 0 {
            return Err("Backoff base must be greater than zero".to_string());
        }

        if self.backoff_max_ms < self.backoff_base_ms {
            return Err("Backoff cap must be >= base".to_string());
        }

        if self.batch_size_unmetered == 0 || self.batch_size_metered == 0 {
            return Err("Batch sizes must be greater than zero".to_string());
        }

        Ok(())
    }

    /// Load configuration from JSON string
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        let config: Config = serde_json::from_str(json)?;
        if let Err(e) = config.validate() {
            return Err(Error::custom(e));
        }
        Ok(config)
    }

    /// Save configuration as JSON string
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cell_size_deg: Self::default_cell_size_deg(),
            max_radius_m: Self::default_max_radius_m(),
            backoff_base_ms: Self::default_backoff_base_ms(),
            backoff_max_ms: Self::default_backoff_max_ms(),
            batch_size_unmetered: Self::default_batch_size_unmetered(),
            batch_size_metered: Self::default_batch_size_metered(),
            sync_policy: SyncPolicy::default(),
            sync_mode: SyncMode::default(),
            journal_compact_bytes: Self::default_journal_compact_bytes(),
        }
    }
}

/// A single reported device position.
///
/// Fixes are consumed once per `evaluate` call and never persisted by the
/// core.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub point: Point,
    /// Reported horizontal accuracy in meters.
    pub accuracy_m: f64,
    pub timestamp: SystemTime,
}

impl LocationFix {
    /// Create a fix at (lon, lat) stamped now.
    pub fn new(lon: f64, lat: f64, accuracy_m: f64) -> Self {
        Self {
            point: Point::new(lon, lat),
            accuracy_m,
            timestamp: SystemTime::now(),
        }
    }

    /// Create a fix with an explicit timestamp.
    pub fn at(lon: f64, lat: f64, accuracy_m: f64, timestamp: SystemTime) -> Self {
        Self {
            point: Point::new(lon, lat),
            accuracy_m,
            timestamp,
        }
    }
}

/// Whether a transition crossed into or out of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Enter,
    Exit,
}

impl TransitionKind {
    /// Ordering rank within a batch: entries sort before exits at equal
    /// timestamps so entry confirmation is never starved by a later exit.
    pub(crate) fn rank(self) -> u8 {
        match self {
            TransitionKind::Enter => 0,
            TransitionKind::Exit => 1,
        }
    }
}

/// A detected boundary crossing.
///
/// Created only by the state tracker on a state flip; immutable after
/// creation except for `synced`, which the sync engine flips exactly once on
/// confirmed delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub id: Uuid,
    pub region_id: String,
    pub kind: TransitionKind,
    /// The fix that triggered the transition.
    pub fix: LocationFix,
    pub timestamp: SystemTime,
    pub synced: bool,
}

impl TransitionEvent {
    pub fn new(region_id: impl Into<String>, kind: TransitionKind, fix: &LocationFix) -> Self {
        Self {
            id: Uuid::new_v4(),
            region_id: region_id.into(),
            kind,
            fix: *fix,
            timestamp: fix.timestamp,
            synced: false,
        }
    }
}

/// Outcome of a flush attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushOutcome {
    /// Events confirmed by every sink and marked synced.
    pub synced: usize,
    /// Events that remain queued after a failed attempt.
    pub failed: usize,
}

/// Engine statistics for diagnostics and telemetry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineStats {
    /// Number of live regions.
    pub region_count: usize,
    /// Regions with a circular shape.
    pub circle_count: usize,
    /// Regions with a polygonal shape.
    pub polygon_count: usize,
    /// Total time rules across all regions.
    pub time_rule_count: usize,
    /// Total conditional rules across all regions.
    pub conditional_rule_count: usize,
    /// Unsynced events waiting in the offline queue.
    pub pending_events: usize,
    /// Occupied buckets in the grid index.
    pub index_bucket_count: usize,
    /// Total `evaluate` calls performed.
    pub evaluations: u64,
    /// Total transitions emitted.
    pub transitions_emitted: u64,
}
