//! Embedded geofence evaluation engine with an offline event pipeline.
//!
//! Register circular and polygonal regions, feed in location fixes, and
//! consume enter/exit transitions through a durable queue that syncs to
//! delivery sinks with batching and exponential backoff — built for
//! unreliable connectivity.
//!
//! ```rust
//! use perimeter::{Engine, LocationFix, Region};
//! use geo::Point;
//!
//! let engine = Engine::new();
//! engine.add_region(Region::circle("office", Point::new(-74.0060, 40.7128), 150.0)?)?;
//!
//! let events = engine.evaluate(&LocationFix::new(-74.0060, 40.7128, 10.0))?;
//! assert_eq!(events.len(), 1); // entered the office
//! # Ok::<(), perimeter::PerimeterError>(())
//! ```

pub mod builder;
pub mod engine;
pub mod error;
pub mod grid;
pub mod hierarchy;
pub mod journal;
pub mod queue;
pub mod region;
pub mod rules;
pub mod sync;
pub mod tracker;
pub mod types;

pub use builder::EngineBuilder;
pub use engine::Engine;
pub use error::{PerimeterError, Result};

pub type Perimeter = Engine;

pub use geo::{Point, Polygon, Rect};

pub use region::{Region, RegionShape, validate_point};

pub use rules::{
    AlwaysHolds, ConditionEvaluator, ConditionKind, ConditionalRule, DaySet, RuleOperator,
    RuleValue, TimeRule,
};

pub use grid::GridIndex;

pub use hierarchy::HierarchyLedger;

pub use tracker::{RegionState, StateTracker};

pub use types::{
    Config, EngineStats, FlushOutcome, LocationFix, NetworkClass, NetworkState, SyncMode,
    SyncPolicy, TransitionEvent, TransitionKind,
};

pub use queue::OfflineQueue;

pub use sync::{Backoff, DeliverySink, SyncEngine};

pub use journal::{EventJournal, JournalConfig};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{Engine, EngineBuilder, Perimeter, PerimeterError, Result};

    pub use geo::{Point, Polygon, Rect};

    pub use crate::{Region, RegionShape};

    pub use crate::{ConditionEvaluator, ConditionalRule, DaySet, TimeRule};

    pub use crate::{Config, LocationFix, NetworkClass, NetworkState, TransitionEvent, TransitionKind};

    pub use crate::DeliverySink;

    pub use std::time::Duration;
}
