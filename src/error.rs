//! Error types for the perimeter engine.

use thiserror::Error;

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PerimeterError>;

/// Errors produced by region validation, evaluation, and the offline queue.
#[derive(Debug, Error)]
pub enum PerimeterError {
    /// Latitude or longitude outside the valid WGS84 range, or not finite.
    #[error("invalid coordinate: lat {lat}, lon {lon}")]
    InvalidCoordinate { lat: f64, lon: f64 },

    /// Circle radius that is non-positive, non-finite, or above the configured cap.
    #[error("invalid radius: {0} meters")]
    InvalidRadius(f64),

    /// Polygon with fewer than three vertices.
    #[error("polygon needs at least 3 vertices, got {0}")]
    DegeneratePolygon(usize),

    /// A region with this id is already registered.
    #[error("duplicate region id: {0}")]
    DuplicateRegion(String),

    /// No live region with this id.
    #[error("unknown region id: {0}")]
    UnknownRegion(String),

    /// Linking these regions would create a cycle in the hierarchy.
    #[error("hierarchy cycle: {parent} is a descendant of {child}")]
    HierarchyCycle { child: String, parent: String },

    /// Generic invalid input with a human-readable description.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Operation attempted on a closed engine.
    #[error("engine is closed")]
    EngineClosed,

    /// Timestamp before the Unix epoch or otherwise unrepresentable.
    #[error("invalid timestamp")]
    InvalidTimestamp,

    /// Journal ended mid-record during replay.
    #[error("unexpected end of journal")]
    UnexpectedEof,

    /// Journal contains a record the current format does not understand.
    #[error("invalid journal format")]
    InvalidFormat,

    /// A journal compaction is already running.
    #[error("journal compaction in progress")]
    CompactionInProgress,

    /// A delivery sink rejected a batch.
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),

    /// Underlying I/O failure from the journal file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
