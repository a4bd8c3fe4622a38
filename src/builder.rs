//! Engine builder for flexible configuration.
//!
//! The builder covers everything the plain constructors do, plus journal
//! paths, delivery sinks, and a custom condition evaluator in one place.

use crate::engine::{Engine, EngineInner};
use crate::error::{PerimeterError, Result};
use crate::journal::{EventJournal, JournalConfig};
use crate::queue::OfflineQueue;
use crate::rules::ConditionEvaluator;
use crate::sync::DeliverySink;
use crate::types::Config;
use std::path::PathBuf;
use std::sync::Arc;

/// Builder for an [`Engine`] with custom persistence and wiring.
///
/// # Examples
///
/// ```rust
/// use perimeter::Engine;
///
/// let temp = std::env::temp_dir().join("perimeter_builder_demo.journal");
/// # let _ = std::fs::remove_file(&temp);
/// let engine = Engine::builder().journal_path(&temp).build()?;
/// # std::fs::remove_file(temp).ok();
/// # Ok::<(), perimeter::PerimeterError>(())
/// ```
pub struct EngineBuilder {
    journal_path: Option<PathBuf>,
    config: Config,
    in_memory: bool,
    sinks: Vec<Arc<dyn DeliverySink>>,
    evaluator: Option<Arc<dyn ConditionEvaluator>>,
}

impl EngineBuilder {
    /// Create a new builder with default in-memory configuration.
    pub fn new() -> Self {
        Self {
            journal_path: None,
            config: Config::default(),
            in_memory: true,
            sinks: Vec::new(),
            evaluator: None,
        }
    }

    /// Journal the offline queue at this path. The file is created if
    /// needed and replayed on startup.
    pub fn journal_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.journal_path = Some(path.into());
        self.in_memory = false;
        self
    }

    /// Keep the queue purely in memory, with no persistence.
    pub fn in_memory(mut self) -> Self {
        self.in_memory = true;
        self.journal_path = None;
        self
    }

    /// Set the engine configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Register a delivery sink up front.
    pub fn sink(mut self, sink: Arc<dyn DeliverySink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Install a conditional-rule evaluator.
    pub fn condition_evaluator(mut self, evaluator: Arc<dyn ConditionEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Build the engine, opening and replaying the journal if configured.
    pub fn build(self) -> Result<Engine> {
        self.config.validate().map_err(PerimeterError::InvalidInput)?;

        let queue = if self.in_memory {
            OfflineQueue::in_memory()
        } else {
            let path = self.journal_path.expect("journal path set with in_memory false");
            let journal = EventJournal::open_with_config(
                &path,
                JournalConfig {
                    compact_size_threshold: self.config.journal_compact_bytes,
                },
            )?;
            OfflineQueue::with_journal(journal, self.config.sync_policy, self.config.sync_mode)?
        };

        let mut inner = EngineInner::new_with_config(self.config);
        if let Some(evaluator) = self.evaluator {
            inner.evaluator = evaluator;
        }

        let engine = Engine::from_parts(inner, queue);
        for sink in self.sinks {
            engine.add_sink(sink);
        }
        Ok(engine)
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Region;
    use crate::types::LocationFix;
    use geo::Point;
    use tempfile::NamedTempFile;

    #[test]
    fn test_builder_default_is_in_memory() {
        let builder = EngineBuilder::new();
        assert!(builder.in_memory);
        assert!(builder.build().is_ok());
    }

    #[test]
    fn test_builder_journal_path_disables_in_memory() {
        let temp = NamedTempFile::new().unwrap();
        let builder = EngineBuilder::new().in_memory().journal_path(temp.path());
        assert!(!builder.in_memory);
        assert!(builder.journal_path.is_some());
    }

    #[test]
    fn test_builder_in_memory_clears_journal_path() {
        let builder = EngineBuilder::new().journal_path("/tmp/never.journal").in_memory();
        assert!(builder.in_memory);
        assert!(builder.journal_path.is_none());
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let mut config = Config::default();
        config.batch_size_metered = 0;
        assert!(EngineBuilder::new().config(config).build().is_err());
    }

    #[test]
    fn test_builder_journal_round_trip() {
        let temp = NamedTempFile::new().unwrap();

        {
            let engine = EngineBuilder::new().journal_path(temp.path()).build().unwrap();
            engine
                .add_region(Region::circle("r", Point::new(0.0, 0.0), 500.0).unwrap())
                .unwrap();
            engine.evaluate(&LocationFix::new(0.0, 0.0, 5.0)).unwrap();
            assert_eq!(engine.pending_events(), 1);
        }

        // Reopen: the unsynced event survived the restart.
        let engine = EngineBuilder::new().journal_path(temp.path()).build().unwrap();
        assert_eq!(engine.pending_events(), 1);
    }
}
