//! Durable ordered queue of unsynced transitions.
//!
//! Events live here from emission until a flush confirms delivery through
//! every sink. With a journal attached, each append and each confirmation
//! is written ahead of the in-memory update, so nothing enqueued is lost
//! before `synced` flips true.

use crate::error::Result;
use crate::journal::{EventJournal, JournalCommand};
use crate::types::{SyncMode, SyncPolicy, TransitionEvent};
use rustc_hash::FxHashSet;
use std::time::SystemTime;
use uuid::Uuid;

/// Offline buffer between the state tracker and the sync engine.
pub struct OfflineQueue {
    events: Vec<TransitionEvent>,
    journal: Option<EventJournal>,
    sync_policy: SyncPolicy,
    sync_mode: SyncMode,
}

impl OfflineQueue {
    /// A queue with no persistence; events survive only as long as the
    /// process.
    pub fn in_memory() -> Self {
        Self {
            events: Vec::new(),
            journal: None,
            sync_policy: SyncPolicy::Never,
            sync_mode: SyncMode::All,
        }
    }

    /// A queue backed by a journal. Replays the journal to restore events
    /// that were enqueued but never confirmed.
    pub fn with_journal(
        mut journal: EventJournal,
        sync_policy: SyncPolicy,
        sync_mode: SyncMode,
    ) -> Result<Self> {
        let commands = journal.replay()?;

        let mut events: Vec<TransitionEvent> = Vec::new();
        let mut confirmed: FxHashSet<Uuid> = FxHashSet::default();
        for command in commands {
            match command {
                JournalCommand::Append(event) => events.push(event),
                JournalCommand::MarkSynced(id) => {
                    confirmed.insert(id);
                }
            }
        }
        events.retain(|e| !confirmed.contains(&e.id));

        if !events.is_empty() {
            log::info!("restored {} unsynced transition(s) from journal", events.len());
        }

        Ok(Self {
            events,
            journal: Some(journal),
            sync_policy,
            sync_mode,
        })
    }

    /// Append an event, journaling it first when persistence is on.
    pub fn enqueue(&mut self, event: TransitionEvent) -> Result<()> {
        if let Some(journal) = self.journal.as_mut() {
            journal.append_event(&event)?;
            journal.maybe_sync(self.sync_policy, self.sync_mode)?;
        }
        self.events.push(event);
        Ok(())
    }

    /// Unsynced events for the next flush, oldest first. Enter events order
    /// before Exit events at equal timestamps so entry confirmation is not
    /// starved by a later exit.
    pub fn unsynced_batch(&self, limit: usize) -> Vec<TransitionEvent> {
        let mut batch: Vec<TransitionEvent> =
            self.events.iter().filter(|e| !e.synced).cloned().collect();
        batch.sort_by_key(|e| (e.timestamp, e.kind.rank()));
        batch.truncate(limit);
        batch
    }

    /// Flip `synced` for the given event ids, journal the confirmations,
    /// and prune the synced entries. Returns how many events flipped.
    pub fn mark_synced(&mut self, ids: &[Uuid]) -> Result<usize> {
        let id_set: FxHashSet<&Uuid> = ids.iter().collect();
        let mut flipped = 0;

        for event in self.events.iter_mut() {
            if !event.synced && id_set.contains(&event.id) {
                if let Some(journal) = self.journal.as_mut() {
                    journal.append_synced(&event.id)?;
                }
                event.synced = true;
                flipped += 1;
            }
        }

        if flipped > 0 {
            self.prune_synced();
            if let Some(journal) = self.journal.as_mut() {
                journal.maybe_sync(self.sync_policy, self.sync_mode)?;
                if journal.should_compact() {
                    let live = self.events.clone();
                    if let Err(err) = journal.compact(&live) {
                        log::warn!("journal compaction failed: {err}");
                    }
                }
            }
        }

        Ok(flipped)
    }

    /// Unsynced events waiting for delivery.
    pub fn pending(&self) -> usize {
        self.events.iter().filter(|e| !e.synced).count()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Timestamp of the oldest unsynced event, if any.
    pub fn oldest_pending(&self) -> Option<SystemTime> {
        self.events
            .iter()
            .filter(|e| !e.synced)
            .map(|e| e.timestamp)
            .min()
    }

    /// Drop already-confirmed entries. Normally a no-op since confirmation
    /// prunes inline.
    pub fn clear_synced(&mut self) {
        self.prune_synced();
    }

    /// Administrative purge: drop every event, synced or not, and compact
    /// the journal down to nothing.
    pub fn purge(&mut self) -> Result<usize> {
        let dropped = self.events.len();
        self.events.clear();
        if let Some(journal) = self.journal.as_mut() {
            journal.compact(&[])?;
        }
        Ok(dropped)
    }

    /// Force the journal to disk regardless of policy.
    pub fn sync_journal(&mut self) -> Result<()> {
        if let Some(journal) = self.journal.as_mut() {
            journal.sync_with_mode(self.sync_mode)?;
        }
        Ok(())
    }

    fn prune_synced(&mut self) {
        self.events.retain(|e| !e.synced);
    }
}
