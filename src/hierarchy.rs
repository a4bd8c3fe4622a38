//! Parent/child relationships between regions.
//!
//! The ledger keeps hierarchy edges out of the region structs themselves so
//! there is a single source of truth. Edges always form a forest; a link
//! that would close a cycle is rejected.

use crate::error::{PerimeterError, Result};
use rustc_hash::{FxHashMap, FxHashSet};

/// Forest of region parent/child edges.
#[derive(Debug, Default)]
pub struct HierarchyLedger {
    parents: FxHashMap<String, String>,
    children: FxHashMap<String, FxHashSet<String>>,
}

impl HierarchyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link `child` under `parent`.
    ///
    /// Re-linking a child moves it to the new parent. Fails with
    /// `HierarchyCycle` when `parent` is `child` itself or one of its
    /// descendants.
    pub fn link(&mut self, child: &str, parent: &str) -> Result<()> {
        if child == parent || self.is_descendant(parent, child) {
            return Err(PerimeterError::HierarchyCycle {
                child: child.to_string(),
                parent: parent.to_string(),
            });
        }

        if let Some(old_parent) = self.parents.insert(child.to_string(), parent.to_string()) {
            self.remove_child_edge(&old_parent, child);
        }
        self.children
            .entry(parent.to_string())
            .or_default()
            .insert(child.to_string());
        Ok(())
    }

    /// Detach a region from the hierarchy: clear its parent pointer and
    /// orphan its children. Detach, don't delete — removing the region
    /// itself is a separate operation.
    pub fn unlink(&mut self, region_id: &str) {
        if let Some(parent) = self.parents.remove(region_id) {
            self.remove_child_edge(&parent, region_id);
        }

        if let Some(kids) = self.children.remove(region_id) {
            for kid in kids {
                self.parents.remove(&kid);
            }
        }
    }

    /// Direct children of a region.
    pub fn children(&self, region_id: &str) -> Vec<String> {
        self.children
            .get(region_id)
            .map(|set| {
                let mut ids: Vec<String> = set.iter().cloned().collect();
                ids.sort();
                ids
            })
            .unwrap_or_default()
    }

    /// Parent of a region, if linked.
    pub fn parent(&self, region_id: &str) -> Option<&str> {
        self.parents.get(region_id).map(String::as_str)
    }

    /// Walk ancestors of `node` looking for `ancestor`.
    fn is_descendant(&self, node: &str, ancestor: &str) -> bool {
        let mut current = self.parents.get(node);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.parents.get(parent);
        }
        false
    }

    fn remove_child_edge(&mut self, parent: &str, child: &str) {
        if let Some(set) = self.children.get_mut(parent) {
            set.remove(child);
            if set.is_empty() {
                self.children.remove(parent);
            }
        }
    }
}
