//! Collapse state that outlives a forest
//!
//! Collapsed threads are remembered by the Message-ID of the collapsed node,
//! so the state can be reapplied after a rebuild and stored on disk between
//! sessions. Nodes without an id (anonymous messages, groups) can still be
//! collapsed but that is lost on rebuild.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ThreadError};

use super::container::Forest;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollapseState {
    collapsed: HashSet<String>,
}

/// Serializable format for disk storage
#[derive(Serialize, Deserialize)]
struct StoredCollapseState {
    collapsed: Vec<String>,
    version: u32,
}

impl CollapseState {
    /// Current on-disk format version
    const STATE_VERSION: u32 = 1;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_collapsed(&self, message_id: &str) -> bool {
        self.collapsed.contains(message_id)
    }

    /// Record a node's state. Returns true if it changed.
    pub fn set(&mut self, message_id: &str, collapsed: bool) -> bool {
        if collapsed {
            self.collapsed.insert(message_id.to_string())
        } else {
            self.collapsed.remove(message_id)
        }
    }

    pub fn len(&self) -> usize {
        self.collapsed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collapsed.is_empty()
    }

    pub fn clear(&mut self) {
        self.collapsed.clear();
    }

    /// Set the collapsed flag of every keyed node in `forest` from this state.
    /// Returns how many nodes ended up collapsed.
    ///
    /// State is keyed by Message-ID, so duplicates threaded as siblings all
    /// take the state last recorded for that id.
    pub fn apply(&self, forest: &mut Forest) -> usize {
        let mut applied = 0;
        for node in forest.nodes.iter_mut().filter(|node| !node.pruned) {
            if let Some(id) = node.message_id.as_deref() {
                node.collapsed = self.collapsed.contains(id);
                if node.collapsed {
                    applied += 1;
                }
            }
        }
        applied
    }

    /// Drop ids that no longer appear in `forest`.
    pub fn retain_present(&mut self, forest: &Forest) -> usize {
        let present: HashSet<&str> = forest
            .nodes
            .iter()
            .filter(|node| !node.pruned)
            .filter_map(|node| node.message_id.as_deref())
            .collect();
        let before = self.collapsed.len();
        self.collapsed.retain(|id| present.contains(id.as_str()));
        before - self.collapsed.len()
    }

    /// Load state from disk (bincode serialized)
    ///
    /// ## Errors
    ///
    /// Returns `ThreadError::NotFound` if the file doesn't exist
    /// Returns `ThreadError::VersionMismatch` if the format version is incompatible
    pub fn load_from_disk(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ThreadError::NotFound);
        }

        let data = std::fs::read(path).map_err(|e| ThreadError::IoError(e.to_string()))?;
        let stored: StoredCollapseState = bincode::deserialize(&data)
            .map_err(|e| ThreadError::DeserializeError(e.to_string()))?;

        if stored.version != Self::STATE_VERSION {
            return Err(ThreadError::VersionMismatch {
                expected: Self::STATE_VERSION,
                found: stored.version,
            });
        }

        log::info!(
            "Loaded collapse state from {}: {} threads",
            path.display(),
            stored.collapsed.len()
        );

        Ok(Self {
            collapsed: stored.collapsed.into_iter().collect(),
        })
    }

    /// Save state to disk, creating the parent directory if needed.
    pub fn save_to_disk(&self, path: &Path) -> Result<()> {
        let mut collapsed: Vec<String> = self.collapsed.iter().cloned().collect();
        collapsed.sort();
        let stored = StoredCollapseState {
            collapsed,
            version: Self::STATE_VERSION,
        };

        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| ThreadError::IoError(e.to_string()))?;
        }

        let data =
            bincode::serialize(&stored).map_err(|e| ThreadError::SerializeError(e.to_string()))?;
        std::fs::write(path, &data).map_err(|e| ThreadError::IoError(e.to_string()))?;

        log::debug!(
            "Saved collapse state to {}: {} threads ({} bytes)",
            path.display(),
            self.collapsed.len(),
            data.len()
        );
        Ok(())
    }
}
