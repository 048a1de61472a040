//! Sliding window of recent calendar contributors.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::node::CoreId;

/// The `window` most recent distinct Cores that committed calendar
/// transactions, most recent first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainContributors {
    window: usize,
    recent: VecDeque<CoreId>,
}

impl ChainContributors {
    /// Create an empty window.
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            recent: VecDeque::new(),
        }
    }

    /// Record a calendar submission from `core`.
    pub fn record(&mut self, core: CoreId) {
        if let Some(pos) = self.recent.iter().position(|c| c == &core) {
            self.recent.remove(pos);
        }
        self.recent.push_front(core);
        self.recent.truncate(self.window);
    }

    /// Contributors, most recent first.
    pub fn recent(&self) -> impl Iterator<Item = &CoreId> {
        self.recent.iter()
    }

    /// Contributors not in `blacklist`.
    pub fn eligible(&self, blacklist: &[CoreId]) -> Vec<CoreId> {
        self.recent
            .iter()
            .filter(|c| !blacklist.contains(c))
            .cloned()
            .collect()
    }

    /// Number of tracked contributors.
    pub fn len(&self) -> usize {
        self.recent.len()
    }

    /// Whether no contributor has been seen.
    pub fn is_empty(&self) -> bool {
        self.recent.is_empty()
    }

    /// Window size.
    pub fn window(&self) -> usize {
        self.window
    }
}

impl Default for ChainContributors {
    fn default() -> Self {
        Self::new(10)
    }
}
