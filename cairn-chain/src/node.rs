//! Node identity and the local view of the network.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::validators::ValidatorSet;

/// Opaque identifier of a Core.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CoreId(String);

impl CoreId {
    /// Create an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CoreId({})", self.0)
    }
}

impl fmt::Display for CoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CoreId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// What this node currently knows about itself and its peers.
///
/// Updated by the network layer; read by leader election.
#[derive(Debug, Clone, Default)]
pub struct NodeView {
    /// This node's id, once known.
    pub id: Option<CoreId>,
    /// Whether the node is still syncing the log.
    pub catching_up: bool,
    /// Connected peers (excluding self).
    pub peers: Vec<CoreId>,
    /// Active validators.
    pub validators: ValidatorSet,
}

impl NodeView {
    /// A synced node with the given id.
    pub fn new(id: impl Into<CoreId>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    /// Set connected peers.
    pub fn with_peers(mut self, peers: Vec<CoreId>) -> Self {
        self.peers = peers;
        self
    }

    /// Set the validator set.
    pub fn with_validators(mut self, validators: ValidatorSet) -> Self {
        self.validators = validators;
        self
    }

    /// Mark the node as catching up.
    pub fn catching_up(mut self, catching_up: bool) -> Self {
        self.catching_up = catching_up;
        self
    }

    /// Whether `id` is this node.
    pub fn is_self(&self, id: &CoreId) -> bool {
        self.id.as_ref() == Some(id)
    }
}
