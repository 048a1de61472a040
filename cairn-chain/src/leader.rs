//! Leader election policies.
//!
//! Three policies share [`elect_leaders`] but differ in their candidate
//! pool: connected peers, active validators, and recent calendar
//! contributors. All of them seed the election with the current block hash.

use tracing::debug;

use crate::election::{elect_leaders, Candidate, ElectionKey};
use crate::node::{CoreId, NodeView};
use crate::state::AnchorState;

/// Outcome of an election from this node's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Election {
    /// Whether this node should act as leader.
    pub is_leader: bool,
    /// Elected Cores.
    pub leaders: Vec<CoreId>,
}

impl Election {
    /// No leaders; nobody acts this block.
    pub fn none() -> Self {
        Self::default()
    }

    /// Whether any leader was elected.
    pub fn has_leaders(&self) -> bool {
        !self.leaders.is_empty()
    }
}

/// Leader election over a node view and replicated state.
pub struct LeaderElection<'a> {
    view: &'a NodeView,
    state: &'a AnchorState,
}

impl<'a> LeaderElection<'a> {
    /// Create an election context.
    pub fn new(view: &'a NodeView, state: &'a AnchorState) -> Self {
        Self { view, state }
    }

    /// Elect among connected peers and self, keyed by Core id.
    pub fn peer_leader(&self, num_leaders: usize) -> Election {
        let mut candidates: Vec<Candidate> =
            self.view.peers.iter().cloned().map(Candidate::from_id).collect();
        if let Some(me) = &self.view.id {
            if !self.view.peers.contains(me) {
                candidates.push(Candidate::from_id(me.clone()));
            }
        }
        self.decide("peer", &candidates, num_leaders)
    }

    /// Elect among active validators, keyed by address, minus `exclude`.
    pub fn validator_leader(&self, num_leaders: usize, exclude: &[CoreId]) -> Election {
        let candidates: Vec<_> = self
            .view
            .validators
            .iter()
            .filter(|v| !exclude.contains(&v.id))
            .cloned()
            .collect();
        self.decide("validator", &candidates, num_leaders)
    }

    /// Elect among recent calendar contributors, minus `blacklist`.
    ///
    /// If the blacklist would remove every contributor, the unfiltered set is
    /// used so a lone contributor can still anchor after its own failure.
    pub fn contributor_leader(&self, num_leaders: usize, blacklist: &[CoreId]) -> Election {
        let mut eligible = self.state.contributors.eligible(blacklist);
        if eligible.is_empty() {
            eligible = self.state.contributors.eligible(&[]);
        }
        let candidates: Vec<Candidate> = eligible.into_iter().map(Candidate::from_id).collect();
        self.decide("contributor", &candidates, num_leaders)
    }

    fn decide<T: ElectionKey + Clone>(
        &self,
        policy: &str,
        candidates: &[T],
        num_leaders: usize,
    ) -> Election {
        let Some(me) = &self.view.id else {
            debug!(policy, "Node identity unknown, skipping election");
            return Election::none();
        };
        if candidates.is_empty() {
            debug!(policy, "No election candidates");
            return Election::none();
        }

        let seed = self.state.block_hash.as_bytes();
        let leaders: Vec<CoreId> = elect_leaders(candidates, seed, num_leaders)
            .iter()
            .map(|c| c.core_id().clone())
            .collect();
        let is_leader = !self.view.catching_up && leaders.contains(me);

        debug!(
            policy,
            height = self.state.height,
            ?leaders,
            is_leader,
            "Elected leaders"
        );
        Election { is_leader, leaders }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateMutation;
    use crate::validators::{Validator, ValidatorSet};
    use cairn_core::sha256;

    fn state_with_contributors(ids: &[&str]) -> AnchorState {
        let mut s = AnchorState::default();
        s.block_hash = sha256(b"block");
        for (i, id) in ids.iter().enumerate() {
            s.apply(&StateMutation::CalendarCommitted {
                seq: i as u64 + 1,
                core: (*id).into(),
            });
        }
        s
    }

    fn validators() -> ValidatorSet {
        ValidatorSet::new(vec![
            Validator::new("a", "addr-a"),
            Validator::new("b", "addr-b"),
            Validator::new("c", "addr-c"),
        ])
    }

    #[test]
    fn test_unknown_identity() {
        let view = NodeView::default().with_peers(vec!["a".into()]);
        let state = state_with_contributors(&["a"]);
        let e = LeaderElection::new(&view, &state).peer_leader(1);
        assert_eq!(e, Election::none());
    }

    #[test]
    fn test_sole_peer_is_leader() {
        let view = NodeView::new("a");
        let state = AnchorState::default();
        let e = LeaderElection::new(&view, &state).peer_leader(1);
        assert!(e.is_leader);
        assert_eq!(e.leaders, vec![CoreId::new("a")]);
    }

    #[test]
    fn test_catching_up_never_leads() {
        let view = NodeView::new("a").catching_up(true);
        let state = state_with_contributors(&["a"]);
        let e = LeaderElection::new(&view, &state).contributor_leader(1, &[]);
        assert!(!e.is_leader);
        assert_eq!(e.leaders, vec![CoreId::new("a")]);
    }

    #[test]
    fn test_all_nodes_agree() {
        let state = state_with_contributors(&["a", "b", "c", "d"]);
        let elections: Vec<Election> = ["a", "b", "c", "d"]
            .iter()
            .map(|id| {
                let view = NodeView::new(*id);
                LeaderElection::new(&view, &state).contributor_leader(1, &[])
            })
            .collect();

        assert!(elections.windows(2).all(|w| w[0].leaders == w[1].leaders));
        assert_eq!(elections.iter().filter(|e| e.is_leader).count(), 1);
    }

    #[test]
    fn test_contributor_blacklist() {
        let state = state_with_contributors(&["a", "b"]);
        let view = NodeView::new("a");
        let e = LeaderElection::new(&view, &state).contributor_leader(1, &["a".into()]);
        assert_eq!(e.leaders, vec![CoreId::new("b")]);
        assert!(!e.is_leader);
    }

    #[test]
    fn test_blacklist_of_everyone_falls_back() {
        let state = state_with_contributors(&["a"]);
        let view = NodeView::new("a");
        let e = LeaderElection::new(&view, &state).contributor_leader(1, &["a".into()]);
        assert!(e.is_leader);
    }

    #[test]
    fn test_no_contributors() {
        let state = AnchorState::default();
        let view = NodeView::new("a");
        assert!(!LeaderElection::new(&view, &state)
            .contributor_leader(1, &[])
            .has_leaders());
    }

    #[test]
    fn test_validator_exclusion() {
        let state = state_with_contributors(&[]);
        let view = NodeView::new("a").with_validators(validators());
        for excluded in ["a", "b", "c"] {
            let e = LeaderElection::new(&view, &state).validator_leader(1, &[excluded.into()]);
            assert_eq!(e.leaders.len(), 1);
            assert_ne!(e.leaders[0], CoreId::new(excluded));
        }

        let e = LeaderElection::new(&view, &state)
            .validator_leader(1, &["a".into(), "b".into(), "c".into()]);
        assert!(!e.has_leaders());
    }
}
