//! Deterministic seeded leader election.
//!
//! Every node evaluates the same function over the same inputs, so leaders
//! are agreed without any messages:
//!
//! 1. sort candidates by ordering key, descending
//! 2. derive an index from the seed (the latest block hash) with a seeded PRNG
//! 3. rotate the sorted list left by that index and take the first `n`

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::node::CoreId;

/// Something that can stand for election.
pub trait ElectionKey {
    /// Stable ordering key.
    fn election_key(&self) -> &str;

    /// The Core this candidate represents.
    fn core_id(&self) -> &CoreId;
}

/// A generic candidate: a Core plus its ordering key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Candidate Core.
    pub id: CoreId,
    /// Ordering key.
    pub key: String,
}

impl Candidate {
    /// A candidate keyed by its own id.
    pub fn from_id(id: CoreId) -> Self {
        let key = id.as_str().to_string();
        Self { id, key }
    }
}

impl ElectionKey for Candidate {
    fn election_key(&self) -> &str {
        &self.key
    }

    fn core_id(&self) -> &CoreId {
        &self.id
    }
}

/// Map a seed to an index in `0..upper`.
///
/// The first 8 bytes of the seed (zero-padded) are read as a big-endian
/// signed integer and used to seed [`StdRng`]. An `upper` of zero is
/// treated as one.
pub fn seeded_index(seed: &[u8], upper: usize) -> usize {
    let mut buf = [0u8; 8];
    let n = seed.len().min(8);
    buf[..n].copy_from_slice(&seed[..n]);
    let seed_int = i64::from_be_bytes(buf);

    let mut rng = StdRng::seed_from_u64(seed_int as u64);
    rng.gen_range(0..upper.max(1))
}

/// Elect `num_leaders` candidates.
///
/// - empty input returns an empty list
/// - `num_leaders >= candidates.len()` returns only the head of the sorted list
pub fn elect_leaders<T: ElectionKey + Clone>(
    candidates: &[T],
    seed: &[u8],
    num_leaders: usize,
) -> Vec<T> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let mut sorted = candidates.to_vec();
    sorted.sort_by(|a, b| b.election_key().cmp(a.election_key()));

    if num_leaders >= sorted.len() {
        sorted.truncate(1);
        return sorted;
    }

    let index = seeded_index(seed, sorted.len());
    sorted.rotate_left(index);
    sorted.truncate(num_leaders);
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(keys: &[&str]) -> Vec<Candidate> {
        keys.iter().map(|k| Candidate::from_id(CoreId::new(*k))).collect()
    }

    #[test]
    fn test_empty_input() {
        let out: Vec<Candidate> = elect_leaders(&[], b"seed", 1);
        assert!(out.is_empty());
    }

    #[test]
    fn test_degenerate_returns_sort_head() {
        let c = candidates(&["a", "c", "b"]);
        let out = elect_leaders(&c, b"any seed at all", 3);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].key, "c");

        let out = elect_leaders(&c, b"another", 10);
        assert_eq!(out[0].key, "c");
    }

    #[test]
    fn test_single_candidate() {
        let c = candidates(&["only"]);
        assert_eq!(elect_leaders(&c, b"x", 1), c);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let c = candidates(&["n1", "n2", "n3", "n4", "n5"]);
        let seed = [7u8; 32];
        let a = elect_leaders(&c, &seed, 2);
        let b = elect_leaders(&c, &seed, 2);
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn test_input_order_irrelevant() {
        let c = candidates(&["n1", "n2", "n3", "n4"]);
        let mut reversed = c.clone();
        reversed.reverse();
        let seed = [42u8; 32];
        assert_eq!(elect_leaders(&c, &seed, 2), elect_leaders(&reversed, &seed, 2));
    }

    #[test]
    fn test_result_is_rotation_prefix() {
        let c = candidates(&["n1", "n2", "n3", "n4"]);
        let seed = b"block-hash-bytes";
        let index = seeded_index(seed, 4);
        let sorted = ["n4", "n3", "n2", "n1"];

        let out = elect_leaders(&c, seed, 2);
        assert_eq!(out[0].key, sorted[index]);
        assert_eq!(out[1].key, sorted[(index + 1) % 4]);
    }

    #[test]
    fn test_short_seed_is_padded() {
        assert_eq!(seeded_index(&[1, 2], 10), seeded_index(&[1, 2, 0, 0, 0, 0, 0, 0, 9], 10));
        assert!(seeded_index(&[], 3) < 3);
        assert_eq!(seeded_index(&[7], 0), 0);
    }
}
