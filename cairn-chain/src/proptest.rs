//! Property-based tests for leader election.

use proptest::prelude::*;

use crate::election::{elect_leaders, seeded_index, Candidate};
use crate::node::CoreId;

fn arb_candidates() -> impl Strategy<Value = Vec<Candidate>> {
    prop::collection::hash_set("[a-z0-9]{1,12}", 1..24).prop_map(|keys| {
        keys.into_iter()
            .map(|k| Candidate::from_id(CoreId::new(k)))
            .collect()
    })
}

fn arb_seed() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..40)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Same inputs, same leaders; input order does not matter.
    #[test]
    fn prop_deterministic(
        candidates in arb_candidates(),
        seed in arb_seed(),
        n in 1usize..8,
    ) {
        let a = elect_leaders(&candidates, &seed, n);
        let mut shuffled = candidates.clone();
        shuffled.reverse();
        let b = elect_leaders(&shuffled, &seed, n);
        prop_assert_eq!(a, b);
    }

    /// Leaders are a contiguous (cyclic) slice of the descending sort.
    #[test]
    fn prop_rotation_prefix(
        candidates in arb_candidates(),
        seed in arb_seed(),
        n in 1usize..8,
    ) {
        let leaders = elect_leaders(&candidates, &seed, n);
        let mut sorted = candidates.clone();
        sorted.sort_by(|a, b| b.key.cmp(&a.key));

        if n >= sorted.len() {
            prop_assert_eq!(leaders, vec![sorted[0].clone()]);
        } else {
            let index = seeded_index(&seed, sorted.len());
            prop_assert_eq!(leaders.len(), n);
            for (i, leader) in leaders.iter().enumerate() {
                prop_assert_eq!(leader, &sorted[(index + i) % sorted.len()]);
            }
        }
    }

    /// The seeded index stays in range.
    #[test]
    fn prop_index_in_range(seed in arb_seed(), upper in 1usize..1000) {
        prop_assert!(seeded_index(&seed, upper) < upper);
    }
}
