//! Property-based tests for trees and proof ops.

use proptest::prelude::*;

use crate::crypto::{sha256, Hash};
use crate::merkle::{MerkleTree, TreeKind};
use crate::ops::ProofOp;

fn arb_hash() -> impl Strategy<Value = Hash> {
    prop::array::uniform32(any::<u8>()).prop_map(Hash::from_bytes)
}

fn arb_kind() -> impl Strategy<Value = TreeKind> {
    prop_oneof![Just(TreeKind::Chainpoint), Just(TreeKind::Bitcoin)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Every leaf's proof replays to the root.
    #[test]
    fn prop_every_leaf_verifies(
        leaves in prop::collection::vec(arb_hash(), 1..40),
        kind in arb_kind(),
    ) {
        let tree = MerkleTree::new(leaves.clone(), kind).unwrap();
        let root = tree.root();
        for (i, leaf) in leaves.iter().enumerate() {
            let ops = tree.proof(i).unwrap();
            prop_assert!(MerkleTree::verify(leaf, &ops, &root));
        }
    }

    /// A proof does not verify for a different leaf.
    #[test]
    fn prop_wrong_leaf_fails(
        leaves in prop::collection::vec(arb_hash(), 2..20),
        kind in arb_kind(),
    ) {
        let tree = MerkleTree::new(leaves.clone(), kind).unwrap();
        let ops = tree.proof(0).unwrap();
        let other = sha256(leaves[0].as_bytes());
        prop_assert!(!MerkleTree::verify(&other, &ops, &tree.root()));
    }

    /// Proof ops survive a JSON round trip.
    #[test]
    fn prop_ops_json_stable(leaves in prop::collection::vec(arb_hash(), 1..16)) {
        let tree = MerkleTree::new(leaves, TreeKind::Bitcoin).unwrap();
        let ops = tree.proof(0).unwrap();
        let json = serde_json::to_string(&ops).unwrap();
        let parsed: Vec<ProofOp> = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(parsed, ops);
    }

    /// Building the same tree twice gives the same root.
    #[test]
    fn prop_root_deterministic(
        leaves in prop::collection::vec(arb_hash(), 1..80),
        kind in arb_kind(),
    ) {
        let a = MerkleTree::new(leaves.clone(), kind).unwrap().root();
        let b = MerkleTree::new(leaves, kind).unwrap().root();
        prop_assert_eq!(a, b);
    }
}
