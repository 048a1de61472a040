//! Bitcoin proof fragments.

use cairn_core::{BtcTxFragment, Hash, MerkleTree, ProofOp, TreeKind};

use crate::errors::{AnchorError, Result};
use crate::provider::BtcBlock;

/// Ops leading from a txid to its block's Merkle root.
///
/// Recomputes the block tree from `block.txids` and fails with
/// [`AnchorError::BlockTreeIntegrity`] if it disagrees with the header.
pub fn btc_header_ops(btc_tx_id: &str, block: &BtcBlock) -> Result<Vec<ProofOp>> {
    let leaves = block
        .txids
        .iter()
        .map(|id| Hash::from_display_hex(id))
        .collect::<cairn_core::Result<Vec<_>>>()?;
    let tree = MerkleTree::new(leaves, TreeKind::Bitcoin)?;

    let computed = tree.root().to_display_hex();
    if !computed.eq_ignore_ascii_case(&block.merkle_root) {
        return Err(AnchorError::BlockTreeIntegrity {
            height: block.height,
            expected: block.merkle_root.clone(),
            computed,
        });
    }

    let leaf = Hash::from_display_hex(btc_tx_id)?;
    Ok(tree.proof_for(&leaf)?)
}

/// The root-to-txid fragment from an announced raw transaction.
///
/// The raw body must hash to `btc_tx_id` and contain `root`.
pub fn btc_tx_fragment(btc_tx_id: &str, raw_tx_hex: &str, root: &Hash) -> Result<BtcTxFragment> {
    let raw = hex::decode(raw_tx_hex)?;
    let txid = cairn_core::sha256d(&raw).to_display_hex();
    if !txid.eq_ignore_ascii_case(btc_tx_id) {
        return Err(AnchorError::InvalidAnnouncement(format!(
            "raw tx hashes to {}, announced {}",
            txid, btc_tx_id
        )));
    }
    BtcTxFragment::from_raw_tx(&raw, root)
        .map_err(|e| AnchorError::InvalidAnnouncement(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::{bitcoin_root_from_txids, replay_hash, sha256, sha256d};

    fn block(txids: Vec<String>) -> BtcBlock {
        let merkle_root = bitcoin_root_from_txids(&txids).unwrap().to_hex();
        BtcBlock {
            height: 812_000,
            merkle_root,
            txids,
        }
    }

    fn txids(n: usize) -> Vec<String> {
        (0..n)
            .map(|i| sha256d(format!("tx-{}", i).as_bytes()).to_display_hex())
            .collect()
    }

    #[test]
    fn test_header_ops_reach_block_root() {
        let b = block(txids(5));
        let target = &b.txids[3];
        let ops = btc_header_ops(target, &b).unwrap();

        let start = Hash::from_display_hex(target).unwrap();
        let root = replay_hash(&start, &ops).unwrap();
        assert_eq!(root.to_display_hex(), b.merkle_root);
    }

    #[test]
    fn test_corrupt_header_detected() {
        let mut b = block(txids(4));
        b.merkle_root = sha256(b"bogus").to_hex();
        let err = btc_header_ops(&b.txids[0], &b).unwrap_err();
        assert!(matches!(err, AnchorError::BlockTreeIntegrity { height: 812_000, .. }));
    }

    #[test]
    fn test_missing_tx_rejected() {
        let b = block(txids(3));
        let absent = sha256d(b"absent").to_display_hex();
        assert!(btc_header_ops(&absent, &b).is_err());
    }

    #[test]
    fn test_tx_fragment_checks_txid() {
        let root = sha256(b"root");
        let mut raw = vec![0x02, 0, 0, 0, 0x6a, 0x20];
        raw.extend_from_slice(root.as_bytes());
        raw.extend_from_slice(&[0, 0, 0, 0]);
        let txid = sha256d(&raw).to_display_hex();

        let frag = btc_tx_fragment(&txid, &hex::encode(&raw), &root).unwrap();
        assert_eq!(replay_hash(&root, &frag.ops).unwrap().to_display_hex(), txid);

        let wrong = sha256d(b"other").to_display_hex();
        assert!(matches!(
            btc_tx_fragment(&wrong, &hex::encode(&raw), &root),
            Err(AnchorError::InvalidAnnouncement(_))
        ));
    }
}
