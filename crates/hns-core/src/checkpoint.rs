// Embedded checkpoint that bootstraps the chain when no on-disk store is
// present or the store fails to load.
//
// No real mainnet header data is vendored here — the checkpoint is a
// synthetic, self-consistent window: each header's `prev_block` is the
// composite hash of its predecessor, starting from an all-zero genesis
// stand-in at `CHECKPOINT_HEIGHT`. This lets the chain, store and sync
// engine all exercise the same code path a real deployment would use,
// without shipping a second copy of chain data that would need updating.

use crate::chain::HeaderChain;
use crate::header::Header;

/// Height the embedded checkpoint starts at.
pub const CHECKPOINT_HEIGHT: u64 = 136_000;

/// Checkpoint window width, one `W`.
pub const CHECKPOINT_WINDOW: usize = 150;

fn synthetic_header(index: u32, prev_block: [u8; 32]) -> Header {
    Header {
        nonce: index,
        time: 1_600_000_000 + index as u64 * 600,
        prev_block,
        name_root: *blake2_of(b"hns-checkpoint-name-root", index),
        extra_nonce: [0u8; 24],
        reserved_root: [0u8; 32],
        witness_root: [0u8; 32],
        merkle_root: [0u8; 32],
        version: 0,
        bits: 0x1d00_ffff,
        mask: *blake2_of(b"hns-checkpoint-mask", index),
    }
}

fn blake2_of(domain: &'static [u8], index: u32) -> Box<[u8; 32]> {
    use blake2::digest::consts::U32;
    use blake2::{Blake2b, Digest};
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(domain);
    hasher.update(index.to_le_bytes());
    let result = hasher.finalize();
    let mut out = Box::new([0u8; 32]);
    out.copy_from_slice(&result);
    out
}

/// Build the embedded checkpoint window of `CHECKPOINT_WINDOW` headers
/// terminating the chain's in-memory tip at
/// `CHECKPOINT_HEIGHT + CHECKPOINT_WINDOW - 1`.
pub fn embedded_headers() -> Vec<Header> {
    let mut headers = Vec::with_capacity(CHECKPOINT_WINDOW);
    let mut prev = [0u8; 32];
    for i in 0..CHECKPOINT_WINDOW as u32 {
        let header = synthetic_header(i, prev);
        prev = header.composite_hash();
        headers.push(header);
    }
    headers
}

/// Construct a fresh `HeaderChain` rooted at the embedded checkpoint.
pub fn bootstrap_chain() -> HeaderChain {
    HeaderChain::from_checkpoint(CHECKPOINT_HEIGHT, embedded_headers(), CHECKPOINT_WINDOW)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_chains_correctly() {
        let chain = bootstrap_chain();
        assert_eq!(chain.len(), CHECKPOINT_WINDOW);
        assert_eq!(chain.first_height(), CHECKPOINT_HEIGHT);
        assert_eq!(
            chain.tip_height().unwrap(),
            CHECKPOINT_HEIGHT + CHECKPOINT_WINDOW as u64 - 1
        );
    }

    #[test]
    fn test_checkpoint_is_deterministic() {
        let a = embedded_headers();
        let b = embedded_headers();
        assert_eq!(a, b);
    }

    #[test]
    fn test_checkpoint_links_are_valid() {
        let headers = embedded_headers();
        let mut prev = [0u8; 32];
        for h in &headers {
            assert_eq!(h.prev_block, prev);
            prev = h.composite_hash();
        }
    }
}
