// Bounded, append-only header chain with a duplicate-hash index and locator
// construction. Exclusively owned by the sync engine; other lanes work off
// cloned snapshots.

use std::collections::HashSet;

use crate::error::ChainError;
use crate::header::{Header, HeaderHash};

/// Maximum locator entries sent in a single `getheaders` request.
const MAX_LOCATOR_ENTRIES: usize = 64;
/// Entries at spacing 1 before the locator starts doubling its stride.
const LOCATOR_DENSE_STEP_COUNT: usize = 11;

/// A bounded, duplicate-free window of the most recent `W` headers.
#[derive(Debug, Clone)]
pub struct HeaderChain {
    window: usize,
    first_height: u64,
    headers: Vec<Header>,
    hashes: Vec<HeaderHash>,
    index: HashSet<HeaderHash>,
}

impl HeaderChain {
    /// Build a chain from a checkpoint: `first_height` is the checkpoint
    /// height and `headers` is the embedded window starting there.
    pub fn from_checkpoint(first_height: u64, headers: Vec<Header>, window: usize) -> Self {
        let mut hashes = Vec::with_capacity(headers.len());
        let mut index = HashSet::with_capacity(headers.len());
        for h in &headers {
            let hash = h.composite_hash();
            index.insert(hash);
            hashes.push(hash);
        }
        Self {
            window,
            first_height,
            headers,
            hashes,
            index,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn first_height(&self) -> u64 {
        self.first_height
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn tip_height(&self) -> Result<u64, ChainError> {
        if self.headers.is_empty() {
            return Err(ChainError::Empty);
        }
        Ok(self.first_height + self.headers.len() as u64 - 1)
    }

    pub fn tip(&self) -> Result<&Header, ChainError> {
        self.headers.last().ok_or(ChainError::Empty)
    }

    pub fn tip_hash(&self) -> Result<HeaderHash, ChainError> {
        self.hashes.last().copied().ok_or(ChainError::Empty)
    }

    pub fn contains_hash(&self, hash: &HeaderHash) -> bool {
        self.index.contains(hash)
    }

    /// Height of a header at position `i` in the in-memory window.
    fn height_at(&self, i: usize) -> u64 {
        self.first_height + i as u64
    }

    pub fn header_at_height(&self, height: u64) -> Option<&Header> {
        if height < self.first_height {
            return None;
        }
        let idx = (height - self.first_height) as usize;
        self.headers.get(idx)
    }

    pub fn hash_at_height(&self, height: u64) -> Option<HeaderHash> {
        if height < self.first_height {
            return None;
        }
        let idx = (height - self.first_height) as usize;
        self.hashes.get(idx).copied()
    }

    /// Append a header that must extend the current tip. Trims the window
    /// head if it exceeds `window` afterward.
    pub fn append(&mut self, header: Header) -> Result<(), ChainError> {
        let hash = header.composite_hash();
        if self.index.contains(&hash) {
            return Err(ChainError::Duplicate);
        }
        if !self.headers.is_empty() {
            let tip_hash = *self.hashes.last().unwrap();
            if header.prev_block != tip_hash {
                return Err(ChainError::NotTipSuccessor);
            }
        }
        self.index.insert(hash);
        self.headers.push(header);
        self.hashes.push(hash);

        while self.headers.len() > self.window {
            let evicted_hash = self.hashes.remove(0);
            self.headers.remove(0);
            self.index.remove(&evicted_hash);
            self.first_height += 1;
        }
        Ok(())
    }

    /// Exponentially-spaced ancestor hashes for `getheaders`.
    ///
    /// Step 1 for the first 11 entries, then doubling. Stops at height 0.
    /// Entries below `first_height` are skipped (not appended) unless the
    /// step has already reached 0, in which case genesis (32 zero bytes) is
    /// appended and the walk stops.
    pub fn build_locator(&self) -> Result<Vec<HeaderHash>, ChainError> {
        let tip_height = self.tip_height()?;
        let mut locator = Vec::with_capacity(MAX_LOCATOR_ENTRIES);
        let mut step: u64 = 1;
        let mut height = tip_height;
        let mut dense_count = 0usize;

        loop {
            if height >= self.first_height {
                if let Some(hash) = self.hash_at_height(height) {
                    locator.push(hash);
                }
            }
            // else: falls below our in-memory window, skip but keep walking.

            if height == 0 || locator.len() >= MAX_LOCATOR_ENTRIES {
                break;
            }

            if dense_count < LOCATOR_DENSE_STEP_COUNT {
                dense_count += 1;
            } else {
                step = step.saturating_mul(2);
            }

            if step == 0 {
                locator.push([0u8; 32]);
                break;
            }

            if step > height {
                locator.push([0u8; 32]);
                break;
            }
            height -= step;
        }

        Ok(locator)
    }

    /// Reconstruct a chain freshly loaded from the header store.
    pub fn from_loaded(first_height: u64, headers: Vec<Header>, window: usize) -> Self {
        Self::from_checkpoint(first_height, headers, window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_with(prev: [u8; 32], nonce: u32) -> Header {
        Header {
            nonce,
            time: 1_700_000_000 + nonce as u64,
            prev_block: prev,
            name_root: [0u8; 32],
            extra_nonce: [0u8; 24],
            reserved_root: [0u8; 32],
            witness_root: [0u8; 32],
            merkle_root: [0u8; 32],
            version: 0,
            bits: 0,
            mask: [0u8; 32],
        }
    }

    #[test]
    fn test_append_extends_tip() {
        let genesis = header_with([0u8; 32], 0);
        let genesis_hash = genesis.composite_hash();
        let mut chain = HeaderChain::from_checkpoint(0, vec![genesis], 150);

        let next = header_with(genesis_hash, 1);
        chain.append(next).unwrap();
        assert_eq!(chain.tip_height().unwrap(), 1);
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_append_rejects_non_successor() {
        let genesis = header_with([0u8; 32], 0);
        let mut chain = HeaderChain::from_checkpoint(0, vec![genesis], 150);
        let bad = header_with([9u8; 32], 1);
        assert!(matches!(chain.append(bad), Err(ChainError::NotTipSuccessor)));
    }

    #[test]
    fn test_append_rejects_duplicate() {
        let genesis = header_with([0u8; 32], 0);
        let genesis_hash = genesis.composite_hash();
        let mut chain = HeaderChain::from_checkpoint(0, vec![genesis], 150);
        let next = header_with(genesis_hash, 1);
        chain.append(next.clone()).unwrap();
        let dup = header_with(genesis_hash, 1);
        assert!(matches!(chain.append(dup), Err(ChainError::Duplicate)));
    }

    #[test]
    fn test_window_trims_head() {
        let mut headers = vec![header_with([0u8; 32], 0)];
        let mut chain = HeaderChain::from_checkpoint(0, headers.clone(), 3);
        for i in 1..6u32 {
            let prev = chain.tip_hash().unwrap();
            let h = header_with(prev, i);
            chain.append(h.clone()).unwrap();
            headers.push(h);
        }
        assert_eq!(chain.len(), 3);
        assert_eq!(chain.tip_height().unwrap(), 5);
        assert_eq!(chain.first_height(), 3);
    }

    #[test]
    fn test_locator_single_header() {
        let genesis = header_with([0u8; 32], 0);
        let genesis_hash = genesis.composite_hash();
        let chain = HeaderChain::from_checkpoint(0, vec![genesis], 150);
        let locator = chain.build_locator().unwrap();
        assert_eq!(locator, vec![genesis_hash]);
    }

    #[test]
    fn test_locator_deterministic() {
        let mut chain = HeaderChain::from_checkpoint(0, vec![header_with([0u8; 32], 0)], 150);
        for i in 1..40u32 {
            let prev = chain.tip_hash().unwrap();
            chain.append(header_with(prev, i)).unwrap();
        }
        let a = chain.build_locator().unwrap();
        let b = chain.build_locator().unwrap();
        assert_eq!(a, b);
        assert!(a.len() <= MAX_LOCATOR_ENTRIES);
    }
}
