// 236-byte block header layout and the composite Blake2b+SHA3 masked hash
// that is the header's sole identity.

use crate::codec::{Reader, Writer};
use crate::error::HeaderError;
use blake2::digest::consts::{U32, U64};
use blake2::{Blake2b, Digest};
use sha3::Sha3_256;

type Blake2b256 = Blake2b<U32>;
type Blake2b512 = Blake2b<U64>;

pub const HEADER_SIZE: usize = 236;

/// The composite hash — 32 bytes, used everywhere else in the system as a
/// header's identity.
pub type HeaderHash = [u8; 32];

/// Fixed-order fields of a block header, little-endian on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub nonce: u32,
    pub time: u64,
    pub prev_block: [u8; 32],
    pub name_root: [u8; 32],
    pub extra_nonce: [u8; 24],
    pub reserved_root: [u8; 32],
    pub witness_root: [u8; 32],
    pub merkle_root: [u8; 32],
    pub version: u32,
    pub bits: u32,
    pub mask: [u8; 32],
}

impl Header {
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut w = Writer::with_capacity(HEADER_SIZE);
        w.write_u32_le(self.nonce)
            .write_u64_le(self.time)
            .write_bytes(&self.prev_block)
            .write_bytes(&self.name_root)
            .write_bytes(&self.extra_nonce)
            .write_bytes(&self.reserved_root)
            .write_bytes(&self.witness_root)
            .write_bytes(&self.merkle_root)
            .write_u32_le(self.version)
            .write_u32_le(self.bits)
            .write_bytes(&self.mask);
        let bytes = w.into_bytes();
        let mut out = [0u8; HEADER_SIZE];
        out.copy_from_slice(&bytes);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, HeaderError> {
        if buf.len() != HEADER_SIZE {
            return Err(HeaderError::WrongSize(buf.len(), HEADER_SIZE));
        }
        let mut r = Reader::new(buf);
        Ok(Self {
            nonce: r.read_u32_le()?,
            time: r.read_u64_le()?,
            prev_block: r.read_array()?,
            name_root: r.read_array()?,
            extra_nonce: r.read_array()?,
            reserved_root: r.read_array()?,
            witness_root: r.read_array()?,
            merkle_root: r.read_array()?,
            version: r.read_u32_le()?,
            bits: r.read_u32_le()?,
            mask: r.read_array()?,
        })
    }

    /// The composite, masked identity hash.
    pub fn composite_hash(&self) -> HeaderHash {
        // Step 1: XOR pads derived from prev_block and name_root.
        let pad8 = xor_pad::<8>(&self.prev_block, &self.name_root);
        let pad20 = xor_pad::<20>(&self.prev_block, &self.name_root);
        let pad32 = xor_pad::<32>(&self.prev_block, &self.name_root);

        // Step 2: sub_hash over the witness/merkle/version/bits fields.
        let mut sub_input = Vec::with_capacity(24 + 32 + 32 + 32 + 4 + 4);
        sub_input.extend_from_slice(&self.extra_nonce);
        sub_input.extend_from_slice(&self.reserved_root);
        sub_input.extend_from_slice(&self.witness_root);
        sub_input.extend_from_slice(&self.merkle_root);
        sub_input.extend_from_slice(&self.version.to_le_bytes());
        sub_input.extend_from_slice(&self.bits.to_le_bytes());
        let sub_hash = blake2b256(&sub_input);

        // Step 3: mask_hash over prev_block and mask.
        let mut mask_input = Vec::with_capacity(64);
        mask_input.extend_from_slice(&self.prev_block);
        mask_input.extend_from_slice(&self.mask);
        let mask_hash = blake2b256(&mask_input);

        // Step 4: commit_hash binds both together.
        let mut commit_input = Vec::with_capacity(64);
        commit_input.extend_from_slice(&sub_hash);
        commit_input.extend_from_slice(&mask_hash);
        let commit_hash = blake2b256(&commit_input);

        // Step 5: pre-image for the final blake2b-512 / sha3-256 pair.
        let mut pre = Vec::with_capacity(128);
        pre.extend_from_slice(&self.nonce.to_le_bytes());
        pre.extend_from_slice(&self.time.to_le_bytes());
        pre.extend_from_slice(&pad20);
        pre.extend_from_slice(&self.prev_block);
        pre.extend_from_slice(&self.name_root);
        pre.extend_from_slice(&commit_hash);

        // Step 6: diverging left/right digests.
        let left = blake2b512(&pre);
        let mut right_input = pre;
        right_input.extend_from_slice(&pad8);
        let right = sha3_256(&right_input);

        // Step 7: final masked hash.
        let mut final_input = Vec::with_capacity(64 + 32 + 32);
        final_input.extend_from_slice(&left);
        final_input.extend_from_slice(&pad32);
        final_input.extend_from_slice(&right);
        let h = blake2b256(&final_input);

        xor_bytes(&h, &self.mask)
    }
}

/// `pad(n)[i] = prev_block[i mod 32] XOR name_root[i mod 32]`.
fn xor_pad<const N: usize>(prev_block: &[u8; 32], name_root: &[u8; 32]) -> [u8; N] {
    let mut out = [0u8; N];
    for i in 0..N {
        out[i] = prev_block[i % 32] ^ name_root[i % 32];
    }
    out
}

fn xor_bytes(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    for i in 0..32 {
        out[i] = a[i] ^ b[i];
    }
    out
}

fn blake2b256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&result);
    out
}

fn blake2b512(data: &[u8]) -> [u8; 64] {
    let mut hasher = Blake2b512::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut out = [0u8; 64];
    out.copy_from_slice(&result);
    out
}

fn sha3_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&result);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header(nonce: u32, prev_block: [u8; 32]) -> Header {
        Header {
            nonce,
            time: 1_700_000_000,
            prev_block,
            name_root: [2u8; 32],
            extra_nonce: [3u8; 24],
            reserved_root: [4u8; 32],
            witness_root: [5u8; 32],
            merkle_root: [6u8; 32],
            version: 0,
            bits: 0x1d00ffff,
            mask: [7u8; 32],
        }
    }

    #[test]
    fn test_header_roundtrip() {
        let header = sample_header(42, [1u8; 32]);
        let encoded = header.encode();
        assert_eq!(encoded.len(), HEADER_SIZE);
        let decoded = Header::decode(&encoded).unwrap();
        assert_eq!(header, decoded);
    }

    #[test]
    fn test_wrong_size_rejected() {
        let bytes = [0u8; 100];
        assert!(Header::decode(&bytes).is_err());
    }

    #[test]
    fn test_hash_deterministic() {
        let header = sample_header(1, [9u8; 32]);
        assert_eq!(header.composite_hash(), header.composite_hash());
    }

    #[test]
    fn test_hash_changes_on_single_byte() {
        let mut header = sample_header(1, [9u8; 32]);
        let original = header.composite_hash();
        header.nonce = 2;
        assert_ne!(header.composite_hash(), original);
    }

    #[test]
    fn test_hash_sensitive_to_every_field() {
        let base = sample_header(1, [9u8; 32]);
        let base_hash = base.composite_hash();

        let mut h = base.clone();
        h.time += 1;
        assert_ne!(h.composite_hash(), base_hash);

        let mut h = base.clone();
        h.name_root[0] ^= 1;
        assert_ne!(h.composite_hash(), base_hash);

        let mut h = base.clone();
        h.mask[31] ^= 1;
        assert_ne!(h.composite_hash(), base_hash);

        let mut h = base.clone();
        h.merkle_root[0] ^= 1;
        assert_ne!(h.composite_hash(), base_hash);
    }
}
