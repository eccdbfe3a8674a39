// Radix-tree proof decoding and verification against a header's `name_root`.
// Four proof shapes: Deadend, Short, Collision, Exists.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

use crate::codec::Reader;
use crate::error::{CodecError, ProofError};

type Blake2b256 = Blake2b<U32>;

/// Application bound on the `EXISTS` value payload. The wire field is a
/// `u16`, but name-state blobs are small DNS records; this keeps a
/// maliciously-sized `value_size` from driving an 8 MB allocation attempt.
pub const MAX_PROOF_VALUE: usize = 4096;

/// Maximum ancestor depth / node count.
pub const MAX_PROOF_DEPTH: u16 = 256;

impl From<CodecError> for ProofError {
    fn from(_: CodecError) -> Self {
        ProofError::Encoding
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofNode {
    /// `(prefix bytes, prefix size in bits)`, absent when the bitmap bit is clear.
    pub prefix: Option<(Vec<u8>, u16)>,
    pub hash: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofKind {
    Deadend,
    Short {
        prefix: Vec<u8>,
        prefix_size: u16,
        left: [u8; 32],
        right: [u8; 32],
    },
    Collision {
        nx_key: [u8; 32],
        nx_hash: [u8; 32],
    },
    Exists {
        value: Vec<u8>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proof {
    pub depth: u16,
    pub nodes: Vec<ProofNode>,
    pub kind: ProofKind,
}

impl Proof {
    pub fn decode(buf: &[u8]) -> Result<Self, ProofError> {
        let mut r = Reader::new(buf);
        let field = r.read_u16_le()?;
        let kind_tag = field >> 14;
        let depth = field & 0x3fff;
        if depth > MAX_PROOF_DEPTH {
            return Err(ProofError::TooDeep);
        }

        let count = r.read_u16_le()?;
        if count > MAX_PROOF_DEPTH {
            return Err(ProofError::TooDeep);
        }

        let bitmap_len = (count as usize).div_ceil(8);
        let bitmap = r.read_bytes(bitmap_len)?.to_vec();

        let mut nodes = Vec::with_capacity(count as usize);
        for i in 0..count {
            let has_prefix = (bitmap[(i / 8) as usize] >> (i % 8)) & 1 == 1;
            let prefix = if has_prefix {
                let prefix_size = r.read_varshort()?;
                if prefix_size == 0 || prefix_size > 256 {
                    return Err(ProofError::Encoding);
                }
                let prefix_bytes = (prefix_size as usize).div_ceil(8);
                let bytes = r.read_bytes(prefix_bytes)?.to_vec();
                Some((bytes, prefix_size))
            } else {
                None
            };
            let hash: [u8; 32] = r.read_array()?;
            nodes.push(ProofNode { prefix, hash });
        }

        let kind = match kind_tag {
            0 => ProofKind::Deadend,
            1 => {
                let prefix_size = r.read_varshort()?;
                if prefix_size == 0 || prefix_size > 256 {
                    return Err(ProofError::Encoding);
                }
                let prefix_bytes = (prefix_size as usize).div_ceil(8);
                let prefix = r.read_bytes(prefix_bytes)?.to_vec();
                let left: [u8; 32] = r.read_array()?;
                let right: [u8; 32] = r.read_array()?;
                ProofKind::Short {
                    prefix,
                    prefix_size,
                    left,
                    right,
                }
            }
            2 => {
                let nx_key: [u8; 32] = r.read_array()?;
                let nx_hash: [u8; 32] = r.read_array()?;
                ProofKind::Collision { nx_key, nx_hash }
            }
            3 => {
                let value_size = r.read_u16_le()? as usize;
                if value_size > MAX_PROOF_VALUE {
                    return Err(ProofError::BadArgs);
                }
                let value = r.read_bytes(value_size)?.to_vec();
                ProofKind::Exists { value }
            }
            _ => return Err(ProofError::Encoding),
        };

        Ok(Self { depth, nodes, kind })
    }

    /// Verify the proof against `root` for `key`, returning nothing on
    /// success; the caller reads `self.kind` for the `Exists` payload.
    pub fn verify(&self, root: &[u8; 32], key: &[u8; 32]) -> Result<(), ProofError> {
        let mut d = self.depth;

        let mut next = match &self.kind {
            ProofKind::Deadend => [0u8; 32],
            ProofKind::Short {
                prefix,
                prefix_size,
                left,
                right,
            } => {
                if prefix_has(prefix, *prefix_size, key, d) {
                    return Err(ProofError::SamePath);
                }
                hash_internal(prefix, *prefix_size, left, right)
            }
            ProofKind::Collision { nx_key, nx_hash } => {
                if nx_key == key {
                    return Err(ProofError::SameKey);
                }
                hash_leaf(nx_key, nx_hash)
            }
            ProofKind::Exists { value } => {
                let value_hash = blake2b256(value);
                hash_leaf(key, &value_hash)
            }
        };

        for node in self.nodes.iter().rev() {
            if d == 0 {
                return Err(ProofError::NegativeDepth);
            }
            d -= 1;

            let bit = bit_at(key, d as usize);
            let (prefix, prefix_size) = match &node.prefix {
                Some((p, sz)) => (p.as_slice(), *sz),
                None => (&[][..], 0),
            };
            next = if bit {
                hash_internal(prefix, prefix_size, &node.hash, &next)
            } else {
                hash_internal(prefix, prefix_size, &next, &node.hash)
            };

            if prefix_size > 0 {
                if prefix_size > d {
                    return Err(ProofError::NegativeDepth);
                }
                d -= prefix_size;
                if !prefix_has(prefix, prefix_size, key, d) {
                    return Err(ProofError::PathMismatch);
                }
            }
        }

        if d != 0 {
            return Err(ProofError::PathMismatch);
        }
        if &next != root {
            return Err(ProofError::HashMismatch);
        }
        Ok(())
    }

    pub fn value(&self) -> Option<&[u8]> {
        match &self.kind {
            ProofKind::Exists { value } => Some(value),
            _ => None,
        }
    }
}

/// `key[bit_index]`, MSB-first across the 256-bit key.
fn bit_at(key: &[u8; 32], bit_index: usize) -> bool {
    let byte = key[bit_index / 8];
    (byte >> (7 - (bit_index % 8))) & 1 == 1
}

/// Whether `prefix` (`prefix_size` bits, MSB-first) matches `key`'s bits
/// starting at `start_bit`.
fn prefix_has(prefix: &[u8], prefix_size: u16, key: &[u8; 32], start_bit: u16) -> bool {
    for i in 0..prefix_size {
        let prefix_bit = (prefix[(i / 8) as usize] >> (7 - (i % 8))) & 1 == 1;
        let key_bit = bit_at(key, (start_bit + i) as usize);
        if prefix_bit != key_bit {
            return false;
        }
    }
    true
}

pub fn hash_leaf(key: &[u8; 32], h: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update([0x00]);
    hasher.update(key);
    hasher.update(h);
    let result = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&result);
    out
}

pub fn hash_internal(prefix: &[u8], prefix_size: u16, left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    if prefix_size == 0 {
        hasher.update([0x01]);
        hasher.update(left);
        hasher.update(right);
    } else {
        hasher.update([0x02]);
        hasher.update(prefix_size.to_le_bytes());
        hasher.update(prefix);
        hasher.update(left);
        hasher.update(right);
    }
    let result = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&result);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exists_depth_zero_verifies() {
        let key = [5u8; 32];
        let value = b"v=1".to_vec();
        let value_hash = blake2b256(&value);
        let root = hash_leaf(&key, &value_hash);

        let proof = Proof {
            depth: 0,
            nodes: vec![],
            kind: ProofKind::Exists { value: value.clone() },
        };
        proof.verify(&root, &key).unwrap();
        assert_eq!(proof.value().unwrap(), &value[..]);
    }

    #[test]
    fn test_deadend_depth_zero_verifies() {
        let key = [5u8; 32];
        let root = [0u8; 32];
        let proof = Proof {
            depth: 0,
            nodes: vec![],
            kind: ProofKind::Deadend,
        };
        proof.verify(&root, &key).unwrap();
    }

    #[test]
    fn test_collision_same_key_rejected() {
        let key = [5u8; 32];
        let proof = Proof {
            depth: 0,
            nodes: vec![],
            kind: ProofKind::Collision {
                nx_key: key,
                nx_hash: [1u8; 32],
            },
        };
        assert_eq!(proof.verify(&[0u8; 32], &key), Err(ProofError::SameKey));
    }

    #[test]
    fn test_one_ancestor_walk_verifies() {
        let key = {
            let mut k = [0u8; 32];
            k[0] = 0b1000_0000; // bit 0 == 1
            k
        };
        let value = b"hello".to_vec();
        let value_hash = blake2b256(&value);
        let leaf = hash_leaf(&key, &value_hash);
        let sibling = [42u8; 32];
        // bit 0 is 1, so leaf goes on the right.
        let root = hash_internal(&[], 0, &sibling, &leaf);

        let proof = Proof {
            depth: 1,
            nodes: vec![ProofNode {
                prefix: None,
                hash: sibling,
            }],
            kind: ProofKind::Exists { value },
        };
        proof.verify(&root, &key).unwrap();
    }

    #[test]
    fn test_hash_mismatch_on_wrong_root() {
        let key = [5u8; 32];
        let value = b"v=1".to_vec();
        let proof = Proof {
            depth: 0,
            nodes: vec![],
            kind: ProofKind::Exists { value },
        };
        assert_eq!(
            proof.verify(&[9u8; 32], &key),
            Err(ProofError::HashMismatch)
        );
    }

    #[test]
    fn test_too_deep_rejected_at_decode() {
        let mut buf = Vec::new();
        let field: u16 = (3u16 << 14) | 257; // depth 257 > 256
        buf.extend_from_slice(&field.to_le_bytes());
        assert_eq!(Proof::decode(&buf), Err(ProofError::TooDeep));
    }
}
