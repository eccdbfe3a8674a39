// Proof client: issues `getproof` and verifies the radix-tree proof against
// a snapshot of the chain tip's `name_root`.

use hns_core::proof::Proof;
use sha3::{Digest, Sha3_256};
use thiserror::Error;

use crate::peer::Peer;

#[derive(Debug, Error)]
pub enum ProofClientError {
    #[error("peer communication failed: {0}")]
    Transport(#[from] anyhow::Error),

    #[error(transparent)]
    Verify(#[from] hns_core::error::ProofError),
}

/// `key = sha3-256(lowercase(trim_trailing_dot(name)))`.
pub fn name_key(name: &str) -> [u8; 32] {
    let trimmed = name.trim_end_matches('.');
    let lower = trimmed.to_ascii_lowercase();
    let mut hasher = Sha3_256::new();
    hasher.update(lower.as_bytes());
    let result = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&result);
    out
}

/// Abstraction over "ask a peer for a proof", so verification logic can be
/// tested without a live P2P connection.
pub trait ProofSource {
    fn fetch_proof(
        &self,
        peer: &Peer,
        root: [u8; 32],
        key: [u8; 32],
    ) -> impl std::future::Future<Output = anyhow::Result<Vec<u8>>> + Send;
}

/// Fetch and verify a proof for `name` against `root`, returning the
/// `EXISTS` name-state blob on success.
pub async fn resolve_name<S: ProofSource>(
    source: &S,
    peer: &Peer,
    root: [u8; 32],
    name: &str,
) -> Result<Option<Vec<u8>>, ProofClientError> {
    let key = name_key(name);
    let encoded = source.fetch_proof(peer, root, key).await?;
    let proof = Proof::decode(&encoded).map_err(ProofClientError::Verify)?;
    proof.verify(&root, &key).map_err(ProofClientError::Verify)?;

    match proof.value() {
        Some(name_state) => Ok(Some(unwrap_name_state(name_state)?)),
        None => Ok(None),
    }
}

/// Strip the `name_len(u8) ‖ name ‖ res_len(u16 LE) ‖ resource_bytes` framing
/// emitted by an `EXISTS` proof, returning the inner `resource_bytes`.
fn unwrap_name_state(blob: &[u8]) -> Result<Vec<u8>, ProofClientError> {
    if blob.is_empty() {
        return Err(ProofClientError::Verify(hns_core::error::ProofError::Encoding));
    }
    let name_len = blob[0] as usize;
    let after_name = 1 + name_len;
    if blob.len() < after_name + 2 {
        return Err(ProofClientError::Verify(hns_core::error::ProofError::Encoding));
    }
    let res_len = u16::from_le_bytes([blob[after_name], blob[after_name + 1]]) as usize;
    let res_start = after_name + 2;
    let res_end = res_start + res_len;
    if blob.len() < res_end {
        return Err(ProofClientError::Verify(hns_core::error::ProofError::Encoding));
    }
    Ok(blob[res_start..res_end].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_key_lowercases_and_trims_dot() {
        assert_eq!(name_key("Example."), name_key("example"));
    }

    #[test]
    fn test_unwrap_name_state() {
        let mut blob = vec![3u8];
        blob.extend_from_slice(b"foo");
        blob.extend_from_slice(&3u16.to_le_bytes());
        blob.extend_from_slice(b"bar");
        let resource = unwrap_name_state(&blob).unwrap();
        assert_eq!(resource, b"bar");
    }

    #[test]
    fn test_unwrap_name_state_rejects_truncated() {
        let blob = vec![3u8, b'f', b'o'];
        assert!(unwrap_name_state(&blob).is_err());
    }
}
