// On-disk header store: a bounded window of headers plus tip height and
// save timestamp, written atomically with a SHA-256 checksum sidecar.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::chain::HeaderChain;
use crate::error::StoreError;
use crate::header::{Header, HEADER_SIZE};

/// Default on-disk filename.
pub const DEFAULT_STORE_FILE: &str = "headers.dat";
/// Sidecar checksum filename, sibling to the store file.
pub const CHECKSUM_SUFFIX: &str = "checksum";

#[derive(Debug, Serialize, Deserialize)]
struct StorePayload {
    /// Height of `headers[0]`.
    first_height: u64,
    /// Tip height (`first_height + headers.len() - 1`).
    height: u64,
    /// Unix seconds at time of save.
    timestamp: u64,
    headers: Vec<[u8; HEADER_SIZE]>,
}

pub struct HeaderStore {
    path: PathBuf,
}

impl HeaderStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn checksum_path(&self) -> PathBuf {
        self.path.with_extension(CHECKSUM_SUFFIX)
    }

    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("dat.tmp")
    }

    /// Persist the chain's current window. Write `tmp`, rename over the
    /// live file, then rewrite the checksum — in that order, so a crash
    /// mid-write never leaves a checksum pointing at a half-written file.
    pub fn save(&self, chain: &HeaderChain, timestamp: u64) -> Result<(), StoreError> {
        let headers: Vec<[u8; HEADER_SIZE]> = (0..chain.len())
            .map(|i| {
                chain
                    .header_at_height(chain.first_height() + i as u64)
                    .expect("index within chain bounds")
                    .encode()
            })
            .collect();

        let payload = StorePayload {
            first_height: chain.first_height(),
            height: chain.tip_height().map_err(|_| StoreError::Malformed)?,
            timestamp,
            headers,
        };

        let encoded = bincode::serialize(&payload)?;

        let tmp = self.tmp_path();
        fs::write(&tmp, &encoded)?;
        fs::rename(&tmp, &self.path)?;

        let checksum = Sha256::digest(&encoded);
        fs::write(self.checksum_path(), hex::encode(checksum))?;

        Ok(())
    }

    /// Load and verify the store. Returns `(first_height, headers)` on
    /// success; any checksum or structural failure is reported so the
    /// caller can fall back to the embedded checkpoint.
    pub fn load(&self) -> Result<(u64, Vec<Header>), StoreError> {
        let encoded = fs::read(&self.path)?;
        let expected_hex = fs::read_to_string(self.checksum_path())?;
        let expected = expected_hex.trim();

        let actual = hex::encode(Sha256::digest(&encoded));
        if actual != expected {
            return Err(StoreError::ChecksumMismatch);
        }

        let payload: StorePayload =
            bincode::deserialize(&encoded).map_err(|_| StoreError::Malformed)?;

        if payload.headers.len() as u64 != payload.height - payload.first_height + 1 {
            return Err(StoreError::Malformed);
        }

        let headers = payload
            .headers
            .iter()
            .map(|bytes| Header::decode(bytes).map_err(|_| StoreError::Malformed))
            .collect::<Result<Vec<_>, _>>()?;

        Ok((payload.first_height, headers))
    }

    pub fn exists(&self) -> bool {
        self.path.exists() && self.checksum_path().exists()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::bootstrap_chain;

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = HeaderStore::new(dir.path().join(DEFAULT_STORE_FILE));
        let chain = bootstrap_chain();

        store.save(&chain, 1_700_000_000).unwrap();
        assert!(store.exists());

        let (first_height, headers) = store.load().unwrap();
        assert_eq!(first_height, chain.first_height());
        assert_eq!(headers.len(), chain.len());
    }

    #[test]
    fn test_corrupt_file_reports_checksum_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let store = HeaderStore::new(dir.path().join(DEFAULT_STORE_FILE));
        let chain = bootstrap_chain();
        store.save(&chain, 1_700_000_000).unwrap();

        let mut bytes = fs::read(store.path()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(store.path(), bytes).unwrap();

        assert!(matches!(store.load(), Err(StoreError::ChecksumMismatch)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = HeaderStore::new(dir.path().join("missing.dat"));
        assert!(store.load().is_err());
    }
}
