//! DNS cache: fingerprint → wire bytes with absolute expiry.
//!
//! Shared between the pipeline and its readers; concurrent reads, single
//! writer per key via the `RwLock`'s inner `HashMap` entry API.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use super::wire::{RCODE_NOERROR, RCODE_NXDOMAIN};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub name: String,
    pub qtype: u16,
    pub qclass: u16,
}

impl CacheKey {
    pub fn new(name: &str, qtype: u16, qclass: u16) -> Self {
        Self {
            name: name.trim_end_matches('.').to_ascii_lowercase(),
            qtype,
            qclass,
        }
    }
}

struct Entry {
    wire_bytes: Vec<u8>,
    rcode: u8,
    expires_at: Instant,
}

/// Only `NOERROR` with at least one answer, or `NXDOMAIN`, are cacheable.
pub fn is_cacheable(rcode: u8, answer_count: usize) -> bool {
    (rcode == RCODE_NOERROR && answer_count > 0) || rcode == RCODE_NXDOMAIN
}

pub struct DnsCache {
    entries: RwLock<HashMap<CacheKey, Entry>>,
}

impl Default for DnsCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DnsCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<(Vec<u8>, u8)> {
        let now = Instant::now();
        let hit = {
            let entries = self.entries.read().unwrap();
            entries.get(key).map(|e| (e.wire_bytes.clone(), e.rcode, e.expires_at))
        };
        match hit {
            Some((bytes, rcode, expires_at)) if expires_at > now => Some((bytes, rcode)),
            Some(_) => {
                // Expired: drop it before returning a miss.
                self.entries.write().unwrap().remove(key);
                None
            }
            None => None,
        }
    }

    /// Caller must have already checked `is_cacheable` against the real
    /// answer count; this does not re-derive it.
    pub fn insert(&self, key: CacheKey, wire_bytes: Vec<u8>, rcode: u8, ttl: Duration) {
        let entry = Entry {
            wire_bytes,
            rcode,
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().unwrap().insert(key, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_insert_and_hit() {
        let cache = DnsCache::new();
        let key = CacheKey::new("Example.com.", 1, 1);
        cache.insert(key.clone(), vec![1, 2, 3], RCODE_NOERROR, Duration::from_secs(60));
        let (bytes, rcode) = cache.get(&key).unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
        assert_eq!(rcode, RCODE_NOERROR);
    }

    #[test]
    fn test_key_normalizes_case_and_trailing_dot() {
        let a = CacheKey::new("Example.com.", 1, 1);
        let b = CacheKey::new("example.com", 1, 1);
        assert_eq!(a, b);
    }

    #[test]
    fn test_expired_entry_evicted_on_read() {
        let cache = DnsCache::new();
        let key = CacheKey::new("example.com", 1, 1);
        cache.insert(key.clone(), vec![1], RCODE_NXDOMAIN, Duration::from_millis(10));
        sleep(Duration::from_millis(30));
        assert!(cache.get(&key).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cacheability_rules() {
        assert!(is_cacheable(RCODE_NOERROR, 1));
        assert!(!is_cacheable(RCODE_NOERROR, 0));
        assert!(is_cacheable(RCODE_NXDOMAIN, 0));
        assert!(!is_cacheable(2, 0)); // SERVFAIL
    }
}
