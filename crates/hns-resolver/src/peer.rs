//! Peer registry: DNS-seed discovery, a static bootstrap list, and a
//! bounded learned set persisted to disk.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hickory_resolver::config::{ResolverConfig as DnsResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Default cap on the persisted learned-peer set, used when no explicit
/// limit is configured.
pub const MAX_LEARNED_PEERS: usize = 10;
const PEER_VERIFY_TIMEOUT: Duration = Duration::from_secs(3);
const DNS_SEED_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Peer {
    pub endpoint: SocketAddr,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LearnedPeersFile {
    peers: Vec<String>,
    timestamp: u64,
    count: u32,
}

pub struct PeerRegistry {
    static_bootstrap: Vec<Peer>,
    learned: Vec<Peer>,
    seed_discovered: Vec<Peer>,
    learned_path: PathBuf,
    max_learned: usize,
}

impl PeerRegistry {
    pub fn new(static_bootstrap: Vec<Peer>, learned_path: impl Into<PathBuf>, max_learned: usize) -> Self {
        Self {
            static_bootstrap,
            learned: Vec::new(),
            seed_discovered: Vec::new(),
            learned_path: learned_path.into(),
            max_learned,
        }
    }

    pub fn load_learned(&mut self) -> anyhow::Result<()> {
        let path = &self.learned_path;
        if !path.exists() {
            return Ok(());
        }
        let bytes = std::fs::read(path)?;
        let file: LearnedPeersFile = bincode::deserialize(&bytes)?;
        self.learned = file
            .peers
            .iter()
            .filter_map(|s| s.parse::<SocketAddr>().ok())
            .map(|endpoint| Peer { endpoint })
            .collect();
        Ok(())
    }

    pub fn save_learned(&self) -> anyhow::Result<()> {
        let file = LearnedPeersFile {
            peers: self.learned.iter().map(|p| p.endpoint.to_string()).collect(),
            timestamp: now_secs(),
            count: self.learned.len() as u32,
        };
        let bytes = bincode::serialize(&file)?;
        let tmp = self.learned_path.with_extension("dat.tmp");
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, &self.learned_path)?;
        Ok(())
    }

    pub fn record_learned(&mut self, peer: Peer) {
        if self.learned.contains(&peer) {
            return;
        }
        if self.learned.len() >= self.max_learned {
            self.learned.remove(0);
        }
        self.learned.push(peer);
    }

    /// `static ∪ learned`, deduplicated, static-first.
    pub fn fallback(&self) -> Vec<Peer> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for p in self.static_bootstrap.iter().chain(self.learned.iter()) {
            if seen.insert(p.endpoint) {
                out.push(p.clone());
            }
        }
        out
    }

    /// Every known candidate: seed-discovered, static, and learned,
    /// deduplicated.
    pub fn all_candidates(&self) -> Vec<Peer> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for p in self
            .seed_discovered
            .iter()
            .chain(self.static_bootstrap.iter())
            .chain(self.learned.iter())
        {
            if seen.insert(p.endpoint) {
                out.push(p.clone());
            }
        }
        out
    }

    pub fn set_seed_discovered(&mut self, peers: Vec<Peer>) {
        self.seed_discovered = peers;
    }

    /// Resolve A/AAAA/TXT records for each configured DNS seed hostname,
    /// treating each result as an `ip:port` candidate.
    pub async fn resolve_dns_seeds(hostnames: &[String], default_port: u16) -> Vec<Peer> {
        let resolver = TokioAsyncResolver::tokio(DnsResolverConfig::default(), ResolverOpts::default());

        let mut out = Vec::new();
        for hostname in hostnames {
            let lookup = timeout(DNS_SEED_TIMEOUT, resolver.lookup_ip(hostname.as_str())).await;
            match lookup {
                Ok(Ok(response)) => {
                    for ip in response.iter() {
                        out.push(Peer {
                            endpoint: SocketAddr::new(ip, default_port),
                        });
                    }
                }
                Ok(Err(e)) => warn!("dns seed lookup failed for {}: {}", hostname, e),
                Err(_) => warn!("dns seed lookup timed out for {}", hostname),
            }

            if let Ok(Ok(txt)) = timeout(DNS_SEED_TIMEOUT, resolver.txt_lookup(hostname.as_str())).await {
                for record in txt.iter() {
                    for chunk in record.iter() {
                        if let Ok(text) = std::str::from_utf8(chunk) {
                            if let Ok(endpoint) = text.parse::<SocketAddr>() {
                                out.push(Peer { endpoint });
                            }
                        }
                    }
                }
            }
        }
        out
    }

    /// Verify a peer by TCP connect within the 3 s budget.
    pub async fn verify(peer: &Peer) -> bool {
        match timeout(PEER_VERIFY_TIMEOUT, TcpStream::connect(peer.endpoint)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!("peer {} failed to connect: {}", peer.endpoint, e);
                false
            }
            Err(_) => {
                debug!("peer {} verify timed out", peer.endpoint);
                false
            }
        }
    }

    /// Verify every candidate concurrently; return only those that connect.
    pub async fn verify_all(candidates: Vec<Peer>) -> Vec<Peer> {
        let checks = candidates.into_iter().map(|peer| async move {
            if Self::verify(&peer).await {
                Some(peer)
            } else {
                None
            }
        });
        futures::future::join_all(checks).await.into_iter().flatten().collect()
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

pub fn parse_static_bootstrap(entries: &[String]) -> Vec<Peer> {
    entries
        .iter()
        .filter_map(|s| s.parse::<SocketAddr>().ok())
        .map(|endpoint| Peer { endpoint })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_dedup_static_first() {
        let mut registry = PeerRegistry::new(
            vec![Peer {
                endpoint: "127.0.0.1:1".parse().unwrap(),
            }],
            "/tmp/hns-resolver-test-peers.dat",
            MAX_LEARNED_PEERS,
        );
        registry.record_learned(Peer {
            endpoint: "127.0.0.1:1".parse().unwrap(),
        });
        registry.record_learned(Peer {
            endpoint: "127.0.0.1:2".parse().unwrap(),
        });

        let fallback = registry.fallback();
        assert_eq!(fallback.len(), 2);
        assert_eq!(fallback[0].endpoint.port(), 1);
    }

    #[test]
    fn test_learned_set_capped() {
        let mut registry = PeerRegistry::new(vec![], "/tmp/hns-resolver-test-peers-cap.dat", MAX_LEARNED_PEERS);
        for i in 0..20u16 {
            registry.record_learned(Peer {
                endpoint: SocketAddr::new("127.0.0.1".parse().unwrap(), 1000 + i),
            });
        }
        assert_eq!(registry.learned.len(), MAX_LEARNED_PEERS);
    }

    #[tokio::test]
    async fn test_verify_rejects_closed_port() {
        let peer = Peer {
            endpoint: "127.0.0.1:1".parse().unwrap(),
        };
        assert!(!PeerRegistry::verify(&peer).await);
    }
}
