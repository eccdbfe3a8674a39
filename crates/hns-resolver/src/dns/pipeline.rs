//! Resolver pipeline: cache → blocklist → ICANN-forward vs SPV resolution →
//! response assembly.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use hns_core::resource::NameRecord;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::blocklist::{BlockVerdict, BlocklistProvider};
use crate::config::ResolverConfig;
use crate::dns::cache::{CacheKey, DnsCache, is_cacheable};
use crate::dns::wire::{
    self, Answer, Question, RCODE_NOERROR, RCODE_NXDOMAIN, RCODE_REFUSED, RCODE_SERVFAIL,
};

const BLOCKLIST_TTL: Duration = Duration::from_secs(60);
const ICANN_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_ANSWER_TTL: u32 = 3600;

/// What the Handshake-TLD branch needs from the sync engine: a snapshot of
/// the current tip's `name_root`, taken once per query.
pub trait RootSnapshot: Send + Sync {
    fn current_name_root(&self) -> Option<[u8; 32]>;
}

/// What the Handshake-TLD branch needs from the proof client: resolve a
/// name against a given root, returning decoded records.
pub trait NameResolver: Send + Sync {
    fn resolve(
        &self,
        name: &str,
        root: [u8; 32],
    ) -> impl std::future::Future<Output = anyhow::Result<Vec<NameRecord>>> + Send;
}

pub struct Pipeline<B, R, N> {
    config: Arc<ResolverConfig>,
    cache: Arc<DnsCache>,
    blocklist: Arc<B>,
    root_snapshot: Arc<R>,
    name_resolver: Arc<N>,
}

impl<B, R, N> Pipeline<B, R, N>
where
    B: BlocklistProvider,
    R: RootSnapshot,
    N: NameResolver,
{
    pub fn new(
        config: Arc<ResolverConfig>,
        cache: Arc<DnsCache>,
        blocklist: Arc<B>,
        root_snapshot: Arc<R>,
        name_resolver: Arc<N>,
    ) -> Self {
        Self {
            config,
            cache,
            blocklist,
            root_snapshot,
            name_resolver,
        }
    }

    /// Resolve a query already parsed from its wire bytes, producing a
    /// fresh wire-format response.
    pub async fn resolve(&self, query_id: u16, question: Question) -> Vec<u8> {
        let key = CacheKey::new(&question.name, question.qtype, question.qclass);

        if let Some((mut bytes, _rcode)) = self.cache.get(&key) {
            wire::rewrite_id(&mut bytes, query_id);
            return bytes;
        }

        match self.blocklist.is_blocked(&question.name) {
            BlockVerdict::Whitelisted | BlockVerdict::Allowed => {}
            BlockVerdict::Blacklisted | BlockVerdict::Blocked => {
                let bytes = wire::build_error_response(query_id, RCODE_NXDOMAIN, &question);
                self.cache.insert(key, bytes.clone(), RCODE_NXDOMAIN, BLOCKLIST_TTL);
                return bytes;
            }
        }

        let tld = question.name.rsplit('.').next().unwrap_or("");
        if self.config.is_icann_tld(tld) {
            self.resolve_icann(query_id, &question, key).await
        } else {
            self.resolve_handshake(query_id, &question, key).await
        }
    }

    async fn resolve_icann(&self, query_id: u16, question: &Question, key: CacheKey) -> Vec<u8> {
        let query_bytes = wire::build_response(query_id, RCODE_NOERROR, question, &[]);

        let mut response = forward_upstream(&self.config.upstream_dns, &query_bytes).await;
        if let Ok(parsed) = response.as_deref().map(wire::parse_query).unwrap_or(Err(wire::WireError::Truncated)) {
            if parsed.rcode == RCODE_REFUSED {
                response = forward_upstream(&self.config.upstream_dns_fallback, &query_bytes).await;
            }
        }

        match response {
            Some(bytes) => {
                if let Ok(parsed) = wire::parse_query(&bytes) {
                    if is_cacheable(parsed.rcode, parsed.answers.len()) {
                        self.cache.insert(key, bytes.clone(), parsed.rcode, Duration::from_secs(DEFAULT_ANSWER_TTL as u64));
                    }
                }
                bytes
            }
            None => wire::build_error_response(query_id, RCODE_SERVFAIL, question),
        }
    }

    async fn resolve_handshake(&self, query_id: u16, question: &Question, key: CacheKey) -> Vec<u8> {
        let root = match self.root_snapshot.current_name_root() {
            Some(r) => r,
            None => return wire::build_error_response(query_id, RCODE_SERVFAIL, question),
        };

        let budget = Duration::from_millis(self.config.handshake_resolution_timeout_ms);
        let result = timeout(budget, self.name_resolver.resolve(&question.name, root)).await;

        let records = match result {
            Ok(Ok(records)) => records,
            Ok(Err(e)) => {
                warn!("handshake resolution failed for {}: {}", question.name, e);
                return wire::build_error_response(query_id, RCODE_SERVFAIL, question);
            }
            Err(_) => {
                debug!("handshake resolution timed out for {}", question.name);
                return wire::build_error_response(query_id, RCODE_SERVFAIL, question);
            }
        };

        let answers = records_to_answers(question, &records);
        let rcode = if answers.is_empty() { RCODE_NXDOMAIN } else { RCODE_NOERROR };
        let bytes = wire::build_response(query_id, rcode, question, &answers);

        if is_cacheable(rcode, answers.len()) {
            self.cache.insert(
                key,
                bytes.clone(),
                rcode,
                Duration::from_secs(self.config.dns_cache_ttl_default_secs),
            );
        }
        bytes
    }
}

fn records_to_answers(question: &Question, records: &[NameRecord]) -> Vec<Answer> {
    records
        .iter()
        .filter_map(|record| match record {
            NameRecord::Glue4 { name, addr } if question.qtype == wire::QTYPE_A => Some(Answer {
                name: name.clone(),
                rtype: wire::QTYPE_A,
                rclass: wire::QCLASS_IN,
                ttl: DEFAULT_ANSWER_TTL,
                rdata: wire::a_rdata(Ipv4Addr::from(*addr)),
            }),
            NameRecord::Glue6 { name, addr } if question.qtype == wire::QTYPE_AAAA => Some(Answer {
                name: name.clone(),
                rtype: wire::QTYPE_AAAA,
                rclass: wire::QCLASS_IN,
                ttl: DEFAULT_ANSWER_TTL,
                rdata: wire::aaaa_rdata(Ipv6Addr::from(*addr)),
            }),
            NameRecord::Ns { name } if question.qtype == wire::QTYPE_NS => Some(Answer {
                name: name.clone(),
                rtype: wire::QTYPE_NS,
                rclass: wire::QCLASS_IN,
                ttl: DEFAULT_ANSWER_TTL,
                rdata: Vec::new(),
            }),
            NameRecord::Text { strings } if question.qtype == wire::QTYPE_TXT => Some(Answer {
                name: question.name.clone(),
                rtype: wire::QTYPE_TXT,
                rclass: wire::QCLASS_IN,
                ttl: DEFAULT_ANSWER_TTL,
                rdata: wire::txt_rdata(strings),
            }),
            _ => None,
        })
        .collect()
}

async fn forward_upstream(upstream: &str, query: &[u8]) -> Option<Vec<u8>> {
    if upstream == "system" {
        return forward_system_resolver(query).await;
    }
    let addr: SocketAddr = upstream.parse().ok()?;
    let socket = UdpSocket::bind("0.0.0.0:0").await.ok()?;
    socket.connect(addr).await.ok()?;
    socket.send(query).await.ok()?;

    let mut buf = vec![0u8; 4096];
    let n = timeout(ICANN_UPSTREAM_TIMEOUT, socket.recv(&mut buf)).await.ok()?.ok()?;
    buf.truncate(n);
    Some(buf)
}

/// Fallback path: the host's configured resolver, read from
/// `/etc/resolv.conf`. This is a deliberate, minimal reading of the system
/// default rather than a full resolv.conf parser.
async fn forward_system_resolver(query: &[u8]) -> Option<Vec<u8>> {
    let contents = tokio::fs::read_to_string("/etc/resolv.conf").await.ok()?;
    let nameserver = contents
        .lines()
        .find_map(|line| line.strip_prefix("nameserver ").map(str::trim))?;
    let addr: SocketAddr = format!("{nameserver}:53").parse().ok()?;
    let socket = UdpSocket::bind("0.0.0.0:0").await.ok()?;
    socket.connect(addr).await.ok()?;
    socket.send(query).await.ok()?;

    let mut buf = vec![0u8; 4096];
    let n = timeout(ICANN_UPSTREAM_TIMEOUT, socket.recv(&mut buf)).await.ok()?.ok()?;
    buf.truncate(n);
    Some(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysAllow;
    impl BlocklistProvider for AlwaysAllow {
        fn is_blocked(&self, _name: &str) -> BlockVerdict {
            BlockVerdict::Allowed
        }
    }

    struct AlwaysBlocked;
    impl BlocklistProvider for AlwaysBlocked {
        fn is_blocked(&self, _name: &str) -> BlockVerdict {
            BlockVerdict::Blocked
        }
    }

    struct NoTip;
    impl RootSnapshot for NoTip {
        fn current_name_root(&self) -> Option<[u8; 32]> {
            None
        }
    }

    struct EmptyResolver;
    impl NameResolver for EmptyResolver {
        async fn resolve(&self, _name: &str, _root: [u8; 32]) -> anyhow::Result<Vec<NameRecord>> {
            Ok(vec![])
        }
    }

    fn question(name: &str, qtype: u16) -> Question {
        Question {
            name: name.to_string(),
            qtype,
            qclass: wire::QCLASS_IN,
        }
    }

    #[tokio::test]
    async fn test_blocklist_synthesizes_nxdomain() {
        let pipeline = Pipeline::new(
            Arc::new(ResolverConfig::default()),
            Arc::new(DnsCache::new()),
            Arc::new(AlwaysBlocked),
            Arc::new(NoTip),
            Arc::new(EmptyResolver),
        );
        let q = question("ads.example.bit", wire::QTYPE_A);
        let response = pipeline.resolve(0x1234, q.clone()).await;
        let parsed = wire::parse_query(&response).unwrap();
        assert_eq!(parsed.id, 0x1234);
        assert_eq!(response[3] & 0x0f, RCODE_NXDOMAIN);
    }

    #[tokio::test]
    async fn test_handshake_with_no_tip_is_servfail() {
        let pipeline = Pipeline::new(
            Arc::new(ResolverConfig::default()),
            Arc::new(DnsCache::new()),
            Arc::new(AlwaysAllow),
            Arc::new(NoTip),
            Arc::new(EmptyResolver),
        );
        let q = question("bar.bit", wire::QTYPE_A);
        let response = pipeline.resolve(0x1, q).await;
        assert_eq!(response[3] & 0x0f, RCODE_SERVFAIL);
    }
}
