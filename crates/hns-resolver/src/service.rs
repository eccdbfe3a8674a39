//! Service lifecycle: wires the header sync engine, peer registry, proof
//! client, and DNS front-ends into one explicit, ownable value with a
//! single start/stop path. Replaces ambient global state with a value the
//! caller constructs, runs, and can shut down deterministically.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, RwLock as StdRwLock};

use hns_core::checkpoint::bootstrap_chain;
use hns_core::resource::NameRecord;
use hns_core::store::HeaderStore;
use tokio::net::TcpListener;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use crate::blocklist::NullBlocklist;
use crate::config::ResolverConfig;
use crate::dns::pipeline::{NameResolver, Pipeline, RootSnapshot};
use crate::dns::tls::LocalCa;
use crate::dns::{doh, dot, DnsCache};
use crate::p2p::NetSource;
use crate::peer::{parse_static_bootstrap, Peer, PeerRegistry};
use crate::proof_client::{self, ProofSource};
use crate::sync::{should_flush, HeaderSource, SyncEngine};

const PEER_DISCOVERY_INTERVAL_SECS: u64 = 600;

/// `RootSnapshot` backed by a plain lock updated by the sync loop after
/// every round; readers never touch the sync engine itself.
struct SharedRoot(Arc<StdRwLock<Option<[u8; 32]>>>);

impl RootSnapshot for SharedRoot {
    fn current_name_root(&self) -> Option<[u8; 32]> {
        *self.0.read().expect("root lock poisoned")
    }
}

/// `NameResolver` that picks a candidate peer from the registry and fetches
/// a proof for it over a fresh P2P connection.
struct PeerProofResolver {
    registry: Arc<RwLock<PeerRegistry>>,
    source: NetSource,
}

impl NameResolver for PeerProofResolver {
    async fn resolve(&self, name: &str, root: [u8; 32]) -> anyhow::Result<Vec<NameRecord>> {
        let peer = {
            let registry = self.registry.read().await;
            registry.all_candidates().into_iter().next()
        };
        let Some(peer) = peer else {
            anyhow::bail!("no peers available to resolve {}", name);
        };

        let blob = proof_client::resolve_name(&self.source, &peer, root, name).await?;
        match blob {
            Some(resource_bytes) => Ok(hns_core::resource::decode(&resource_bytes)?),
            None => Ok(Vec::new()),
        }
    }
}

pub struct Service {
    config: Arc<ResolverConfig>,
    data_dir: PathBuf,
    registry: Arc<RwLock<PeerRegistry>>,
    current_root: Arc<StdRwLock<Option<[u8; 32]>>>,
    cache: Arc<DnsCache>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Service {
    pub fn new(config: ResolverConfig, data_dir: PathBuf) -> Self {
        let static_bootstrap = parse_static_bootstrap(&config.static_bootstrap);
        let learned_path = data_dir.join("peers.dat");
        let registry = PeerRegistry::new(static_bootstrap, learned_path, config.max_fallback_peers);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            config: Arc::new(config),
            data_dir,
            registry: Arc::new(RwLock::new(registry)),
            current_root: Arc::new(StdRwLock::new(None)),
            cache: Arc::new(DnsCache::new()),
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn run(self) -> anyhow::Result<()> {
        {
            let mut registry = self.registry.write().await;
            if let Err(e) = registry.load_learned() {
                warn!("failed to load learned peers: {}", e);
            }
        }

        let store_path = self.data_dir.join(hns_core::store::DEFAULT_STORE_FILE);
        let store = HeaderStore::new(store_path);
        let chain = if store.exists() {
            match store.load() {
                Ok((first_height, headers)) => {
                    let chain = hns_core::HeaderChain::from_loaded(first_height, headers, self.config.window_size);
                    info!("loaded header store at tip height {}", chain.tip_height().unwrap_or(0));
                    chain
                }
                Err(e) => {
                    warn!("header store failed to load ({}), falling back to checkpoint", e);
                    bootstrap_chain()
                }
            }
        } else {
            bootstrap_chain()
        };

        let net_source = NetSource::new(self.config.magic, self.config.max_message_size);
        let engine = SyncEngine::new(chain, net_source);

        let local_ca = LocalCa::generate()?;
        let (leaf_cert, leaf_key) = local_ca.issue_localhost_leaf()?;

        let resolver = Arc::new(PeerProofResolver {
            registry: Arc::clone(&self.registry),
            source: NetSource::new(self.config.magic, self.config.max_message_size),
        });
        let root_snapshot = Arc::new(SharedRoot(Arc::clone(&self.current_root)));
        let pipeline = Arc::new(Pipeline::new(
            Arc::clone(&self.config),
            Arc::clone(&self.cache),
            Arc::new(NullBlocklist),
            root_snapshot,
            resolver,
        ));

        let peer_discovery = tokio::spawn(run_peer_discovery(
            Arc::clone(&self.config),
            Arc::clone(&self.registry),
            self.shutdown_rx.clone(),
        ));

        let sync_task = tokio::spawn(run_sync_loop(
            engine,
            store,
            Arc::clone(&self.registry),
            Arc::clone(&self.current_root),
            self.shutdown_rx.clone(),
        ));

        let doh_addr = SocketAddr::from(([0, 0, 0, 0], self.config.doh_port));
        let dot_addr = SocketAddr::from(([0, 0, 0, 0], self.config.dot_port));

        let rustls_config = axum_server::tls_rustls::RustlsConfig::from_der(
            vec![leaf_cert.to_vec()],
            leaf_key.secret_der().to_vec(),
        )
        .await?;

        let doh_router = doh::router(Arc::clone(&pipeline));
        let doh_shutdown = self.shutdown_rx.clone();
        let doh_task = tokio::spawn(async move {
            let handle = axum_server::Handle::new();
            let watch_handle = handle.clone();
            tokio::spawn(async move {
                let mut rx = doh_shutdown;
                loop {
                    if *rx.borrow() {
                        watch_handle.graceful_shutdown(Some(std::time::Duration::from_secs(5)));
                        return;
                    }
                    if rx.changed().await.is_err() {
                        return;
                    }
                }
            });
            axum_server::bind_rustls(doh_addr, rustls_config)
                .handle(handle)
                .serve(doh_router.into_make_service())
                .await
        });

        let dot_tls_config = {
            let mut tls_config = tokio_rustls::rustls::ServerConfig::builder()
                .with_no_client_auth()
                .with_single_cert(vec![leaf_cert], leaf_key)?;
            tls_config.alpn_protocols = vec![b"dot".to_vec()];
            Arc::new(tls_config)
        };
        let dot_listener = TcpListener::bind(dot_addr).await?;
        let dot_task = tokio::spawn(dot::serve(
            dot_listener,
            dot_tls_config,
            pipeline,
            self.shutdown_rx.clone(),
        ));

        info!("hns-resolver listening: DoH on {}, DoT on {}", doh_addr, dot_addr);

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
            }
            result = sync_task => {
                warn!("sync loop exited: {:?}", result);
            }
            result = peer_discovery => {
                warn!("peer discovery loop exited: {:?}", result);
            }
            result = doh_task => {
                warn!("doh server exited: {:?}", result);
            }
        }

        self.request_shutdown();
        dot_task.abort();

        let registry = self.registry.read().await;
        if let Err(e) = registry.save_learned() {
            warn!("failed to persist learned peers: {}", e);
        }

        Ok(())
    }
}

async fn run_peer_discovery(
    config: Arc<ResolverConfig>,
    registry: Arc<RwLock<PeerRegistry>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let discovered = PeerRegistry::resolve_dns_seeds(&config.dns_seeds, config.p2p_port).await;
        let verified = PeerRegistry::verify_all(discovered).await;
        {
            let mut registry = registry.write().await;
            registry.set_seed_discovered(verified);
        }

        tokio::select! {
            _ = tokio::time::sleep(std::time::Duration::from_secs(PEER_DISCOVERY_INTERVAL_SECS)) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}

async fn run_sync_loop<S: HeaderSource>(
    mut engine: SyncEngine<S>,
    store: HeaderStore,
    registry: Arc<RwLock<PeerRegistry>>,
    current_root: Arc<StdRwLock<Option<[u8; 32]>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    if let Ok(tip) = engine.chain().tip() {
        *current_root.write().expect("root lock poisoned") = Some(tip.name_root);
    }

    loop {
        if *shutdown.borrow() {
            return;
        }

        let candidates = {
            let registry = registry.read().await;
            let mut peers = registry.all_candidates();
            if peers.is_empty() {
                peers = registry.fallback();
            }
            peers
        };

        let mut outcome = crate::sync::RoundOutcome::default();
        for peer in &candidates {
            match engine.run_round(peer).await {
                Ok(o) => {
                    outcome = o;
                    break;
                }
                Err(e) => debug!("sync round against {:?} failed: {}", peer_addr(peer), e),
            }
        }

        if outcome.appended > 0 {
            if let Ok(tip) = engine.chain().tip() {
                *current_root.write().expect("root lock poisoned") = Some(tip.name_root);
                if let Ok(height) = engine.chain().tip_height() {
                    if should_flush(height) {
                        let timestamp = std::time::SystemTime::now()
                            .duration_since(std::time::UNIX_EPOCH)
                            .unwrap_or_default()
                            .as_secs();
                        if let Err(e) = store.save(engine.chain(), timestamp) {
                            warn!("failed to flush header store: {}", e);
                        }
                    }
                }
            }
        }

        let delay = engine.next_round_delay(&outcome);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}

fn peer_addr(peer: &Peer) -> SocketAddr {
    peer.endpoint
}
