// Header sync engine: locator construction, batched header processing, and
// the catch-up loop. Runs on a single task to guarantee
// sequential chain mutation; other lanes only ever see snapshots.

use std::time::Duration;

use hns_core::{Header, HeaderChain};
use tracing::{debug, info, warn};

use crate::peer::Peer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    CatchingUp,
    Synced,
}

/// Abstraction over "ask a peer for headers" so the round/catch-up logic
/// can be exercised without a live P2P connection.
pub trait HeaderSource {
    fn fetch_headers(
        &self,
        peer: &Peer,
        locator: &[[u8; 32]],
        stop: [u8; 32],
    ) -> impl std::future::Future<Output = anyhow::Result<Vec<Header>>> + Send;
}

pub struct SyncEngine<S: HeaderSource> {
    chain: HeaderChain,
    network_height: Option<u64>,
    source: S,
}

/// Outcome of processing one `headers(list)` batch.
#[derive(Debug, Default)]
pub struct RoundOutcome {
    pub appended: usize,
    pub rejected: usize,
}

impl<S: HeaderSource> SyncEngine<S> {
    pub fn new(chain: HeaderChain, source: S) -> Self {
        Self {
            chain,
            network_height: None,
            source,
        }
    }

    pub fn chain(&self) -> &HeaderChain {
        &self.chain
    }

    pub fn note_network_height(&mut self, height: u64) {
        if self.network_height.map(|h| height > h).unwrap_or(true) {
            self.network_height = Some(height);
        }
    }

    pub fn state(&self) -> SyncState {
        let tip = match self.chain.tip_height() {
            Ok(t) => t,
            Err(_) => return SyncState::Idle,
        };
        match self.network_height {
            None => SyncState::Idle,
            Some(network) if in_sync_band(tip, network) => SyncState::Synced,
            Some(_) => SyncState::CatchingUp,
        }
    }

    /// Run one round against `peer`: build a locator, fetch headers, and
    /// apply the six-rule batch-processing logic.
    pub async fn run_round(&mut self, peer: &Peer) -> anyhow::Result<RoundOutcome> {
        let locator = self.chain.build_locator()?;
        let headers = self.source.fetch_headers(peer, &locator, [0u8; 32]).await?;

        let mut outcome = RoundOutcome::default();
        for header in headers {
            match self.apply_header(header) {
                Ok(()) => outcome.appended += 1,
                Err(reason) => {
                    debug!("header rejected: {}", reason);
                    outcome.rejected += 1;
                }
            }
        }
        Ok(outcome)
    }

    /// The six numbered rules of batch processing for one incoming header.
    fn apply_header(&mut self, header: Header) -> Result<(), &'static str> {
        let hash = header.composite_hash();

        // Rule 2: duplicate of our current tip.
        if let Ok(tip_hash) = self.chain.tip_hash() {
            if hash == tip_hash {
                return Err("duplicate of tip");
            }
        }

        // Rule 3: must extend the current tip.
        if let Ok(tip_hash) = self.chain.tip_hash() {
            if header.prev_block != tip_hash {
                return Err("not a tip successor");
            }
        }

        // Rule 4: never get ahead of the advisory network height.
        if let Some(network_height) = self.network_height {
            if let Ok(tip_height) = self.chain.tip_height() {
                if tip_height + 1 > network_height {
                    return Err("ahead of advisory network height");
                }
            }
        }

        // Rule 5: already in the duplicate index.
        if self.chain.contains_hash(&hash) {
            return Err("duplicate hash");
        }

        // Rule 6: append (the chain itself trims the window on overflow).
        self.chain.append(header).map_err(|_| "append failed")
    }

    /// Delay before the next round, per the catch-up schedule.
    pub fn next_round_delay(&self, outcome: &RoundOutcome) -> Duration {
        if outcome.appended > 0 {
            Duration::from_millis(500)
        } else if self.state() == SyncState::CatchingUp {
            Duration::from_secs(2)
        } else {
            Duration::from_secs(300)
        }
    }
}

/// `network_height − tip ∈ [-2, 10]`.
fn in_sync_band(tip: u64, network_height: u64) -> bool {
    let diff = network_height as i64 - tip as i64;
    (-2..=10).contains(&diff)
}

/// Flush the store every 2000 headers of new tip.
pub fn should_flush(new_tip: u64) -> bool {
    new_tip % 2000 == 0
}

/// Run the catch-up loop until cancelled, selecting a peer each round from
/// `candidates` and sleeping the schedule-appropriate delay between rounds.
pub async fn run_catch_up<S: HeaderSource>(
    engine: &mut SyncEngine<S>,
    candidates: impl Fn() -> Vec<Peer> + Send + Sync,
    mut cancel: tokio::sync::watch::Receiver<bool>,
) {
    loop {
        if *cancel.borrow() {
            info!("sync loop cancelled");
            return;
        }

        let peers = candidates();
        let mut outcome = RoundOutcome::default();
        for peer in &peers {
            match engine.run_round(peer).await {
                Ok(o) => {
                    outcome = o;
                    break;
                }
                Err(e) => {
                    warn!("round against {:?} failed: {}", peer.endpoint, e);
                    continue;
                }
            }
        }

        let delay = engine.next_round_delay(&outcome);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.changed() => {
                if *cancel.borrow() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hns_core::checkpoint::bootstrap_chain;

    struct FakeSource {
        next: std::sync::Mutex<Vec<Header>>,
    }

    impl HeaderSource for FakeSource {
        async fn fetch_headers(&self, _peer: &Peer, _locator: &[[u8; 32]], _stop: [u8; 32]) -> anyhow::Result<Vec<Header>> {
            Ok(self.next.lock().unwrap().clone())
        }
    }

    fn successor(prev: &Header, nonce: u32) -> Header {
        Header {
            nonce,
            time: prev.time + 1,
            prev_block: prev.composite_hash(),
            name_root: prev.name_root,
            extra_nonce: prev.extra_nonce,
            reserved_root: prev.reserved_root,
            witness_root: prev.witness_root,
            merkle_root: prev.merkle_root,
            version: prev.version,
            bits: prev.bits,
            mask: prev.mask,
        }
    }

    #[tokio::test]
    async fn test_round_appends_valid_successor() {
        let chain = bootstrap_chain();
        let tip = chain.tip().unwrap().clone();
        let next = successor(&tip, 999);

        let engine_source = FakeSource {
            next: std::sync::Mutex::new(vec![next]),
        };
        let mut engine = SyncEngine::new(chain, engine_source);
        let peer = Peer {
            endpoint: "127.0.0.1:1".parse().unwrap(),
        };

        let outcome = engine.run_round(&peer).await.unwrap();
        assert_eq!(outcome.appended, 1);
        assert_eq!(outcome.rejected, 0);
    }

    #[tokio::test]
    async fn test_repeated_feed_appends_nothing() {
        let chain = bootstrap_chain();
        let tip = chain.tip().unwrap().clone();
        let next = successor(&tip, 999);

        let engine_source = FakeSource {
            next: std::sync::Mutex::new(vec![next.clone()]),
        };
        let mut engine = SyncEngine::new(chain, engine_source);
        let peer = Peer {
            endpoint: "127.0.0.1:1".parse().unwrap(),
        };

        engine.run_round(&peer).await.unwrap();
        *engine.source.next.lock().unwrap() = vec![next];
        let second = engine.run_round(&peer).await.unwrap();
        assert_eq!(second.appended, 0);
    }

    #[tokio::test]
    async fn test_rejects_header_ahead_of_network() {
        let chain = bootstrap_chain();
        let tip = chain.tip().unwrap().clone();
        let tip_height = chain.tip_height().unwrap();
        let next = successor(&tip, 1);

        let engine_source = FakeSource {
            next: std::sync::Mutex::new(vec![next]),
        };
        let mut engine = SyncEngine::new(chain, engine_source);
        engine.note_network_height(tip_height); // tip+1 > network_height

        let peer = Peer {
            endpoint: "127.0.0.1:1".parse().unwrap(),
        };
        let outcome = engine.run_round(&peer).await.unwrap();
        assert_eq!(outcome.appended, 0);
        assert_eq!(outcome.rejected, 1);
    }

    #[test]
    fn test_flush_schedule() {
        assert!(should_flush(136_150 + 1850));
        assert!(!should_flush(136_151));
    }
}
