//! Network-backed `HeaderSource` and `ProofSource` implementations: each
//! call opens a fresh connection to the given peer, does the version
//! handshake, sends one request, and reads back the matching response.

use hns_core::{Header, HEADER_SIZE};

use crate::p2p::connection::Connection;
use crate::p2p::messages::{Command, GetHeadersMessage, GetProofMessage, HeadersMessage, ProofMessage};
use crate::peer::Peer;
use crate::proof_client::ProofSource;
use crate::sync::HeaderSource;

const USER_AGENT: &str = concat!("hns-resolver/", env!("CARGO_PKG_VERSION"));

pub struct NetSource {
    magic: u32,
    max_payload: u32,
}

impl NetSource {
    pub fn new(magic: u32, max_payload: u32) -> Self {
        Self { magic, max_payload }
    }

    async fn open(&self, peer: &Peer, start_height: u64) -> anyhow::Result<Connection> {
        let mut conn = Connection::connect(peer.endpoint, self.magic, self.max_payload).await?;
        conn.handshake(start_height, USER_AGENT).await?;
        Ok(conn)
    }
}

impl HeaderSource for NetSource {
    async fn fetch_headers(
        &self,
        peer: &Peer,
        locator: &[[u8; 32]],
        stop: [u8; 32],
    ) -> anyhow::Result<Vec<Header>> {
        let mut conn = self.open(peer, 0).await?;
        conn.send_bincode(
            Command::GetHeaders,
            &GetHeadersMessage {
                locator: locator.to_vec(),
                stop,
            },
        )
        .await?;

        let frame = conn.recv().await?;
        if frame.command != Command::Headers {
            anyhow::bail!("expected headers, got {:?}", frame.command);
        }
        let message: HeadersMessage = bincode::deserialize(&frame.payload)?;
        message
            .headers
            .iter()
            .map(|bytes| {
                if bytes.len() != HEADER_SIZE {
                    anyhow::bail!("header entry has wrong size: {}", bytes.len());
                }
                Header::decode(bytes).map_err(|e: hns_core::HeaderError| anyhow::anyhow!("bad header encoding: {}", e))
            })
            .collect()
    }
}

impl ProofSource for NetSource {
    async fn fetch_proof(&self, peer: &Peer, root: [u8; 32], key: [u8; 32]) -> anyhow::Result<Vec<u8>> {
        let mut conn = self.open(peer, 0).await?;
        conn.send_bincode(Command::GetProof, &GetProofMessage { root, key }).await?;

        let frame = conn.recv().await?;
        if frame.command != Command::Proof {
            anyhow::bail!("expected proof, got {:?}", frame.command);
        }
        let message: ProofMessage = bincode::deserialize(&frame.payload)?;
        Ok(message.encoded_proof)
    }
}
