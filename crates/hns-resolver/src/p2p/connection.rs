//! Framed P2P connection: version/verack handshake, ping/pong keep-alive,
//! and bounded reads of the `magic ‖ cmd ‖ length ‖ payload` frame.

use std::time::Duration;

use hns_core::codec::MAX_FRAME_SIZE;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::messages::{Command, PingMessage, PongMessage, VersionMessage};

/// Read timeout for a frame's fixed 9-byte header.
const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(30);
/// Read timeout for the frame payload once its length is known.
const PAYLOAD_READ_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("bad magic: expected {expected:#x}, got {got:#x}")]
    BadMagic { expected: u32, got: u32 },

    #[error("frame payload {0} exceeds maximum {1}")]
    Oversize(u32, u32),

    #[error("unknown command {0}")]
    UnknownCommand(u8),

    #[error(transparent)]
    Codec(#[from] hns_core::error::CodecError),

    #[error(transparent)]
    Bincode(#[from] bincode::Error),

    #[error("connection timed out")]
    Timeout,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<tokio::time::error::Elapsed> for ConnectionError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ConnectionError::Timeout
    }
}

pub struct Connection {
    stream: TcpStream,
    magic: u32,
    max_payload: u32,
}

pub struct Frame {
    pub command: Command,
    pub payload: Vec<u8>,
}

impl Connection {
    pub fn new(stream: TcpStream, magic: u32, max_payload: u32) -> Self {
        Self {
            stream,
            magic,
            max_payload,
        }
    }

    pub async fn connect(addr: std::net::SocketAddr, magic: u32, max_payload: u32) -> Result<Self, ConnectionError> {
        let stream = timeout(Duration::from_secs(10), TcpStream::connect(addr)).await??;
        Ok(Self::new(stream, magic, max_payload))
    }

    pub async fn send(&mut self, command: Command, payload: &[u8]) -> Result<(), ConnectionError> {
        if payload.len() as u32 > self.max_payload {
            return Err(ConnectionError::Oversize(payload.len() as u32, self.max_payload));
        }
        let frame = hns_core::codec::encode_frame(self.magic, command as u8, payload)?;
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        Ok(())
    }

    pub async fn send_bincode<T: serde::Serialize>(
        &mut self,
        command: Command,
        message: &T,
    ) -> Result<(), ConnectionError> {
        let payload = bincode::serialize(message)?;
        self.send(command, &payload).await
    }

    /// Read one frame, bounded by the header/payload timeouts.
    pub async fn recv(&mut self) -> Result<Frame, ConnectionError> {
        let mut header = [0u8; 9];
        timeout(HEADER_READ_TIMEOUT, self.stream.read_exact(&mut header)).await??;

        let (magic, cmd, length) = hns_core::codec::decode_frame_header(&header)?;
        if magic != self.magic {
            return Err(ConnectionError::BadMagic {
                expected: self.magic,
                got: magic,
            });
        }
        if length > MAX_FRAME_SIZE.min(self.max_payload) {
            return Err(ConnectionError::Oversize(length, self.max_payload));
        }
        let command = Command::try_from(cmd).map_err(|_| ConnectionError::UnknownCommand(cmd))?;

        let mut payload = vec![0u8; length as usize];
        timeout(PAYLOAD_READ_TIMEOUT, self.stream.read_exact(&mut payload)).await??;

        Ok(Frame { command, payload })
    }

    /// Outbound version → inbound verack, then inbound version → outbound
    /// verack; the peer's reported height becomes the caller's advisory
    /// network tip.
    pub async fn handshake(&mut self, start_height: u64, user_agent: &str) -> Result<u64, ConnectionError> {
        let version = VersionMessage {
            version: 1,
            services: 0,
            timestamp: now_secs(),
            user_agent: user_agent.to_string(),
            start_height,
        };
        self.send_bincode(Command::Version, &version).await?;

        let frame = self.recv().await?;
        if frame.command != Command::Version {
            return Err(ConnectionError::UnknownCommand(frame.command as u8));
        }
        let peer_version: VersionMessage = bincode::deserialize(&frame.payload)?;
        self.send(Command::Verack, &[]).await?;

        let ack = self.recv().await?;
        if ack.command != Command::Verack {
            debug!("peer skipped verack, continuing");
        }

        Ok(peer_version.start_height)
    }

    pub async fn ping(&mut self, nonce: u64) -> Result<(), ConnectionError> {
        self.send_bincode(Command::Ping, &PingMessage { nonce }).await
    }

    pub async fn pong(&mut self, nonce: u64) -> Result<(), ConnectionError> {
        self.send_bincode(Command::Pong, &PongMessage { nonce }).await
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_handshake_roundtrip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = Connection::new(stream, 0xABCD, 8_000_000);
            conn.handshake(100, "test-server/1.0").await.unwrap()
        });

        let mut client = Connection::connect(addr, 0xABCD, 8_000_000).await.unwrap();
        let client_height = client.handshake(50, "test-client/1.0").await.unwrap();
        let server_height = server.await.unwrap();

        assert_eq!(client_height, 100);
        assert_eq!(server_height, 50);
    }

    #[tokio::test]
    async fn test_bad_magic_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = Connection::new(stream, 0x1111, 8_000_000);
            conn.recv().await
        });

        let mut client = Connection::connect(addr, 0x2222, 8_000_000).await.unwrap();
        client.send(Command::Ping, &[]).await.unwrap();

        let result = server.await.unwrap();
        assert!(matches!(result, Err(ConnectionError::BadMagic { .. })));
    }
}
