//! DoT front-end: TLS with 2-byte big-endian length-prefixed DNS messages,
//! one query/response per frame, long-lived connection.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, warn};

use crate::blocklist::BlocklistProvider;
use crate::dns::pipeline::{NameResolver, Pipeline, RootSnapshot};
use crate::dns::wire;

const MAX_MESSAGE_LEN: usize = 0xffff;

pub async fn serve<B, R, N>(
    listener: TcpListener,
    tls_config: Arc<ServerConfig>,
    pipeline: Arc<Pipeline<B, R, N>>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) where
    B: BlocklistProvider + 'static,
    R: RootSnapshot + 'static,
    N: NameResolver + 'static,
{
    let acceptor = TlsAcceptor::from(tls_config);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer_addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!("dot: accept failed: {}", e);
                        continue;
                    }
                };
                let acceptor = acceptor.clone();
                let pipeline = Arc::clone(&pipeline);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, acceptor, pipeline).await {
                        debug!("dot: connection from {} ended: {}", peer_addr, e);
                    }
                });
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

async fn handle_connection<B, R, N>(
    stream: tokio::net::TcpStream,
    acceptor: TlsAcceptor,
    pipeline: Arc<Pipeline<B, R, N>>,
) -> anyhow::Result<()>
where
    B: BlocklistProvider,
    R: RootSnapshot,
    N: NameResolver,
{
    let mut tls_stream = acceptor.accept(stream).await?;

    loop {
        let mut len_buf = [0u8; 2];
        if tls_stream.read_exact(&mut len_buf).await.is_err() {
            return Ok(());
        }
        let len = u16::from_be_bytes(len_buf) as usize;
        if len == 0 || len > MAX_MESSAGE_LEN {
            return Ok(());
        }

        let mut payload = vec![0u8; len];
        tls_stream.read_exact(&mut payload).await?;

        let message = match wire::parse_query(&payload) {
            Ok(m) => m,
            Err(_) => continue,
        };
        let Some(question) = message.question else {
            continue;
        };

        let response = pipeline.resolve(message.id, question).await;
        let response_len = (response.len() as u16).to_be_bytes();
        tls_stream.write_all(&response_len).await?;
        tls_stream.write_all(&response).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_message_len_fits_u16_length_prefix() {
        assert_eq!(MAX_MESSAGE_LEN, u16::MAX as usize);
    }
}
