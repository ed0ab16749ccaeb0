//! Bidirectional byte relay between a client and one fixed backend.
//!
//! # Responsibilities
//! - Open the backend connection before reading anything from the client
//! - Copy bytes in both directions, one chunk in flight per direction
//! - Propagate a close on either leg to the other leg
//!
//! # Design Decisions
//! - Each direction is a sequential read → write_all → flush loop over one
//!   fixed buffer, so the next read is only issued once the previous chunk
//!   has been handed to the peer
//! - The leg that ended is left alone; the other leg is flushed and shut
//!   down so queued bytes are not discarded
//! - A failed backend connect drops the client with no response
//! - With headers configured, client bytes are held back until the first
//!   request head is complete, so injection cannot be dodged by splitting
//!   the head across segments

use std::borrow::Cow;
use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::ProxyTarget;
use crate::observability::metrics;
use crate::proxy::inject::{FirstHop, HeaderInjector, Rewrite};

/// Bytes read per chunk in each direction.
pub const RELAY_BUFFER: usize = 8 * 1024;

/// One side of a proxy pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leg {
    Client,
    Backend,
}

/// Summary of a finished relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOutcome {
    /// Bytes written to the backend, injected headers included.
    pub upstream_bytes: u64,
    /// Bytes read from the backend and written to the client.
    pub downstream_bytes: u64,
    /// The leg whose close or failure ended the relay.
    pub ended_by: Leg,
}

/// Reverse-proxy pipeline for one listener.
#[derive(Debug, Clone)]
pub struct ProxyRelay {
    target: ProxyTarget,
    injector: HeaderInjector,
}

impl ProxyRelay {
    pub fn new(target: ProxyTarget) -> Self {
        let injector = HeaderInjector::new(target.headers.clone());
        Self { target, injector }
    }

    /// `host:port` of the backend.
    pub fn backend_address(&self) -> String {
        format!("{}:{}", self.target.backend_host, self.target.backend_port)
    }

    /// Connect to the backend, then relay until either side closes.
    ///
    /// On connect failure the client connection is dropped and the error
    /// returned.
    pub async fn attach<S>(&self, inbound: S, peer: SocketAddr) -> io::Result<RelayOutcome>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let backend = match TcpStream::connect((
            self.target.backend_host.as_str(),
            self.target.backend_port,
        ))
        .await
        {
            Ok(backend) => backend,
            Err(err) => {
                tracing::warn!(
                    backend = %self.backend_address(),
                    error = %err,
                    "Backend connect failed, dropping client"
                );
                drop(inbound);
                return Err(err);
            }
        };
        let _ = backend.set_nodelay(true);

        tracing::debug!(backend = %self.backend_address(), "Backend connected");

        let first_hop = self.injector.first_hop(peer, &self.target.backend_host);
        let outcome = relay(inbound, backend, Some(first_hop)).await;

        tracing::debug!(
            upstream_bytes = outcome.upstream_bytes,
            downstream_bytes = outcome.downstream_bytes,
            ended_by = ?outcome.ended_by,
            "Relay finished"
        );
        Ok(outcome)
    }
}

/// Pair `inbound` with a new connection to `target` and relay.
pub async fn attach_proxy_pair<S>(
    inbound: S,
    peer: SocketAddr,
    target: &ProxyTarget,
) -> io::Result<RelayOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    ProxyRelay::new(target.clone()).attach(inbound, peer).await
}

/// Relay between two connected streams until one of them ends.
///
/// `first_hop`, when set, may rewrite the first request head read from the
/// client.
pub async fn relay<C, B>(client: C, backend: B, first_hop: Option<FirstHop<'_>>) -> RelayOutcome
where
    C: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_rd, mut client_wr) = tokio::io::split(client);
    let (mut backend_rd, mut backend_wr) = tokio::io::split(backend);
    let mut upstream_bytes = 0u64;
    let mut downstream_bytes = 0u64;

    let ended_by = {
        let upstream = pump(
            &mut client_rd,
            &mut backend_wr,
            (Leg::Client, Leg::Backend),
            first_hop,
            &mut upstream_bytes,
        );
        let downstream = pump(
            &mut backend_rd,
            &mut client_wr,
            (Leg::Backend, Leg::Client),
            None,
            &mut downstream_bytes,
        );
        tokio::select! {
            ended = upstream => ended,
            ended = downstream => ended,
        }
    };

    match ended_by {
        Leg::Client => close_gracefully(&mut backend_wr).await,
        Leg::Backend => close_gracefully(&mut client_wr).await,
    }

    metrics::record_proxy_bytes("upstream", upstream_bytes);
    metrics::record_proxy_bytes("downstream", downstream_bytes);

    RelayOutcome {
        upstream_bytes,
        downstream_bytes,
        ended_by,
    }
}

/// Copy `reader` into `writer` one chunk at a time. Returns the leg that
/// ended the copy: the source on EOF or read failure, the sink on write
/// failure.
async fn pump<R, W>(
    reader: &mut R,
    writer: &mut W,
    (source, sink): (Leg, Leg),
    mut first_hop: Option<FirstHop<'_>>,
    total: &mut u64,
) -> Leg
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUFFER];
    let mut head = Vec::new();
    loop {
        let read = match reader.read(&mut buf).await {
            Ok(0) => {
                // An unfinished head still belongs to the backend.
                if !head.is_empty() && forward(writer, &head).await.is_ok() {
                    *total += head.len() as u64;
                }
                return source;
            }
            Ok(read) => read,
            Err(err) => {
                tracing::debug!(leg = ?source, error = %err, "Relay read failed");
                return source;
            }
        };

        let chunk = &buf[..read];
        let payload = match first_hop {
            None => Cow::Borrowed(chunk),
            Some(hop) => {
                head.extend_from_slice(chunk);
                match hop.rewrite(&head) {
                    Rewrite::Partial => continue,
                    Rewrite::Ready(rewritten) => {
                        first_hop = None;
                        head.clear();
                        Cow::Owned(rewritten)
                    }
                    Rewrite::Passthrough => {
                        first_hop = None;
                        Cow::Owned(std::mem::take(&mut head))
                    }
                    Rewrite::Oversized => {
                        tracing::warn!(
                            buffered = head.len(),
                            "Request head too large for header injection, closing"
                        );
                        return source;
                    }
                }
            }
        };

        if let Err(err) = forward(writer, &payload).await {
            tracing::debug!(leg = ?sink, error = %err, "Relay write failed");
            return sink;
        }
        *total += payload.len() as u64;
    }
}

async fn forward<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    writer.write_all(payload).await?;
    writer.flush().await
}

/// Flush queued bytes, then close the write side.
async fn close_gracefully<W: AsyncWrite + Unpin>(writer: &mut W) {
    let _ = writer.flush().await;
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::{duplex, DuplexStream, ReadBuf};

    /// Counts bytes the relay pulls from the client.
    struct CountingStream {
        inner: DuplexStream,
        read: Arc<AtomicU64>,
    }

    impl AsyncRead for CountingStream {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            let before = buf.filled().len();
            let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
            let added = (buf.filled().len() - before) as u64;
            self.read.fetch_add(added, Ordering::SeqCst);
            poll
        }
    }

    impl AsyncWrite for CountingStream {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Pin::new(&mut self.inner).poll_write(cx, buf)
        }

        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_flush(cx)
        }

        fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_shutdown(cx)
        }
    }

    #[tokio::test]
    async fn relays_bytes_in_order_and_propagates_client_close() {
        let (mut client, relay_client) = duplex(64 * 1024);
        let (relay_backend, mut backend) = duplex(64 * 1024);
        let relay_task = tokio::spawn(relay(relay_client, relay_backend, None));

        let mut expected = Vec::new();
        for i in 0..50u8 {
            let chunk = vec![i; 1000 + i as usize];
            client.write_all(&chunk).await.unwrap();
            expected.extend_from_slice(&chunk);
        }
        drop(client);

        let mut received = Vec::new();
        backend.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, expected);

        let outcome = relay_task.await.unwrap();
        assert_eq!(outcome.ended_by, Leg::Client);
        assert_eq!(outcome.upstream_bytes, expected.len() as u64);
    }

    #[tokio::test]
    async fn backend_close_reaches_client() {
        let (mut client, relay_client) = duplex(64 * 1024);
        let (relay_backend, mut backend) = duplex(64 * 1024);
        let relay_task = tokio::spawn(relay(relay_client, relay_backend, None));

        backend.write_all(b"goodbye").await.unwrap();
        drop(backend);

        let mut received = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut received))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, b"goodbye");
        assert_eq!(relay_task.await.unwrap().ended_by, Leg::Backend);
    }

    #[tokio::test]
    async fn stalled_backend_bounds_client_reads() {
        const BACKEND_CAPACITY: usize = RELAY_BUFFER;

        let (mut client, relay_client) = duplex(1024 * 1024);
        let (relay_backend, _stalled_backend) = duplex(BACKEND_CAPACITY);
        let read = Arc::new(AtomicU64::new(0));
        let counted = CountingStream {
            inner: relay_client,
            read: read.clone(),
        };
        let relay_task = tokio::spawn(async move { relay(counted, relay_backend, None).await });

        client.write_all(&vec![7u8; 512 * 1024]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let pulled = read.load(Ordering::SeqCst) as usize;
        assert!(pulled > 0);
        assert!(
            pulled <= BACKEND_CAPACITY + 2 * RELAY_BUFFER,
            "relay pulled {pulled} bytes from the client"
        );
        relay_task.abort();
    }

    #[tokio::test]
    async fn first_chunk_gets_injected_headers() {
        let injector = HeaderInjector::new(vec![crate::config::ProxyHeader {
            name: "X-Real-IP".to_string(),
            value: "$remote_addr".to_string(),
        }]);
        let peer: SocketAddr = "203.0.113.9:4000".parse().unwrap();

        let (mut client, relay_client) = duplex(64 * 1024);
        let (relay_backend, mut backend) = duplex(64 * 1024);

        client
            .write_all(b"GET / HTTP/1.1\r\nHost: swift\r\n\r\n")
            .await
            .unwrap();
        drop(client);

        let outcome = relay(
            relay_client,
            relay_backend,
            Some(injector.first_hop(peer, "backend")),
        )
        .await;
        assert_eq!(outcome.ended_by, Leg::Client);

        let mut received = Vec::new();
        backend.read_to_end(&mut received).await.unwrap();
        assert_eq!(outcome.upstream_bytes, received.len() as u64);
        let text = String::from_utf8(received).unwrap();
        assert!(text.contains("X-Real-IP: 203.0.113.9\r\n"));
        assert!(text.contains("Host: swift\r\n"));
    }

    #[tokio::test]
    async fn head_split_across_writes_is_still_rewritten() {
        let injector = HeaderInjector::new(vec![crate::config::ProxyHeader {
            name: "X-Forwarded-For".to_string(),
            value: "$remote_addr".to_string(),
        }]);
        let peer: SocketAddr = "203.0.113.9:4000".parse().unwrap();

        let (mut client, relay_client) = duplex(64 * 1024);
        let (relay_backend, mut backend) = duplex(64 * 1024);
        let relaying = tokio::spawn(async move {
            relay(
                relay_client,
                relay_backend,
                Some(injector.first_hop(peer, "backend")),
            )
            .await
        });

        client
            .write_all(b"GET /api HTTP/1.1\r\nHost: swift\r\nX-Forwarded-For: 6.6.6.6\r\n")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        client.write_all(b"\r\nbody").await.unwrap();
        drop(client);

        let mut received = Vec::new();
        backend.read_to_end(&mut received).await.unwrap();
        let outcome = relaying.await.unwrap();

        let text = String::from_utf8(received).unwrap();
        assert!(text.starts_with("GET /api HTTP/1.1\r\n"));
        assert!(text.contains("X-Forwarded-For: 203.0.113.9\r\n"));
        assert!(!text.contains("6.6.6.6"));
        assert!(text.ends_with("\r\n\r\nbody"));
        assert_eq!(outcome.upstream_bytes, text.len() as u64);
    }

    #[tokio::test]
    async fn oversized_head_closes_instead_of_bypassing() {
        let injector = HeaderInjector::new(vec![crate::config::ProxyHeader {
            name: "X-Real-IP".to_string(),
            value: "$remote_addr".to_string(),
        }]);
        let peer: SocketAddr = "203.0.113.9:4000".parse().unwrap();

        let (mut client, relay_client) = duplex(64 * 1024);
        let (relay_backend, mut backend) = duplex(64 * 1024);

        let mut head = b"GET / HTTP/1.1\r\nX-Real-IP: 6.6.6.6\r\nX-Pad: ".to_vec();
        head.resize(crate::http::codec::MAX_HEAD_SIZE + RELAY_BUFFER, b'a');
        client.write_all(&head).await.unwrap();

        let outcome = relay(
            relay_client,
            relay_backend,
            Some(injector.first_hop(peer, "backend")),
        )
        .await;
        assert_eq!(outcome.ended_by, Leg::Client);
        assert_eq!(outcome.upstream_bytes, 0);

        let mut received = Vec::new();
        backend.read_to_end(&mut received).await.unwrap();
        assert!(received.is_empty());
    }

    #[tokio::test]
    async fn connect_failure_drops_client() {
        let unused = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = unused.local_addr().unwrap().port();
        drop(unused);

        let target = ProxyTarget {
            backend_host: "127.0.0.1".to_string(),
            backend_port: port,
            headers: Vec::new(),
        };
        let (mut client, relay_client) = duplex(1024);
        let peer: SocketAddr = "127.0.0.1:1".parse().unwrap();

        assert!(attach_proxy_pair(relay_client, peer, &target).await.is_err());
        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        assert!(received.is_empty());
    }
}
