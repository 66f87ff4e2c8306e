//! Video path: UDP ingest loop and `/video` subscriber sessions.
//!
//! A video encoder multicasts an opaque byte stream (e.g. MPEG-TS for a
//! jsmpeg player) as raw UDP datagrams.  [`UdpIngest`] drains that socket
//! and feeds every datagram into the [`FanoutEngine`]; each `/video`
//! subscriber receives each datagram as one binary WebSocket message.  The
//! drain loop runs until the socket fails repeatedly enough to be considered
//! dead.
//!
//! The ingest loop never learns about subscriber failures — the engine
//! contains them — so a slow or broken viewer can never stall ingestion.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use deskgate_core::{BroadcastSink, FanoutEngine, SinkError};

/// Maximum UDP datagram we accept.  The practical limit for the video
/// encoders in use is the 64 KiB IPv4 datagram ceiling.
pub const MAX_DATAGRAM_SIZE: usize = 64 * 1024;

/// Pause after a failed `recv` before retrying.
const RECV_ERROR_DELAY: Duration = Duration::from_millis(100);

/// Consecutive `recv` failures after which the ingest loop gives up.
const MAX_CONSECUTIVE_RECV_ERRORS: u32 = 10;

/// Error type for the ingest socket.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The UDP socket could not be bound.
    #[error("failed to bind video ingest socket on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// The UDP ingest socket, bound but not yet draining.
///
/// Binding and running are separate steps so callers (and tests) can learn
/// the actual local address before the drain loop starts.
pub struct UdpIngest {
    socket: UdpSocket,
}

impl UdpIngest {
    /// Binds the ingest socket on `addr`.
    pub async fn bind(addr: SocketAddr) -> Result<Self, IngestError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| IngestError::BindFailed { addr, source })?;
        Ok(Self { socket })
    }

    /// The address the socket actually bound to (resolves port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Drains datagrams into the engine.
    ///
    /// One `recv` = one datagram = one broadcast chunk; the engine forwards
    /// it to each subscriber as a single message, so message boundaries
    /// survive end to end.  A receive error is logged and retried after a
    /// short pause — the stream is continuous and the next datagram is
    /// always more valuable than the one that failed.  A socket that fails
    /// [`MAX_CONSECUTIVE_RECV_ERRORS`] times in a row is treated as dead and
    /// the loop ends.
    pub async fn run(self, engine: Arc<FanoutEngine>) {
        match self.local_addr() {
            Ok(addr) => info!("video ingest listening on udp {addr}"),
            Err(_) => info!("video ingest listening"),
        }
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let mut streak = RecvErrorStreak::new(MAX_CONSECUTIVE_RECV_ERRORS);
        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((n, _peer)) => {
                    streak.clear();
                    engine.broadcast(&buf[..n]).await;
                }
                Err(e) => {
                    if streak.record() {
                        warn!("video ingest socket dead, giving up: {e}");
                        break;
                    }
                    warn!("video ingest recv error: {e}");
                    tokio::time::sleep(RECV_ERROR_DELAY).await;
                }
            }
        }
    }
}

/// Counts consecutive receive failures so a broken socket cannot spin the
/// ingest loop forever.
struct RecvErrorStreak {
    count: u32,
    limit: u32,
}

impl RecvErrorStreak {
    fn new(limit: u32) -> Self {
        Self { count: 0, limit }
    }

    /// Records one failure; returns true once the limit is reached.
    fn record(&mut self) -> bool {
        self.count += 1;
        self.count >= self.limit
    }

    /// A successful receive resets the streak.
    fn clear(&mut self) {
        self.count = 0;
    }
}

// ── Subscriber side ───────────────────────────────────────────────────────────

/// Adapter: the write half of a subscriber WebSocket as a broadcast sink.
///
/// A successful `send` means the whole chunk was accepted as one frame, so
/// the short-write arm of the engine contract can only be hit by sink
/// implementations with partial-write semantics — not this one.
struct WsBroadcastSink {
    tx: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl BroadcastSink for WsBroadcastSink {
    async fn send_chunk(&mut self, chunk: &[u8]) -> Result<usize, SinkError> {
        self.tx
            .send(Message::Binary(chunk.to_vec().into()))
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;
        Ok(chunk.len())
    }
}

/// Runs one `/video` subscriber session.
///
/// The send half is handed to the engine; this task keeps the receive half
/// and waits for whichever comes first:
///
/// - the engine removes the sink (its write failed), or
/// - the client closes the connection.
///
/// Either way the sink is unregistered before the connection is dropped, so
/// no chunk is ever delivered to a gone subscriber.
pub async fn run_video_session(socket: WebSocket, engine: Arc<FanoutEngine>) {
    let (tx, mut rx) = socket.split();
    let mut handle = engine.register(Box::new(WsBroadcastSink { tx })).await;
    let sink_id = handle.id();
    info!("video subscriber {sink_id} connected");

    loop {
        tokio::select! {
            _ = handle.wait_removed() => {
                debug!("video subscriber {sink_id} removed by engine");
                break;
            }
            msg = next_client_frame(&mut rx) => {
                match msg {
                    ClientFrame::Closed => {
                        debug!("video subscriber {sink_id} closed the connection");
                        break;
                    }
                    // Subscribers have nothing to say; ignore stray frames.
                    ClientFrame::Ignored => {}
                }
            }
        }
    }

    engine.unregister(sink_id).await;
    info!("video subscriber {sink_id} disconnected");
}

/// What the subscriber's receive half produced.
enum ClientFrame {
    /// The connection is over (close frame, stream end, or error).
    Closed,
    /// A frame we don't act on (the video path has no client → server data).
    Ignored,
}

async fn next_client_frame(rx: &mut SplitStream<WebSocket>) -> ClientFrame {
    match rx.next().await {
        None | Some(Err(_)) | Some(Ok(Message::Close(_))) => ClientFrame::Closed,
        Some(Ok(_)) => ClientFrame::Ignored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_streak_trips_only_at_the_limit() {
        // Arrange
        let mut streak = RecvErrorStreak::new(3);

        // Act / Assert
        assert!(!streak.record());
        assert!(!streak.record());
        assert!(streak.record());
    }

    #[test]
    fn test_error_streak_resets_on_success() {
        // Arrange
        let mut streak = RecvErrorStreak::new(2);
        assert!(!streak.record());

        // Act: a successful receive in between.
        streak.clear();

        // Assert: the count starts over.
        assert!(!streak.record());
        assert!(streak.record());
    }

    #[test]
    fn test_bind_error_names_the_address() {
        let err = IngestError::BindFailed {
            addr: "127.0.0.1:1234".parse().unwrap(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.to_string().contains("127.0.0.1:1234"));
    }
}
