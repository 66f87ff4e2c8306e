//! Stream bridge: one browser WebSocket paired with one upstream TCP stream.
//!
//! This is the `/websockify` data path.  Each session dials the configured
//! remote-framebuffer address and then runs two independent copy loops:
//!
//! - **client → upstream**: WebSocket frame payloads written to the TCP
//!   stream as raw bytes,
//! - **upstream → client**: TCP bytes read in up-to-32-KiB slices, each sent
//!   to the browser as one binary WebSocket frame.
//!
//! Whichever loop terminates first — end of stream or error on either leg —
//! ends the session: the other loop is aborted and both endpoints are closed
//! by dropping their halves.  Each half is owned by exactly one task, so
//! teardown cannot double-close or deadlock.
//!
//! Dial failures and mid-session failures are logged distinctly so an
//! operator can tell "upstream unreachable" from "client hung up".  A failed
//! dial is never retried; the browser sees its WebSocket close and its own
//! reconnect logic takes over.

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info};

/// Copy buffer for the upstream → client direction.  Framebuffer updates
/// arrive in large bursts; a big buffer keeps the syscall count down.
pub const COPY_BUFFER_SIZE: usize = 32 * 1024;

/// Error type for bridge sessions.
///
/// Sessions are fire-and-forget tasks, so these are logged rather than
/// propagated; the enum exists to keep the two failure classes distinct.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The upstream TCP connection could not be established.
    #[error("dial failed for {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    /// Read or write failed on an established leg.
    #[error("transport error: {0}")]
    Transport(std::io::Error),
}

/// Runs one complete bridge session: dial, pump both directions, tear down.
pub async fn run_bridge(socket: WebSocket, target: String) {
    // Dial with hostname resolution; failure is terminal for this session.
    let stream = match TcpStream::connect(&target).await {
        Ok(s) => s,
        Err(source) => {
            let e = BridgeError::Dial {
                addr: target.clone(),
                source,
            };
            error!("[{target}] {e}");
            // Dropping `socket` closes the browser connection.
            return;
        }
    };

    info!("[{target}] framebuffer session established");

    let (mut tcp_read, mut tcp_write) = stream.into_split();
    let (mut ws_tx, mut ws_rx) = socket.split();

    // ── client → upstream ─────────────────────────────────────────────────────
    let target_c2u = target.clone();
    let mut client_to_upstream = tokio::spawn(async move {
        while let Some(msg) = ws_rx.next().await {
            let payload: Vec<u8> = match msg {
                // noVNC speaks binary frames; tolerate text frames by
                // forwarding their bytes unchanged.
                Ok(Message::Binary(data)) => data.to_vec(),
                Ok(Message::Text(text)) => text.as_str().as_bytes().to_vec(),
                Ok(Message::Close(_)) => break,
                // Protocol-level ping/pong is handled by axum when writing.
                Ok(_) => continue,
                Err(e) => {
                    debug!("[{target_c2u}] client read error: {e}");
                    break;
                }
            };
            if let Err(e) = tcp_write.write_all(&payload).await {
                debug!("[{target_c2u}] {}", BridgeError::Transport(e));
                break;
            }
        }
        // Signal EOF toward the framebuffer server so it tears the session
        // down on its side too.
        let _ = tcp_write.shutdown().await;
    });

    // ── upstream → client ─────────────────────────────────────────────────────
    let target_u2c = target.clone();
    let mut upstream_to_client = tokio::spawn(async move {
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        loop {
            match tcp_read.read(&mut buf).await {
                Ok(0) => break, // upstream EOF
                Ok(n) => {
                    if ws_tx.send(Message::Binary(buf[..n].to_vec().into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!("[{target_u2c}] {}", BridgeError::Transport(e));
                    break;
                }
            }
        }
        // Best effort: tell the browser the session is over.
        let _ = ws_tx.send(Message::Close(None)).await;
    });

    // First loop to finish ends the session; abort the other so its half is
    // dropped and the underlying connection closes promptly.
    tokio::select! {
        _ = &mut client_to_upstream => {
            upstream_to_client.abort();
            info!("[{target}] client disconnected");
        }
        _ = &mut upstream_to_client => {
            client_to_upstream.abort();
            info!("[{target}] upstream session closed");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
