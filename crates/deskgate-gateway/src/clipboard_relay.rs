//! Clipboard relay: one session per `/clipboard` connection.
//!
//! Each session first waits for the host clipboard capability to become
//! available (bounded exponential backoff), then runs three concurrent
//! activities scoped to the connection:
//!
//! 1. **Keep-alive ticker** — writes the 1-byte marker once per second; any
//!    write error ends the session.
//! 2. **Inbound reader** — every received payload that is not the keep-alive
//!    marker (classified by length, see [`deskgate_core::is_keepalive`]) is
//!    written to the host clipboard.
//! 3. **Change forwarder** — every host clipboard change is sent to the
//!    client as a text message.
//!
//! The first activity to finish ends the session; the other two are aborted,
//! which drops the watch subscription (cancelling it) and both WebSocket
//! halves (closing the connection).  That teardown runs on every exit path.

use std::sync::Arc;

use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio::time::interval;
use tracing::{debug, info, warn};

use deskgate_core::{
    init_with_backoff, is_keepalive, ClipboardFormat, ClipboardProvider, KEEPALIVE,
    KEEPALIVE_INTERVAL,
};

/// Runs one complete clipboard relay session.
pub async fn run_clipboard_session(socket: WebSocket, clipboard: Arc<dyn ClipboardProvider>) {
    info!("clipboard session opened");

    // The capability may not be ready while the desktop session is still
    // starting; keep trying with backoff until it is.
    init_with_backoff(clipboard.as_ref()).await;

    // Subscribe before splitting the socket so no change between init and
    // the forwarder starting is lost.
    let mut watch = clipboard.subscribe();

    let (ws_tx, mut ws_rx) = socket.split();
    // The ticker and the forwarder both write to the client; share the sink
    // behind an async mutex so their frames interleave whole.
    let ws_tx = Arc::new(Mutex::new(ws_tx));

    // ── Activity 1: keep-alive ticker ─────────────────────────────────────────
    let ws_tx_tick = Arc::clone(&ws_tx);
    let mut keepalive = tokio::spawn(async move {
        let mut ticker = interval(KEEPALIVE_INTERVAL);
        ticker.tick().await; // skip the immediate first tick
        loop {
            ticker.tick().await;
            let mut sink = ws_tx_tick.lock().await;
            if sink.send(Message::Text(Utf8Bytes::from_static(KEEPALIVE))).await.is_err() {
                debug!("clipboard keep-alive write failed; client gone");
                break;
            }
        }
    });

    // ── Activity 2: inbound reader ────────────────────────────────────────────
    let clipboard_in = Arc::clone(&clipboard);
    let mut inbound = tokio::spawn(async move {
        while let Some(msg) = ws_rx.next().await {
            let payload: Vec<u8> = match msg {
                Ok(Message::Text(text)) => text.as_str().as_bytes().to_vec(),
                Ok(Message::Binary(data)) => data.to_vec(),
                Ok(Message::Close(_)) => break,
                Ok(_) => continue, // protocol-level ping/pong
                Err(e) => {
                    debug!("clipboard client read error: {e}");
                    break;
                }
            };
            // The keep-alive echo must never land in the host clipboard.
            if is_keepalive(&payload) {
                continue;
            }
            if let Err(e) = clipboard_in.write(ClipboardFormat::Text, &payload).await {
                warn!("clipboard write from client failed: {e}");
            }
        }
    });

    // ── Activity 3: change forwarder ──────────────────────────────────────────
    let ws_tx_fwd = Arc::clone(&ws_tx);
    let mut forward = tokio::spawn(async move {
        while let Some(contents) = watch.changed().await {
            let text = String::from_utf8_lossy(&contents).into_owned();
            let mut sink = ws_tx_fwd.lock().await;
            if sink.send(Message::Text(text.into())).await.is_err() {
                debug!("clipboard forward to client failed; client gone");
                break;
            }
        }
        // `watch` is dropped here, cancelling the subscription.
    });

    // First activity to finish ends the session.
    tokio::select! {
        _ = &mut keepalive => {}
        _ = &mut inbound => {}
        _ = &mut forward => {}
    }
    keepalive.abort();
    inbound.abort();
    forward.abort();

    info!("clipboard session closed");
}
