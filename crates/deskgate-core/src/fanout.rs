//! Broadcast fan-out engine: one upstream source, many disposable sinks.
//!
//! The engine is the write target of the UDP drain loop in the gateway.  Each
//! datagram received from the video source is handed to [`FanoutEngine::broadcast`]
//! exactly once, and the engine forwards it to every registered sink as one
//! opaque message.  The engine never fragments or coalesces chunks: message
//! boundaries are owned by the caller.
//!
//! # Failure containment
//!
//! In a live broadcast of a continuous video stream there is no sensible way
//! to buffer or retry per-subscriber: dropping a struggling subscriber is
//! strictly preferable to letting its backpressure stall the stream for
//! everyone.  The engine therefore treats any sink error — including a short
//! write — as fatal *for that sink only*:
//!
//! - the sink is removed from the registry,
//! - its [`SinkHandle`] is signalled so the owning session can close the
//!   connection,
//! - delivery to the remaining sinks continues,
//! - and [`FanoutEngine::broadcast`] still reports the full chunk length to
//!   the upstream drain loop, which must proceed unconditionally.
//!
//! # Ordering
//!
//! Broadcasts are serialized: each call completes all fan-out before the next
//! one is accepted, so a single sink always observes chunks in arrival order.
//! There is no ordering guarantee *across* sinks.
//!
//! # Ownership
//!
//! The engine is an explicitly owned object constructed in `main` and passed
//! (behind an `Arc`) to every task that needs it.  There is no process-global
//! registry, which keeps lifetimes and test isolation explicit.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

/// Opaque identity of a registered sink.
pub type SinkId = Uuid;

/// Error type reported by a sink write.
///
/// The engine does not distinguish between the variants when deciding a sink
/// is dead — any error removes the sink.  The variants exist so the removal
/// log line can say *why*.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The underlying transport failed (connection reset, send error, ...).
    #[error("sink transport error: {0}")]
    Transport(String),
    /// The sink was already closed by its peer.
    #[error("sink closed")]
    Closed,
}

/// A downstream subscriber of the broadcast stream.
///
/// Implementations wrap the send half of a client connection (in the gateway:
/// the write half of a WebSocket).  `send_chunk` must deliver the chunk as a
/// single message and return the number of bytes accepted; returning fewer
/// bytes than the chunk length marks the sink dead, exactly like an error.
#[async_trait]
pub trait BroadcastSink: Send {
    async fn send_chunk(&mut self, chunk: &[u8]) -> Result<usize, SinkError>;
}

/// Handle returned by [`FanoutEngine::register`].
///
/// The owning session holds the handle for the lifetime of the connection and
/// uses [`SinkHandle::wait_removed`] to learn when the engine has dropped the
/// sink, at which point it should close the client connection and call
/// [`FanoutEngine::unregister`] (a no-op by then, but harmless).
pub struct SinkHandle {
    id: SinkId,
    removed_rx: oneshot::Receiver<()>,
}

impl SinkHandle {
    /// The identity this sink was registered under.
    pub fn id(&self) -> SinkId {
        self.id
    }

    /// Suspends until the engine removes this sink from the registry.
    ///
    /// Resolves at most once: after it has resolved, the handle must not be
    /// awaited again.  If the engine itself is dropped first, this resolves
    /// as well (the session has nothing left to wait for).
    pub async fn wait_removed(&mut self) {
        // A closed channel (engine dropped, or session-initiated unregister)
        // counts as removal too.
        let _ = (&mut self.removed_rx).await;
    }
}

/// One registry entry: the sink itself plus the removal signal for its owner.
struct SinkEntry {
    sink: Box<dyn BroadcastSink>,
    removed_tx: oneshot::Sender<()>,
}

/// The broadcast fan-out engine.
///
/// The registry lives behind a single async `Mutex`.  The lock is held across
/// the whole fan-out of one chunk, which is what serializes broadcasts and
/// makes registration/removal trivially safe against iteration: no task can
/// observe a half-removed entry.
pub struct FanoutEngine {
    sinks: Mutex<HashMap<SinkId, SinkEntry>>,
}

impl FanoutEngine {
    /// Creates an empty engine.
    pub fn new() -> Self {
        Self {
            sinks: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a sink and returns the handle its owning session waits on.
    pub async fn register(&self, sink: Box<dyn BroadcastSink>) -> SinkHandle {
        let id = Uuid::new_v4();
        let (removed_tx, removed_rx) = oneshot::channel();
        self.sinks
            .lock()
            .await
            .insert(id, SinkEntry { sink, removed_tx });
        debug!("fanout: registered sink {id}");
        SinkHandle { id, removed_rx }
    }

    /// Removes a sink on behalf of its owning session (client disconnect).
    ///
    /// Idempotent: unregistering an id the engine already removed is a no-op.
    pub async fn unregister(&self, id: SinkId) {
        if self.sinks.lock().await.remove(&id).is_some() {
            debug!("fanout: unregistered sink {id}");
        }
    }

    /// Delivers `chunk` to every registered sink as one message.
    ///
    /// Sinks that error or short-write are removed and signalled; the caller
    /// is never told about them.  Always returns `chunk.len()`: the upstream
    /// drain loop must treat every broadcast as a success and keep going.
    pub async fn broadcast(&self, chunk: &[u8]) -> usize {
        let mut sinks = self.sinks.lock().await;
        let mut dead: Vec<(SinkId, String)> = Vec::new();

        for (id, entry) in sinks.iter_mut() {
            match entry.sink.send_chunk(chunk).await {
                Ok(n) if n == chunk.len() => {}
                Ok(n) => {
                    // Short write: the sink accepted only part of the message.
                    // Treated identically to an error — no partial-write
                    // recovery is attempted.
                    dead.push((*id, format!("short write ({n} of {} bytes)", chunk.len())));
                }
                Err(e) => {
                    dead.push((*id, e.to_string()));
                }
            }
        }

        for (id, reason) in dead {
            if let Some(entry) = sinks.remove(&id) {
                warn!("fanout: removing sink {id}: {reason}");
                // The owning session may already be gone; a dropped receiver
                // is fine.
                let _ = entry.removed_tx.send(());
            }
        }

        chunk.len()
    }

    /// Number of currently registered sinks.
    pub async fn sink_count(&self) -> usize {
        self.sinks.lock().await.len()
    }
}

impl Default for FanoutEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
