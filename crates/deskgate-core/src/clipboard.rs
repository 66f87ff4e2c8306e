//! Host clipboard capability boundary and keep-alive framing.
//!
//! The gateway never talks to a platform clipboard API directly.  It talks to
//! a [`ClipboardProvider`], an opaque capability with three operations:
//!
//! - `init` – make the capability available (may fail while the host session
//!   is not ready yet; see [`init_with_backoff`]),
//! - `write` – store client-originated clipboard content,
//! - `subscribe` – obtain a cancellable stream of clipboard change events.
//!
//! [`MemoryClipboard`] is the in-process implementation the gateway ships
//! with; a platform backend plugs in behind the same trait without touching
//! the relay code.
//!
//! # Keep-alive framing
//!
//! The clipboard WebSocket carries two kinds of messages on one channel:
//! real clipboard payloads and a once-per-second keep-alive marker.  The two
//! are disambiguated *only by length*: a 1-byte message is the keep-alive
//! sentinel and is never treated as clipboard content, regardless of its
//! value.  The embedded web client relies on this exact convention, so
//! [`is_keepalive`] is the single place that implements it.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// The keep-alive marker written to the client once per second.
pub const KEEPALIVE: &str = "A";

/// How often the relay writes the keep-alive marker.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(1);

/// Returns `true` if a clipboard-channel payload is the keep-alive marker.
///
/// Classification is by length alone: any 1-byte payload is a keep-alive.
/// This mirrors what the web client does on its side, and it is what keeps a
/// host echo-back of the marker from triggering a spurious clipboard write.
pub fn is_keepalive(payload: &[u8]) -> bool {
    payload.len() == 1
}

/// Clipboard content formats the relay understands.
///
/// Only text is relayed today; the enum exists because the capability
/// interface is format-addressed and platform backends support more.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ClipboardFormat {
    Text,
}

/// Error type for clipboard capability operations.
#[derive(Debug, Error)]
pub enum ClipboardError {
    /// The capability could not be initialised (host session not ready).
    #[error("clipboard unavailable: {0}")]
    Unavailable(String),
    /// A write to the host clipboard failed.
    #[error("clipboard write failed: {0}")]
    WriteFailed(String),
}

/// The host clipboard capability.
///
/// Implementations must be cheap to share (`Arc<dyn ClipboardProvider>`);
/// each `/clipboard` session calls `init` once, holds one subscription for
/// its lifetime, and writes whenever the client sends content.
#[async_trait]
pub trait ClipboardProvider: Send + Sync {
    /// Makes the capability available.  May be called more than once.
    async fn init(&self) -> Result<(), ClipboardError>;

    /// Stores `contents` in the host clipboard.
    async fn write(&self, format: ClipboardFormat, contents: &[u8]) -> Result<(), ClipboardError>;

    /// Starts watching for clipboard changes.
    ///
    /// The subscription is cancelled by dropping the returned watch; sessions
    /// rely on this for guaranteed release on every exit path.
    fn subscribe(&self) -> ClipboardWatch;
}

/// A cancellable clipboard change subscription.
///
/// Wraps a broadcast receiver so that every subscriber observes every change.
/// Dropping the watch ends the subscription.
pub struct ClipboardWatch {
    rx: broadcast::Receiver<Vec<u8>>,
}

impl ClipboardWatch {
    /// Waits for the next clipboard change.
    ///
    /// Returns `None` when the provider has been dropped.  A subscriber that
    /// lags far enough behind to lose events simply skips to the newest one —
    /// clipboard state is last-write-wins, so intermediate values are not
    /// worth blocking for.
    pub async fn changed(&mut self) -> Option<Vec<u8>> {
        loop {
            match self.rx.recv().await {
                Ok(contents) => return Some(contents),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("clipboard watch lagged; skipped {skipped} change(s)");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

// ── In-process provider ───────────────────────────────────────────────────────

/// In-process clipboard provider.
///
/// Holds the current contents and fans change events out to all watchers.
/// Writes originating from a client are observed by every subscriber —
/// including the session that wrote them, which is why the relay filters the
/// keep-alive marker by length before writing (see [`is_keepalive`]).
pub struct MemoryClipboard {
    contents: Mutex<Option<Vec<u8>>>,
    changes: broadcast::Sender<Vec<u8>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        // 16 in-flight changes per subscriber before lagging; clipboard
        // updates are human-scale, so this never fills in practice.
        let (changes, _) = broadcast::channel(16);
        Self {
            contents: Mutex::new(None),
            changes,
        }
    }

    /// Current clipboard contents, if any has been written.
    pub fn contents(&self) -> Option<Vec<u8>> {
        self.contents.lock().unwrap().clone()
    }
}

impl Default for MemoryClipboard {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClipboardProvider for MemoryClipboard {
    async fn init(&self) -> Result<(), ClipboardError> {
        Ok(())
    }

    async fn write(&self, _format: ClipboardFormat, contents: &[u8]) -> Result<(), ClipboardError> {
        *self.contents.lock().unwrap() = Some(contents.to_vec());
        // No subscribers is fine; the value is still stored.
        let _ = self.changes.send(contents.to_vec());
        Ok(())
    }

    fn subscribe(&self) -> ClipboardWatch {
        ClipboardWatch {
            rx: self.changes.subscribe(),
        }
    }
}

// ── Capability initialisation ─────────────────────────────────────────────────

/// Initial delay between failed `init` attempts.
const INIT_BACKOFF_BASE: Duration = Duration::from_millis(100);

/// Upper bound on the delay between failed `init` attempts.
const INIT_BACKOFF_CAP: Duration = Duration::from_secs(5);

/// Retries `provider.init()` until it succeeds, with bounded exponential
/// backoff (100 ms doubling up to 5 s), logging each failed attempt.
///
/// The retry runs for as long as the calling session lives: the host
/// clipboard typically becomes available as soon as the desktop session is
/// up, and a client that gives up earlier simply closes its connection,
/// cancelling the task this runs in.
pub async fn init_with_backoff(provider: &dyn ClipboardProvider) {
    let mut delay = INIT_BACKOFF_BASE;
    let mut attempt: u32 = 1;
    loop {
        match provider.init().await {
            Ok(()) => {
                info!("clipboard capability initialised (attempt {attempt})");
                return;
            }
            Err(e) => {
                warn!("clipboard init attempt {attempt} failed: {e}; retrying in {delay:?}");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(INIT_BACKOFF_CAP);
                attempt += 1;
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_one_byte_payload_is_keepalive_regardless_of_value() {
        assert!(is_keepalive(b"A"));
        assert!(is_keepalive(b"\x00"));
        assert!(is_keepalive(b"Z"));
    }

    #[test]
    fn test_other_lengths_are_clipboard_content() {
        assert!(!is_keepalive(b""));
        assert!(!is_keepalive(b"AB"));
        assert!(!is_keepalive(b"hello clipboard"));
    }

    #[test]
    fn test_keepalive_marker_is_one_byte() {
        // The sentinel itself must classify as a keep-alive.
        assert!(is_keepalive(KEEPALIVE.as_bytes()));
    }

    #[tokio::test]
    async fn test_memory_clipboard_write_then_read() {
        let cb = MemoryClipboard::new();
        cb.write(ClipboardFormat::Text, b"copied text").await.unwrap();
        assert_eq!(cb.contents(), Some(b"copied text".to_vec()));
    }

    #[tokio::test]
    async fn test_subscriber_observes_writes_in_order() {
        // Arrange
        let cb = MemoryClipboard::new();
        let mut watch = cb.subscribe();

        // Act
        cb.write(ClipboardFormat::Text, b"first").await.unwrap();
        cb.write(ClipboardFormat::Text, b"second").await.unwrap();

        // Assert
        assert_eq!(watch.changed().await, Some(b"first".to_vec()));
        assert_eq!(watch.changed().await, Some(b"second".to_vec()));
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_every_change() {
        let cb = MemoryClipboard::new();
        let mut watch_a = cb.subscribe();
        let mut watch_b = cb.subscribe();

        cb.write(ClipboardFormat::Text, b"shared").await.unwrap();

        assert_eq!(watch_a.changed().await, Some(b"shared".to_vec()));
        assert_eq!(watch_b.changed().await, Some(b"shared".to_vec()));
    }

    #[tokio::test]
    async fn test_watch_ends_when_provider_is_dropped() {
        let cb = MemoryClipboard::new();
        let mut watch = cb.subscribe();
        drop(cb);
        assert_eq!(watch.changed().await, None);
    }

    /// Provider double that fails a configurable number of times before
    /// succeeding, counting attempts.
    struct FlakyProvider {
        failures: usize,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl ClipboardProvider for FlakyProvider {
        async fn init(&self) -> Result<(), ClipboardError> {
            let n = self.attempts.fetch_add(1, Ordering::Relaxed);
            if n < self.failures {
                Err(ClipboardError::Unavailable("not ready".into()))
            } else {
                Ok(())
            }
        }

        async fn write(&self, _f: ClipboardFormat, _c: &[u8]) -> Result<(), ClipboardError> {
            Ok(())
        }

        fn subscribe(&self) -> ClipboardWatch {
            let (tx, rx) = broadcast::channel(1);
            drop(tx);
            ClipboardWatch { rx }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_with_backoff_retries_until_success() {
        // Arrange: fail four times, then succeed
        let provider = FlakyProvider {
            failures: 4,
            attempts: AtomicUsize::new(0),
        };

        // Act (paused clock: the backoff sleeps auto-advance)
        init_with_backoff(&provider).await;

        // Assert: exactly failures + 1 attempts were made
        assert_eq!(provider.attempts.load(Ordering::Relaxed), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_with_backoff_returns_immediately_on_first_success() {
        let provider = FlakyProvider {
            failures: 0,
            attempts: AtomicUsize::new(0),
        };
        init_with_backoff(&provider).await;
        assert_eq!(provider.attempts.load(Ordering::Relaxed), 1);
    }
}
