//! # deskgate-core
//!
//! Shared library for the deskgate relay gateway containing the broadcast
//! fan-out engine and the host clipboard capability boundary.
//!
//! This crate has no dependency on any HTTP framework or WebSocket library.
//! Everything that touches a real socket lives in `deskgate-gateway`; this
//! crate only sees abstract sinks and capabilities, which keeps the engine
//! testable without a network.
//!
//! # Architecture overview
//!
//! deskgate sits between web browsers and a remote desktop:
//!
//! ```text
//! Browser (WebSocket)          deskgate                 Upstream
//! ───────────────────          ────────                 ────────
//! /websockify  ◀────────▶  stream bridge  ◀────────▶  VNC server (TCP)
//! /video       ◀────────   fan-out engine  ◀────────  video source (UDP)
//! /clipboard   ◀────────▶  clipboard relay ◀────────▶ host clipboard
//! ```
//!
//! This crate provides the two pieces that are pure enough to live outside
//! the gateway binary:
//!
//! - **`fanout`** – The broadcast engine behind `/video`.  One upstream byte
//!   source, many disposable subscribers: a failing subscriber is dropped
//!   without ever stalling ingestion or the other subscribers.
//!
//! - **`clipboard`** – The [`ClipboardProvider`] capability trait, the
//!   keep-alive framing convention shared with the embedded web client, and
//!   the bounded-backoff initialisation helper.

pub mod clipboard;
pub mod fanout;

// Re-export the most-used types at the crate root so callers can write
// `deskgate_core::FanoutEngine` instead of the longer module path.
pub use clipboard::{
    init_with_backoff, is_keepalive, ClipboardError, ClipboardFormat, ClipboardProvider,
    ClipboardWatch, MemoryClipboard, KEEPALIVE, KEEPALIVE_INTERVAL,
};
pub use fanout::{BroadcastSink, FanoutEngine, SinkError, SinkHandle, SinkId};
