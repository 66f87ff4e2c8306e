//! deskgate-gateway library crate.
//!
//! Exposes the gateway's components so the integration tests (and any future
//! embedder) can assemble a gateway in-process:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use deskgate_core::{ClipboardProvider, FanoutEngine, MemoryClipboard};
//! use deskgate_gateway::{config::GatewayConfig, routes::create_router, state::AppState};
//!
//! let engine = Arc::new(FanoutEngine::new());
//! let clipboard: Arc<dyn ClipboardProvider> = Arc::new(MemoryClipboard::new());
//! let state = AppState::new(GatewayConfig::default(), engine, clipboard);
//! let app = create_router(state);
//! ```
//!
//! # Module map
//!
//! - [`config`] — the `GatewayConfig` struct (populated by the CLI in `main`)
//! - [`state`] — shared `AppState` injected into handlers
//! - [`routes`] — the route table and small HTTP handlers
//! - [`bridge`] — `/websockify` WebSocket ↔ TCP stream bridge
//! - [`video`] — UDP ingest loop and `/video` subscriber sessions
//! - [`clipboard_relay`] — `/clipboard` relay sessions

pub mod bridge;
pub mod clipboard_relay;
pub mod config;
pub mod routes;
pub mod state;
pub mod video;
