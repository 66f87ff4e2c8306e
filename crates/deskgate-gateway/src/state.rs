//! Shared application state.
//!
//! Everything a request handler needs is carried in [`AppState`] and injected
//! by axum's `State` extractor.  The fan-out engine and clipboard provider
//! are constructed once in `main` and passed in here — there is no
//! process-global registry anywhere in the gateway.

use std::sync::Arc;

use deskgate_core::{ClipboardProvider, FanoutEngine};

use crate::config::GatewayConfig;

/// Per-process shared state, cloned cheaply into every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    /// The video broadcast engine; `/video` subscribers register here and
    /// the UDP ingest loop writes into it.
    pub engine: Arc<FanoutEngine>,
    /// The host clipboard capability, one per process, shared by all
    /// `/clipboard` sessions.
    pub clipboard: Arc<dyn ClipboardProvider>,
}

impl AppState {
    pub fn new(
        config: GatewayConfig,
        engine: Arc<FanoutEngine>,
        clipboard: Arc<dyn ClipboardProvider>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            engine,
            clipboard,
        }
    }
}
