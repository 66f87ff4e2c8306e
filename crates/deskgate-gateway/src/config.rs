//! Gateway configuration types.
//!
//! [`GatewayConfig`] is the single source of truth for all runtime settings.
//! It is populated from CLI arguments in `main.rs` (preferred for production)
//! or from [`Default`] (local development and tests).
//!
//! Keeping configuration as a plain struct — no global state, no environment
//! variable reads outside `main` — makes the gateway easy to embed in the
//! integration tests, which construct a config pointing at ephemeral ports.

use std::net::SocketAddr;
use std::path::PathBuf;

/// All runtime configuration for the relay gateway.
///
/// Build this once at startup, then share it behind an `Arc` via `AppState`.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address the HTTP/WebSocket listener binds to.
    pub listen_addr: SocketAddr,

    /// Directory served under `/static` (the embedded web client).
    pub static_dir: PathBuf,

    /// Directory served under `/downloads`.
    pub downloads_dir: PathBuf,

    /// Address the UDP video ingest socket binds to.
    ///
    /// The video source multicasts raw datagrams here; each datagram is
    /// republished verbatim to every `/video` subscriber.
    pub udp_addr: SocketAddr,

    /// Address of the remote-framebuffer (VNC) server that `/websockify`
    /// sessions dial.  A hostname is allowed; resolution happens at dial
    /// time, once per session.
    pub fb_addr: String,

    /// Shared secret used only to pre-fill the web client's connection form
    /// via the `/` redirect.  Not enforced server-side.
    pub secret: Option<String>,
}

impl Default for GatewayConfig {
    /// Defaults suitable for running next to a local VNC server.
    ///
    /// | Field         | Default          |
    /// |---------------|------------------|
    /// | listen_addr   | `0.0.0.0:8888`   |
    /// | static_dir    | `./static`       |
    /// | downloads_dir | `./downloads`    |
    /// | udp_addr      | `0.0.0.0:1234`   |
    /// | fb_addr       | `localhost:5900` |
    /// | secret        | none             |
    fn default() -> Self {
        Self {
            // Compile-time-known valid socket address strings.
            listen_addr: "0.0.0.0:8888".parse().unwrap(),
            static_dir: PathBuf::from("./static"),
            downloads_dir: PathBuf::from("./downloads"),
            udp_addr: "0.0.0.0:1234".parse().unwrap(),
            fb_addr: "localhost:5900".to_string(),
            secret: None,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_listen_port_is_8888() {
        let cfg = GatewayConfig::default();
        assert_eq!(cfg.listen_addr.port(), 8888);
    }

    #[test]
    fn test_default_udp_port_is_1234() {
        let cfg = GatewayConfig::default();
        assert_eq!(cfg.udp_addr.port(), 1234);
    }

    #[test]
    fn test_default_framebuffer_target_is_local_vnc() {
        let cfg = GatewayConfig::default();
        assert_eq!(cfg.fb_addr, "localhost:5900");
    }

    #[test]
    fn test_default_has_no_secret() {
        let cfg = GatewayConfig::default();
        assert!(cfg.secret.is_none());
    }

    #[test]
    fn test_config_can_be_cloned() {
        // Cloneability is required so an Arc<GatewayConfig> can be shared
        // across session tasks.
        let cfg = GatewayConfig::default();
        let cloned = cfg.clone();
        assert_eq!(cfg.listen_addr, cloned.listen_addr);
        assert_eq!(cfg.static_dir, cloned.static_dir);
    }
}
