//! deskgate — browser remote-desktop relay gateway, entry point.
//!
//! This binary bridges web browsers to a remote desktop over three WebSocket
//! endpoints on one listening port:
//!
//! - `/websockify` — raw TCP bridge to a VNC-style framebuffer server
//!   (wire-compatible with websockify, so unmodified noVNC connects to it),
//! - `/video` — live video broadcast: UDP datagrams from an encoder are
//!   republished verbatim to every subscriber,
//! - `/clipboard` — host clipboard relay with a 1-byte keep-alive marker.
//!
//! It also serves the embedded web client under `/static`, a downloads
//! directory under `/downloads`, answers `/ping` for health checks, and
//! redirects `/` into the web client with the connection form pre-filled.
//!
//! # Usage
//!
//! ```text
//! deskgate [OPTIONS]
//!
//! Options:
//!   --listen        <ADDR>  HTTP/WebSocket listen address [default: 0.0.0.0:8888]
//!   --static-dir    <DIR>   Web client asset directory    [default: ./static]
//!   --downloads-dir <DIR>   Downloads directory           [default: ./downloads]
//!   --udp-addr      <ADDR>  Video ingest UDP address      [default: 0.0.0.0:1234]
//!   --fb-addr       <ADDR>  Framebuffer (VNC) server      [default: localhost:5900]
//!   --secret        <STR>   Pre-filled connection secret  [optional]
//! ```
//!
//! Each flag can also be set through a `DESKGATE_*` environment variable
//! (CLI args take precedence): `DESKGATE_LISTEN`, `DESKGATE_STATIC_DIR`,
//! `DESKGATE_DOWNLOADS_DIR`, `DESKGATE_UDP_ADDR`, `DESKGATE_FB_ADDR`,
//! `DESKGATE_SECRET`.
//!
//! # Failure policy
//!
//! Only one failure is fatal: the main listener not binding.  A UDP ingest
//! bind failure disables the video path but leaves the rest of the gateway
//! up; every per-session failure is contained to that session.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use deskgate_core::{ClipboardProvider, FanoutEngine, MemoryClipboard};
use deskgate_gateway::config::GatewayConfig;
use deskgate_gateway::routes::create_router;
use deskgate_gateway::state::AppState;
use deskgate_gateway::video::UdpIngest;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Browser remote-desktop relay gateway.
///
/// Bridges WebSocket clients to a VNC server, a UDP video source, and the
/// host clipboard.
#[derive(Debug, Parser)]
#[command(name = "deskgate", about = "Browser remote-desktop relay gateway", version)]
struct Cli {
    /// Address the HTTP/WebSocket server listens on.
    ///
    /// Use `0.0.0.0` to accept connections from any interface, or
    /// `127.0.0.1` when a TLS-terminating front end is the only client.
    #[arg(long, default_value = "0.0.0.0:8888", env = "DESKGATE_LISTEN")]
    listen: SocketAddr,

    /// Directory served under `/static` (the embedded web client).
    #[arg(long, default_value = "./static", env = "DESKGATE_STATIC_DIR")]
    static_dir: PathBuf,

    /// Directory served under `/downloads`.
    #[arg(long, default_value = "./downloads", env = "DESKGATE_DOWNLOADS_DIR")]
    downloads_dir: PathBuf,

    /// UDP address the video ingest socket binds to.
    #[arg(long, default_value = "0.0.0.0:1234", env = "DESKGATE_UDP_ADDR")]
    udp_addr: SocketAddr,

    /// Address of the framebuffer (VNC) server; hostnames are allowed and
    /// resolved at dial time, once per `/websockify` session.
    #[arg(long, default_value = "localhost:5900", env = "DESKGATE_FB_ADDR")]
    fb_addr: String,

    /// Shared secret pre-filled into the web client's connection form via
    /// the `/` redirect.  Never enforced by the gateway itself.
    #[arg(long, env = "DESKGATE_SECRET")]
    secret: Option<String>,
}

impl Cli {
    /// Converts the parsed CLI arguments into a [`GatewayConfig`].
    fn into_config(self) -> GatewayConfig {
        GatewayConfig {
            listen_addr: self.listen,
            static_dir: self.static_dir,
            downloads_dir: self.downloads_dir,
            udp_addr: self.udp_addr,
            fb_addr: self.fb_addr,
            secret: self.secret,
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Log level is controlled by RUST_LOG; default to `info`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_config();

    info!(
        "deskgate starting — listen={}, udp={}, framebuffer={}",
        config.listen_addr, config.udp_addr, config.fb_addr
    );

    // Process-wide collaborators, constructed once and injected everywhere.
    let engine = Arc::new(FanoutEngine::new());
    let clipboard: Arc<dyn ClipboardProvider> = Arc::new(MemoryClipboard::new());

    // Start the video ingest loop.  A bind failure (port in use, missing
    // permission) disables the video path but is not fatal to the gateway.
    match UdpIngest::bind(config.udp_addr).await {
        Ok(ingest) => {
            let engine = Arc::clone(&engine);
            tokio::spawn(ingest.run(engine));
        }
        Err(e) => error!("{e}; video broadcast disabled"),
    }

    let listen_addr = config.listen_addr;
    let state = AppState::new(config, engine, clipboard);
    let app = create_router(state);

    // The main listener is the one unrecoverable failure.
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind listener on {listen_addr}"))?;

    info!("deskgate listening on http://{listen_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("deskgate stopped");
    Ok(())
}

/// Resolves when the user presses Ctrl+C.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl+C — shutting down"),
        Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_listen_address() {
        let cli = Cli::parse_from(["deskgate"]);
        assert_eq!(cli.listen, "0.0.0.0:8888".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_cli_default_udp_address() {
        let cli = Cli::parse_from(["deskgate"]);
        assert_eq!(cli.udp_addr, "0.0.0.0:1234".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_cli_default_framebuffer_address() {
        let cli = Cli::parse_from(["deskgate"]);
        assert_eq!(cli.fb_addr, "localhost:5900");
    }

    #[test]
    fn test_cli_default_directories() {
        let cli = Cli::parse_from(["deskgate"]);
        assert_eq!(cli.static_dir, PathBuf::from("./static"));
        assert_eq!(cli.downloads_dir, PathBuf::from("./downloads"));
    }

    #[test]
    fn test_cli_secret_defaults_to_none() {
        let cli = Cli::parse_from(["deskgate"]);
        assert!(cli.secret.is_none());
    }

    #[test]
    fn test_cli_listen_override() {
        let cli = Cli::parse_from(["deskgate", "--listen", "127.0.0.1:9000"]);
        assert_eq!(cli.listen, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_cli_framebuffer_override_accepts_hostname() {
        let cli = Cli::parse_from(["deskgate", "--fb-addr", "vnc-host.local:5901"]);
        assert_eq!(cli.fb_addr, "vnc-host.local:5901");
    }

    #[test]
    fn test_into_config_carries_all_fields() {
        let cli = Cli::parse_from([
            "deskgate",
            "--listen",
            "127.0.0.1:9000",
            "--static-dir",
            "/srv/www",
            "--udp-addr",
            "127.0.0.1:5004",
            "--fb-addr",
            "10.0.0.2:5900",
            "--secret",
            "hunter2",
        ]);
        let config = cli.into_config();
        assert_eq!(config.listen_addr.port(), 9000);
        assert_eq!(config.static_dir, PathBuf::from("/srv/www"));
        assert_eq!(config.udp_addr.port(), 5004);
        assert_eq!(config.fb_addr, "10.0.0.2:5900");
        assert_eq!(config.secret.as_deref(), Some("hunter2"));
    }
}
