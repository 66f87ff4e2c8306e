//! HTTP surface: route table and the small non-WebSocket handlers.
//!
//! One WebSocket path per function, matching what the embedded web client
//! expects:
//!
//! | Path          | Function                                      |
//! |---------------|-----------------------------------------------|
//! | `/websockify` | Remote-framebuffer bridge (binary, WS ↔ TCP)  |
//! | `/video`      | Video broadcast subscription (binary, WS ← UDP)|
//! | `/clipboard`  | Clipboard relay (text + keep-alive sentinel)  |
//! | `/static`     | Embedded web client assets                    |
//! | `/downloads`  | File downloads directory                      |
//! | `/ping`       | Liveness check (`pong`)                       |
//! | `/`           | Redirect into the web client, secret pre-filled|
//!
//! `/websockify` is wire-compatible with the websockify "WebSocket to raw
//! TCP" convention, so an unmodified noVNC client connects to it directly.

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::info;

use crate::state::AppState;
use crate::{bridge, clipboard_relay, video};

/// Builds the complete gateway router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_redirect))
        .route("/ping", get(ping))
        .route("/websockify", get(framebuffer_ws))
        .route("/video", get(video_ws))
        .route("/clipboard", get(clipboard_ws))
        .nest_service("/static", ServeDir::new(&state.config.static_dir))
        .nest_service("/downloads", ServeDir::new(&state.config.downloads_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `/` — sends the browser into the embedded web client with auto-connect
/// parameters and the shared secret pre-filled.
///
/// The secret is a convenience for the connection form only; it is not
/// checked by the gateway (authentication proper is a front-end concern).
async fn root_redirect(State(state): State<AppState>) -> Redirect {
    let password = state.config.secret.as_deref().unwrap_or("");
    Redirect::temporary(&format!(
        "/static/vnc.html?autoconnect=true&resize=scale&reconnect=true&reconnect_delay=1000&password={password}"
    ))
}

/// `/ping` — fixed literal for health monitoring.
async fn ping() -> &'static str {
    "pong"
}

/// `/websockify` — upgrade, then bridge to the framebuffer TCP server.
async fn framebuffer_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let target = state.config.fb_addr.clone();
    ws.on_upgrade(move |socket| bridge::run_bridge(socket, target))
        .into_response()
}

/// `/video` — upgrade, then subscribe to the broadcast engine.
async fn video_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let engine = state.engine.clone();
    ws.on_upgrade(move |socket| video::run_video_session(socket, engine))
        .into_response()
}

/// `/clipboard` — upgrade, then run a clipboard relay session.
async fn clipboard_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    info!("clipboard connection accepted");
    let clipboard = state.clipboard.clone();
    ws.on_upgrade(move |socket| clipboard_relay::run_clipboard_session(socket, clipboard))
        .into_response()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
