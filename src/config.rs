//! Configuration knobs for connections, listeners, and dialers.
//!
//! Defaults match common WebSocket library conventions: 1 MiB outbound
//! fragments, 10 MiB max inbound frame.

use std::sync::Arc;

use tokio_rustls::rustls;

const DEFAULT_FRAGSIZE: usize = 1 << 20; // 1 MiB
const DEFAULT_MAXFRAME: usize = 10 << 20; // 10 MiB

/// Per-connection framing limits, shared by both roles.
#[derive(Debug, Clone, Copy)]
pub struct WebSocketConfig {
    /// Max payload bytes per outbound frame before the message assembler
    /// starts a new continuation frame.
    pub fragsize: usize,
    /// Max payload bytes accepted per inbound frame. Exceeding this closes
    /// the connection with code 1009.
    pub maxframe: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            fragsize: DEFAULT_FRAGSIZE,
            maxframe: DEFAULT_MAXFRAME,
        }
    }
}

/// The outcome of a server-side policy hook invocation, grounded on NNG's
/// hook callback being free to rewrite the response to any non-101 status
/// rather than just 403.
#[derive(Debug, Clone)]
pub enum HookOutcome {
    Accept,
    Reject(u16),
}

/// Server-side policy callback, invoked with the validated request's
/// headers before the 101 response is written.
pub type PolicyHook = Arc<dyn Fn(&crate::handshake::ServerRequest) -> HookOutcome + Send + Sync>;

/// Knobs for a [`crate::listener::Listener`].
#[derive(Clone)]
pub struct ListenerConfig {
    pub websocket: WebSocketConfig,
    pub subprotocol: Option<String>,
    pub tls: Option<Arc<rustls::ServerConfig>>,
    pub hook: Option<PolicyHook>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            websocket: WebSocketConfig::default(),
            subprotocol: None,
            tls: None,
            hook: None,
        }
    }
}

/// Knobs for a [`crate::dialer::Dialer`].
#[derive(Clone, Default)]
pub struct DialerConfig {
    pub websocket: WebSocketConfig,
    pub subprotocol: Option<String>,
    pub tls: Option<Arc<rustls::ClientConfig>>,
}
