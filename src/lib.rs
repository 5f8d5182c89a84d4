//! WebSocket transport core: RFC 6455 handshake, framing, and the
//! per-connection send/receive engine, carried over HTTP/1.1.
//!
//! This crate implements the dialer (client) and listener (server) roles of
//! a bidirectional, message-oriented channel. It does not implement the
//! underlying TCP/TLS byte transport beyond plumbing `tokio`/`tokio-rustls`
//! streams through, nor the general-purpose HTTP/1.1 parser (`httparse`
//! covers that), nor SHA-1/Base64 (`sha1`/`base64` cover that).
//!
//! Start with [`listener::Listener`] on the server side and
//! [`dialer::Dialer`] on the client side; both hand you a ready
//! [`connection::Connection`] once the upgrade handshake completes.

pub mod addr;
pub mod config;
pub mod connection;
pub mod dialer;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod listener;
pub mod message;
pub mod stream;
pub mod tls;
pub mod util;

pub use config::{DialerConfig, HookOutcome, ListenerConfig, PolicyHook, WebSocketConfig};
pub use connection::Connection;
pub use dialer::Dialer;
pub use error::{Error, Result};
pub use listener::Listener;
