use std::io;
use thiserror::Error;
use tokio_rustls::rustls;

/// The error taxonomy for the transport core.
///
/// Every in-flight caller observes exactly one terminal completion: either
/// success, or one of these variants. Allocation and I/O errors are never
/// retried locally; the only operation the engine retries on the caller's
/// behalf is the dialer's per-caller reconnection (`Dialer::dial`), and even
/// that surfaces each failed connect attempt individually.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input: a bad handshake key, an invalid URL scheme, a frame
    /// header that fails a length-encoding sanity check.
    #[error("invalid input: {0}")]
    Invalid(String),

    /// Allocation failure. Rust aborts on real OOM rather than returning
    /// this, but the variant exists so call sites that pre-validate a size
    /// (e.g. a caller-supplied `Vec::try_reserve`) have somewhere to put it.
    #[error("allocation failed")]
    NoMem,

    /// The operation targeted a connection, listener, or dialer that is
    /// already closed, or was cancelled because one of those closed out
    /// from under it.
    #[error("closed")]
    Closed,

    /// The peer violated the WebSocket protocol (bad opcode, oversize
    /// control frame, ambiguous length encoding, wrong masking direction,
    /// receiving with no queued receiver, etc). Maps to a close(1002) on
    /// the wire.
    #[error("protocol error")]
    Proto,

    /// The peer sent a text frame. Text payloads are a non-goal of this
    /// transport; distinct from [`Error::Proto`] only in that it maps to
    /// a close(1003) rather than close(1002) on the wire.
    #[error("unsupported data")]
    Unsupported,

    /// Handshake failed with HTTP 401 or 403.
    #[error("permission denied")]
    Perm,

    /// Handshake failed with HTTP 404 or 405.
    #[error("refused")]
    Refused,

    /// A `ws://`/`wss://` URL failed to parse or was missing a required
    /// component (host, scheme).
    #[error("invalid address: {0}")]
    AddrInval(String),

    /// Attempted to mutate state that is frozen once a listener/dialer is
    /// running (e.g. setting the subprotocol after `start`).
    #[error("busy")]
    Busy,

    /// Operation attempted in the wrong lifecycle stage (e.g. `accept`
    /// before `start`).
    #[error("wrong state")]
    EState,

    /// A caller-supplied timeout elapsed before the operation completed.
    #[error("timed out")]
    TimedOut,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error("HTTP parse error: {0}")]
    HttpParse(#[from] httparse::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),
}

impl Error {
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::Closed)
    }

    pub fn is_proto(&self) -> bool {
        matches!(self, Error::Proto)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
