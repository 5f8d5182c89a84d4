//! The TLS-or-plain byte stream each connection owns exclusively.
//!
//! The listener/dialer decide once, before the handshake runs, whether a
//! given socket is wrapped in TLS, and everything above this layer
//! (handshake, frame codec, connection engine) just sees an
//! `AsyncRead + AsyncWrite`. TLS is plumbed in prior to `start`/`dial`, not
//! bolted on afterward.

use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream as ServerTlsStream;
use tokio_rustls::client::TlsStream as ClientTlsStream;

/// Either a bare TCP socket or one wrapped in a TLS session, unified behind
/// a single `AsyncRead + AsyncWrite` so the handshake and connection engine
/// never need to know which.
pub enum MaybeTlsStream {
    Plain(TcpStream),
    TlsServer(ServerTlsStream<TcpStream>),
    TlsClient(ClientTlsStream<TcpStream>),
}

impl AsyncRead for MaybeTlsStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            MaybeTlsStream::TlsServer(s) => Pin::new(s).poll_read(cx, buf),
            MaybeTlsStream::TlsClient(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeTlsStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            MaybeTlsStream::TlsServer(s) => Pin::new(s).poll_write(cx, buf),
            MaybeTlsStream::TlsClient(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_flush(cx),
            MaybeTlsStream::TlsServer(s) => Pin::new(s).poll_flush(cx),
            MaybeTlsStream::TlsClient(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            MaybeTlsStream::TlsServer(s) => Pin::new(s).poll_shutdown(cx),
            MaybeTlsStream::TlsClient(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}
