//! Client-side endpoint: drives a TCP connect and upgrade handshake for
//! each caller.

use std::sync::Arc;

use log::debug;
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::TlsConnector;

use crate::addr::{self, Endpoint};
use crate::config::DialerConfig;
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::frame::Role;
use crate::handshake;
use crate::stream::MaybeTlsStream;

/// Drives a TCP connect + WebSocket upgrade per call to [`Dialer::dial`].
///
/// Each `dial()` call is an independent task racing the shared `closed`
/// signal, so any number of dials proceed in parallel without hand-rolled
/// queue bookkeeping — a caller-limited event loop would need an explicit
/// queue to know when to kick off another outgoing connect; Tokio's task
/// scheduler gives that pipelining for free.
pub struct Dialer {
    endpoint: Endpoint,
    config: Mutex<DialerConfig>,
    closed_tx: watch::Sender<bool>,
}

impl Dialer {
    pub fn new(url: &str) -> Result<Self> {
        let endpoint = addr::parse(url)?;
        let (closed_tx, _) = watch::channel(false);
        Ok(Self {
            endpoint,
            config: Mutex::new(DialerConfig::default()),
            closed_tx,
        })
    }

    pub async fn set_subprotocol(&self, proto: impl Into<String>) {
        self.config.lock().await.subprotocol = Some(proto.into());
    }

    /// Override the default `fragsize`/`maxframe` knobs.
    pub async fn set_websocket_config(&self, websocket: crate::config::WebSocketConfig) {
        self.config.lock().await.websocket = websocket;
    }

    pub async fn set_tls(&self, tls: Arc<tokio_rustls::rustls::ClientConfig>) {
        self.config.lock().await.tls = Some(tls);
    }

    /// Connect, upgrade, and hand back a ready [`Connection`], or fail with
    /// [`Error::Closed`] if [`Dialer::close`] fires first.
    pub async fn dial(&self) -> Result<Connection> {
        if *self.closed_tx.borrow() {
            return Err(Error::Closed);
        }
        let mut closed_rx = self.closed_tx.subscribe();
        tokio::select! {
            res = self.connect_and_handshake() => res,
            _ = closed_rx.changed() => Err(Error::Closed),
        }
    }

    async fn connect_and_handshake(&self) -> Result<Connection> {
        let tcp = TcpStream::connect((self.endpoint.host.as_str(), self.endpoint.port))
            .await
            .map_err(Error::Io)?;

        let config = self.config.lock().await.clone();
        let mut stream = self.maybe_wrap_tls(tcp, &config).await?;

        let host_header = format!("{}:{}", self.endpoint.host, self.endpoint.port);
        let path_and_query = self.endpoint.path_and_query();

        match handshake::perform_client_handshake(&mut stream, &host_header, &path_and_query, &config)
            .await
        {
            Ok(_negotiated) => Ok(Connection::spawn(stream, Role::Dialer, config.websocket)),
            Err(e) => {
                debug!("client handshake failed: {e}");
                Err(e)
            }
        }
    }

    async fn maybe_wrap_tls(
        &self,
        tcp: TcpStream,
        config: &DialerConfig,
    ) -> Result<MaybeTlsStream> {
        match (&config.tls, self.endpoint.tls) {
            (Some(tls_config), true) => {
                let connector = TlsConnector::from(tls_config.clone());
                let server_name = ServerName::try_from(self.endpoint.host.clone())
                    .map_err(|_| Error::AddrInval("invalid TLS server name".into()))?;
                let tls_stream = connector.connect(server_name, tcp).await?;
                Ok(MaybeTlsStream::TlsClient(tls_stream))
            }
            _ => Ok(MaybeTlsStream::Plain(tcp)),
        }
    }

    /// Cancel any outstanding dial and fail all of them with
    /// [`Error::Closed`].
    pub fn close(&self) {
        let _ = self.closed_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dial_fails_immediately_after_close() {
        let dialer = Dialer::new("ws://127.0.0.1:1/test").unwrap();
        dialer.close();
        let result = dialer.dial().await;
        assert!(matches!(result, Err(Error::Closed)));
    }

    #[tokio::test]
    async fn dial_to_unreachable_port_surfaces_io_error() {
        let dialer = Dialer::new("ws://127.0.0.1:1/test").unwrap();
        let result = dialer.dial().await;
        assert!(result.is_err());
        assert!(!matches!(result, Err(Error::Closed)));
    }
}
