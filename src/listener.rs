//! Server-side endpoint: binds a path, negotiates inbound connections, and
//! hands them to waiting acceptors.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, warn};
use tokio::net::TcpListener as TokioTcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

use crate::addr::{self, Endpoint};
use crate::config::{HookOutcome, ListenerConfig};
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::frame::Role;
use crate::handshake;
use crate::stream::MaybeTlsStream;

struct ListenerState {
    /// Fully negotiated connections waiting for a caller to `accept()` them.
    pend: VecDeque<Connection>,
    /// Callers blocked in `accept()` with nothing in `pend` yet.
    aios: VecDeque<oneshot::Sender<Result<Connection>>>,
    closed: bool,
}

/// Binds a URL path and produces negotiated [`Connection`]s to callers of
/// [`Listener::accept`], FIFO.
pub struct Listener {
    endpoint: Endpoint,
    config: Mutex<ListenerConfig>,
    started: AtomicBool,
    state: Arc<Mutex<ListenerState>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl Listener {
    pub fn new(url: &str) -> Result<Self> {
        let endpoint = addr::parse(url)?;
        Ok(Self {
            endpoint,
            config: Mutex::new(ListenerConfig::default()),
            started: AtomicBool::new(false),
            state: Arc::new(Mutex::new(ListenerState {
                pend: VecDeque::new(),
                aios: VecDeque::new(),
                closed: false,
            })),
            accept_task: Mutex::new(None),
        })
    }

    fn ensure_not_started(&self) -> Result<()> {
        if self.started.load(Ordering::SeqCst) {
            Err(Error::Busy)
        } else {
            Ok(())
        }
    }

    /// Set the accepted subprotocol token list. Fails with [`Error::Busy`]
    /// once [`Listener::start`] has run.
    pub async fn set_subprotocol(&self, proto: impl Into<String>) -> Result<()> {
        self.ensure_not_started()?;
        self.config.lock().await.subprotocol = Some(proto.into());
        Ok(())
    }

    /// Override the default `fragsize`/`maxframe` knobs. Fails with
    /// [`Error::Busy`] once started.
    pub async fn set_websocket_config(&self, websocket: crate::config::WebSocketConfig) -> Result<()> {
        self.ensure_not_started()?;
        self.config.lock().await.websocket = websocket;
        Ok(())
    }

    /// Install a policy hook invoked with each validated request before the
    /// 101 response is written. Fails with [`Error::Busy`] once started.
    pub async fn set_policy_hook(
        &self,
        hook: impl Fn(&handshake::ServerRequest) -> HookOutcome + Send + Sync + 'static,
    ) -> Result<()> {
        self.ensure_not_started()?;
        self.config.lock().await.hook = Some(Arc::new(hook));
        Ok(())
    }

    /// Configure TLS for this listener (`wss://` URLs). Fails with
    /// [`Error::Busy`] once started.
    pub async fn set_tls(&self, tls: Arc<tokio_rustls::rustls::ServerConfig>) -> Result<()> {
        self.ensure_not_started()?;
        self.config.lock().await.tls = Some(tls);
        Ok(())
    }

    /// Bind the address and start accepting connections on a background
    /// task. Idempotent calls after the first fail with [`Error::Busy`].
    pub async fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::Busy);
        }

        let tcp = TokioTcpListener::bind((self.endpoint.host.as_str(), self.endpoint.port))
            .await
            .map_err(Error::Io)?;

        let state = self.state.clone();
        let config = self.config.lock().await.clone();
        let path = self.endpoint.path.clone();
        let handle = tokio::spawn(accept_loop(tcp, path, config, state));
        *self.accept_task.lock().await = Some(handle);
        Ok(())
    }

    /// Wait for the next negotiated connection, FIFO with other pending
    /// acceptors.
    pub async fn accept(&self) -> Result<Connection> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(Error::EState);
        }
        let mut st = self.state.lock().await;
        if st.closed {
            return Err(Error::Closed);
        }
        if let Some(conn) = st.pend.pop_front() {
            return Ok(conn);
        }
        let (tx, rx) = oneshot::channel();
        st.aios.push_back(tx);
        drop(st);
        rx.await.map_err(|_| Error::Closed)?
    }

    /// Deregister the handler, stop accepting, and send `going away` (1001)
    /// to every connection in `pend`; fail every waiting acceptor with
    /// [`Error::Closed`].
    pub async fn close(&self) {
        let mut st = self.state.lock().await;
        if st.closed {
            return;
        }
        st.closed = true;
        while let Some(conn) = st.pend.pop_front() {
            tokio::spawn(async move { conn.close(1001).await });
        }
        while let Some(waiter) = st.aios.pop_front() {
            let _ = waiter.send(Err(Error::Closed));
        }
        drop(st);

        if let Some(handle) = self.accept_task.lock().await.take() {
            handle.abort();
        }
    }
}

async fn accept_loop(
    tcp: TokioTcpListener,
    path: String,
    config: ListenerConfig,
    state: Arc<Mutex<ListenerState>>,
) {
    loop {
        let (socket, peer) = match tcp.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!("accept failed: {e}");
                continue;
            }
        };
        debug!("accepted TCP connection from {peer}");

        let path = path.clone();
        let config = config.clone();
        let state = state.clone();
        tokio::spawn(async move {
            let stream = match negotiate_tls(socket, &config).await {
                Ok(s) => s,
                Err(e) => {
                    warn!("TLS handshake with {peer} failed: {e}");
                    return;
                }
            };
            handle_one(stream, &path, &config, &state).await;
        });
    }
}

async fn negotiate_tls(
    socket: tokio::net::TcpStream,
    config: &ListenerConfig,
) -> Result<MaybeTlsStream> {
    match &config.tls {
        Some(tls_config) => {
            let acceptor = TlsAcceptor::from(tls_config.clone());
            let tls_stream = acceptor.accept(socket).await?;
            Ok(MaybeTlsStream::TlsServer(tls_stream))
        }
        None => Ok(MaybeTlsStream::Plain(socket)),
    }
}

async fn handle_one(
    mut stream: MaybeTlsStream,
    path: &str,
    config: &ListenerConfig,
    state: &Arc<Mutex<ListenerState>>,
) {
    match handshake::perform_server_handshake(&mut stream, path, config).await {
        Ok(_negotiated) => {
            let conn = Connection::spawn(stream, Role::Listener, config.websocket);
            let mut st = state.lock().await;
            if st.closed {
                drop(st);
                conn.close(1001).await;
                return;
            }
            if let Some(waiter) = st.aios.pop_front() {
                let _ = waiter.send(Ok(conn));
            } else {
                st.pend.push_back(conn);
            }
        }
        Err(e) => debug!("handshake rejected: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialer::Dialer;

    #[tokio::test]
    async fn echo_round_trip_through_listener_and_dialer() {
        // bind to an ephemeral port by asking the OS, then re-derive the
        // actual address for both sides.
        let tcp = TokioTcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = tcp.local_addr().unwrap().port();
        drop(tcp);

        let listener = Listener::new(&format!("ws://127.0.0.1:{port}/test")).unwrap();
        listener.start().await.unwrap();

        let dialer = Dialer::new(&format!("ws://127.0.0.1:{port}/test")).unwrap();

        let server_task = tokio::spawn(async move {
            let conn = listener.accept().await.unwrap();
            let msg = conn.recv().await.unwrap();
            assert_eq!(msg, b"hello");
        });

        let conn = dialer.dial().await.unwrap();
        conn.send(b"hello".to_vec()).await.unwrap();

        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn path_mismatch_is_refused() {
        let tcp = TokioTcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = tcp.local_addr().unwrap().port();
        drop(tcp);

        let listener = Listener::new(&format!("ws://127.0.0.1:{port}/test")).unwrap();
        listener.start().await.unwrap();

        let dialer = Dialer::new(&format!("ws://127.0.0.1:{port}/nothere")).unwrap();
        let result = dialer.dial().await;
        assert!(matches!(result, Err(Error::Refused)));
    }
}
