//! End-to-end echo/fragmentation/close scenarios driven over real loopback
//! TCP sockets rather than the in-memory duplex pipes the unit tests use.

use tokio::net::TcpListener as TokioTcpListener;

use wavecore::{Dialer, Error, Listener, WebSocketConfig};

async fn ephemeral_port() -> u16 {
    let tcp = TokioTcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = tcp.local_addr().unwrap().port();
    drop(tcp);
    port
}

#[tokio::test]
async fn echo_round_trip_hello() {
    let port = ephemeral_port().await;
    let listener = Listener::new(&format!("ws://127.0.0.1:{port}/test")).unwrap();
    listener.start().await.unwrap();
    let dialer = Dialer::new(&format!("ws://127.0.0.1:{port}/test")).unwrap();

    let server = tokio::spawn(async move {
        let conn = listener.accept().await.unwrap();
        let msg = conn.recv().await.unwrap();
        assert_eq!(msg, b"hello");
        assert_eq!(msg.len(), 5);
    });

    let conn = dialer.dial().await.unwrap();
    conn.send(b"hello".to_vec()).await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn wildcard_bind_accepts_loopback_dial() {
    // Bind an ephemeral port on the wildcard address, then dial it via
    // 127.0.0.1 specifically.
    let tcp = TokioTcpListener::bind("0.0.0.0:0").await.unwrap();
    let port = tcp.local_addr().unwrap().port();
    drop(tcp);

    let listener = Listener::new(&format!("ws://*:{port}/test")).unwrap();
    listener.start().await.unwrap();
    let dialer = Dialer::new(&format!("ws://127.0.0.1:{port}/test")).unwrap();

    let server = tokio::spawn(async move {
        let conn = listener.accept().await.unwrap();
        conn.recv().await.unwrap()
    });

    let conn = dialer.dial().await.unwrap();
    conn.send(b"ping".to_vec()).await.unwrap();
    let received = server.await.unwrap();
    assert_eq!(received, b"ping");
}

#[tokio::test]
async fn large_message_round_trips_across_multiple_frames() {
    let port = ephemeral_port().await;
    let listener = Listener::new(&format!("ws://127.0.0.1:{port}/test")).unwrap();
    listener.start().await.unwrap();

    let dialer = Dialer::new(&format!("ws://127.0.0.1:{port}/test")).unwrap();
    let mut cfg = WebSocketConfig::default();
    cfg.fragsize = 1 << 20; // 1 MiB, the crate's default, spelled out explicitly
    dialer.set_websocket_config(cfg).await;

    let server = tokio::spawn(async move {
        let conn = listener.accept().await.unwrap();
        conn.recv().await.unwrap()
    });

    let body = vec![0x5Au8; 3 * 1024 * 1024];
    let conn = dialer.dial().await.unwrap();
    conn.send(body.clone()).await.unwrap();

    let received = server.await.unwrap();
    assert_eq!(received.len(), body.len());
    assert_eq!(received, body);
}

#[tokio::test]
async fn oversize_inbound_frame_closes_with_message_too_big() {
    let port = ephemeral_port().await;
    let listener = Listener::new(&format!("ws://127.0.0.1:{port}/test")).unwrap();
    let mut listener_cfg = WebSocketConfig::default();
    listener_cfg.maxframe = 1024;
    listener.set_websocket_config(listener_cfg).await.unwrap();
    listener.start().await.unwrap();

    let dialer = Dialer::new(&format!("ws://127.0.0.1:{port}/test")).unwrap();
    // Fragsize larger than the payload so it goes out as a single 2048-byte
    // frame, which exceeds the listener's 1024-byte maxframe.
    let mut dialer_cfg = WebSocketConfig::default();
    dialer_cfg.fragsize = 4096;
    dialer.set_websocket_config(dialer_cfg).await;

    let server = tokio::spawn(async move { listener.accept().await.unwrap() });

    let conn = dialer.dial().await.unwrap();
    let server_conn = server.await.unwrap();

    let oversized = vec![1u8; 2048];

    // The send may itself observe the connection tearing down mid-flight,
    // so only the receive side's outcome is asserted.
    let _ = conn.send(oversized).await;
    let result = server_conn.recv().await;
    assert!(matches!(result, Err(Error::Closed)) || result.is_err());
}

#[tokio::test]
async fn close_fails_subsequent_sends_with_closed() {
    let port = ephemeral_port().await;
    let listener = Listener::new(&format!("ws://127.0.0.1:{port}/test")).unwrap();
    listener.start().await.unwrap();
    let dialer = Dialer::new(&format!("ws://127.0.0.1:{port}/test")).unwrap();

    let server = tokio::spawn(async move { listener.accept().await.unwrap() });
    let conn = dialer.dial().await.unwrap();
    let _server_conn = server.await.unwrap();

    conn.close(1000).await;
    let result = conn.send(b"too late".to_vec()).await;
    assert!(matches!(result, Err(Error::Closed)));
}
