use log::{error, info};
use wavecore::Dialer;

#[tokio::main]
async fn main() {
    env_logger::init();

    let dialer = Dialer::new("ws://127.0.0.1:9002/echo").expect("bad dialer URL");
    let conn = match dialer.dial().await {
        Ok(conn) => conn,
        Err(e) => {
            error!("dial failed: {e}");
            return;
        }
    };

    conn.send(b"hello from wavecore".to_vec())
        .await
        .expect("send failed");

    match conn.recv().await {
        Ok(payload) => info!("echoed back: {}", String::from_utf8_lossy(&payload)),
        Err(e) => error!("recv failed: {e}"),
    }

    conn.close(1000).await;
}
