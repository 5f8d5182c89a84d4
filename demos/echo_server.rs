use log::{error, info};
use wavecore::Listener;

#[tokio::main]
async fn main() {
    env_logger::init();

    let listener = Listener::new("ws://127.0.0.1:9002/echo").expect("bad listener URL");
    listener.start().await.expect("failed to bind");
    info!("listening on ws://127.0.0.1:9002/echo");

    loop {
        let conn = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("accept failed: {e}");
                break;
            }
        };

        tokio::spawn(async move {
            loop {
                match conn.recv().await {
                    Ok(payload) => {
                        if let Err(e) = conn.send(payload).await {
                            error!("echo send failed: {e}");
                            break;
                        }
                    }
                    Err(e) => {
                        if !e.is_closed() {
                            error!("recv failed: {e}");
                        }
                        break;
                    }
                }
            }
        });
    }
}
