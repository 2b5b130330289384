use futures_util::{SinkExt, StreamExt};
use relayd::config::ServerConfig;
use relayd::server::ServerState;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

pub fn test_config(listen: SocketAddr) -> ServerConfig {
    ServerConfig {
        listen,
        metrics_addr: "127.0.0.1:0".parse().unwrap(),
        max_conns: 1000,
        send_queue: 256,
        max_frame_bytes: 32 * 1024 * 1024,
        ping_interval: 30,
        idle_timeout: 300,
    }
}

pub struct TestClient {
    pub ws_tx: futures_util::stream::SplitSink<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        Message,
    >,
    pub ws_rx: futures_util::stream::SplitStream<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    >,
}

impl TestClient {
    pub async fn connect(addr: &SocketAddr) -> Self {
        let url = format!("ws://{addr}");
        let (ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        let (ws_tx, ws_rx) = ws.split();
        Self { ws_tx, ws_rx }
    }

    pub async fn send_raw(&mut self, msg: Message) {
        self.ws_tx.send(msg).await.unwrap();
    }

    pub async fn send_json(&mut self, value: &serde_json::Value) {
        self.send_raw(Message::Text(value.to_string())).await;
    }

    /// Receive the next text or binary frame, skipping keepalive frames.
    pub async fn recv_message(&mut self) -> Message {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), self.ws_rx.next())
                .await
                .expect("timeout waiting for message")
                .expect("stream ended")
                .expect("websocket error");
            match msg {
                Message::Text(_) | Message::Binary(_) => return msg,
                Message::Ping(_) | Message::Pong(_) => {}
                other => panic!("expected data frame, got {other:?}"),
            }
        }
    }

    pub async fn recv_json(&mut self) -> serde_json::Value {
        match self.recv_message().await {
            Message::Text(text) => serde_json::from_str(&text).expect("invalid json from relay"),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    pub async fn recv_message_timeout(&mut self, timeout: Duration) -> Option<Message> {
        tokio::time::timeout(timeout, self.recv_message()).await.ok()
    }

    pub async fn close(mut self) {
        let _ = self.ws_tx.send(Message::Close(None)).await;
    }
}

pub async fn start_server() -> (SocketAddr, Arc<ServerState>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(ServerState::new(test_config(addr)));

    let state_clone = state.clone();
    tokio::spawn(async move {
        if let Err(e) = relayd::run(listener, state_clone).await {
            eprintln!("server error in test: {e}");
        }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;

    (addr, state)
}

/// Poll until the registry holds exactly `expected` connections.
pub async fn wait_for_registry_len(state: &ServerState, expected: usize) {
    for _ in 0..200 {
        if state.registry.len() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "registry never reached {expected} connections (currently {})",
        state.registry.len()
    );
}
