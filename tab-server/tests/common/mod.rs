#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use shared::ServerEvent;
use tab_server::{Config, Server, ServerState};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

pub type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: ServerState,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    pub async fn start_with(customize: impl FnOnce(&mut Config)) -> Self {
        let mut config = Config::with_overrides("127.0.0.1", 0);
        config.stats_interval_secs = 3600;
        config.handshake_timeout_secs = 10;
        config.strict_totals = false;
        config.outbound_queue_capacity = 256;
        customize(&mut config);

        let state = ServerState::initialize(&config);
        let server = Server::with_state(config, state.clone());
        let listener = server.bind().await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = server.serve(listener, std::future::pending()).await;
        });

        Self { addr, state }
    }

    /// Connect and return the socket plus the session id from `connected`
    pub async fn connect(&self) -> (Ws, String) {
        let (mut ws, _) = connect_async(format!("ws://{}/ws", self.addr))
            .await
            .expect("connect");
        match recv_event(&mut ws).await {
            ServerEvent::Connected(p) => (ws, p.session_id),
            other => panic!("Expected Connected, got {other:?}"),
        }
    }

    /// Connect, send `client_ready` and consume the snapshot
    pub async fn connect_ready(&self) -> Ws {
        let (mut ws, _) = self.connect().await;
        send(&mut ws, ready()).await;
        match recv_event(&mut ws).await {
            ServerEvent::TableOrdersSync(_) => ws,
            other => panic!("Expected TableOrdersSync, got {other:?}"),
        }
    }

    pub fn shutdown(&self) {
        self.state.shutdown_token().cancel();
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub async fn send(ws: &mut Ws, frame: Value) {
    ws.send(Message::text(frame.to_string())).await.expect("send");
}

/// Next text frame as an event (5s timeout)
pub async fn recv_event(ws: &mut Ws) -> ServerEvent {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = msg {
            return ServerEvent::from_json(text.as_str()).expect("valid event");
        }
    }
}

/// Assert nothing arrives within a short window
pub async fn assert_silent(ws: &mut Ws) {
    let result = tokio::time::timeout(Duration::from_millis(300), ws.next()).await;
    if let Ok(Some(Ok(Message::Text(text)))) = result {
        panic!("Expected no event, got {text}");
    }
}

pub fn ready() -> Value {
    json!({
        "command": "client_ready",
        "data": { "clientType": "pos", "timestamp": "2024-05-01T19:00:00Z" }
    })
}

pub fn item(product: &str, price: f64, quantity: i64) -> Value {
    json!({ "productId": product, "name": product, "unitPrice": price, "quantity": quantity })
}

pub fn order_command(command: &str, table: i64, items: Vec<Value>, total: f64) -> Value {
    json!({
        "command": command,
        "data": {
            "tableNumber": table,
            "orderData": { "items": items, "total": total },
            "timestamp": "2024-05-01T19:30:00Z",
            "clientId": "pos-test"
        }
    })
}

pub fn transfer(source: i64, target: i64) -> Value {
    json!({
        "command": "transfer_table",
        "data": {
            "sourceTable": source,
            "targetTable": target,
            "timestamp": "2024-05-01T20:00:00Z",
            "clientId": "pos-test"
        }
    })
}

pub fn close(table: i64) -> Value {
    json!({
        "command": "close_table_order",
        "data": {
            "tableNumber": table,
            "timestamp": "2024-05-01T21:00:00Z",
            "clientId": "pos-test"
        }
    })
}
