//! WebSocket 终端连接
//!
//! GET /ws
//!
//! 每个连接两个任务：
//! - forwarder：session 出站队列 → socket，定时 ping
//! - reader：socket → CommandProcessor，负责 `client_ready` 超时检测
//!
//! 任一方结束都会取消 `disconnect_token`，另一方随之退出，然后注销会话。

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use axum::routing::get;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use shared::{CommandError, ServerEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::connections::{OutboundFrame, SessionId};
use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().route("/ws", get(ws_handler))
}

async fn ws_handler(
    State(state): State<ServerState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, addr, state))
}

async fn handle_socket(socket: WebSocket, addr: SocketAddr, state: ServerState) {
    let (sink, stream) = socket.split();
    let (session_id, outbound) = state.connections.register(addr);
    state.processor.greet(session_id);

    let disconnect_token = CancellationToken::new();
    let forwarder = spawn_forwarder(
        sink,
        outbound,
        Duration::from_secs(state.config.ping_interval_secs),
        state.shutdown_token(),
        disconnect_token.clone(),
        session_id,
    );

    read_client_messages(stream, &state, session_id, addr, disconnect_token.clone()).await;

    disconnect_token.cancel();
    if let Err(e) = forwarder.await {
        tracing::error!(session_id = %session_id, error = %e, "Forwarder task failed");
    }
    state.connections.unregister(session_id);
    tracing::info!(session_id = %session_id, peer = %addr, "Terminal disconnected");
}

/// Drain the session queue into the socket
fn spawn_forwarder(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<OutboundFrame>,
    ping_interval: Duration,
    shutdown_token: CancellationToken,
    disconnect_token: CancellationToken,
    session_id: SessionId,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ping = tokio::time::interval(ping_interval);
        ping.tick().await; // skip immediate

        loop {
            tokio::select! {
                _ = shutdown_token.cancelled() => {
                    tracing::debug!(session_id = %session_id, "Forwarder shutting down");
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
                _ = disconnect_token.cancelled() => {
                    tracing::debug!(session_id = %session_id, "Terminal disconnected, forwarder stopping");
                    break;
                }
                _ = ping.tick() => {
                    if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                        tracing::debug!(session_id = %session_id, "Ping failed");
                        break;
                    }
                }
                frame = outbound.recv() => {
                    // None: 会话已被注销（例如广播时队列满）
                    let Some(frame) = frame else {
                        tracing::debug!(session_id = %session_id, "Session queue closed");
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    };
                    if let Err(e) = sink.send(Message::Text(frame.to_string().into())).await {
                        tracing::debug!(session_id = %session_id, error = %e, "Terminal write failed");
                        break;
                    }
                }
            }
        }

        disconnect_token.cancel();
        tracing::debug!(session_id = %session_id, "Forwarder stopped");
    })
}

async fn read_client_messages(
    mut stream: SplitStream<WebSocket>,
    state: &ServerState,
    session_id: SessionId,
    addr: SocketAddr,
    disconnect_token: CancellationToken,
) {
    let shutdown_token = state.shutdown_token();
    let handshake_deadline =
        tokio::time::sleep(Duration::from_secs(state.config.handshake_timeout_secs));
    tokio::pin!(handshake_deadline);
    let mut awaiting_handshake = true;

    loop {
        tokio::select! {
            _ = shutdown_token.cancelled() => break,
            _ = disconnect_token.cancelled() => break,

            _ = &mut handshake_deadline, if awaiting_handshake => {
                awaiting_handshake = false;
                if !state.connections.is_ready(session_id) {
                    tracing::warn!(
                        session_id = %session_id,
                        peer = %addr,
                        timeout_secs = state.config.handshake_timeout_secs,
                        "No client_ready within handshake timeout, session excluded from broadcasts"
                    );
                }
            }

            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        state.processor.handle_frame(session_id, text.as_str());
                    }
                    Some(Ok(Message::Binary(_))) => {
                        tracing::warn!(target: "security", session_id = %session_id, "Binary frame rejected");
                        let err = CommandError::malformed("binary frames are not supported");
                        if let Ok(text) = ServerEvent::error("unknown", &err).to_json() {
                            let _ = state.connections.send_to(session_id, text.into());
                        }
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(session_id = %session_id, error = %e, "Read error");
                        break;
                    }
                }
            }
        }
    }
}
