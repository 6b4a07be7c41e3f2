//! ConnectionManager: 终端会话注册表
//!
//! ```text
//! ws handler ──register──► sessions: session_id → Session
//!                              │  tx: mpsc::Sender<OutboundFrame> (bounded)
//!                              ▼
//!                          forwarder task ──► WebSocket
//! ```
//!
//! 会话在 `client_ready` 之后才是 active：只有 active 会话接收广播、计入统计。
//! 发送失败（队列满或已关闭）等同于断开，会话立即移除。

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

pub type SessionId = Uuid;

/// Pre-serialized text frame shared by every recipient
pub type OutboundFrame = Arc<str>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("Unknown session")]
    UnknownSession,
    #[error("Outbound queue full")]
    QueueFull,
    #[error("Session closed")]
    Closed,
}

struct Session {
    peer_addr: SocketAddr,
    tx: mpsc::Sender<OutboundFrame>,
    ready: bool,
    client_type: Option<String>,
    connected_at: DateTime<Utc>,
    ready_at: Option<DateTime<Utc>>,
}

/// Cheap handle for fan-out outside of the session map
#[derive(Clone, Debug)]
pub struct SessionHandle {
    pub id: SessionId,
    tx: mpsc::Sender<OutboundFrame>,
}

impl SessionHandle {
    pub fn try_send(&self, frame: OutboundFrame) -> Result<(), SendError> {
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => SendError::QueueFull,
            TrySendError::Closed(_) => SendError::Closed,
        })
    }
}

/// Session summary for diagnostics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub peer_addr: String,
    pub client_type: Option<String>,
    pub ready: bool,
    pub connected_at: DateTime<Utc>,
    pub ready_at: Option<DateTime<Utc>>,
}

pub struct ConnectionManager {
    sessions: DashMap<SessionId, Session>,
    queue_capacity: usize,
}

impl ConnectionManager {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Register a new connection and return its outbound queue
    pub fn register(&self, peer_addr: SocketAddr) -> (SessionId, mpsc::Receiver<OutboundFrame>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        self.sessions.insert(
            id,
            Session {
                peer_addr,
                tx,
                ready: false,
                client_type: None,
                connected_at: Utc::now(),
                ready_at: None,
            },
        );
        tracing::info!(session_id = %id, peer = %peer_addr, "Session registered");
        (id, rx)
    }

    /// Mark a session active. Returns false if the session is gone
    ///
    /// 重复的 `client_ready` 只更新 client_type。
    pub fn mark_ready(&self, id: SessionId, client_type: &str, timestamp: DateTime<Utc>) -> bool {
        let Some(mut session) = self.sessions.get_mut(&id) else {
            return false;
        };
        let repeated = session.ready;
        session.ready = true;
        session.client_type = Some(client_type.to_string());
        if session.ready_at.is_none() {
            session.ready_at = Some(Utc::now());
        }
        drop(session);

        if repeated {
            tracing::debug!(session_id = %id, client_type, "Repeated client_ready");
        } else {
            tracing::info!(
                session_id = %id,
                client_type,
                client_timestamp = %timestamp,
                "Session ready"
            );
        }
        true
    }

    pub fn is_ready(&self, id: SessionId) -> bool {
        self.sessions.get(&id).is_some_and(|s| s.ready)
    }

    /// Remove a session. Returns true if it was present
    pub fn unregister(&self, id: SessionId) -> bool {
        match self.sessions.remove(&id) {
            Some((_, session)) => {
                tracing::info!(
                    session_id = %id,
                    peer = %session.peer_addr,
                    was_ready = session.ready,
                    "Session unregistered"
                );
                true
            }
            None => false,
        }
    }

    /// Send one frame to one session (connection-level events, error replies)
    pub fn send_to(&self, id: SessionId, frame: OutboundFrame) -> Result<(), SendError> {
        let tx = self
            .sessions
            .get(&id)
            .map(|s| s.tx.clone())
            .ok_or(SendError::UnknownSession)?;
        let handle = SessionHandle { id, tx };
        let result = handle.try_send(frame);
        if let Err(ref e) = result {
            tracing::warn!(session_id = %id, error = %e, "Send failed, dropping session");
            self.unregister(id);
        }
        result
    }

    /// Snapshot of active session handles
    pub fn active_handles(&self) -> Vec<SessionHandle> {
        self.sessions
            .iter()
            .filter(|entry| entry.ready)
            .map(|entry| SessionHandle {
                id: *entry.key(),
                tx: entry.tx.clone(),
            })
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.sessions.iter().filter(|entry| entry.ready).count()
    }

    /// All registered sessions, ready or not
    pub fn connection_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = self
            .sessions
            .iter()
            .map(|entry| SessionInfo {
                session_id: *entry.key(),
                peer_addr: entry.peer_addr.to_string(),
                client_type: entry.client_type.clone(),
                ready: entry.ready,
                connected_at: entry.connected_at,
                ready_at: entry.ready_at,
            })
            .collect();
        sessions.sort_by_key(|s| s.connected_at);
        sessions
    }
}
