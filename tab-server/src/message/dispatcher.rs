//! BroadcastDispatcher: 将提交后的状态变更推送给所有 active 终端
//!
//! ```text
//! TableRegistry ──mpsc (commit order)──► BroadcastDispatcher::run
//!                                             │ serialize once
//!                                             ├── try_send ──► session A queue
//!                                             ├── try_send ──► session B queue
//!                                             └── full/closed ──► unregister
//! ```
//!
//! 投递语义：at-most-once，不重试。队列满的终端被断开，
//! 重连后通过 `table_orders_sync` 重新获取全量状态。

use std::sync::Arc;

use shared::ServerEvent;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::connections::{ConnectionManager, OutboundFrame, SendError};
use crate::orders::RegistryEvent;

/// Outcome of one publish
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub dropped: usize,
}

#[derive(Clone)]
pub struct BroadcastDispatcher {
    connections: Arc<ConnectionManager>,
}

impl BroadcastDispatcher {
    pub fn new(connections: Arc<ConnectionManager>) -> Self {
        Self { connections }
    }

    /// Serialize once and fan out to every active session
    pub fn publish(&self, event: &ServerEvent) -> DispatchReport {
        let frame: OutboundFrame = match event.to_json() {
            Ok(text) => Arc::from(text),
            Err(e) => {
                tracing::error!(event = event.name(), error = %e, "Failed to serialize event");
                return DispatchReport::default();
            }
        };
        self.publish_frame(event.name(), frame)
    }

    fn publish_frame(&self, event_name: &str, frame: OutboundFrame) -> DispatchReport {
        let mut report = DispatchReport::default();
        for handle in self.connections.active_handles() {
            match handle.try_send(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    match e {
                        SendError::QueueFull => tracing::warn!(
                            session_id = %handle.id,
                            event = event_name,
                            "Outbound queue full, disconnecting slow terminal"
                        ),
                        _ => tracing::debug!(
                            session_id = %handle.id,
                            event = event_name,
                            "Session closed during broadcast"
                        ),
                    }
                    self.connections.unregister(handle.id);
                    report.dropped += 1;
                }
            }
        }
        report
    }

    /// 消费 registry 事件直到通道关闭或收到关闭信号
    pub async fn run(
        self,
        mut events: mpsc::UnboundedReceiver<RegistryEvent>,
        shutdown: CancellationToken,
    ) {
        tracing::info!("Broadcast dispatcher started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Broadcast dispatcher shutting down");
                    break;
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        tracing::info!("Registry event channel closed, dispatcher stopping");
                        break;
                    };
                    let table = event.table_number();
                    let event = ServerEvent::from(event);
                    let report = self.publish(&event);
                    tracing::debug!(
                        table,
                        event = event.name(),
                        delivered = report.delivered,
                        dropped = report.dropped,
                        "Event dispatched"
                    );
                }
            }
        }
    }
}
