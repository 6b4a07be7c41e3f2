//! 健康检查路由
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /health | GET | 健康检查 + 会话列表 |
//!
//! 后台任务（广播、统计）意外退出时 status 为 `degraded`。
//!
//! ```json
//! {
//!   "status": "ok",
//!   "version": "0.1.0",
//!   "uptimeSeconds": 42,
//!   "activeConnections": 2,
//!   "connections": [ ... ]
//! }
//! ```

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::core::ServerState;
use crate::message::SessionInfo;

pub fn router() -> Router<ServerState> {
    Router::new().route("/health", get(health))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    status: &'static str,
    failed_tasks: usize,
    version: &'static str,
    uptime_seconds: i64,
    open_tables: usize,
    active_connections: usize,
    connections: Vec<SessionInfo>,
}

async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    let failed_tasks = state.failed_tasks().await;
    Json(HealthResponse {
        status: if failed_tasks == 0 { "ok" } else { "degraded" },
        failed_tasks,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_secs(),
        open_tables: state.registry.open_count(),
        active_connections: state.connections.active_count(),
        connections: state.connections.list_sessions(),
    })
}
