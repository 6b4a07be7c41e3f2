//! 统计路由

use axum::{Json, Router, extract::State, routing::get};
use shared::message::ServerStatsPayload;

use crate::core::{Result, ServerError, ServerState};

pub fn router() -> Router<ServerState> {
    Router::new().route("/api/stats", get(current_stats))
}

/// GET /api/stats - 与 `server_stats` 事件相同的数据
async fn current_stats(State(state): State<ServerState>) -> Result<Json<ServerStatsPayload>> {
    state
        .stats
        .compute()
        .map(Json)
        .map_err(|e| ServerError::Internal(e.into()))
}
