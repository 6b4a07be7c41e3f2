//! API 路由模块
//!
//! - [`health`] - 健康检查
//! - [`tables`] - 开台订单查询
//! - [`stats`] - 统计
//!
//! WebSocket 终端入口见 [`crate::message::ws_server`]。

pub mod health;
pub mod stats;
pub mod tables;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::core::ServerState;
use crate::message::ws_server;

/// Full application router
pub fn build_router(state: ServerState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(tables::router())
        .merge(stats::router())
        .merge(ws_server::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
