//! Table order API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use shared::order::TableOrder;

use crate::core::{Result, ServerError, ServerState};
use crate::orders::validator::table_number;

/// GET /api/tables - 所有开台订单（按桌号升序）
pub async fn list(State(state): State<ServerState>) -> Json<Vec<TableOrder>> {
    Json(state.registry.list_open())
}

/// GET /api/tables/:table_number - 单个桌台订单
pub async fn get_by_number(
    State(state): State<ServerState>,
    Path(raw): Path<i64>,
) -> Result<Json<TableOrder>> {
    let table = table_number(raw, "tableNumber").map_err(|e| ServerError::Validation(e.to_string()))?;
    state
        .registry
        .get(table)
        .map(Json)
        .ok_or_else(|| ServerError::NotFound(format!("Table {table} has no open order")))
}
