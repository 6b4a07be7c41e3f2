//! 命令与事件载荷

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CommandErrorCode;
use crate::order::{LineItemInput, Money, TableNumber, TableOrder};
use crate::util::{flexible_timestamp, flexible_timestamp_opt};

// ========== Client → Server ==========

/// `client_ready` 握手载荷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientReadyPayload {
    pub client_type: String,
    #[serde(deserialize_with = "flexible_timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// 终端提交的订单数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderData {
    #[serde(default)]
    pub items: Vec<LineItemInput>,
    /// 客户端计算的合计，仅作参考
    #[serde(default)]
    pub total: Option<f64>,
    #[serde(default, deserialize_with = "flexible_timestamp_opt")]
    pub start_time: Option<DateTime<Utc>>,
}

/// `create_table_order` / `update_table_order` 载荷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableOrderPayload {
    pub table_number: i64,
    pub order_data: OrderData,
    #[serde(deserialize_with = "flexible_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub client_id: Option<String>,
    /// 客户端修改所基于的 sequence（仅 update 使用）
    #[serde(default)]
    pub expected_sequence: Option<u64>,
}

/// `transfer_table` 载荷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferTablePayload {
    pub source_table: i64,
    pub target_table: i64,
    #[serde(deserialize_with = "flexible_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub client_id: Option<String>,
}

/// `close_table_order` 载荷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseTableOrderPayload {
    pub table_number: i64,
    #[serde(deserialize_with = "flexible_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub client_id: Option<String>,
}

// ========== Server → Client ==========

/// 连接建立后立即发送（连接级事件）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedPayload {
    pub session_id: String,
}

/// 终端 ready 后发送的全量快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableOrdersSyncPayload {
    pub orders: Vec<TableOrder>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableTransferredPayload {
    pub source_table: TableNumber,
    pub target_table: TableNumber,
    pub order: TableOrder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableOrderClosedPayload {
    pub table_number: TableNumber,
    /// 关闭这一修改对应的 sequence
    pub sequence: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatsPayload {
    pub open_tables: usize,
    pub total_value: Money,
    pub active_connections: usize,
}

/// 错误事件，仅发送给发起命令的终端
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub command: String,
    pub reason: CommandErrorCode,
    pub message: String,
}
