//! 终端与服务端之间的 JSON 消息协议
//!
//! 每个 WebSocket 文本帧是一条消息：
//!
//! ```text
//! Client → Server: {"command": "create_table_order", "data": {...}}
//! Server → Client: {"event":   "table_order_created", "data": {...}}
//! ```

use serde::{Deserialize, Serialize};

pub mod payload;
pub use payload::*;

use crate::error::CommandError;
use crate::order::TableOrder;

/// 终端发送的命令
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "data", rename_all = "snake_case")]
pub enum ClientCommand {
    ClientReady(ClientReadyPayload),
    CreateTableOrder(TableOrderPayload),
    UpdateTableOrder(TableOrderPayload),
    TransferTable(TransferTablePayload),
    CloseTableOrder(CloseTableOrderPayload),
}

impl ClientCommand {
    /// 线上命令名
    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::ClientReady(_) => "client_ready",
            ClientCommand::CreateTableOrder(_) => "create_table_order",
            ClientCommand::UpdateTableOrder(_) => "update_table_order",
            ClientCommand::TransferTable(_) => "transfer_table",
            ClientCommand::CloseTableOrder(_) => "close_table_order",
        }
    }

    /// 是否为修改桌台状态的命令
    pub fn is_mutation(&self) -> bool {
        !matches!(self, ClientCommand::ClientReady(_))
    }

    /// 解析文本帧。失败时尽量带回命令名，方便回送错误事件
    pub fn parse(text: &str) -> Result<Self, (String, CommandError)> {
        serde_json::from_str(text).map_err(|e| {
            let name = Self::peek_name(text).unwrap_or_else(|| "unknown".to_string());
            (name, CommandError::malformed(e.to_string()))
        })
    }

    /// 从未能完整解析的帧里取出 `command` 字段
    pub fn peek_name(text: &str) -> Option<String> {
        let value: serde_json::Value = serde_json::from_str(text).ok()?;
        value.get("command")?.as_str().map(str::to_string)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// 服务端推送的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected(ConnectedPayload),
    TableOrdersSync(TableOrdersSyncPayload),
    TableOrderCreated(TableOrder),
    TableOrderUpdated(TableOrder),
    TableTransferred(TableTransferredPayload),
    TableOrderClosed(TableOrderClosedPayload),
    ServerStats(ServerStatsPayload),
    Error(ErrorPayload),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Connected(_) => "connected",
            ServerEvent::TableOrdersSync(_) => "table_orders_sync",
            ServerEvent::TableOrderCreated(_) => "table_order_created",
            ServerEvent::TableOrderUpdated(_) => "table_order_updated",
            ServerEvent::TableTransferred(_) => "table_transferred",
            ServerEvent::TableOrderClosed(_) => "table_order_closed",
            ServerEvent::ServerStats(_) => "server_stats",
            ServerEvent::Error(_) => "error",
        }
    }

    /// 构造错误事件
    pub fn error(command: impl Into<String>, err: &CommandError) -> Self {
        ServerEvent::Error(ErrorPayload {
            command: command.into(),
            reason: err.code,
            message: err.message.clone(),
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CommandErrorCode;

    #[test]
    fn parses_create_command() {
        let text = r#"{
            "command": "create_table_order",
            "data": {
                "tableNumber": 1,
                "orderData": {
                    "items": [{"productId": 1, "name": "Paella", "unitPrice": 15.5, "quantity": 2}],
                    "total": 31.0,
                    "startTime": "2024-05-01T19:30:00Z"
                },
                "timestamp": "2024-05-01T19:30:01Z",
                "clientId": "pos-1"
            }
        }"#;
        let cmd = ClientCommand::parse(text).unwrap();
        assert_eq!(cmd.name(), "create_table_order");
        assert!(cmd.is_mutation());
        match cmd {
            ClientCommand::CreateTableOrder(p) => {
                assert_eq!(p.table_number, 1);
                assert_eq!(p.order_data.items.len(), 1);
                assert_eq!(p.order_data.total, Some(31.0));
                assert_eq!(p.client_id.as_deref(), Some("pos-1"));
                assert_eq!(p.expected_sequence, None);
            }
            other => panic!("Expected CreateTableOrder, got {other:?}"),
        }
    }

    #[test]
    fn malformed_frame_keeps_command_name() {
        let (name, err) =
            ClientCommand::parse(r#"{"command":"transfer_table","data":{"sourceTable":"x"}}"#)
                .unwrap_err();
        assert_eq!(name, "transfer_table");
        assert_eq!(err.code, CommandErrorCode::MalformedPayload);

        let (name, _) = ClientCommand::parse("not json").unwrap_err();
        assert_eq!(name, "unknown");
    }

    #[test]
    fn unknown_command_is_malformed() {
        let (name, err) = ClientCommand::parse(r#"{"command":"drop_tables","data":{}}"#).unwrap_err();
        assert_eq!(name, "drop_tables");
        assert_eq!(err.code, CommandErrorCode::MalformedPayload);
    }

    #[test]
    fn error_event_shape() {
        let err = CommandError::new(CommandErrorCode::AlreadyOpen, "table 1 is already open");
        let json: serde_json::Value =
            serde_json::from_str(&ServerEvent::error("create_table_order", &err).to_json().unwrap())
                .unwrap();
        assert_eq!(json["event"], "error");
        assert_eq!(json["data"]["command"], "create_table_order");
        assert_eq!(json["data"]["reason"], "AlreadyOpen");
    }

    #[test]
    fn closed_event_round_trips() {
        let event = ServerEvent::TableOrderClosed(TableOrderClosedPayload {
            table_number: 2,
            sequence: 3,
        });
        let text = event.to_json().unwrap();
        assert!(text.contains(r#""tableNumber":2"#));
        assert_eq!(ServerEvent::from_json(&text).unwrap(), event);
    }
}
