//! CommandProcessor: 终端命令的入口
//!
//! 文本帧 → 解析 → 就绪检查 → 结构校验 → Registry → 结果
//!
//! 成功的修改由 Registry 事件经 Dispatcher 广播（发起方也会收到）；
//! 错误只回送给发起命令的终端。

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::Utc;
use shared::message::{
    ClientReadyPayload, CloseTableOrderPayload, ConnectedPayload, TableOrderPayload,
    TableOrdersSyncPayload, TransferTablePayload,
};
use shared::order::TableOrder;
use shared::{ClientCommand, CommandError, CommandErrorCode, ServerEvent};

use super::connections::{ConnectionManager, OutboundFrame, SessionId};
use crate::orders::money::{check_client_total, normalize_items, order_total};
use crate::orders::validator::table_number;
use crate::orders::{CloseConfirmation, TableRegistry, TransferOutcome};

/// Result of a successfully executed command
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    /// Session is now active; snapshot to send back
    Ready { orders: Vec<TableOrder> },
    Created(TableOrder),
    Updated(TableOrder),
    Transferred(TransferOutcome),
    Closed(CloseConfirmation),
}

pub struct CommandProcessor {
    registry: Arc<TableRegistry>,
    connections: Arc<ConnectionManager>,
    strict_totals: bool,
}

impl CommandProcessor {
    pub fn new(
        registry: Arc<TableRegistry>,
        connections: Arc<ConnectionManager>,
        strict_totals: bool,
    ) -> Self {
        Self {
            registry,
            connections,
            strict_totals,
        }
    }

    /// Send the connection-level `connected` event
    pub fn greet(&self, session: SessionId) {
        self.reply(
            session,
            &ServerEvent::Connected(ConnectedPayload {
                session_id: session.to_string(),
            }),
        );
    }

    /// Handle one inbound text frame from `session`
    pub fn handle_frame(&self, session: SessionId, text: &str) {
        let command = match ClientCommand::parse(text) {
            Ok(command) => command,
            Err((name, err)) => {
                tracing::warn!(session_id = %session, command = %name, error = %err, "Malformed frame");
                self.reply(session, &ServerEvent::error(name, &err));
                return;
            }
        };

        let name = command.name();
        // parking_lot 锁不会中毒；panic 发生在提交之前，Registry 状态不受影响
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.execute(session, command)))
            .unwrap_or_else(|_| {
                tracing::error!(session_id = %session, command = name, "Command handler panicked");
                Err(CommandError::new(
                    CommandErrorCode::InternalError,
                    "internal error while executing command",
                ))
            });
        match result {
            Ok(CommandOutcome::Ready { orders }) => {
                tracing::debug!(session_id = %session, open_tables = orders.len(), "Sending table snapshot");
                self.reply(
                    session,
                    &ServerEvent::TableOrdersSync(TableOrdersSyncPayload { orders }),
                );
            }
            Ok(_) => {
                tracing::debug!(session_id = %session, command = name, "Command committed");
            }
            Err(err) => {
                tracing::info!(
                    session_id = %session,
                    command = name,
                    reason = %err.code,
                    message = %err.message,
                    "Command rejected"
                );
                self.reply(session, &ServerEvent::error(name, &err));
            }
        }
    }

    /// Execute a parsed command on behalf of `session`
    pub fn execute(
        &self,
        session: SessionId,
        command: ClientCommand,
    ) -> Result<CommandOutcome, CommandError> {
        if command.is_mutation() && !self.connections.is_ready(session) {
            return Err(CommandError::not_ready());
        }

        match command {
            ClientCommand::ClientReady(payload) => self.client_ready(session, payload),
            ClientCommand::CreateTableOrder(payload) => self.create(payload),
            ClientCommand::UpdateTableOrder(payload) => self.update(payload),
            ClientCommand::TransferTable(payload) => self.transfer(payload),
            ClientCommand::CloseTableOrder(payload) => self.close(payload),
        }
    }

    fn client_ready(
        &self,
        session: SessionId,
        payload: ClientReadyPayload,
    ) -> Result<CommandOutcome, CommandError> {
        if payload.client_type.trim().is_empty() {
            return Err(CommandError::malformed("clientType must not be empty"));
        }
        if !self
            .connections
            .mark_ready(session, &payload.client_type, payload.timestamp)
        {
            return Err(CommandError::not_ready());
        }
        Ok(CommandOutcome::Ready {
            orders: self.registry.list_open(),
        })
    }

    fn create(&self, payload: TableOrderPayload) -> Result<CommandOutcome, CommandError> {
        let table = table_number(payload.table_number, "tableNumber")?;
        let items = normalize_items(&payload.order_data.items)?;
        let total = order_total(&items)?;
        check_client_total(payload.order_data.total, total, self.strict_totals)?;
        let start_time = payload.order_data.start_time.unwrap_or_else(Utc::now);

        let order = self.registry.create(table, items, start_time)?;
        Ok(CommandOutcome::Created(order))
    }

    fn update(&self, payload: TableOrderPayload) -> Result<CommandOutcome, CommandError> {
        let table = table_number(payload.table_number, "tableNumber")?;
        let items = normalize_items(&payload.order_data.items)?;
        let total = order_total(&items)?;
        check_client_total(payload.order_data.total, total, self.strict_totals)?;

        let order = self
            .registry
            .update(table, items, payload.expected_sequence)?;
        Ok(CommandOutcome::Updated(order))
    }

    fn transfer(&self, payload: TransferTablePayload) -> Result<CommandOutcome, CommandError> {
        let source = table_number(payload.source_table, "sourceTable")?;
        let target = table_number(payload.target_table, "targetTable")?;
        if source == target {
            return Err(CommandError::malformed(format!(
                "sourceTable and targetTable must differ (both {source})"
            )));
        }

        let outcome = self.registry.transfer(source, target)?;
        Ok(CommandOutcome::Transferred(outcome))
    }

    fn close(&self, payload: CloseTableOrderPayload) -> Result<CommandOutcome, CommandError> {
        let table = table_number(payload.table_number, "tableNumber")?;
        let confirmation = self.registry.close(table)?;
        Ok(CommandOutcome::Closed(confirmation))
    }

    fn reply(&self, session: SessionId, event: &ServerEvent) {
        let frame: OutboundFrame = match event.to_json() {
            Ok(text) => Arc::from(text),
            Err(e) => {
                tracing::error!(event = event.name(), error = %e, "Failed to serialize reply");
                return;
            }
        };
        if let Err(e) = self.connections.send_to(session, frame) {
            tracing::debug!(session_id = %session, event = event.name(), error = %e, "Reply undeliverable");
        }
    }
}
