//! Command error codes
//!
//! 所有命令错误都只回送给发起命令的终端，不影响其他连接。
//! 前端根据 `reason` 做本地化，`message` 仅用于日志与调试。

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// 命令错误码
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CommandErrorCode {
    /// 桌台已有未结订单
    AlreadyOpen,
    /// 桌台没有未结订单
    NotFound,
    /// 转台目标桌台已被占用
    TargetOccupied,
    /// 客户端基于过期的 sequence 提交修改
    StaleSequence,
    /// 载荷结构校验失败
    MalformedPayload,
    /// 终端尚未发送 client_ready
    NotReady,
    InternalError,
}

impl CommandErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandErrorCode::AlreadyOpen => "AlreadyOpen",
            CommandErrorCode::NotFound => "NotFound",
            CommandErrorCode::TargetOccupied => "TargetOccupied",
            CommandErrorCode::StaleSequence => "StaleSequence",
            CommandErrorCode::MalformedPayload => "MalformedPayload",
            CommandErrorCode::NotReady => "NotReady",
            CommandErrorCode::InternalError => "InternalError",
        }
    }
}

impl fmt::Display for CommandErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Command error as delivered to the originating terminal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code}: {message}")]
pub struct CommandError {
    pub code: CommandErrorCode,
    pub message: String,
}

impl CommandError {
    pub fn new(code: CommandErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(CommandErrorCode::MalformedPayload, message)
    }

    pub fn not_ready() -> Self {
        Self::new(
            CommandErrorCode::NotReady,
            "client_ready must be sent before mutation commands",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_serializes_as_bare_name() {
        let json = serde_json::to_string(&CommandErrorCode::TargetOccupied).unwrap();
        assert_eq!(json, "\"TargetOccupied\"");
        assert_eq!(CommandErrorCode::StaleSequence.to_string(), "StaleSequence");
    }

    #[test]
    fn display_includes_code_and_message() {
        let err = CommandError::new(CommandErrorCode::NotFound, "table 4 has no open order");
        assert_eq!(err.to_string(), "NotFound: table 4 has no open order");
    }
}
