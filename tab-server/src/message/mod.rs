//! 终端消息层
//!
//! - [`connections`]: 会话注册与出站队列
//! - [`dispatcher`]: 广播
//! - [`processor`]: 命令处理
//! - [`ws_server`]: WebSocket 接入

pub mod connections;
pub mod dispatcher;
pub mod processor;
pub mod ws_server;

pub use connections::{ConnectionManager, OutboundFrame, SessionHandle, SessionId, SessionInfo};
pub use dispatcher::{BroadcastDispatcher, DispatchReport};
pub use processor::{CommandOutcome, CommandProcessor};
