//! Tab Server - 餐厅桌台订单实时同步服务
//!
//! 多台 POS 终端通过 WebSocket 连接，对桌台订单的开台、修改、转台、结账
//! 由服务端统一串行化并广播给所有终端。
//!
//! ```text
//! tab-server/src/
//! ├── core/          # 配置、状态、错误、后台任务、服务器
//! ├── orders/        # 桌台订单：校验、金额、Registry
//! ├── message/       # 会话、命令处理、广播、WebSocket
//! ├── stats.rs       # 定时统计
//! ├── api/           # 诊断 HTTP 路由
//! └── utils/         # 日志
//! ```

pub mod api;
pub mod core;
pub mod message;
pub mod orders;
pub mod stats;
pub mod utils;

pub use crate::core::{Config, Server, ServerError, ServerState};
pub use message::{BroadcastDispatcher, CommandProcessor, ConnectionManager};
pub use orders::{OrderError, TableRegistry};
pub use stats::StatsAggregator;

pub use utils::logger::{init_logger, init_logger_with_file};

/// 加载 `.env` 并初始化日志
pub fn setup_environment() -> anyhow::Result<Config> {
    if let Err(e) = dotenv::dotenv() {
        // .env 是可选的
        eprintln!("No .env loaded: {e}");
    }
    let config = Config::from_env();
    init_logger_with_file(Some(&config.log_level), config.log_dir.as_deref());
    Ok(config)
}

pub fn print_banner() {
    println!(
        r#"
  _______    _
 |__   __|  | |
    | | __ _| |__
    | |/ _` | '_ \
    | | (_| | |_) |
    |_|\__,_|_.__/   sync server v{}
    "#,
        env!("CARGO_PKG_VERSION")
    );
}
