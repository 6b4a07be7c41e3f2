/// 服务器配置
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖（启动时先加载 `.env`）：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WS_HOST | 0.0.0.0 | 监听地址 |
/// | WS_PORT | 3001 | WebSocket + 诊断 HTTP 端口 |
/// | HANDSHAKE_TIMEOUT_SECS | 10 | 等待 `client_ready` 的时间 |
/// | STATS_INTERVAL_SECS | 5 | `server_stats` 推送间隔 |
/// | PING_INTERVAL_SECS | 30 | 服务端 ping 间隔 |
/// | OUTBOUND_QUEUE_CAPACITY | 256 | 每个会话的出站队列容量 |
/// | STRICT_TOTALS | false | 客户端合计不符时拒绝命令 |
/// | LOG_LEVEL | info | 日志级别（RUST_LOG 优先） |
/// | LOG_DIR | (未设置) | 日志文件目录 |
/// | ENVIRONMENT | development | 运行环境 |
/// | SHUTDOWN_TIMEOUT_MS | 10000 | 关闭超时(毫秒) |
///
/// # 示例
///
/// ```ignore
/// WS_PORT=4000 STRICT_TOTALS=true cargo run -p tab-server
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub handshake_timeout_secs: u64,
    pub stats_interval_secs: u64,
    pub ping_interval_secs: u64,
    pub outbound_queue_capacity: usize,
    /// 客户端提交的 total 与服务端计算不符时是否拒绝
    pub strict_totals: bool,
    pub log_level: String,
    pub log_dir: Option<String>,
    /// 运行环境: development | staging | production
    pub environment: String,
    pub shutdown_timeout_ms: u64,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 未设置或无法解析的值使用默认值
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("WS_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_or("WS_PORT", 3001),
            handshake_timeout_secs: env_or("HANDSHAKE_TIMEOUT_SECS", 10),
            stats_interval_secs: env_or::<u64>("STATS_INTERVAL_SECS", 5).max(1),
            ping_interval_secs: env_or::<u64>("PING_INTERVAL_SECS", 30).max(1),
            outbound_queue_capacity: env_or::<usize>("OUTBOUND_QUEUE_CAPACITY", 256).max(1),
            strict_totals: env_or("STRICT_TOTALS", false),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_dir: std::env::var("LOG_DIR").ok().filter(|d| !d.trim().is_empty()),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
            shutdown_timeout_ms: env_or("SHUTDOWN_TIMEOUT_MS", 10000),
        }
    }

    /// 使用自定义值覆盖部分配置
    ///
    /// 常用于测试场景（port = 0 绑定随机端口）
    pub fn with_overrides(host: impl Into<String>, port: u16) -> Self {
        let mut config = Self::from_env();
        config.host = host.into();
        config.port = port;
        config
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
