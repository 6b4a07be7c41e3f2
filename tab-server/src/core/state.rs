use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::Config;
use crate::core::tasks::{BackgroundTasks, TaskKind};
use crate::message::{BroadcastDispatcher, CommandProcessor, ConnectionManager};
use crate::orders::{RegistryEvent, TableRegistry};
use crate::stats::StatsAggregator;

/// 服务器状态 - 持有所有组件的共享引用
///
/// 使用 Arc 实现浅拷贝，axum handler 和后台任务各持一份。
///
/// | 字段 | 说明 |
/// |------|------|
/// | config | 配置项 (不可变) |
/// | registry | 桌台订单权威状态 |
/// | connections | 终端会话 |
/// | dispatcher | 广播分发 |
/// | processor | 命令处理 |
/// | stats | 统计聚合 |
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<Config>,
    pub registry: Arc<TableRegistry>,
    pub connections: Arc<ConnectionManager>,
    pub dispatcher: BroadcastDispatcher,
    pub processor: Arc<CommandProcessor>,
    pub stats: StatsAggregator,
    pub started_at: DateTime<Utc>,
    shutdown: CancellationToken,
    /// Registry 事件接收端，启动后台任务时取走
    registry_events: Arc<Mutex<Option<mpsc::UnboundedReceiver<RegistryEvent>>>>,
    tasks: Arc<tokio::sync::Mutex<Option<BackgroundTasks>>>,
}

impl ServerState {
    pub fn initialize(config: &Config) -> Self {
        let (registry, registry_events) = TableRegistry::new();
        let registry = Arc::new(registry);
        let connections = Arc::new(ConnectionManager::new(config.outbound_queue_capacity));
        let dispatcher = BroadcastDispatcher::new(connections.clone());
        let processor = Arc::new(CommandProcessor::new(
            registry.clone(),
            connections.clone(),
            config.strict_totals,
        ));
        let stats = StatsAggregator::new(registry.clone(), connections.clone(), dispatcher.clone());

        Self {
            config: Arc::new(config.clone()),
            registry,
            connections,
            dispatcher,
            processor,
            stats,
            started_at: Utc::now(),
            shutdown: CancellationToken::new(),
            registry_events: Arc::new(Mutex::new(Some(registry_events))),
            tasks: Arc::new(tokio::sync::Mutex::new(None)),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// 启动广播分发和统计推送。重复调用无效果
    pub async fn start_background_tasks(&self) {
        let Some(events) = self.registry_events.lock().take() else {
            tracing::debug!("Background tasks already started");
            return;
        };

        let mut tasks = BackgroundTasks::with_token(self.shutdown.clone());
        tasks.spawn(
            "broadcast_dispatcher",
            TaskKind::Listener,
            self.dispatcher.clone().run(events, self.shutdown.clone()),
        );
        tasks.spawn(
            "stats_aggregator",
            TaskKind::Periodic,
            self.stats.clone().run(
                Duration::from_secs(self.config.stats_interval_secs),
                self.shutdown.clone(),
            ),
        );
        tasks.log_summary();
        *self.tasks.lock().await = Some(tasks);
    }

    /// 取消所有任务和连接，等待后台任务结束
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let tasks = self.tasks.lock().await.take();
        if let Some(tasks) = tasks {
            tasks
                .shutdown(Duration::from_millis(self.config.shutdown_timeout_ms))
                .await;
        }
    }

    /// 意外结束的后台任务数量（尚未启动时为 0）
    pub async fn failed_tasks(&self) -> usize {
        self.tasks
            .lock()
            .await
            .as_ref()
            .map_or(0, BackgroundTasks::check_health)
    }

    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
