//! Stats aggregator
//!
//! 定时计算营业概况并推送 `server_stats`。只读 Registry，失败时记录日志并跳过本轮。

use std::sync::Arc;
use std::time::Duration;

use shared::ServerEvent;
use shared::message::ServerStatsPayload;
use shared::order::Money;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::message::{BroadcastDispatcher, ConnectionManager, DispatchReport};
use crate::orders::TableRegistry;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatsError {
    #[error("Sum of open totals overflows after {tables} tables")]
    TotalOverflow { tables: usize },
}

#[derive(Clone)]
pub struct StatsAggregator {
    registry: Arc<TableRegistry>,
    connections: Arc<ConnectionManager>,
    dispatcher: BroadcastDispatcher,
}

impl StatsAggregator {
    pub fn new(
        registry: Arc<TableRegistry>,
        connections: Arc<ConnectionManager>,
        dispatcher: BroadcastDispatcher,
    ) -> Self {
        Self {
            registry,
            connections,
            dispatcher,
        }
    }

    pub fn compute(&self) -> Result<ServerStatsPayload, StatsError> {
        let open = self.registry.list_open();
        let mut total = Money::ZERO;
        for (index, order) in open.iter().enumerate() {
            total = total
                .checked_add(order.total)
                .ok_or(StatsError::TotalOverflow { tables: index + 1 })?;
        }
        Ok(ServerStatsPayload {
            open_tables: open.len(),
            total_value: total,
            active_connections: self.connections.active_count(),
        })
    }

    /// Compute and publish once. None when the tick was skipped
    pub fn tick(&self) -> Option<DispatchReport> {
        match self.compute() {
            Ok(stats) => {
                tracing::trace!(
                    open_tables = stats.open_tables,
                    total_value = %stats.total_value,
                    active_connections = stats.active_connections,
                    "Publishing server stats"
                );
                Some(self.dispatcher.publish(&ServerEvent::ServerStats(stats)))
            }
            Err(e) => {
                tracing::error!(error = %e, "Stats computation failed, skipping tick");
                None
            }
        }
    }

    pub async fn run(self, period: Duration, shutdown: CancellationToken) {
        tracing::info!(interval_secs = period.as_secs(), "Stats aggregator started");
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval.tick().await; // skip immediate

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Stats aggregator shutting down");
                    break;
                }
                _ = interval.tick() => {
                    self.tick();
                }
            }
        }
    }
}
