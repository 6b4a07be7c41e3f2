//! Mutation validator
//!
//! 纯函数：只根据当前状态和输入计算结果，不修改任何东西。
//! Registry 持有桌台锁时调用这些函数，校验通过后再提交。
//!
//! | 函数 | 失败 | 成功 |
//! |------|------|------|
//! | [`validate_create`] | AlreadyOpen | 新订单, sequence = 1 |
//! | [`validate_update`] | NotFound / StaleSequence | 新 items/total, sequence + 1 |
//! | [`validate_transfer`] | NotFound / TargetOccupied | 目标桌订单, sequence = 1 |
//! | [`validate_close`] | NotFound | 关闭确认 |

use chrono::{DateTime, Utc};
use shared::order::{LineItem, OrderStatus, TableNumber, TableOrder};

use super::error::{OrderError, OrderResult};
use super::money::order_total;

/// Result of a successful close validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseConfirmation {
    pub table_number: TableNumber,
    /// sequence assigned to the close mutation
    pub sequence: u64,
    /// final state of the order, status = Closed
    pub closed: TableOrder,
}

/// Structural check for table numbers coming off the wire
pub fn table_number(raw: i64, field: &str) -> OrderResult<TableNumber> {
    if raw <= 0 {
        return Err(OrderError::malformed(format!(
            "{field} must be a positive integer, got {raw}"
        )));
    }
    TableNumber::try_from(raw)
        .map_err(|_| OrderError::malformed(format!("{field} is out of range: {raw}")))
}

fn open_order(current: Option<&TableOrder>) -> Option<&TableOrder> {
    current.filter(|o| o.is_open())
}

pub fn validate_create(
    table: TableNumber,
    current: Option<&TableOrder>,
    items: Vec<LineItem>,
    start_time: DateTime<Utc>,
) -> OrderResult<TableOrder> {
    if open_order(current).is_some() {
        return Err(OrderError::AlreadyOpen(table));
    }
    let total = order_total(&items)?;
    Ok(TableOrder {
        table_number: table,
        items,
        total,
        start_time,
        sequence: 1,
        status: OrderStatus::Open,
    })
}

/// `expected_sequence` 是客户端修改所基于的版本；缺省时不做版本检查
pub fn validate_update(
    table: TableNumber,
    current: Option<&TableOrder>,
    items: Vec<LineItem>,
    expected_sequence: Option<u64>,
) -> OrderResult<TableOrder> {
    let existing = open_order(current).ok_or(OrderError::NotFound(table))?;
    if let Some(expected) = expected_sequence
        && expected != existing.sequence
    {
        return Err(OrderError::StaleSequence {
            table,
            expected,
            current: existing.sequence,
        });
    }
    let total = order_total(&items)?;
    Ok(TableOrder {
        table_number: table,
        items,
        total,
        start_time: existing.start_time,
        sequence: existing.sequence + 1,
        status: OrderStatus::Open,
    })
}

/// Returns the order to install at `target`; the caller clears `source`
pub fn validate_transfer(
    source: TableNumber,
    source_current: Option<&TableOrder>,
    target: TableNumber,
    target_current: Option<&TableOrder>,
) -> OrderResult<TableOrder> {
    if source == target {
        return Err(OrderError::malformed(format!(
            "sourceTable and targetTable must differ (both {source})"
        )));
    }
    let existing = open_order(source_current).ok_or(OrderError::NotFound(source))?;
    if open_order(target_current).is_some() {
        return Err(OrderError::TargetOccupied(target));
    }
    Ok(TableOrder {
        table_number: target,
        items: existing.items.clone(),
        total: existing.total,
        start_time: existing.start_time,
        sequence: 1,
        status: OrderStatus::Open,
    })
}

pub fn validate_close(table: TableNumber, current: Option<&TableOrder>) -> OrderResult<CloseConfirmation> {
    let existing = open_order(current).ok_or(OrderError::NotFound(table))?;
    let sequence = existing.sequence + 1;
    let mut closed = existing.clone();
    closed.sequence = sequence;
    closed.status = OrderStatus::Closed;
    Ok(CloseConfirmation {
        table_number: table,
        sequence,
        closed,
    })
}
