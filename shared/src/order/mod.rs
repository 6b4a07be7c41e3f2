//! Table order domain model
//!
//! - [`TableOrder`]: 一张桌台从开台到结账期间的订单快照
//! - [`LineItem`]: 已规范化的订单行（价格为 [`Money`]）
//! - [`LineItemInput`]: 终端提交的原始订单行，服务端校验后才会变成 `LineItem`

mod money;

pub use money::{DECIMAL_PLACES, Money};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::util::string_or_number;

/// Physical table number (always > 0)
pub type TableNumber = u32;

/// 订单状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum OrderStatus {
    #[default]
    Open,
    Closed,
}

/// Normalized line item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: String,
    pub name: String,
    pub unit_price: Money,
    pub quantity: u32,
}

impl LineItem {
    /// unit_price × quantity，溢出返回 None
    pub fn line_total(&self) -> Option<Money> {
        self.unit_price.checked_mul(self.quantity)
    }
}

/// 计算订单合计（分）。任何一行溢出则返回 None
pub fn compute_total(items: &[LineItem]) -> Option<Money> {
    items
        .iter()
        .try_fold(Money::ZERO, |acc, item| acc.checked_add(item.line_total()?))
}

/// Line item as submitted by a terminal
///
/// 价格和数量保持宽松类型，由服务端统一校验后报告 `MalformedPayload`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemInput {
    #[serde(deserialize_with = "string_or_number")]
    pub product_id: String,
    pub name: String,
    pub unit_price: f64,
    pub quantity: i64,
}

impl LineItemInput {
    pub fn new(product_id: impl Into<String>, name: impl Into<String>, unit_price: f64, quantity: i64) -> Self {
        Self {
            product_id: product_id.into(),
            name: name.into(),
            unit_price,
            quantity,
        }
    }
}

/// Table order snapshot
///
/// 由服务端 Registry 独占持有；广播和查询拿到的都是克隆快照。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableOrder {
    pub table_number: TableNumber,
    pub items: Vec<LineItem>,
    /// 永远由服务端根据 items 重新计算
    pub total: Money,
    /// 开台时间，创建后不可变
    pub start_time: DateTime<Utc>,
    /// 每次被接受的修改 +1，开台/转台后为 1
    pub sequence: u64,
    pub status: OrderStatus,
}

impl TableOrder {
    pub fn is_open(&self) -> bool {
        self.status == OrderStatus::Open
    }

    pub fn item_count(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.quantity)).sum()
    }
}
