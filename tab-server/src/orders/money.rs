//! Line item normalization and total calculation
//!
//! 终端提交的价格是浮点数，这里统一校验并转换为以分为单位的 [`Money`]。
//! 合计永远在服务端重新计算，客户端提交的 total 只做比对。

use rust_decimal::prelude::*;
use shared::order::{LineItem, LineItemInput, Money, compute_total};

use super::error::{OrderError, OrderResult};

/// Maximum allowed unit price (1,000,000.00)
const MAX_PRICE: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);
/// Maximum allowed quantity per line
const MAX_QUANTITY: i64 = 9999;
/// Maximum number of lines per order
pub const MAX_ITEMS_PER_ORDER: usize = 500;
/// Product name length limit (80mm receipt line with some overflow)
const MAX_NAME_LEN: usize = 200;

/// Maximum price in minor units, for items that are already [`Money`]
const MAX_PRICE_MINOR: i64 = 100_000_000;

/// Tolerance for client total comparison (0.01)
pub const TOTAL_TOLERANCE: Money = Money::from_minor(1);

/// Validate that a f64 value is finite (not NaN, not Infinity)
#[inline]
fn require_finite(value: f64, field_name: &str) -> OrderResult<()> {
    if !value.is_finite() {
        return Err(OrderError::malformed(format!(
            "{} must be a finite number, got {}",
            field_name, value
        )));
    }
    Ok(())
}

/// Validate one submitted line and convert it to a [`LineItem`]
pub fn normalize_item(item: &LineItemInput) -> OrderResult<LineItem> {
    if item.product_id.trim().is_empty() {
        return Err(OrderError::malformed("productId must not be empty"));
    }
    if item.name.trim().is_empty() {
        return Err(OrderError::malformed("item name must not be empty"));
    }
    if item.name.len() > MAX_NAME_LEN {
        return Err(OrderError::malformed(format!(
            "item name is too long ({} chars, max {})",
            item.name.len(),
            MAX_NAME_LEN
        )));
    }

    require_finite(item.unit_price, "unitPrice")?;
    let price = Decimal::from_f64(item.unit_price).ok_or_else(|| {
        OrderError::malformed(format!("unitPrice is not representable: {}", item.unit_price))
    })?;
    if price.is_sign_negative() && !price.is_zero() {
        return Err(OrderError::malformed(format!(
            "unitPrice must be non-negative, got {}",
            item.unit_price
        )));
    }
    if price > MAX_PRICE {
        return Err(OrderError::malformed(format!(
            "unitPrice exceeds maximum allowed ({}), got {}",
            MAX_PRICE, item.unit_price
        )));
    }
    let unit_price = Money::from_decimal(price)
        .ok_or_else(|| OrderError::malformed("unitPrice out of range"))?;

    if item.quantity <= 0 {
        return Err(OrderError::malformed(format!(
            "quantity must be positive, got {}",
            item.quantity
        )));
    }
    if item.quantity > MAX_QUANTITY {
        return Err(OrderError::malformed(format!(
            "quantity exceeds maximum allowed ({}), got {}",
            MAX_QUANTITY, item.quantity
        )));
    }
    let quantity = u32::try_from(item.quantity)
        .map_err(|_| OrderError::malformed("quantity out of range"))?;

    Ok(LineItem {
        product_id: item.product_id.clone(),
        name: item.name.clone(),
        unit_price,
        quantity,
    })
}

/// Re-check a line that is already in minor units (snapshots from an external store)
pub fn check_line_item(item: &LineItem) -> OrderResult<()> {
    if item.product_id.trim().is_empty() || item.name.trim().is_empty() {
        return Err(OrderError::malformed("productId and name must not be empty"));
    }
    if item.name.len() > MAX_NAME_LEN {
        return Err(OrderError::malformed(format!(
            "item name is too long ({} chars, max {})",
            item.name.len(),
            MAX_NAME_LEN
        )));
    }
    if item.unit_price.is_negative() || item.unit_price.minor() > MAX_PRICE_MINOR {
        return Err(OrderError::malformed(format!(
            "unitPrice out of range: {}",
            item.unit_price
        )));
    }
    if item.quantity == 0 || i64::from(item.quantity) > MAX_QUANTITY {
        return Err(OrderError::malformed(format!(
            "quantity out of range: {}",
            item.quantity
        )));
    }
    Ok(())
}

/// Validate all submitted lines, preserving order
pub fn normalize_items(items: &[LineItemInput]) -> OrderResult<Vec<LineItem>> {
    if items.len() > MAX_ITEMS_PER_ORDER {
        return Err(OrderError::malformed(format!(
            "too many items ({}, max {})",
            items.len(),
            MAX_ITEMS_PER_ORDER
        )));
    }
    items.iter().map(normalize_item).collect()
}

/// Σ unit_price × quantity
pub fn order_total(items: &[LineItem]) -> OrderResult<Money> {
    compute_total(items).ok_or_else(|| OrderError::malformed("order total overflows"))
}

/// Compare the advisory client total with the server-computed one
///
/// 超出容差时记录 warn；`strict` 模式下拒绝命令。
pub fn check_client_total(client_total: Option<f64>, computed: Money, strict: bool) -> OrderResult<()> {
    let Some(raw) = client_total else {
        return Ok(());
    };
    require_finite(raw, "total")?;
    let value = Decimal::from_f64(raw)
        .ok_or_else(|| OrderError::malformed(format!("total is not representable: {raw}")))?;
    // 单价 × 数量 × 行数的上限，超过的 total 不可能来自合法订单
    let max_total = MAX_PRICE * Decimal::from(MAX_QUANTITY) * Decimal::from(MAX_ITEMS_PER_ORDER);
    if value.abs() > max_total {
        return Err(OrderError::malformed(format!(
            "total exceeds maximum allowed ({max_total}), got {raw}"
        )));
    }
    let client = Money::from_decimal(value).ok_or_else(|| OrderError::malformed("total out of range"))?;
    let diff = client.abs_diff(computed);
    if diff > TOTAL_TOLERANCE.minor().unsigned_abs() {
        tracing::warn!(
            client_total = %client,
            server_total = %computed,
            diff_minor = diff,
            "Client total diverges from server computation"
        );
        if strict {
            return Err(OrderError::malformed(format!(
                "total {} does not match computed total {}",
                client, computed
            )));
        }
    }
    Ok(())
}
