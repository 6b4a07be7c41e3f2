//! Money in integer minor units
//!
//! 金额内部一律以"分"为单位的 `i64` 存储和计算，避免浮点累积误差。
//! 线上 JSON 仍然使用十进制数字（例如 `15.5`），边界处通过
//! `rust_decimal` 做 half-up 两位小数舍入。

use rust_decimal::prelude::*;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// 小数位数 (2 decimal places, half-up)
pub const DECIMAL_PLACES: u32 = 2;

/// 每单位主币的分数
const MINOR_PER_MAJOR: i64 = 100;

/// Amount of money in minor units (cents)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    pub const fn minor(self) -> i64 {
        self.0
    }

    /// Decimal → Money，half-up 舍入到分。超出 i64 范围返回 None
    pub fn from_decimal(value: Decimal) -> Option<Self> {
        let rounded = value.round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero);
        rounded
            .checked_mul(Decimal::from(MINOR_PER_MAJOR))?
            .to_i64()
            .map(Money)
    }

    /// f64 → Money。NaN / Infinity 返回 None
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        Decimal::from_f64(value).and_then(Self::from_decimal)
    }

    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, DECIMAL_PLACES)
    }

    pub fn to_f64(self) -> f64 {
        self.to_decimal().to_f64().unwrap_or(0.0)
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn checked_mul(self, quantity: u32) -> Option<Money> {
        self.0.checked_mul(i64::from(quantity)).map(Money)
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// 两个金额之差的绝对值（分）
    pub fn abs_diff(self, other: Money) -> u64 {
        self.0.abs_diff(other.0)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_f64())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Money::from_f64(value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid monetary amount: {value}")))
    }
}
