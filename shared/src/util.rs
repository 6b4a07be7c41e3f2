use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum TimestampRepr {
    Millis(i64),
    Text(String),
}

/// 时间戳反序列化：兼容 ISO-8601 字符串与 Unix 毫秒
///
/// 终端发送的 `timestamp` / `startTime` 两种格式都见过，服务端统一为 `DateTime<Utc>`。
pub fn flexible_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    match TimestampRepr::deserialize(deserializer)? {
        TimestampRepr::Millis(ms) => Utc
            .timestamp_millis_opt(ms)
            .single()
            .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {ms}"))),
        TimestampRepr::Text(s) => DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| serde::de::Error::custom(format!("invalid ISO-8601 timestamp '{s}': {e}"))),
    }
}

/// Optional variant of [`flexible_timestamp`]
pub fn flexible_timestamp_opt<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "flexible_timestamp")] DateTime<Utc>);

    Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|w| w.0))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Int(i64),
    Text(String),
}

/// Product ID 反序列化：数字或字符串均转为 `String`
pub fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match IdRepr::deserialize(deserializer)? {
        IdRepr::Int(n) => n.to_string(),
        IdRepr::Text(s) => s,
    })
}
