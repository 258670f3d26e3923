//! DuckDB values to JSON

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use duckdb::types::{TimeUnit, Value};
use serde_json::{Number, Value as Json};

pub fn to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Boolean(b) => Json::Bool(*b),
        Value::TinyInt(i) => Json::from(*i),
        Value::SmallInt(i) => Json::from(*i),
        Value::Int(i) => Json::from(*i),
        Value::BigInt(i) => Json::from(*i),
        Value::HugeInt(i) => i64::try_from(*i)
            .map(Json::from)
            .unwrap_or_else(|_| Json::String(i.to_string())),
        Value::UTinyInt(i) => Json::from(*i),
        Value::USmallInt(i) => Json::from(*i),
        Value::UInt(i) => Json::from(*i),
        Value::UBigInt(i) => Json::from(*i),
        Value::Float(f) => float(f64::from(*f)),
        Value::Double(f) => float(*f),
        // decimals go through f64 so charts and profiles see numbers
        Value::Decimal(d) => d
            .to_string()
            .parse::<f64>()
            .map(float)
            .unwrap_or_else(|_| Json::String(d.to_string())),
        Value::Text(s) | Value::Enum(s) => Json::String(s.clone()),
        Value::Blob(b) => Json::String(format!("<blob {} bytes>", b.len())),
        Value::Date32(days) => date(*days),
        Value::Timestamp(unit, ticks) => timestamp(*unit, *ticks),
        Value::Time64(unit, ticks) => time(*unit, *ticks),
        Value::Interval { months, days, nanos } => {
            Json::String(format!("{} months {} days {} ns", months, days, nanos))
        }
        Value::List(items) | Value::Array(items) => Json::Array(items.iter().map(to_json).collect()),
        Value::Union(inner) => to_json(inner),
        _ => Json::String("<unsupported>".to_string()),
    }
}

fn float(f: f64) -> Json {
    Number::from_f64(f).map(Json::Number).unwrap_or(Json::Null)
}

fn micros(unit: TimeUnit, ticks: i64) -> i64 {
    match unit {
        TimeUnit::Second => ticks.saturating_mul(1_000_000),
        TimeUnit::Millisecond => ticks.saturating_mul(1_000),
        TimeUnit::Microsecond => ticks,
        TimeUnit::Nanosecond => ticks / 1_000,
    }
}

fn date(days: i32) -> Json {
    NaiveDate::from_ymd_opt(1970, 1, 1)
        .and_then(|epoch| epoch.checked_add_signed(Duration::days(i64::from(days))))
        .map(|d| Json::String(d.to_string()))
        .unwrap_or(Json::Null)
}

fn timestamp(unit: TimeUnit, ticks: i64) -> Json {
    DateTime::<Utc>::from_timestamp_micros(micros(unit, ticks))
        .map(|ts| Json::String(ts.naive_utc().to_string()))
        .unwrap_or(Json::Null)
}

fn time(unit: TimeUnit, ticks: i64) -> Json {
    let micros = micros(unit, ticks);
    let secs = u32::try_from(micros / 1_000_000).ok();
    let nanos = u32::try_from((micros % 1_000_000) * 1_000).ok();
    secs.zip(nanos)
        .and_then(|(secs, nanos)| NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos))
        .map(|t| Json::String(t.to_string()))
        .unwrap_or(Json::Null)
}
