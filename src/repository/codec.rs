// ==========================================
// 制造执行系统 (MES) - 行字段编解码
// ==========================================
// 日期/时间/JSON 列统一在此转换，解析失败返回 FromSqlConversionFailure
// ==========================================

use crate::db::{DATETIME_FORMAT, DATE_FORMAT, TIME_FORMAT};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::types::Type;
use rusqlite::Row;
use serde::de::DeserializeOwned;

pub fn fmt_date(d: NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

pub fn fmt_time(t: NaiveTime) -> String {
    t.format(TIME_FORMAT).to_string()
}

pub fn fmt_datetime(dt: NaiveDateTime) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

pub fn parse_date_str(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).ok()
}

/// 兼容 HH:MM:SS 与 HH:MM
pub fn parse_time_str(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
}

/// 兼容 'YYYY-MM-DD HH:MM:SS' 与 ISO 'T' 分隔
pub fn parse_datetime_str(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M"))
        .ok()
}

pub fn get_date(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    parse_date_str(&raw).ok_or_else(|| conversion_error(idx, format!("非法日期: {}", raw)))
}

pub fn get_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveTime> {
    let raw: String = row.get(idx)?;
    parse_time_str(&raw).ok_or_else(|| conversion_error(idx, format!("非法时间: {}", raw)))
}

pub fn get_opt_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveTime>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        Some(s) if !s.trim().is_empty() => parse_time_str(&s)
            .map(Some)
            .ok_or_else(|| conversion_error(idx, format!("非法时间: {}", s))),
        _ => Ok(None),
    }
}

pub fn get_datetime(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    parse_datetime_str(&raw)
        .ok_or_else(|| conversion_error(idx, format!("非法时间戳: {}", raw)))
}

pub fn get_opt_datetime(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDateTime>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        Some(s) if !s.trim().is_empty() => parse_datetime_str(&s)
            .map(Some)
            .ok_or_else(|| conversion_error(idx, format!("非法时间戳: {}", s))),
        _ => Ok(None),
    }
}

pub fn get_opt_date(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let raw: Option<String> = row.get(idx)?;
    Ok(raw.as_deref().and_then(parse_date_str))
}

pub fn get_opt_rfc3339(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<FixedOffset>>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        Some(s) if !s.trim().is_empty() => DateTime::parse_from_rfc3339(s.trim())
            .map(Some)
            .map_err(|e| conversion_error(idx, format!("非法 RFC3339 时间戳 {}: {}", s, e))),
        _ => Ok(None),
    }
}

/// JSON 数组列（空串视为空数组）
pub fn get_json<T: DeserializeOwned + Default>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        Some(s) if !s.trim().is_empty() => serde_json::from_str(&s)
            .map_err(|e| conversion_error(idx, format!("非法 JSON {}: {}", s, e))),
        _ => Ok(T::default()),
    }
}

pub fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "[]".to_string())
}
