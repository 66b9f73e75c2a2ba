// ==========================================
// 制造执行系统 (MES) - 行事历数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 冲突查询为半开区间: start < e ∧ end > s
// ==========================================

use crate::db::SharedConnection;
use crate::domain::calendar::{CalendarEvent, CalendarEventFilter, DayOverride, NewCalendarEvent};
use crate::domain::resource::ResourceRef;
use crate::domain::types::CalendarEventType;
use crate::repository::codec::{fmt_date, fmt_datetime, get_datetime, parse_datetime_str};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::collections::HashMap;

const EVENT_COLUMNS: &str = r#"
    id, event_type, title, description, start_time, end_time, all_day, unit,
    operator_id, equipment_id, smt_equipment_id, order_id, process_name, created_by
"#;

// ==========================================
// CalendarEventRepository - 行事历事件仓储
// ==========================================
pub struct CalendarEventRepository {
    conn: SharedConnection,
}

impl CalendarEventRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row<'_>) -> SqliteResult<CalendarEvent> {
        Ok(CalendarEvent {
            id: row.get(0)?,
            event_type: CalendarEventType::from_str(&row.get::<_, String>(1)?),
            title: row.get(2)?,
            description: row.get(3)?,
            start: get_datetime(row, 4)?,
            end: get_datetime(row, 5)?,
            all_day: row.get::<_, i64>(6)? != 0,
            unit: row.get(7)?,
            operator_id: row.get(8)?,
            equipment_id: row.get(9)?,
            smt_equipment_id: row.get(10)?,
            order_id: row.get(11)?,
            process_name: row.get(12)?,
            created_by: row.get(13)?,
        })
    }

    // ===== 事务内操作 =====

    /// 在事务中插入事件，返回新 id
    pub fn insert_tx(conn: &Connection, event: &NewCalendarEvent) -> RepositoryResult<i64> {
        if event.end <= event.start && !event.all_day {
            return Err(RepositoryError::ValidationError(format!(
                "事件结束时间必须晚于开始时间: {} ~ {}",
                fmt_datetime(event.start),
                fmt_datetime(event.end)
            )));
        }
        conn.execute(
            r#"
            INSERT INTO calendar_event (
                event_type, title, description, start_time, end_time, all_day, unit,
                operator_id, equipment_id, smt_equipment_id, order_id, process_name,
                created_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, datetime('now', 'localtime'))
            "#,
            params![
                event.event_type.to_db_str(),
                event.title,
                event.description,
                fmt_datetime(event.start),
                fmt_datetime(event.end),
                event.all_day as i64,
                event.unit,
                event.operator_id,
                event.equipment_id,
                event.smt_equipment_id,
                event.order_id,
                event.process_name,
                event.created_by,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 在事务中查询与 [start, end) 重叠且占用该资源的事件
    pub fn find_overlapping_tx(
        conn: &Connection,
        resource: ResourceRef,
        start: NaiveDateTime,
        end: NaiveDateTime,
        exclude_event_id: Option<i64>,
    ) -> RepositoryResult<Vec<CalendarEvent>> {
        // 列名来自枚举常量，非用户输入
        let sql = format!(
            r#"
            SELECT {cols}
            FROM calendar_event
            WHERE {col} = ?1
              AND start_time < ?2
              AND end_time > ?3
              AND (?4 IS NULL OR id <> ?4)
            ORDER BY start_time, id
            "#,
            cols = EVENT_COLUMNS,
            col = resource.column()
        );
        let mut stmt = conn.prepare(&sql)?;
        let events = stmt
            .query_map(
                params![
                    resource.id(),
                    fmt_datetime(end),
                    fmt_datetime(start),
                    exclude_event_id
                ],
                Self::map_row,
            )?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(events)
    }

    /// 在事务中查询某日的覆盖事件（补班日优先）
    pub fn day_override_tx(conn: &Connection, date: NaiveDate) -> RepositoryResult<Option<DayOverride>> {
        let day = fmt_date(date);
        let kinds: Vec<String> = conn
            .prepare(
                r#"
                SELECT DISTINCT event_type
                FROM calendar_event
                WHERE all_day = 1
                  AND event_type IN ('workday', 'holiday')
                  AND substr(start_time, 1, 10) <= ?1
                  AND substr(end_time, 1, 10) >= ?1
                "#,
            )?
            .query_map(params![day], |row| row.get(0))?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(resolve_override(kinds.iter().map(String::as_str)))
    }

    // ===== 常规操作 =====

    pub fn insert(&self, event: &NewCalendarEvent) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        Self::insert_tx(&conn, event)
    }

    pub fn find_by_id(&self, id: i64) -> RepositoryResult<Option<CalendarEvent>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM calendar_event WHERE id = ?1", EVENT_COLUMNS);
        let event = conn
            .query_row(&sql, params![id], Self::map_row)
            .optional()?;
        Ok(event)
    }

    pub fn delete(&self, id: i64) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute("DELETE FROM calendar_event WHERE id = ?1", params![id])?;
        if affected == 0 {
            return Err(RepositoryError::not_found("CalendarEvent", id));
        }
        Ok(())
    }

    /// 删除某工单的所有生产事件
    pub fn delete_production_by_order(&self, order_id: i64) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "DELETE FROM calendar_event WHERE order_id = ?1 AND event_type = 'production'",
            params![order_id],
        )?;
        Ok(affected)
    }

    /// 查询时间窗内的事件（与窗口重叠即返回）
    pub fn list_in_window(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        filter: &CalendarEventFilter,
    ) -> RepositoryResult<Vec<CalendarEvent>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            SELECT {}
            FROM calendar_event
            WHERE start_time < ?1
              AND end_time > ?2
              AND (?3 IS NULL OR event_type = ?3)
              AND (?4 IS NULL OR operator_id = ?4)
              AND (?5 IS NULL OR equipment_id = ?5)
              AND (?6 IS NULL OR smt_equipment_id = ?6)
              AND (?7 IS NULL OR order_id = ?7)
            ORDER BY start_time, id
            "#,
            EVENT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let events = stmt
            .query_map(
                params![
                    fmt_datetime(end),
                    fmt_datetime(start),
                    filter.event_type.map(|t| t.to_db_str()),
                    filter.operator_id,
                    filter.equipment_id,
                    filter.smt_equipment_id,
                    filter.order_id,
                ],
                Self::map_row,
            )?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(events)
    }

    /// 查询时间窗内所有占用资源的事件（排程整批读取用）
    pub fn list_resource_events(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> RepositoryResult<Vec<CalendarEvent>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            SELECT {}
            FROM calendar_event
            WHERE start_time < ?1
              AND end_time > ?2
              AND (operator_id IS NOT NULL OR equipment_id IS NOT NULL OR smt_equipment_id IS NOT NULL)
            ORDER BY start_time, id
            "#,
            EVENT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let events = stmt
            .query_map(
                params![fmt_datetime(end), fmt_datetime(start)],
                Self::map_row,
            )?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(events)
    }

    pub fn day_override(&self, date: NaiveDate) -> RepositoryResult<Option<DayOverride>> {
        let conn = self.get_conn()?;
        Self::day_override_tx(&conn, date)
    }

    /// 批量读取日期区间内的覆盖事件（缓存预热用）
    pub fn day_overrides_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepositoryResult<HashMap<NaiveDate, DayOverride>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT event_type, start_time, end_time
            FROM calendar_event
            WHERE all_day = 1
              AND event_type IN ('workday', 'holiday')
              AND substr(start_time, 1, 10) <= ?2
              AND substr(end_time, 1, 10) >= ?1
            "#,
        )?;
        let rows = stmt
            .query_map(params![fmt_date(from), fmt_date(to)], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        let mut kinds_by_day: HashMap<NaiveDate, Vec<String>> = HashMap::new();
        for (kind, start, end) in rows {
            let (Some(s), Some(e)) = (parse_datetime_str(&start), parse_datetime_str(&end)) else {
                continue;
            };
            let mut day = s.date().max(from);
            let last = e.date().min(to);
            while day <= last {
                kinds_by_day.entry(day).or_default().push(kind.clone());
                match day.succ_opt() {
                    Some(next) => day = next,
                    None => break,
                }
            }
        }

        Ok(kinds_by_day
            .into_iter()
            .filter_map(|(day, kinds)| {
                resolve_override(kinds.iter().map(String::as_str)).map(|o| (day, o))
            })
            .collect())
    }

    /// 某日是否已存在指定类型的全天事件（导入去重）
    pub fn exists_all_day(
        &self,
        event_type: CalendarEventType,
        date: NaiveDate,
    ) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let exists = conn
            .query_row(
                r#"
                SELECT 1 FROM calendar_event
                WHERE all_day = 1 AND event_type = ?1 AND substr(start_time, 1, 10) = ?2
                LIMIT 1
                "#,
                params![event_type.to_db_str(), fmt_date(date)],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        Ok(exists)
    }
}

/// 补班日优先于假日
fn resolve_override<'a>(kinds: impl Iterator<Item = &'a str>) -> Option<DayOverride> {
    let mut result = None;
    for kind in kinds {
        match kind {
            "workday" => return Some(DayOverride::Workday),
            "holiday" => result = Some(DayOverride::Holiday),
            _ => {}
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_override_priority() {
        assert_eq!(
            resolve_override(["holiday", "workday"].into_iter()),
            Some(DayOverride::Workday)
        );
        assert_eq!(resolve_override(["holiday"].into_iter()), Some(DayOverride::Holiday));
        assert_eq!(resolve_override(std::iter::empty()), None);
    }
}
