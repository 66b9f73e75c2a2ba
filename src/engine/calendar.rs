// ==========================================
// 制造执行系统 (MES) - 行事历服务
// ==========================================
// 工作日判定顺序:
//   1. 当日有 workday 全天事件 → 工作日（补班优先）
//   2. 当日有 holiday 全天事件 → 非工作日
//   3. 给定产线 → 按产线工作日掩码
//   4. 默认 → 周一至周五
// 覆盖事件按日缓存，写入时失效
// ==========================================

use crate::db::SharedConnection;
use crate::domain::calendar::{CalendarEvent, CalendarEventFilter, DayOverride, NewCalendarEvent};
use crate::domain::resource::{ProductionLine, ResourceRef};
use crate::domain::types::CalendarEventType;
use crate::engine::error::{ScheduleError, ScheduleResult};
use crate::engine::ports::CalendarQuery;
use crate::repository::CalendarEventRepository;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Weekday};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, info};

/// 向前/向后查找工作日的最大天数
pub const MAX_WORKDAY_SEARCH_DAYS: u32 = 366;

/// 默认周历（无产线时）
pub fn is_default_workday(weekday: Weekday) -> bool {
    !matches!(weekday, Weekday::Sat | Weekday::Sun)
}

/// 纯规则: 覆盖事件 > 产线掩码 > 默认周历
pub fn resolve_workday(date: NaiveDate, over: Option<DayOverride>, line: Option<&ProductionLine>) -> bool {
    match over {
        Some(DayOverride::Workday) => true,
        Some(DayOverride::Holiday) => false,
        None => match line {
            Some(line) => line.works_on(date.weekday()),
            None => is_default_workday(date.weekday()),
        },
    }
}

// ==========================================
// CalendarService - 行事历服务
// ==========================================
pub struct CalendarService {
    repo: CalendarEventRepository,
    overrides: RwLock<HashMap<NaiveDate, Option<DayOverride>>>,
}

impl CalendarService {
    pub fn new(conn: SharedConnection) -> Self {
        Self {
            repo: CalendarEventRepository::new(conn),
            overrides: RwLock::new(HashMap::new()),
        }
    }

    fn day_override(&self, date: NaiveDate) -> ScheduleResult<Option<DayOverride>> {
        if let Ok(cache) = self.overrides.read() {
            if let Some(cached) = cache.get(&date) {
                return Ok(*cached);
            }
        }
        let over = self.repo.day_override(date)?;
        if let Ok(mut cache) = self.overrides.write() {
            cache.insert(date, over);
        }
        Ok(over)
    }

    /// 预热日期区间的覆盖缓存（排程前整批读取）
    pub fn preload(&self, from: NaiveDate, to: NaiveDate) -> ScheduleResult<()> {
        let found = self.repo.day_overrides_between(from, to)?;
        if let Ok(mut cache) = self.overrides.write() {
            let mut day = from;
            while day <= to {
                cache.insert(day, found.get(&day).copied());
                match day.succ_opt() {
                    Some(next) => day = next,
                    None => break,
                }
            }
        }
        debug!(from = %from, to = %to, overrides = found.len(), "行事历覆盖缓存已预热");
        Ok(())
    }

    pub fn invalidate(&self) {
        if let Ok(mut cache) = self.overrides.write() {
            cache.clear();
        }
    }

    /// 下一个工作日
    ///
    /// 当日为补班日时返回当日；否则返回严格晚于 `date` 的第一个工作日。
    pub fn next_workday(&self, date: NaiveDate, line: Option<&ProductionLine>) -> ScheduleResult<NaiveDate> {
        if self.day_override(date)? == Some(DayOverride::Workday) {
            return Ok(date);
        }
        let mut day = date;
        for _ in 0..MAX_WORKDAY_SEARCH_DAYS {
            day = day
                .succ_opt()
                .ok_or_else(|| ScheduleError::InvalidInput(format!("日期越界: {}", date)))?;
            if self.is_workday(day, line)? {
                return Ok(day);
            }
        }
        Err(ScheduleError::InvalidInput(format!(
            "{} 之后 {} 天内没有工作日",
            date, MAX_WORKDAY_SEARCH_DAYS
        )))
    }

    /// 严格早于 `date` 的最近工作日
    pub fn previous_workday(&self, date: NaiveDate, line: Option<&ProductionLine>) -> ScheduleResult<NaiveDate> {
        let mut day = date;
        for _ in 0..MAX_WORKDAY_SEARCH_DAYS {
            day = day
                .pred_opt()
                .ok_or_else(|| ScheduleError::InvalidInput(format!("日期越界: {}", date)))?;
            if self.is_workday(day, line)? {
                return Ok(day);
            }
        }
        Err(ScheduleError::InvalidInput(format!(
            "{} 之前 {} 天内没有工作日",
            date, MAX_WORKDAY_SEARCH_DAYS
        )))
    }

    pub fn add_holiday(
        &self,
        date: NaiveDate,
        name: &str,
        description: Option<&str>,
        created_by: &str,
    ) -> ScheduleResult<i64> {
        if name.trim().is_empty() {
            return Err(ScheduleError::InvalidInput("假日名称不能为空".to_string()));
        }
        let event = NewCalendarEvent::all_day(
            CalendarEventType::Holiday,
            date,
            name.trim(),
            description.map(str::to_string),
            Some(created_by.to_string()),
        );
        let id = self.repo.insert(&event)?;
        self.forget(date);
        info!(date = %date, name, "新增假日");
        Ok(id)
    }

    /// 新增补班日（覆盖周末/假日）
    pub fn add_workday(&self, date: NaiveDate, description: Option<&str>, created_by: &str) -> ScheduleResult<i64> {
        let event = NewCalendarEvent::all_day(
            CalendarEventType::Workday,
            date,
            "補行上班",
            description.map(str::to_string),
            Some(created_by.to_string()),
        );
        let id = self.repo.insert(&event)?;
        self.forget(date);
        info!(date = %date, "新增补班日");
        Ok(id)
    }

    pub fn add_event(&self, event: &NewCalendarEvent) -> ScheduleResult<i64> {
        if event.end <= event.start && !event.all_day {
            return Err(ScheduleError::InvalidInput(format!(
                "事件结束时间必须晚于开始时间: {} ~ {}",
                event.start, event.end
            )));
        }
        let id = self.repo.insert(event)?;
        if event.event_type.is_day_override() {
            self.invalidate();
        }
        Ok(id)
    }

    pub fn remove_event(&self, id: i64) -> ScheduleResult<()> {
        let existing = self
            .repo
            .find_by_id(id)?
            .ok_or_else(|| ScheduleError::not_found("CalendarEvent", id))?;
        self.repo.delete(id)?;
        if existing.event_type.is_day_override() {
            self.invalidate();
        }
        Ok(())
    }

    pub fn list_events(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        filter: &CalendarEventFilter,
    ) -> ScheduleResult<Vec<CalendarEvent>> {
        if end <= start {
            return Err(ScheduleError::InvalidInput(format!(
                "查询窗口无效: {} ~ {}",
                start, end
            )));
        }
        Ok(self.repo.list_in_window(start, end, filter)?)
    }

    /// 当日是否已有同类全天事件（导入去重）
    pub fn has_all_day(&self, event_type: CalendarEventType, date: NaiveDate) -> ScheduleResult<bool> {
        Ok(self.repo.exists_all_day(event_type, date)?)
    }

    fn forget(&self, date: NaiveDate) {
        if let Ok(mut cache) = self.overrides.write() {
            cache.remove(&date);
        }
    }
}

impl CalendarQuery for CalendarService {
    fn is_workday(&self, date: NaiveDate, line: Option<&ProductionLine>) -> ScheduleResult<bool> {
        let over = self.day_override(date)?;
        Ok(resolve_workday(date, over, line))
    }

    fn occupying_events(
        &self,
        resource: ResourceRef,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> ScheduleResult<Vec<CalendarEvent>> {
        let filter = match resource {
            ResourceRef::Operator(id) => CalendarEventFilter {
                operator_id: Some(id),
                ..Default::default()
            },
            ResourceRef::Equipment(id) => CalendarEventFilter {
                equipment_id: Some(id),
                ..Default::default()
            },
            ResourceRef::SmtEquipment(id) => CalendarEventFilter {
                smt_equipment_id: Some(id),
                ..Default::default()
            },
        };
        let events = self.repo.list_in_window(start, end, &filter)?;
        Ok(events
            .into_iter()
            .filter(|e| e.occupies(resource) && e.overlaps(start, end))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_resolve_workday_precedence() {
        // 2025-03-08 为周六
        let sat = d(2025, 3, 8);
        assert!(!resolve_workday(sat, None, None));
        assert!(resolve_workday(sat, Some(DayOverride::Workday), None));

        let mon = d(2025, 3, 10);
        assert!(resolve_workday(mon, None, None));
        assert!(!resolve_workday(mon, Some(DayOverride::Holiday), None));

        let mut line = ProductionLine::builtin_default();
        line.work_days.push(Weekday::Sat);
        assert!(resolve_workday(sat, None, Some(&line)));
        assert!(!resolve_workday(sat, Some(DayOverride::Holiday), Some(&line)));
    }
}
