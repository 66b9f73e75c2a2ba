// ==========================================
// 制造执行系统 (MES) - 行事历领域模型
// ==========================================
// 行事历事件为共享数据：只按 id 引用资源，不拥有资源
// holiday / workday 全天事件覆盖默认周历
// ==========================================

use crate::domain::resource::ResourceRef;
use crate::domain::types::CalendarEventType;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ==========================================
// CalendarEvent - 行事历事件
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: i64,
    pub event_type: CalendarEventType,
    pub title: String,
    pub description: Option<String>,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub all_day: bool,
    pub unit: Option<String>,
    pub operator_id: Option<i64>,
    pub equipment_id: Option<i64>,
    pub smt_equipment_id: Option<i64>,
    pub order_id: Option<i64>,
    pub process_name: Option<String>,
    pub created_by: Option<String>,
}

impl CalendarEvent {
    /// 是否占用指定资源
    pub fn occupies(&self, resource: ResourceRef) -> bool {
        match resource {
            ResourceRef::Operator(id) => self.operator_id == Some(id),
            ResourceRef::Equipment(id) => self.equipment_id == Some(id),
            ResourceRef::SmtEquipment(id) => self.smt_equipment_id == Some(id),
        }
    }

    /// 半开区间重叠: event.start < e ∧ event.end > s
    pub fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        self.start < end && self.end > start
    }
}

/// 新建行事历事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCalendarEvent {
    pub event_type: CalendarEventType,
    pub title: String,
    pub description: Option<String>,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub all_day: bool,
    pub unit: Option<String>,
    pub operator_id: Option<i64>,
    pub equipment_id: Option<i64>,
    pub smt_equipment_id: Option<i64>,
    pub order_id: Option<i64>,
    pub process_name: Option<String>,
    pub created_by: Option<String>,
}

impl NewCalendarEvent {
    /// 全天事件（假日 / 补班日）
    pub fn all_day(
        event_type: CalendarEventType,
        date: NaiveDate,
        title: &str,
        description: Option<String>,
        created_by: Option<String>,
    ) -> Self {
        let start = date.and_hms_opt(0, 0, 0).unwrap_or_default();
        let end = date.and_hms_opt(23, 59, 59).unwrap_or_default();
        Self {
            event_type,
            title: title.to_string(),
            description,
            start,
            end,
            all_day: true,
            unit: None,
            operator_id: None,
            equipment_id: None,
            smt_equipment_id: None,
            order_id: None,
            process_name: None,
            created_by,
        }
    }
}

// ==========================================
// DayOverride - 某日的周历覆盖
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayOverride {
    /// 补班日（优先级最高）
    Workday,
    Holiday,
}

// ==========================================
// CalendarEventFilter - 事件查询条件
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalendarEventFilter {
    pub event_type: Option<CalendarEventType>,
    pub operator_id: Option<i64>,
    pub equipment_id: Option<i64>,
    pub smt_equipment_id: Option<i64>,
    pub order_id: Option<i64>,
}

// ==========================================
// EventConflict - 资源占用冲突描述
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventConflict {
    pub resource: ResourceRef,
    /// 占用中的事件 id（同一次排程运行中的暂定任务为 None）
    pub event_id: Option<i64>,
    pub event_title: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl std::fmt::Display for EventConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.resource {
            ResourceRef::Operator(_) => "operator",
            ResourceRef::Equipment(_) => "equipment",
            ResourceRef::SmtEquipment(_) => "smt_equipment",
        };
        match self.event_id {
            Some(id) => write!(
                f,
                "{}={} occupied by event #{} \"{}\" [{} ~ {})",
                kind,
                self.resource.id(),
                id,
                self.event_title,
                self.start.format("%Y-%m-%d %H:%M"),
                self.end.format("%Y-%m-%d %H:%M")
            ),
            None => write!(
                f,
                "{}={} occupied by pending task \"{}\" [{} ~ {})",
                kind,
                self.resource.id(),
                self.event_title,
                self.start.format("%Y-%m-%d %H:%M"),
                self.end.format("%Y-%m-%d %H:%M")
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 3)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_half_open_overlap() {
        let mut ev = NewCalendarEvent::all_day(
            CalendarEventType::Production,
            NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            "SMT",
            None,
            None,
        );
        ev.start = dt(9, 0);
        ev.end = dt(11, 0);
        let event = CalendarEvent {
            id: 1,
            event_type: ev.event_type,
            title: ev.title,
            description: None,
            start: ev.start,
            end: ev.end,
            all_day: false,
            unit: None,
            operator_id: Some(1),
            equipment_id: None,
            smt_equipment_id: None,
            order_id: None,
            process_name: None,
            created_by: None,
        };

        assert!(event.overlaps(dt(9, 30), dt(10, 30)));
        assert!(!event.overlaps(dt(11, 0), dt(12, 0)));
        assert!(!event.overlaps(dt(8, 0), dt(9, 0)));
        assert!(event.occupies(ResourceRef::Operator(1)));
        assert!(!event.occupies(ResourceRef::Equipment(1)));
    }
}
