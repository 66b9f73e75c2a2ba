// ==========================================
// 制造执行系统 (MES) - 资源冲突检测
// ==========================================
// conflict(resource, [s, e)) ⇔ ∃ event: event.start < e ∧ event.end > s
// 规划阶段: 行事历查询 + 本次运行的暂定占用（咨询性）
// 提交阶段: 事务内复查（权威）
// ==========================================

use crate::domain::calendar::EventConflict;
use crate::domain::resource::ResourceRef;
use crate::engine::error::ScheduleResult;
use crate::engine::ports::CalendarQuery;
use crate::repository::{CalendarEventRepository, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::Connection;

/// 本次排程运行中尚未提交的占用
#[derive(Debug, Clone, PartialEq)]
pub struct TentativeBooking {
    pub resource: ResourceRef,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub label: String,
}

impl TentativeBooking {
    fn conflict(&self, resource: ResourceRef, start: NaiveDateTime, end: NaiveDateTime) -> Option<EventConflict> {
        (self.resource == resource && self.start < end && self.end > start).then(|| EventConflict {
            resource,
            event_id: None,
            event_title: self.label.clone(),
            start: self.start,
            end: self.end,
        })
    }
}

// ==========================================
// ConflictChecker - 冲突检测器
// ==========================================
pub struct ConflictChecker<'a> {
    calendar: &'a dyn CalendarQuery,
    bookings: Vec<TentativeBooking>,
}

impl<'a> ConflictChecker<'a> {
    pub fn new(calendar: &'a dyn CalendarQuery) -> Self {
        Self {
            calendar,
            bookings: Vec::new(),
        }
    }

    /// 检查已持久化事件、本次运行已接受的占用以及调用方给出的额外占用
    pub fn check(
        &self,
        resource: ResourceRef,
        start: NaiveDateTime,
        end: NaiveDateTime,
        extra: &[TentativeBooking],
    ) -> ScheduleResult<Vec<EventConflict>> {
        let mut conflicts: Vec<EventConflict> = self
            .calendar
            .occupying_events(resource, start, end)?
            .into_iter()
            .map(|e| EventConflict {
                resource,
                event_id: Some(e.id),
                event_title: e.title,
                start: e.start,
                end: e.end,
            })
            .collect();
        conflicts.extend(
            self.bookings
                .iter()
                .chain(extra.iter())
                .filter_map(|b| b.conflict(resource, start, end)),
        );
        Ok(conflicts)
    }

    pub fn is_free(
        &self,
        resource: ResourceRef,
        start: NaiveDateTime,
        end: NaiveDateTime,
        extra: &[TentativeBooking],
    ) -> ScheduleResult<bool> {
        Ok(self.check(resource, start, end, extra)?.is_empty())
    }

    /// 接受一批占用（某工单全部任务通过后调用）
    pub fn accept(&mut self, bookings: impl IntoIterator<Item = TentativeBooking>) {
        self.bookings.extend(bookings);
    }

    pub fn bookings(&self) -> &[TentativeBooking] {
        &self.bookings
    }

    /// 事务内复查
    pub fn check_tx(
        conn: &Connection,
        resource: ResourceRef,
        start: NaiveDateTime,
        end: NaiveDateTime,
        exclude_event_id: Option<i64>,
    ) -> RepositoryResult<Vec<EventConflict>> {
        Ok(
            CalendarEventRepository::find_overlapping_tx(conn, resource, start, end, exclude_event_id)?
                .into_iter()
                .map(|e| EventConflict {
                    resource,
                    event_id: Some(e.id),
                    event_title: e.title,
                    start: e.start,
                    end: e.end,
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::calendar::CalendarEvent;
    use crate::domain::resource::ProductionLine;
    use crate::domain::types::CalendarEventType;
    use chrono::NaiveDate;

    struct OneEvent(CalendarEvent);

    impl CalendarQuery for OneEvent {
        fn is_workday(&self, _date: NaiveDate, _line: Option<&ProductionLine>) -> ScheduleResult<bool> {
            Ok(true)
        }

        fn occupying_events(
            &self,
            resource: ResourceRef,
            start: NaiveDateTime,
            end: NaiveDateTime,
        ) -> ScheduleResult<Vec<CalendarEvent>> {
            Ok(if self.0.occupies(resource) && self.0.overlaps(start, end) {
                vec![self.0.clone()]
            } else {
                Vec::new()
            })
        }
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 3)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn busy_operator_1() -> OneEvent {
        OneEvent(CalendarEvent {
            id: 9,
            event_type: CalendarEventType::Production,
            title: "WO-01-202503001 SMT".to_string(),
            description: None,
            start: at(9, 0),
            end: at(11, 0),
            all_day: false,
            unit: None,
            operator_id: Some(1),
            equipment_id: None,
            smt_equipment_id: None,
            order_id: Some(1),
            process_name: Some("SMT".to_string()),
            created_by: None,
        })
    }

    #[test]
    fn test_persisted_event_conflicts() {
        let calendar = busy_operator_1();
        let checker = ConflictChecker::new(&calendar);
        let conflicts = checker
            .check(ResourceRef::Operator(1), at(9, 30), at(10, 30), &[])
            .unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].event_id, Some(9));
        // 首尾相接不算冲突
        assert!(checker
            .is_free(ResourceRef::Operator(1), at(11, 0), at(12, 0), &[])
            .unwrap());
        assert!(checker
            .is_free(ResourceRef::Operator(2), at(9, 30), at(10, 30), &[])
            .unwrap());
    }

    #[test]
    fn test_tentative_bookings_conflict() {
        let calendar = busy_operator_1();
        let mut checker = ConflictChecker::new(&calendar);
        checker.accept(vec![TentativeBooking {
            resource: ResourceRef::Equipment(3),
            start: at(13, 0),
            end: at(14, 0),
            label: "WO-01-202503002 DIP".to_string(),
        }]);
        let conflicts = checker
            .check(ResourceRef::Equipment(3), at(13, 30), at(15, 0), &[])
            .unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].event_id, None);
    }
}
