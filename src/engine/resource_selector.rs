// ==========================================
// 制造执行系统 (MES) - 资源选择（贪心）
// ==========================================
// 作业员: 技能包含该工序且无冲突的第一位（必需）
// 设备: SMT 工序取 SMT 设备，否则取支持该工序的设备；
//       目录中无候选设备时不指派设备
// ==========================================

use crate::domain::resource::{Equipment, Operator, ResourceRef, SmtEquipment};
use crate::engine::conflict::{ConflictChecker, TentativeBooking};
use crate::engine::error::ScheduleResult;
use crate::engine::ports::ResourceQuery;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// 选中的资源
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceChoice {
    pub operator_id: Option<i64>,
    pub operator_name: Option<String>,
    pub equipment_id: Option<i64>,
    pub smt_equipment_id: Option<i64>,
    pub equipment_name: Option<String>,
}

impl ResourceChoice {
    pub fn resources(&self) -> Vec<ResourceRef> {
        let mut refs = Vec::with_capacity(2);
        if let Some(id) = self.operator_id {
            refs.push(ResourceRef::Operator(id));
        }
        if let Some(id) = self.equipment_id {
            refs.push(ResourceRef::Equipment(id));
        }
        if let Some(id) = self.smt_equipment_id {
            refs.push(ResourceRef::SmtEquipment(id));
        }
        refs
    }
}

// ==========================================
// ResourcePool - 一次排程运行的资源快照
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ResourcePool {
    pub operators: Vec<Operator>,
    pub equipment: Vec<Equipment>,
    pub smt_equipment: Vec<SmtEquipment>,
}

impl ResourcePool {
    pub fn load(resources: &dyn ResourceQuery) -> ScheduleResult<Self> {
        Ok(Self {
            operators: resources.operators()?,
            equipment: resources.equipment()?,
            smt_equipment: resources.smt_equipment()?,
        })
    }

    pub fn operator_name(&self, id: i64) -> Option<&str> {
        self.operators
            .iter()
            .find(|o| o.id == id)
            .map(|o| o.name.as_str())
    }

    pub fn equipment_name(&self, id: i64) -> Option<&str> {
        self.equipment
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.name.as_str())
    }

    pub fn smt_equipment_name(&self, id: i64) -> Option<&str> {
        self.smt_equipment
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.name.as_str())
    }

    /// 在 [start, end) 为工序选择资源；无可用组合时返回 None
    pub fn select(
        &self,
        process_name: &str,
        is_smt: bool,
        start: NaiveDateTime,
        end: NaiveDateTime,
        checker: &ConflictChecker<'_>,
        extra: &[TentativeBooking],
    ) -> ScheduleResult<Option<ResourceChoice>> {
        let mut choice = ResourceChoice::default();

        let mut operator = None;
        for op in self.operators.iter().filter(|o| o.is_active && o.can_perform(process_name)) {
            if checker.is_free(ResourceRef::Operator(op.id), start, end, extra)? {
                operator = Some(op);
                break;
            }
        }
        let Some(operator) = operator else {
            return Ok(None);
        };
        choice.operator_id = Some(operator.id);
        choice.operator_name = Some(operator.name.clone());

        if is_smt {
            let candidates: Vec<&SmtEquipment> =
                self.smt_equipment.iter().filter(|e| e.is_active).collect();
            if !candidates.is_empty() {
                let mut found = None;
                for eq in candidates {
                    if checker.is_free(ResourceRef::SmtEquipment(eq.id), start, end, extra)? {
                        found = Some(eq);
                        break;
                    }
                }
                let Some(eq) = found else {
                    return Ok(None);
                };
                choice.smt_equipment_id = Some(eq.id);
                choice.equipment_name = Some(eq.name.clone());
            }
        } else {
            let candidates: Vec<&Equipment> = self
                .equipment
                .iter()
                .filter(|e| e.is_active && e.supports(process_name))
                .collect();
            if !candidates.is_empty() {
                let mut found = None;
                for eq in candidates {
                    if checker.is_free(ResourceRef::Equipment(eq.id), start, end, extra)? {
                        found = Some(eq);
                        break;
                    }
                }
                let Some(eq) = found else {
                    return Ok(None);
                };
                choice.equipment_id = Some(eq.id);
                choice.equipment_name = Some(eq.name.clone());
            }
        }

        Ok(Some(choice))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::calendar::CalendarEvent;
    use crate::domain::resource::ProductionLine;
    use crate::engine::ports::CalendarQuery;
    use chrono::NaiveDate;

    struct EmptyCalendar;

    impl CalendarQuery for EmptyCalendar {
        fn is_workday(&self, _date: NaiveDate, _line: Option<&ProductionLine>) -> ScheduleResult<bool> {
            Ok(true)
        }

        fn occupying_events(
            &self,
            _resource: ResourceRef,
            _start: NaiveDateTime,
            _end: NaiveDateTime,
        ) -> ScheduleResult<Vec<CalendarEvent>> {
            Ok(Vec::new())
        }
    }

    fn at(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 3)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn op(id: i64, skills: &[&str]) -> Operator {
        Operator {
            id,
            name: format!("OP{}", id),
            skill_set: skills.iter().map(|s| s.to_string()).collect(),
            is_active: true,
        }
    }

    #[test]
    fn test_selects_first_skilled_free_operator() {
        let pool = ResourcePool {
            operators: vec![op(1, &["DIP"]), op(2, &["SMT"]), op(3, &["SMT"])],
            ..Default::default()
        };
        let calendar = EmptyCalendar;
        let checker = ConflictChecker::new(&calendar);
        let busy = vec![TentativeBooking {
            resource: ResourceRef::Operator(2),
            start: at(8),
            end: at(10),
            label: "busy".to_string(),
        }];
        let choice = pool
            .select("SMT", true, at(9), at(11), &checker, &busy)
            .unwrap()
            .unwrap();
        assert_eq!(choice.operator_id, Some(3));
        // 无 SMT 设备目录时不指派设备
        assert_eq!(choice.smt_equipment_id, None);
    }

    #[test]
    fn test_no_skilled_operator_is_unavailable() {
        let pool = ResourcePool {
            operators: vec![op(1, &["DIP"])],
            ..Default::default()
        };
        let calendar = EmptyCalendar;
        let checker = ConflictChecker::new(&calendar);
        assert!(pool
            .select("SMT", true, at(9), at(11), &checker, &[])
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_busy_equipment_blocks_selection() {
        let pool = ResourcePool {
            operators: vec![op(1, &["DIP"])],
            equipment: vec![Equipment {
                id: 5,
                name: "DIP-01".to_string(),
                process_set: vec!["DIP".to_string()],
                unit_name: None,
                is_active: true,
            }],
            ..Default::default()
        };
        let calendar = EmptyCalendar;
        let checker = ConflictChecker::new(&calendar);
        let busy = vec![TentativeBooking {
            resource: ResourceRef::Equipment(5),
            start: at(9),
            end: at(12),
            label: "busy".to_string(),
        }];
        assert!(pool
            .select("DIP", false, at(10), at(11), &checker, &busy)
            .unwrap()
            .is_none());
        let choice = pool
            .select("DIP", false, at(12), at(13), &checker, &busy)
            .unwrap()
            .unwrap();
        assert_eq!(choice.equipment_id, Some(5));
        assert_eq!(choice.equipment_name.as_deref(), Some("DIP-01"));
    }
}
