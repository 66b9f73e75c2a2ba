// ==========================================
// 制造执行系统 (MES) - 资源目录领域模型
// ==========================================
// 作业员 / 一般设备 / SMT 设备 / 产线
// 资源目录为读多写少数据，排程每次运行整批读取
// ==========================================

use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

// ==========================================
// Operator - 作业员
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operator {
    pub id: i64,
    pub name: String,
    /// 可作业工序（工序名称集合）
    pub skill_set: Vec<String>,
    pub is_active: bool,
}

impl Operator {
    pub fn can_perform(&self, process_name: &str) -> bool {
        self.is_active && self.skill_set.iter().any(|s| s == process_name)
    }
}

// ==========================================
// Equipment - 一般设备
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equipment {
    pub id: i64,
    pub name: String,
    /// 可加工工序
    pub process_set: Vec<String>,
    /// 所属产线名称
    pub unit_name: Option<String>,
    pub is_active: bool,
}

impl Equipment {
    pub fn supports(&self, process_name: &str) -> bool {
        self.is_active && self.process_set.iter().any(|p| p == process_name)
    }
}

// ==========================================
// SmtEquipment - SMT 设备
// ==========================================
// 不区分工序：任何 SMT 工序都可使用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmtEquipment {
    pub id: i64,
    pub name: String,
    pub is_active: bool,
}

// ==========================================
// ProductionLine - 产线作息
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionLine {
    pub id: i64,
    pub name: String,
    pub work_start: NaiveTime,
    pub work_end: NaiveTime,
    pub lunch_start: Option<NaiveTime>,
    pub lunch_end: Option<NaiveTime>,
    pub overtime_start: Option<NaiveTime>,
    pub overtime_end: Option<NaiveTime>,
    /// 工作日（周一..周日的子集）
    pub work_days: Vec<Weekday>,
    pub is_active: bool,
}

/// 未配置产线时使用的内建产线名称
pub const BUILTIN_LINE_NAME: &str = "DEFAULT";

impl ProductionLine {
    /// 内建默认作息: 08:30–17:30，午休 12:00–13:00，周一至周五
    pub fn builtin_default() -> Self {
        Self {
            id: 0,
            name: BUILTIN_LINE_NAME.to_string(),
            work_start: hm(8, 30),
            work_end: hm(17, 30),
            lunch_start: Some(hm(12, 0)),
            lunch_end: Some(hm(13, 0)),
            overtime_start: None,
            overtime_end: None,
            work_days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            is_active: true,
        }
    }

    pub fn works_on(&self, weekday: Weekday) -> bool {
        self.work_days.contains(&weekday)
    }

    /// 午休时段（起止都定义且有效时）
    pub fn lunch_window(&self) -> Option<(NaiveTime, NaiveTime)> {
        match (self.lunch_start, self.lunch_end) {
            (Some(s), Some(e)) if s < e => Some((s, e)),
            _ => None,
        }
    }

    /// 加班时段（起止都定义且有效时）
    pub fn overtime_window(&self) -> Option<(NaiveTime, NaiveTime)> {
        match (self.overtime_start, self.overtime_end) {
            (Some(s), Some(e)) if s < e => Some((s, e)),
            _ => None,
        }
    }

    /// 工作日掩码 → 数据库字符串（ISO 周几编号，逗号分隔）
    pub fn work_days_to_db_str(&self) -> String {
        self.work_days
            .iter()
            .map(|d| d.number_from_monday().to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// 数据库字符串 → 工作日掩码（非法片段忽略）
    pub fn parse_work_days(raw: &str) -> Vec<Weekday> {
        let mut days: Vec<Weekday> = raw
            .split(',')
            .filter_map(|s| s.trim().parse::<u32>().ok())
            .filter_map(weekday_from_number)
            .collect();
        days.dedup();
        days
    }
}

fn weekday_from_number(n: u32) -> Option<Weekday> {
    match n {
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        7 => Some(Weekday::Sun),
        _ => None,
    }
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN)
}

// ==========================================
// ResourceRef - 排程任务引用的资源
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ResourceRef {
    Operator(i64),
    Equipment(i64),
    SmtEquipment(i64),
}

impl ResourceRef {
    pub fn id(&self) -> i64 {
        match self {
            ResourceRef::Operator(id)
            | ResourceRef::Equipment(id)
            | ResourceRef::SmtEquipment(id) => *id,
        }
    }

    /// calendar_event 中对应的列名
    pub fn column(&self) -> &'static str {
        match self {
            ResourceRef::Operator(_) => "operator_id",
            ResourceRef::Equipment(_) => "equipment_id",
            ResourceRef::SmtEquipment(_) => "smt_equipment_id",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_days_roundtrip() {
        let line = ProductionLine::builtin_default();
        assert_eq!(line.work_days_to_db_str(), "1,2,3,4,5");
        assert_eq!(
            ProductionLine::parse_work_days("1, 6,x,9,7"),
            vec![Weekday::Mon, Weekday::Sat, Weekday::Sun]
        );
    }

    #[test]
    fn test_windows() {
        let mut line = ProductionLine::builtin_default();
        assert_eq!(line.lunch_window(), Some((hm(12, 0), hm(13, 0))));
        assert_eq!(line.overtime_window(), None);

        line.overtime_start = Some(hm(18, 0));
        line.overtime_end = Some(hm(17, 0));
        assert_eq!(line.overtime_window(), None);
    }

    #[test]
    fn test_operator_and_equipment_matching() {
        let op = Operator {
            id: 1,
            name: "王小明".to_string(),
            skill_set: vec!["DIP".to_string()],
            is_active: true,
        };
        assert!(op.can_perform("DIP"));
        assert!(!op.can_perform("SMT"));

        let eq = Equipment {
            id: 2,
            name: "波焊機".to_string(),
            process_set: vec!["DIP".to_string()],
            unit_name: None,
            is_active: false,
        };
        assert!(!eq.supports("DIP"));
    }
}
