// ==========================================
// 制造执行系统 (MES) - 排程警告看板
// ==========================================
// 警告只追加；定期裁剪保留最近 N 条
// 分类器依据关键字归类（繁中文案为准，英文文案同样识别）
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// ScheduleWarning - 排程警告
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleWarning {
    pub id: i64,
    pub order_id: Option<i64>,
    pub process_name: Option<String>,
    pub warning_message: String,
    pub category: WarningCategory,
    pub created_at: NaiveDateTime,
}

/// 新增警告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewScheduleWarning {
    pub order_id: Option<i64>,
    pub process_name: Option<String>,
    pub warning_message: String,
}

impl NewScheduleWarning {
    pub fn new(order_id: Option<i64>, process_name: Option<&str>, message: String) -> Self {
        Self {
            order_id,
            process_name: process_name.map(str::to_string),
            warning_message: message,
        }
    }

    pub fn category(&self) -> WarningCategory {
        WarningCategory::classify(&self.warning_message)
    }
}

// ==========================================
// WarningCategory - 警告分类
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningCategory {
    /// 作业员时间冲突
    OperatorTime,
    Equipment,
    MissingRoute,
    Late,
    Other,
}

const CLASSIFIER_RULES: &[(&[&str], WarningCategory)] = &[
    (&["時間衝突", "Time conflict"], WarningCategory::OperatorTime),
    (&["設備衝突", "Equipment conflict"], WarningCategory::Equipment),
    (
        &["工序未設定", "Route not defined"],
        WarningCategory::MissingRoute,
    ),
    (&["超過交期", "Past delivery"], WarningCategory::Late),
];

impl WarningCategory {
    /// 按关键字归类（首个命中规则为准）
    pub fn classify(message: &str) -> Self {
        CLASSIFIER_RULES
            .iter()
            .find(|(keywords, _)| keywords.iter().any(|k| message.contains(k)))
            .map(|(_, category)| *category)
            .unwrap_or(WarningCategory::Other)
    }

    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "operator_time" => WarningCategory::OperatorTime,
            "equipment" => WarningCategory::Equipment,
            "missing_route" => WarningCategory::MissingRoute,
            "late" => WarningCategory::Late,
            _ => WarningCategory::Other,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            WarningCategory::OperatorTime => "operator_time",
            WarningCategory::Equipment => "equipment",
            WarningCategory::MissingRoute => "missing_route",
            WarningCategory::Late => "late",
            WarningCategory::Other => "other",
        }
    }
}

impl fmt::Display for WarningCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

/// 看板分类统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WarningSummary {
    pub operator_time: i64,
    pub equipment: i64,
    pub missing_route: i64,
    pub late: i64,
    pub other: i64,
}

impl WarningSummary {
    pub fn add(&mut self, category: WarningCategory, count: i64) {
        match category {
            WarningCategory::OperatorTime => self.operator_time += count,
            WarningCategory::Equipment => self.equipment += count,
            WarningCategory::MissingRoute => self.missing_route += count,
            WarningCategory::Late => self.late += count,
            WarningCategory::Other => self.other += count,
        }
    }

    pub fn total(&self) -> i64 {
        self.operator_time + self.equipment + self.missing_route + self.late + self.other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_keywords() {
        assert_eq!(
            WarningCategory::classify("時間衝突: 作業員 王小明 於 09:00~10:00 已被佔用"),
            WarningCategory::OperatorTime
        );
        assert_eq!(
            WarningCategory::classify("設備衝突: SMT 設備 SMT-1"),
            WarningCategory::Equipment
        );
        assert_eq!(
            WarningCategory::classify("工序未設定: 產品 PFP-X"),
            WarningCategory::MissingRoute
        );
        assert_eq!(
            WarningCategory::classify("超過交期: 預計完成 2025-03-10"),
            WarningCategory::Late
        );
        assert_eq!(
            WarningCategory::classify("Past delivery: expected finish"),
            WarningCategory::Late
        );
        assert_eq!(WarningCategory::classify("無可用資源"), WarningCategory::Other);
    }

    #[test]
    fn test_summary() {
        let mut s = WarningSummary::default();
        s.add(WarningCategory::Late, 2);
        s.add(WarningCategory::Other, 1);
        assert_eq!(s.total(), 3);
        assert_eq!(s.late, 2);
    }
}
