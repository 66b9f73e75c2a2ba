// ==========================================
// 制造执行系统 (MES) - 自动分配设置与日志
// ==========================================

use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

// ==========================================
// AutoAllocationSettings - 自动分配设置（单行）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoAllocationSettings {
    /// 后台作业总开关
    pub enabled: bool,
    pub interval_minutes: u32,
    /// 每日执行窗口
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub max_execution_minutes: u32,
    /// 在制报工分配开关
    pub auto_allocation_enabled: bool,
    /// 完工报工分配开关
    pub completed_allocation_enabled: bool,
}

impl Default for AutoAllocationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: 30,
            start_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN),
            end_time: NaiveTime::from_hms_opt(18, 0, 0).unwrap_or(NaiveTime::MIN),
            max_execution_minutes: 30,
            auto_allocation_enabled: true,
            completed_allocation_enabled: false,
        }
    }
}

impl AutoAllocationSettings {
    /// 当前时刻是否落在执行窗口内（含端点）
    pub fn in_window(&self, now: NaiveTime) -> bool {
        if self.start_time <= self.end_time {
            now >= self.start_time && now <= self.end_time
        } else {
            // 跨午夜窗口
            now >= self.start_time || now <= self.end_time
        }
    }
}

// ==========================================
// AllocationTarget - 分配对象
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationTarget {
    /// 在制报工明细
    ProductionDetail,
    /// 完工报工快照
    CompletedReport,
}

impl AllocationTarget {
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "completed_report" => AllocationTarget::CompletedReport,
            _ => AllocationTarget::ProductionDetail,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            AllocationTarget::ProductionDetail => "production_detail",
            AllocationTarget::CompletedReport => "completed_report",
        }
    }
}

// ==========================================
// AllocationLog - 分配日志
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationLog {
    pub id: i64,
    /// 携带汇总数量的来源明细
    pub source_detail_id: i64,
    pub target: AllocationTarget,
    pub method: String,
    /// 每日分配数量（与 target_detail_ids 一一对应）
    pub allocated_quantities: Vec<i64>,
    pub target_detail_ids: Vec<i64>,
    pub created_at: NaiveDateTime,
}

/// 一次分配运行的结果统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationRunSummary {
    pub groups_examined: usize,
    pub groups_allocated: usize,
    pub rows_updated: usize,
    pub skipped_final_day_only: usize,
    pub timed_out: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window() {
        let settings = AutoAllocationSettings::default();
        assert!(settings.in_window(NaiveTime::from_hms_opt(8, 0, 0).unwrap()));
        assert!(settings.in_window(NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
        assert!(!settings.in_window(NaiveTime::from_hms_opt(18, 0, 1).unwrap()));

        let night = AutoAllocationSettings {
            start_time: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(2, 0, 0).unwrap(),
            ..AutoAllocationSettings::default()
        };
        assert!(night.in_window(NaiveTime::from_hms_opt(23, 0, 0).unwrap()));
        assert!(!night.in_window(NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
    }
}
