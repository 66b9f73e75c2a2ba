// ==========================================
// 制造执行系统 (MES) - 完工快照领域模型
// ==========================================
// 完工表只由完工引擎写入，写入后视为不可变快照
// original_workorder_id 为历史指针（非外键）
// ==========================================

use crate::domain::types::{
    ApprovalStatus, ProcessStatus, QuantitySource, ReportKind, ReportSource,
};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, Utc};
use serde::{Deserialize, Serialize};

/// 完工报工自动分配的方法标识
pub const ALLOCATION_METHOD_PROPORTIONAL_HOURS: &str = "proportional_hours";

// ==========================================
// CompletedWorkOrder - 完工工单
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedWorkOrder {
    pub id: i64,
    pub original_workorder_id: i64,
    pub company_code: String,
    pub order_number: String,
    pub product_code: String,
    pub quantity: i64,
    /// 包装累计数量（非计划数量）
    pub completed_quantity: i64,
    pub totals: CompletionTotals,
    pub forced: bool,
    pub force_reason: Option<String>,
    pub order_created_at: NaiveDateTime,
    pub completed_at: NaiveDateTime,
    pub transferred_at: NaiveDateTime,
}

// ==========================================
// CompletionTotals - 完工汇总
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionTotals {
    pub total_good_quantity: i64,
    pub total_defect_quantity: i64,
    pub total_work_hours: f64,
    pub total_overtime_hours: f64,
    pub total_all_hours: f64,
    pub total_report_count: i64,
    pub unique_operators: Vec<String>,
    pub unique_equipment: Vec<String>,
}

impl CompletionTotals {
    /// 累加一行报工（人员/设备去重并保持首次出现顺序）
    pub fn add_line(
        &mut self,
        work_quantity: i64,
        defect_quantity: i64,
        work_hours: f64,
        overtime_hours: f64,
        operator: Option<&str>,
        equipment: Option<&str>,
    ) {
        self.total_good_quantity += work_quantity;
        self.total_defect_quantity += defect_quantity;
        self.total_work_hours += work_hours;
        self.total_overtime_hours += overtime_hours;
        self.total_all_hours += work_hours + overtime_hours;
        self.total_report_count += 1;
        push_unique(&mut self.unique_operators, operator);
        push_unique(&mut self.unique_equipment, equipment);
    }

    /// 工时统一四舍五入到两位小数
    pub fn rounded(mut self) -> Self {
        self.total_work_hours = round2(self.total_work_hours);
        self.total_overtime_hours = round2(self.total_overtime_hours);
        self.total_all_hours = round2(self.total_all_hours);
        self
    }
}

fn push_unique(list: &mut Vec<String>, value: Option<&str>) {
    if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
        if !list.iter().any(|x| x == v) {
            list.push(v.to_string());
        }
    }
}

pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

// ==========================================
// CompletedWorkOrderProcess - 完工工序快照
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedWorkOrderProcess {
    pub id: i64,
    pub completed_work_order_id: i64,
    pub process_name: String,
    pub process_order: i32,
    pub planned_quantity: i64,
    pub completed_quantity: i64,
    pub status: ProcessStatus,
    pub assigned_operator: Option<String>,
    pub assigned_equipment: Option<String>,
    pub actual_start_time: Option<NaiveDateTime>,
    pub actual_end_time: Option<NaiveDateTime>,
    /// 实际参与的作业员（来自报工）
    pub operators: Vec<String>,
    pub equipment: Vec<String>,
}

// ==========================================
// CompletedProductionReport - 完工报工快照
// ==========================================
// start_at / end_at 为带时区偏移的时间戳
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedProductionReport {
    pub id: i64,
    pub completed_work_order_id: i64,
    pub process_name: String,
    pub report_date: NaiveDate,
    pub report_time: NaiveTime,
    pub start_at: Option<DateTime<FixedOffset>>,
    pub end_at: Option<DateTime<FixedOffset>>,
    pub work_quantity: i64,
    pub defect_quantity: i64,
    pub operator: Option<String>,
    pub equipment: Option<String>,
    pub report_source: ReportSource,
    pub work_hours: f64,
    pub overtime_hours: f64,
    pub break_hours: f64,
    pub approval_status: ApprovalStatus,
    pub approved_by: Option<String>,
    pub approved_at: Option<NaiveDateTime>,
    pub allocated_quantity: i64,
    pub quantity_source: QuantitySource,
    pub allocation_method: Option<String>,
    pub is_completed: bool,
    pub remarks: Option<String>,
    pub abnormal_notes: Option<String>,
    pub original_report_id: Option<i64>,
    pub original_report_type: Option<ReportKind>,
}

/// 将 (日期, 时间) 转为带偏移的时间戳
pub fn to_offset_datetime(
    date: NaiveDate,
    time: Option<NaiveTime>,
    offset: FixedOffset,
) -> Option<DateTime<FixedOffset>> {
    let time = time?;
    date.and_time(time).and_local_timezone(offset).single()
}

/// 工厂时区偏移（小时）→ FixedOffset；越界时退回 UTC
pub fn factory_offset(hours: i32) -> FixedOffset {
    FixedOffset::east_opt(hours * 3600).unwrap_or_else(|| Utc.fix())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_totals_dedup_and_round() {
        let mut totals = CompletionTotals::default();
        totals.add_line(40, 0, 1.333, 0.0, Some("OP1"), Some("EQ1"));
        totals.add_line(40, 5, 1.333, 0.5, Some("OP2"), Some("EQ1"));
        totals.add_line(20, 0, 1.0, 0.0, Some("OP1"), None);
        let totals = totals.rounded();

        assert_eq!(totals.total_good_quantity, 100);
        assert_eq!(totals.total_defect_quantity, 5);
        assert_eq!(totals.total_report_count, 3);
        assert_eq!(totals.total_work_hours, 3.67);
        assert_eq!(totals.total_all_hours, 4.17);
        assert_eq!(totals.unique_operators, vec!["OP1", "OP2"]);
        assert_eq!(totals.unique_equipment, vec!["EQ1"]);
    }

    #[test]
    fn test_offset_datetime() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        let ts = to_offset_datetime(date, NaiveTime::from_hms_opt(8, 30, 0), factory_offset(8)).unwrap();
        assert_eq!(ts.to_rfc3339(), "2025-03-03T08:30:00+08:00");
        assert!(to_offset_datetime(date, None, factory_offset(8)).is_none());
    }
}
