// ==========================================
// 制造执行系统 (MES) - 工单领域模型
// ==========================================
// 工单独占: 工序 / 派工记录 / 生产记录（删除工单时级联删除）
// 生产记录独占: 报工明细
// ==========================================

use crate::domain::types::{
    ApprovalStatus, OrderPriority, ProcessStatus, QuantitySource, ReportKind, ReportSource,
    WorkOrderStatus,
};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

// ==========================================
// WorkOrder - 工单
// ==========================================
// 唯一键: (company_code, order_number)
// 不变量: status = completed ⇒ completed_at 非空；quantity 创建后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkOrder {
    pub id: i64,
    pub company_code: String,
    pub order_number: String,
    pub product_code: String,
    pub quantity: i64,
    pub status: WorkOrderStatus,
    pub priority: OrderPriority,
    /// 预计入库日（交期）
    pub pre_in_date: Option<NaiveDate>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
}

/// 新建工单请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWorkOrder {
    pub company_code: String,
    /// 为空时自动生成 `WO-<公司>-<YYYYMM><序号>`
    pub order_number: Option<String>,
    pub product_code: String,
    pub quantity: i64,
    pub priority: OrderPriority,
    pub pre_in_date: Option<NaiveDate>,
}

/// 工单号前缀: `WO-<两位补零公司代码>-<YYYYMM>`
pub fn order_number_prefix(company_code: &str, year: i32, month: u32) -> String {
    format!("WO-{:0>2}-{:04}{:02}", company_code.trim(), year, month)
}

/// 组装工单号: 前缀 + 三位序号
pub fn format_order_number(company_code: &str, year: i32, month: u32, seq: u32) -> String {
    format!("{}{:03}", order_number_prefix(company_code, year, month), seq)
}

/// 从已存在的工单号中解析序号（前缀不符返回 None）
pub fn parse_order_sequence(prefix: &str, order_number: &str) -> Option<u32> {
    order_number
        .strip_prefix(prefix)
        .filter(|rest| rest.len() == 3)
        .and_then(|rest| rest.parse::<u32>().ok())
}

// ==========================================
// WorkOrderProcess - 工单工序
// ==========================================
// 不变量: completed_quantity ≤ planned_quantity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkOrderProcess {
    pub id: i64,
    pub work_order_id: i64,
    pub process_name: String,
    pub step_order: i32,
    pub planned_quantity: i64,
    pub completed_quantity: i64,
    pub status: ProcessStatus,
    pub assigned_operator: Option<String>,
    pub assigned_equipment: Option<String>,
    pub actual_start_time: Option<NaiveDateTime>,
    pub actual_end_time: Option<NaiveDateTime>,
    pub capacity_multiplier: i32,
    /// 并行作业员
    pub additional_operators: Vec<String>,
    /// 并行设备
    pub additional_equipment: Vec<String>,
    pub target_hourly_output: f64,
}

impl WorkOrderProcess {
    /// 剩余数量（不小于 0）
    pub fn remaining_quantity(&self) -> i64 {
        (self.planned_quantity - self.completed_quantity).max(0)
    }
}

// ==========================================
// DispatchRecord - 派工记录（审计用）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub id: i64,
    pub work_order_id: i64,
    pub process_name: String,
    pub operator: Option<String>,
    pub quantity: i64,
    pub created_by: String,
    pub created_at: NaiveDateTime,
}

// ==========================================
// ProductionRecord - 生产记录（与在制工单 1:1）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionRecord {
    pub id: i64,
    pub work_order_id: i64,
    pub current_process: Option<String>,
    pub status: WorkOrderStatus,
    pub total_good_quantity: i64,
    pub total_defect_quantity: i64,
    pub total_work_hours: f64,
    pub report_count: i64,
    pub started_at: Option<NaiveDateTime>,
    pub updated_at: NaiveDateTime,
}

// ==========================================
// ProductionDetail - 报工明细（生产期间累加，完工时迁移）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionDetail {
    pub id: i64,
    pub production_record_id: i64,
    pub process_name: String,
    pub report_date: NaiveDate,
    pub report_time: NaiveTime,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
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
    pub is_completed: bool,
    pub remarks: Option<String>,
    pub abnormal_notes: Option<String>,
    pub original_report_id: Option<i64>,
    pub original_report_type: Option<ReportKind>,
}

impl ProductionDetail {
    /// 良品 + 不良品（包装完工口径）
    pub fn packaged_quantity(&self) -> i64 {
        self.work_quantity + self.defect_quantity
    }
}

/// 报工明细写入内容（入账时由报工映射而来）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProductionDetail {
    pub process_name: String,
    pub report_date: NaiveDate,
    pub report_time: NaiveTime,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
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
    pub remarks: Option<String>,
    pub abnormal_notes: Option<String>,
    pub original_report_id: Option<i64>,
    pub original_report_type: Option<ReportKind>,
}

/// 明细写入结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailUpsert {
    pub detail_id: i64,
    /// true = 新增；false = 更新既有行
    pub inserted: bool,
}

/// 生产记录汇总计数
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductionCounters {
    pub total_good_quantity: i64,
    pub total_defect_quantity: i64,
    pub total_work_hours: f64,
    pub report_count: i64,
    pub current_process: Option<String>,
}

// ==========================================
// 工单查询条件与分页
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkOrderFilter {
    pub status: Option<WorkOrderStatus>,
    pub company_code: Option<String>,
    /// 创建日期下限（含）
    pub created_from: Option<NaiveDate>,
    /// 创建日期上限（含）
    pub created_to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_number_format() {
        assert_eq!(format_order_number("1", 2025, 3, 7), "WO-01-202503007");
        assert_eq!(format_order_number("123", 2025, 12, 42), "WO-123-202512042");
    }

    #[test]
    fn test_parse_order_sequence() {
        let prefix = order_number_prefix("01", 2025, 3);
        assert_eq!(parse_order_sequence(&prefix, "WO-01-202503015"), Some(15));
        assert_eq!(parse_order_sequence(&prefix, "WO-01-2025030150"), None);
        assert_eq!(parse_order_sequence(&prefix, "WO-02-202503015"), None);
    }
}
