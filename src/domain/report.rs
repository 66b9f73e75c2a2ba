// ==========================================
// 制造执行系统 (MES) - 报工领域模型
// ==========================================
// 三种报工共用同一形状，通过 Report 标签枚举区分:
// - OperatorSupplement: 作业员补登（需审核）
// - SmtSupplement: SMT 补登（需审核）
// - OnSite: 现场即时报工（权威数据，免审核）
// ==========================================

use crate::domain::types::{ApprovalStatus, LinkStatus, ReportKind};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

// ==========================================
// ReportView - 报工通用视图
// ==========================================
// 工时计算器 / 报工入账只依赖该视图
pub trait ReportView {
    fn report_id(&self) -> i64;
    fn kind(&self) -> ReportKind;
    fn company_code(&self) -> &str;
    fn order_number(&self) -> &str;
    fn product_code(&self) -> &str;
    fn process_name(&self) -> &str;
    fn report_date(&self) -> NaiveDate;
    fn start_time(&self) -> Option<NaiveTime>;
    fn end_time(&self) -> Option<NaiveTime>;
    fn work_quantity(&self) -> i64;
    fn defect_quantity(&self) -> i64;
    fn operator(&self) -> Option<&str>;
    fn equipment(&self) -> Option<&str>;
    fn production_line(&self) -> Option<&str>;

    fn is_smt(&self) -> bool {
        self.kind().is_smt()
    }
}

// ==========================================
// FillWorkReport - 补登报工（作业员 / SMT）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillWorkReport {
    pub id: i64,
    pub kind: ReportKind,
    pub company_code: String,
    pub order_number: String,
    pub product_code: String,
    pub process_name: String,
    pub report_date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub operator: Option<String>,
    pub equipment: Option<String>,
    pub production_line: Option<String>,
    pub work_quantity: i64,
    pub defect_quantity: i64,
    pub remarks: Option<String>,
    pub abnormal_notes: Option<String>,
    pub approval_status: ApprovalStatus,
    pub approved_by: Option<String>,
    pub approved_at: Option<NaiveDateTime>,
    pub work_hours: f64,
    pub overtime_hours: f64,
    pub break_hours: f64,
    pub link_status: LinkStatus,
    pub created_by: Option<String>,
    pub created_at: NaiveDateTime,
}

// ==========================================
// OnsiteReport - 现场报工
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnsiteReport {
    pub id: i64,
    pub company_code: String,
    pub order_number: String,
    pub product_code: String,
    pub process_name: String,
    pub report_date: NaiveDate,
    pub report_time: NaiveTime,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub operator: Option<String>,
    pub equipment: Option<String>,
    pub production_line: Option<String>,
    pub work_quantity: i64,
    pub defect_quantity: i64,
    pub remarks: Option<String>,
    pub abnormal_notes: Option<String>,
    pub work_hours: f64,
    pub overtime_hours: f64,
    pub break_hours: f64,
    pub link_status: LinkStatus,
    pub created_at: NaiveDateTime,
}

// ==========================================
// Report - 标签枚举
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Report {
    OperatorSupplement(FillWorkReport),
    SmtSupplement(FillWorkReport),
    OnSite(OnsiteReport),
}

impl Report {
    /// 由补登报工构造（按其 kind 选择变体）
    pub fn from_fill_work(report: FillWorkReport) -> Self {
        match report.kind {
            ReportKind::SmtSupplement => Report::SmtSupplement(report),
            _ => Report::OperatorSupplement(report),
        }
    }

    fn view(&self) -> &dyn ReportView {
        match self {
            Report::OperatorSupplement(r) | Report::SmtSupplement(r) => r,
            Report::OnSite(r) => r,
        }
    }

    /// 审核信息（现场报工视为已审核、无审核人）
    pub fn approval(&self) -> (ApprovalStatus, Option<&str>, Option<NaiveDateTime>) {
        match self {
            Report::OperatorSupplement(r) | Report::SmtSupplement(r) => {
                (r.approval_status, r.approved_by.as_deref(), r.approved_at)
            }
            Report::OnSite(_) => (ApprovalStatus::Approved, None, None),
        }
    }

    /// 报工时刻（补登以创建时间为准）
    pub fn report_time(&self) -> NaiveTime {
        match self {
            Report::OperatorSupplement(r) | Report::SmtSupplement(r) => r.created_at.time(),
            Report::OnSite(r) => r.report_time,
        }
    }

    /// 入账时写回的工时 (work_hours, overtime_hours, break_hours)
    pub fn work_time(&self) -> (f64, f64, f64) {
        match self {
            Report::OperatorSupplement(r) | Report::SmtSupplement(r) => {
                (r.work_hours, r.overtime_hours, r.break_hours)
            }
            Report::OnSite(r) => (r.work_hours, r.overtime_hours, r.break_hours),
        }
    }

    pub fn remarks(&self) -> Option<&str> {
        match self {
            Report::OperatorSupplement(r) | Report::SmtSupplement(r) => r.remarks.as_deref(),
            Report::OnSite(r) => r.remarks.as_deref(),
        }
    }

    pub fn abnormal_notes(&self) -> Option<&str> {
        match self {
            Report::OperatorSupplement(r) | Report::SmtSupplement(r) => {
                r.abnormal_notes.as_deref()
            }
            Report::OnSite(r) => r.abnormal_notes.as_deref(),
        }
    }
}

macro_rules! impl_report_view {
    ($ty:ty, $kind:expr) => {
        impl ReportView for $ty {
            fn report_id(&self) -> i64 {
                self.id
            }
            fn kind(&self) -> ReportKind {
                $kind(self)
            }
            fn company_code(&self) -> &str {
                &self.company_code
            }
            fn order_number(&self) -> &str {
                &self.order_number
            }
            fn product_code(&self) -> &str {
                &self.product_code
            }
            fn process_name(&self) -> &str {
                &self.process_name
            }
            fn report_date(&self) -> NaiveDate {
                self.report_date
            }
            fn start_time(&self) -> Option<NaiveTime> {
                self.start_time
            }
            fn end_time(&self) -> Option<NaiveTime> {
                self.end_time
            }
            fn work_quantity(&self) -> i64 {
                self.work_quantity
            }
            fn defect_quantity(&self) -> i64 {
                self.defect_quantity
            }
            fn operator(&self) -> Option<&str> {
                self.operator.as_deref()
            }
            fn equipment(&self) -> Option<&str> {
                self.equipment.as_deref()
            }
            fn production_line(&self) -> Option<&str> {
                self.production_line.as_deref()
            }
        }
    };
}

impl_report_view!(FillWorkReport, |r: &FillWorkReport| r.kind);
impl_report_view!(OnsiteReport, |_r: &OnsiteReport| ReportKind::Onsite);

impl ReportView for Report {
    fn report_id(&self) -> i64 {
        self.view().report_id()
    }
    fn kind(&self) -> ReportKind {
        self.view().kind()
    }
    fn company_code(&self) -> &str {
        self.view().company_code()
    }
    fn order_number(&self) -> &str {
        self.view().order_number()
    }
    fn product_code(&self) -> &str {
        self.view().product_code()
    }
    fn process_name(&self) -> &str {
        self.view().process_name()
    }
    fn report_date(&self) -> NaiveDate {
        self.view().report_date()
    }
    fn start_time(&self) -> Option<NaiveTime> {
        self.view().start_time()
    }
    fn end_time(&self) -> Option<NaiveTime> {
        self.view().end_time()
    }
    fn work_quantity(&self) -> i64 {
        self.view().work_quantity()
    }
    fn defect_quantity(&self) -> i64 {
        self.view().defect_quantity()
    }
    fn operator(&self) -> Option<&str> {
        self.view().operator()
    }
    fn equipment(&self) -> Option<&str> {
        self.view().equipment()
    }
    fn production_line(&self) -> Option<&str> {
        self.view().production_line()
    }
}

// ==========================================
// NewReport - 报工提交（三种报工共用）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReport {
    pub company_code: String,
    pub order_number: String,
    pub product_code: String,
    pub process_name: String,
    pub report_date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub operator: Option<String>,
    pub equipment: Option<String>,
    pub production_line: Option<String>,
    pub work_quantity: i64,
    pub defect_quantity: i64,
    pub remarks: Option<String>,
    pub abnormal_notes: Option<String>,
    pub created_by: Option<String>,
}

impl NewReport {
    /// 基本校验，返回第一条违规原因
    pub fn validate(&self) -> Result<(), String> {
        if self.company_code.trim().is_empty() {
            return Err("company_code 不能为空".to_string());
        }
        if self.order_number.trim().is_empty() {
            return Err("order_number 不能为空".to_string());
        }
        if self.product_code.trim().is_empty() {
            return Err("product_code 不能为空".to_string());
        }
        if self.process_name.trim().is_empty() {
            return Err("process_name 不能为空".to_string());
        }
        if self.work_quantity < 0 || self.defect_quantity < 0 {
            return Err(format!(
                "数量不可为负: work_quantity={}, defect_quantity={}",
                self.work_quantity, self.defect_quantity
            ));
        }
        if let (Some(s), Some(e)) = (self.start_time, self.end_time) {
            if s == e {
                return Err(format!("起讫时间相同: {}", s.format("%H:%M")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_report() -> NewReport {
        NewReport {
            company_code: "01".to_string(),
            order_number: "WO-01-202503001".to_string(),
            product_code: "PFP-X".to_string(),
            process_name: "DIP".to_string(),
            report_date: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            start_time: NaiveTime::from_hms_opt(8, 30, 0),
            end_time: NaiveTime::from_hms_opt(17, 30, 0),
            operator: Some("OP1".to_string()),
            equipment: None,
            production_line: None,
            work_quantity: 10,
            defect_quantity: 0,
            remarks: None,
            abnormal_notes: None,
            created_by: None,
        }
    }

    #[test]
    fn test_validate() {
        assert!(new_report().validate().is_ok());

        let mut r = new_report();
        r.work_quantity = -1;
        assert!(r.validate().is_err());

        let mut r = new_report();
        r.end_time = r.start_time;
        assert!(r.validate().is_err());

        let mut r = new_report();
        r.start_time = None;
        assert!(r.validate().is_ok());
    }

    #[test]
    fn test_report_enum_view() {
        let onsite = OnsiteReport {
            id: 7,
            company_code: "01".to_string(),
            order_number: "WO".to_string(),
            product_code: "PFP-X".to_string(),
            process_name: "SMT".to_string(),
            report_date: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            report_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            start_time: None,
            end_time: None,
            operator: None,
            equipment: Some("SMT-1".to_string()),
            production_line: None,
            work_quantity: 5,
            defect_quantity: 1,
            remarks: None,
            abnormal_notes: None,
            work_hours: 0.0,
            overtime_hours: 0.0,
            break_hours: 0.0,
            link_status: LinkStatus::Unlinked,
            created_at: NaiveDate::from_ymd_opt(2025, 3, 3)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
        };
        let report = Report::OnSite(onsite);
        assert_eq!(report.kind(), ReportKind::Onsite);
        assert_eq!(report.report_id(), 7);
        assert_eq!(report.equipment(), Some("SMT-1"));
        assert_eq!(report.approval().0, ApprovalStatus::Approved);
        assert!(!report.is_smt());
    }
}
