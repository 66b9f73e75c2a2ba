// ==========================================
// 制造执行系统 (MES) - 领域类型定义
// ==========================================
// 序列化格式: snake_case（与数据库一致）
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 工单状态 (Work Order Status)
// ==========================================
// 状态机: pending → in_progress ⇄ paused → completed
// completed 只能由完工引擎写入
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkOrderStatus {
    Pending,
    InProgress,
    Paused,
    Completed,
}

impl WorkOrderStatus {
    /// 从字符串解析状态（未知值视为 pending）
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "in_progress" => WorkOrderStatus::InProgress,
            "paused" => WorkOrderStatus::Paused,
            "completed" => WorkOrderStatus::Completed,
            _ => WorkOrderStatus::Pending,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            WorkOrderStatus::Pending => "pending",
            WorkOrderStatus::InProgress => "in_progress",
            WorkOrderStatus::Paused => "paused",
            WorkOrderStatus::Completed => "completed",
        }
    }

    /// 人工操作（开工/暂停/恢复）允许的状态转换
    ///
    /// 转为 completed 不在此表内：只允许完工引擎写入
    pub fn can_transition_to(&self, next: WorkOrderStatus) -> bool {
        matches!(
            (self, next),
            (WorkOrderStatus::Pending, WorkOrderStatus::InProgress)
                | (WorkOrderStatus::InProgress, WorkOrderStatus::Paused)
                | (WorkOrderStatus::Paused, WorkOrderStatus::InProgress)
        )
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, WorkOrderStatus::Completed)
    }
}

impl fmt::Display for WorkOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 工序状态 (Process Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Pending,
    InProgress,
    Completed,
    Paused,
    Cancelled,
}

impl ProcessStatus {
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "in_progress" => ProcessStatus::InProgress,
            "completed" => ProcessStatus::Completed,
            "paused" => ProcessStatus::Paused,
            "cancelled" => ProcessStatus::Cancelled,
            _ => ProcessStatus::Pending,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            ProcessStatus::Pending => "pending",
            ProcessStatus::InProgress => "in_progress",
            ProcessStatus::Completed => "completed",
            ProcessStatus::Paused => "paused",
            ProcessStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 工单优先级 (Order Priority)
// ==========================================
// 混合排程模式按此分桶: urgent → normal → flexible
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderPriority {
    Urgent,
    Normal,
    Flexible,
}

impl OrderPriority {
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "urgent" => OrderPriority::Urgent,
            "flexible" => OrderPriority::Flexible,
            _ => OrderPriority::Normal,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            OrderPriority::Urgent => "urgent",
            OrderPriority::Normal => "normal",
            OrderPriority::Flexible => "flexible",
        }
    }

    /// 混合模式下的资源重试次数（紧急单更严格）
    pub fn retry_budget(&self) -> u32 {
        match self {
            OrderPriority::Urgent => 3,
            OrderPriority::Normal => 5,
            OrderPriority::Flexible => 5,
        }
    }
}

impl fmt::Display for OrderPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 报工来源 (Report Source)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportSource {
    /// 作业员补登
    OperatorSupplement,
    /// SMT 补登
    Smt,
    /// 现场报工
    Onsite,
}

impl ReportSource {
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "smt" | "smt_supplement" => ReportSource::Smt,
            "onsite" => ReportSource::Onsite,
            _ => ReportSource::OperatorSupplement,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            ReportSource::OperatorSupplement => "operator_supplement",
            ReportSource::Smt => "smt",
            ReportSource::Onsite => "onsite",
        }
    }
}

impl fmt::Display for ReportSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 报工种类 (Report Kind)
// ==========================================
// 对应 production_detail.original_report_type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    OperatorSupplement,
    SmtSupplement,
    Onsite,
}

impl ReportKind {
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "smt_supplement" | "smt" => ReportKind::SmtSupplement,
            "onsite" => ReportKind::Onsite,
            _ => ReportKind::OperatorSupplement,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            ReportKind::OperatorSupplement => "operator_supplement",
            ReportKind::SmtSupplement => "smt_supplement",
            ReportKind::Onsite => "onsite",
        }
    }

    /// 补登类报工需要审核，现场报工本身即为权威数据
    pub fn requires_approval(&self) -> bool {
        !matches!(self, ReportKind::Onsite)
    }

    pub fn report_source(&self) -> ReportSource {
        match self {
            ReportKind::OperatorSupplement => ReportSource::OperatorSupplement,
            ReportKind::SmtSupplement => ReportSource::Smt,
            ReportKind::Onsite => ReportSource::Onsite,
        }
    }

    pub fn is_smt(&self) -> bool {
        matches!(self, ReportKind::SmtSupplement)
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 审核状态 (Approval Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "approved" => ApprovalStatus::Approved,
            "rejected" => ApprovalStatus::Rejected,
            _ => ApprovalStatus::Pending,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ApprovalStatus::Pending)
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, ApprovalStatus::Approved)
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 数量来源 (Quantity Source)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantitySource {
    Original,
    Allocated,
}

impl QuantitySource {
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "allocated" => QuantitySource::Allocated,
            _ => QuantitySource::Original,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            QuantitySource::Original => "original",
            QuantitySource::Allocated => "allocated",
        }
    }
}

// ==========================================
// 报工关联状态 (Link Status)
// ==========================================
// pending_link: 报工时找不到对应工单，保留待后续关联
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Unlinked,
    Linked,
    PendingLink,
    LinkedCompleted,
}

impl LinkStatus {
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "linked" => LinkStatus::Linked,
            "pending_link" => LinkStatus::PendingLink,
            "linked_completed" => LinkStatus::LinkedCompleted,
            _ => LinkStatus::Unlinked,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            LinkStatus::Unlinked => "unlinked",
            LinkStatus::Linked => "linked",
            LinkStatus::PendingLink => "pending_link",
            LinkStatus::LinkedCompleted => "linked_completed",
        }
    }
}

// ==========================================
// 行事历事件类型 (Calendar Event Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarEventType {
    /// 假日
    Holiday,
    /// 补班日（覆盖默认周历）
    Workday,
    /// 生产排程
    Production,
    Meeting,
    Maintenance,
    Overtime,
}

impl CalendarEventType {
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "holiday" => CalendarEventType::Holiday,
            "workday" => CalendarEventType::Workday,
            "meeting" => CalendarEventType::Meeting,
            "maintenance" => CalendarEventType::Maintenance,
            "overtime" => CalendarEventType::Overtime,
            _ => CalendarEventType::Production,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            CalendarEventType::Holiday => "holiday",
            CalendarEventType::Workday => "workday",
            CalendarEventType::Production => "production",
            CalendarEventType::Meeting => "meeting",
            CalendarEventType::Maintenance => "maintenance",
            CalendarEventType::Overtime => "overtime",
        }
    }

    /// 是否为覆盖默认周历的日类型事件
    pub fn is_day_override(&self) -> bool {
        matches!(self, CalendarEventType::Holiday | CalendarEventType::Workday)
    }
}

impl fmt::Display for CalendarEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 排程模式 (Schedule Mode)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleMode {
    Auto,
    SemiAuto,
    Hybrid,
    Manual,
}

impl ScheduleMode {
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "semi_auto" | "semi" => ScheduleMode::SemiAuto,
            "hybrid" => ScheduleMode::Hybrid,
            "manual" => ScheduleMode::Manual,
            _ => ScheduleMode::Auto,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            ScheduleMode::Auto => "auto",
            ScheduleMode::SemiAuto => "semi_auto",
            ScheduleMode::Hybrid => "hybrid",
            ScheduleMode::Manual => "manual",
        }
    }
}

impl fmt::Display for ScheduleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 后台作业执行结果 (Job Run Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobRunStatus {
    Success,
    PartialSuccess,
    Failed,
    Skipped,
}

impl JobRunStatus {
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "success" => JobRunStatus::Success,
            "partial_success" => JobRunStatus::PartialSuccess,
            "skipped" => JobRunStatus::Skipped,
            _ => JobRunStatus::Failed,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            JobRunStatus::Success => "success",
            JobRunStatus::PartialSuccess => "partial_success",
            JobRunStatus::Failed => "failed",
            JobRunStatus::Skipped => "skipped",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_order_transitions() {
        use WorkOrderStatus::*;
        assert!(Pending.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Paused));
        assert!(Paused.can_transition_to(InProgress));
        assert!(!Pending.can_transition_to(Paused));
        assert!(!InProgress.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(InProgress));
    }

    #[test]
    fn test_db_string_roundtrip_defaults() {
        assert_eq!(WorkOrderStatus::from_str("IN_PROGRESS"), WorkOrderStatus::InProgress);
        assert_eq!(WorkOrderStatus::from_str("garbage"), WorkOrderStatus::Pending);
        assert_eq!(ReportKind::from_str("smt"), ReportKind::SmtSupplement);
        assert_eq!(OrderPriority::from_str(""), OrderPriority::Normal);
        assert_eq!(CalendarEventType::Workday.to_db_str(), "workday");
    }

    #[test]
    fn test_report_kind_rules() {
        assert!(ReportKind::OperatorSupplement.requires_approval());
        assert!(ReportKind::SmtSupplement.requires_approval());
        assert!(!ReportKind::Onsite.requires_approval());
        assert_eq!(ReportKind::SmtSupplement.report_source(), ReportSource::Smt);
    }

    #[test]
    fn test_priority_ordering_and_budget() {
        let mut v = vec![OrderPriority::Flexible, OrderPriority::Urgent, OrderPriority::Normal];
        v.sort();
        assert_eq!(v, vec![OrderPriority::Urgent, OrderPriority::Normal, OrderPriority::Flexible]);
        assert!(OrderPriority::Urgent.retry_budget() < OrderPriority::Normal.retry_budget());
    }
}
