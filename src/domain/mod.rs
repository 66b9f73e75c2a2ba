// ==========================================
// 制造执行系统 (MES) - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、纯业务规则
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod allocation;
pub mod calendar;
pub mod completed;
pub mod erp;
pub mod job;
pub mod report;
pub mod resource;
pub mod route;
pub mod types;
pub mod warning;
pub mod work_order;

// 重导出核心类型
pub use allocation::{AllocationLog, AllocationRunSummary, AllocationTarget, AutoAllocationSettings};
pub use calendar::{CalendarEvent, CalendarEventFilter, DayOverride, EventConflict, NewCalendarEvent};
pub use completed::{
    CompletedProductionReport, CompletedWorkOrder, CompletedWorkOrderProcess, CompletionTotals,
};
pub use erp::{CompanyOrder, ConvertSummary, ErpOrderRow, ErpOrigin, ErpSyncSummary};
pub use job::{JobOutcome, JobRun};
pub use report::{FillWorkReport, NewReport, OnsiteReport, Report, ReportView};
pub use resource::{Equipment, Operator, ProductionLine, ResourceRef, SmtEquipment};
pub use route::{ProductProcessStandardCapacity, ProductRoute, DEFAULT_CAPACITY_PER_HOUR};
pub use types::{
    ApprovalStatus, CalendarEventType, JobRunStatus, LinkStatus, OrderPriority, ProcessStatus,
    QuantitySource, ReportKind, ReportSource, ScheduleMode, WorkOrderStatus,
};
pub use warning::{NewScheduleWarning, ScheduleWarning, WarningCategory, WarningSummary};
pub use work_order::{
    DetailUpsert, DispatchRecord, NewProductionDetail, NewWorkOrder, Page, ProductionCounters,
    ProductionDetail, ProductionRecord, WorkOrder, WorkOrderFilter, WorkOrderProcess,
};
