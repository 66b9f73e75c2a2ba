// ==========================================
// 制造执行系统 (MES) - 引擎层
// ==========================================
// 职责: 排程、工时、报工入账、完工转移、自动分配、ERP 同步
// 依赖: 排程 → 资源 + 行事历 + 工单存储；报工 → 工单存储；完工 → 工单存储 + 事件
// 红线: 只读路径经 ports 接口；多表写入走 *_tx 事务函数
// ==========================================

pub mod allocation;
pub mod calendar;
pub mod catalog;
pub mod completion;
pub mod conflict;
pub mod erp_sync;
pub mod error;
pub mod events;
pub mod ingestion;
pub mod ports;
pub mod progress;
pub mod resource_selector;
pub mod scheduler;
pub mod time_window;
pub mod work_orders;
pub mod work_time;

// 重导出核心引擎
pub use allocation::AllocationEngine;
pub use calendar::CalendarService;
pub use catalog::CatalogService;
pub use completion::{CompletionCheck, CompletionEngine, RetransferSummary, SweepSummary};
pub use conflict::{ConflictChecker, TentativeBooking};
pub use erp_sync::{ErpOrderSource, ErpSyncService};
pub use error::{
    CompletionError, CompletionResult, IngestionError, IngestionResult, JobError, JobResult,
    ScheduleError, ScheduleResult,
};
pub use events::{
    MesEvent, MesEventPublisher, MesEventType, NoOpEventPublisher, OptionalEventPublisher,
};
pub use ingestion::{IngestionOutcome, RelinkSummary, ReportIngestion, SubmittedReport};
pub use ports::{CalendarQuery, ResourceQuery, WorkOrderStore};
pub use progress::{ProgressRegistry, ProgressSnapshot, ProgressStatus};
pub use resource_selector::{ResourceChoice, ResourcePool};
pub use scheduler::{
    ScheduleOptions, ScheduleOutcome, Scheduler, SchedulerSession, TaskAssignment,
};
pub use time_window::{calculate_task_duration, TimeWindowFitter};
pub use work_orders::{WorkOrderDetail, WorkOrderService};
pub use work_time::{WorkTimeBreakdown, WorkTimeCalculator};
