// ==========================================
// 制造执行系统 (MES) - API 层
// ==========================================
// 职责: 前台业务操作，统一返回 ApiResult
// ==========================================

pub mod allocation_api;
pub mod calendar_api;
pub mod completion_api;
pub mod config_api;
pub mod context;
pub mod erp_api;
pub mod error;
pub mod report_api;
pub mod schedule_api;
pub mod work_order_api;

// 重导出核心类型
pub use allocation_api::AllocationApi;
pub use calendar_api::CalendarApi;
pub use completion_api::{CompletedOrderDetail, CompletionApi};
pub use config_api::ConfigApi;
pub use context::{Clock, FixedClock, MesContext, SystemClock};
pub use erp_api::ErpApi;
pub use error::{ApiError, ApiResult};
pub use report_api::ReportApi;
pub use schedule_api::{ScheduleApi, ScheduleRequest, ScheduleResponse};
pub use work_order_api::WorkOrderApi;
