// ==========================================
// 制造执行系统 (MES) - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化
// 约定: `*_tx` 关联函数在调用方持有的事务内执行,不再加锁
// ==========================================

pub mod allocation_repo;
pub mod calendar_repo;
pub mod codec;
pub mod company_order_repo;
pub mod completed_repo;
pub mod error;
pub mod job_run_repo;
pub mod production_repo;
pub mod report_repo;
pub mod resource_repo;
pub mod route_repo;
pub mod warning_repo;
pub mod work_order_repo;

// 重导出核心仓储
pub use allocation_repo::AllocationRepository;
pub use calendar_repo::CalendarEventRepository;
pub use company_order_repo::{CompanyOrderRepository, CompanyOrderUpsert};
pub use completed_repo::{CompletedReportWithOrder, CompletedRepository};
pub use error::{RepositoryError, RepositoryResult};
pub use job_run_repo::JobRunRepository;
pub use production_repo::{DetailWithOrder, ProductionRepository};
pub use report_repo::{OverlappingReport, ReportRepository};
pub use resource_repo::ResourceRepository;
pub use route_repo::RouteRepository;
pub use warning_repo::WarningRepository;
pub use work_order_repo::{WorkOrderInsert, WorkOrderRepository};
