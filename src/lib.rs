// ==========================================
// 制造执行系统 (MES) - 核心库
// ==========================================
// 范围: 排程、派工、工时、报工入账、完工转移、自动分配、ERP 同步
// 技术栈: Rust + SQLite + tokio
// ==========================================

// 初始化国际化系统
rust_i18n::i18n!("locales", fallback = "zh-TW");

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 导入层 - 外部数据
pub mod importer;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// 国际化
pub mod i18n;

// API 层 - 业务接口
pub mod api;

// 应用层 - 状态组装与后台作业
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

pub use domain::types::{
    ApprovalStatus, CalendarEventType, LinkStatus, OrderPriority, ProcessStatus, ReportKind,
    ScheduleMode, WorkOrderStatus,
};

pub use domain::{CalendarEvent, CompletedWorkOrder, Report, WorkOrder, WorkOrderProcess};

pub use engine::{
    AllocationEngine, CalendarService, CompletionEngine, ErpSyncService, ReportIngestion,
    Scheduler, WorkTimeCalculator,
};

pub use api::{ApiError, ApiResult, MesContext};

pub use app::{AppState, WorkerRunner};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "制造执行系统 (MES)";

// 数据库版本
pub const DB_VERSION: &str = "v0.1";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
