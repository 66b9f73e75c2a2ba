// ==========================================
// 制造执行系统 (MES) - 应用层
// ==========================================
// 职责: 组装共享状态与 API，驱动后台周期作业
// ==========================================

pub mod state;
pub mod workers;

// 重导出
pub use state::{get_default_db_path, AppState, DB_PATH_ENV};
pub use workers::{ShutdownSignal, WorkerRunner, DEFAULT_MAX_EXECUTION_MINUTES};
