// ==========================================
// 制造执行系统 (MES) - 引擎层错误类型
// ==========================================

use crate::domain::calendar::EventConflict;
use crate::repository::error::RepositoryError;
use thiserror::Error;

// ==========================================
// ScheduleError - 排程错误
// ==========================================
#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("产品 {product_code} 没有工艺路线")]
    NoRouteDefined { product_code: String },

    #[error("工单 {order_number} 剩余数量无效: {qty_remain}")]
    InvalidQuantity { order_number: String, qty_remain: i64 },

    #[error("工序 {process_name} 重试 {attempts} 次后仍无可用资源")]
    NoResourceAvailable { process_name: String, attempts: u32 },

    #[error("超过交期: {message}")]
    DeliveryDateViolation { message: String, suggestion: String },

    #[error("资源冲突: {}", format_conflicts(.conflicts))]
    ResourceConflict { conflicts: Vec<EventConflict> },

    #[error("输入无效: {0}")]
    InvalidInput(String),

    #[error("{entity} 不存在: {id}")]
    NotFound { entity: String, id: String },

    #[error("排程进度已过期: {0}")]
    ProgressExpired(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ScheduleError {
    /// 错误分类名（写入 failed-orders 列表）
    pub fn kind(&self) -> &'static str {
        match self {
            ScheduleError::NoRouteDefined { .. } => "RouteMissing",
            ScheduleError::InvalidQuantity { .. } | ScheduleError::InvalidInput(_) => "InvalidInput",
            ScheduleError::NoResourceAvailable { .. } => "NoResourceAvailable",
            ScheduleError::DeliveryDateViolation { .. } => "DeliveryDateViolation",
            ScheduleError::ResourceConflict { .. } => "ResourceConflict",
            ScheduleError::NotFound { .. } => "NotFound",
            ScheduleError::ProgressExpired(_) => "Expired",
            ScheduleError::Repository(_) => "DatabaseError",
        }
    }

    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        ScheduleError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}

impl From<rusqlite::Error> for ScheduleError {
    fn from(err: rusqlite::Error) -> Self {
        ScheduleError::Repository(err.into())
    }
}

fn format_conflicts(conflicts: &[EventConflict]) -> String {
    conflicts
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type ScheduleResult<T> = Result<T, ScheduleError>;

// ==========================================
// IngestionError - 报工入账错误
// ==========================================
#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("报工数据无效: {0}")]
    InvalidInput(String),

    #[error("报工不存在: {kind} #{id}")]
    NotFound { kind: String, id: i64 },

    #[error("报工已审核: {kind} #{id} ({status})")]
    AlreadyApproved { kind: String, id: i64, status: String },

    #[error("工时计算失败: {0}")]
    WorkTime(#[from] ScheduleError),

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<rusqlite::Error> for IngestionError {
    fn from(err: rusqlite::Error) -> Self {
        IngestionError::Repository(err.into())
    }
}

pub type IngestionResult<T> = Result<T, IngestionError>;

// ==========================================
// CompletionError - 完工转移错误
// ==========================================
#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("工单不存在: {0}")]
    WorkOrderNotFound(String),

    #[error("完工工单不存在: {0}")]
    CompletedOrderNotFound(String),

    #[error("强制完工必须填写原因")]
    MissingReason,

    #[error("完工数据不一致: {0}")]
    Inconsistent(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<rusqlite::Error> for CompletionError {
    fn from(err: rusqlite::Error) -> Self {
        CompletionError::Repository(err.into())
    }
}

pub type CompletionResult<T> = Result<T, CompletionError>;

// ==========================================
// JobError - 后台作业错误（ERP 同步、自动分配等）
// ==========================================
#[derive(Error, Debug)]
pub enum JobError {
    #[error("ERP 数据源错误: {0}")]
    Source(String),

    #[error("作业超时: {job} 超过 {minutes} 分钟")]
    Timeout { job: String, minutes: u32 },

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<rusqlite::Error> for JobError {
    fn from(err: rusqlite::Error) -> Self {
        JobError::Repository(err.into())
    }
}

pub type JobResult<T> = Result<T, JobError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resource::ResourceRef;
    use chrono::NaiveDate;

    #[test]
    fn test_conflict_message_names_event_and_resource() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        let err = ScheduleError::ResourceConflict {
            conflicts: vec![EventConflict {
                resource: ResourceRef::Operator(1),
                event_id: Some(42),
                event_title: "WO-01-202503001 SMT".to_string(),
                start: day.and_hms_opt(9, 0, 0).unwrap(),
                end: day.and_hms_opt(11, 0, 0).unwrap(),
            }],
        };
        let msg = err.to_string();
        assert!(msg.contains("operator=1"));
        assert!(msg.contains("#42"));
        assert_eq!(err.kind(), "ResourceConflict");
    }
}
