// ==========================================
// 制造执行系统 (MES) - API层错误类型
// ==========================================
// 职责: 把各层错误收敛为对外的错误分类
// 分类: InvalidInput / NotFound / ResourceConflict / NoResourceAvailable /
//       RouteMissing / DeliveryDateViolation / AlreadyApproved / Expired /
//       DatabaseError / Fatal
// ==========================================

use crate::domain::calendar::EventConflict;
use crate::engine::error::{CompletionError, IngestionError, JobError, ScheduleError};
use crate::importer::error::ImportError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
/// 所有错误信息必须包含显式原因
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 调用方可修正的错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("报工已审核: {0}")]
    AlreadyApproved(String),

    #[error("已过期: {0}")]
    Expired(String),

    // ==========================================
    // 排程错误（逐单失败，批次继续）
    // ==========================================
    /// 附带占用事件，调用方可顺延时间后重试
    #[error("资源冲突: {message}")]
    ResourceConflict {
        message: String,
        conflicts: Vec<EventConflict>,
    },

    #[error("无可用资源: {0}")]
    NoResourceAvailable(String),

    #[error("工艺路线缺失: {0}")]
    RouteMissing(String),

    #[error("超过交期: {message}")]
    DeliveryDateViolation { message: String, suggestion: String },

    // ==========================================
    // 存储与系统错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    /// 数据损坏或不变量被破坏，事务已回滚
    #[error("严重错误: {0}")]
    Fatal(String),
}

impl ApiError {
    /// 错误分类名
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) => "InvalidInput",
            ApiError::NotFound(_) => "NotFound",
            ApiError::AlreadyApproved(_) => "AlreadyApproved",
            ApiError::Expired(_) => "Expired",
            ApiError::ResourceConflict { .. } => "ResourceConflict",
            ApiError::NoResourceAvailable(_) => "NoResourceAvailable",
            ApiError::RouteMissing(_) => "RouteMissing",
            ApiError::DeliveryDateViolation { .. } => "DeliveryDateViolation",
            ApiError::DatabaseError(_) => "DatabaseError",
            ApiError::Fatal(_) => "Fatal",
        }
    }

    /// 调用方原样或调整时间后重试可能成功
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::ResourceConflict { .. }
                | ApiError::NoResourceAvailable(_)
                | ApiError::DatabaseError(_)
        )
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }

            // 数据库错误
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseTransactionError(msg)
            | RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::InvalidInput(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::InvalidInput(format!("外键约束违反: {}", msg))
            }
            RepositoryError::CheckConstraintViolation(msg) => {
                ApiError::InvalidInput(format!("检查约束违反: {}", msg))
            }

            // 业务规则 / 数据质量
            RepositoryError::BusinessRuleViolation(msg) | RepositoryError::ValidationError(msg) => {
                ApiError::InvalidInput(msg)
            }
            RepositoryError::InvalidStateTransition { from, to } => {
                ApiError::InvalidInput(format!("无效的状态转换: {} → {}", from, to))
            }
            // 库内数据无法解码视为数据损坏
            RepositoryError::FieldValueError { field, message } => {
                ApiError::Fatal(format!("字段{}错误: {}", field, message))
            }

            RepositoryError::InternalError(msg) => ApiError::Fatal(msg),
            RepositoryError::Other(err) => ApiError::Fatal(err.to_string()),
        }
    }
}

// ==========================================
// 从引擎错误转换
// ==========================================
impl From<ScheduleError> for ApiError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::NoRouteDefined { product_code } => ApiError::RouteMissing(product_code),
            err @ ScheduleError::InvalidQuantity { .. } => ApiError::InvalidInput(err.to_string()),
            ScheduleError::InvalidInput(msg) => ApiError::InvalidInput(msg),
            err @ ScheduleError::NoResourceAvailable { .. } => {
                ApiError::NoResourceAvailable(err.to_string())
            }
            ScheduleError::DeliveryDateViolation { message, suggestion } => {
                ApiError::DeliveryDateViolation { message, suggestion }
            }
            ScheduleError::ResourceConflict { conflicts } => {
                let message = conflicts
                    .iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join("; ");
                ApiError::ResourceConflict { message, conflicts }
            }
            ScheduleError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            ScheduleError::ProgressExpired(key) => ApiError::Expired(format!("排程进度 {}", key)),
            ScheduleError::Repository(err) => err.into(),
        }
    }
}

impl From<CompletionError> for ApiError {
    fn from(err: CompletionError) -> Self {
        match err {
            CompletionError::WorkOrderNotFound(id) => {
                ApiError::NotFound(format!("WorkOrder(id={})不存在", id))
            }
            CompletionError::CompletedOrderNotFound(id) => {
                ApiError::NotFound(format!("CompletedWorkOrder(id={})不存在", id))
            }
            err @ CompletionError::MissingReason => ApiError::InvalidInput(err.to_string()),
            CompletionError::Inconsistent(msg) => ApiError::Fatal(msg),
            CompletionError::Repository(err) => err.into(),
        }
    }
}

impl From<IngestionError> for ApiError {
    fn from(err: IngestionError) -> Self {
        match err {
            IngestionError::InvalidInput(msg) => ApiError::InvalidInput(msg),
            IngestionError::NotFound { kind, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", kind, id))
            }
            IngestionError::AlreadyApproved { kind, id, status } => {
                ApiError::AlreadyApproved(format!("{} #{} 当前状态 {}", kind, id, status))
            }
            IngestionError::WorkTime(err) => err.into(),
            IngestionError::Completion(err) => err.into(),
            IngestionError::Repository(err) => err.into(),
        }
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::Source(msg) => ApiError::DatabaseError(format!("ERP 数据源: {}", msg)),
            err @ JobError::Timeout { .. } => ApiError::DatabaseError(err.to_string()),
            JobError::Schedule(err) => err.into(),
            JobError::Completion(err) => err.into(),
            JobError::Repository(err) => err.into(),
        }
    }
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::FileNotFound(path) => ApiError::NotFound(format!("文件 {}", path)),
            ImportError::Calendar(err) => err.into(),
            ImportError::Repository(err) => err.into(),
            ImportError::FeedUnavailable(msg) => ApiError::DatabaseError(msg),
            other => ApiError::InvalidInput(other.to_string()),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resource::ResourceRef;
    use chrono::NaiveDate;

    #[test]
    fn test_repository_error_conversion() {
        let repo_err = RepositoryError::NotFound {
            entity: "WorkOrder".to_string(),
            id: "42".to_string(),
        };
        let api_err: ApiError = repo_err.into();
        match api_err {
            ApiError::NotFound(msg) => {
                assert!(msg.contains("WorkOrder"));
                assert!(msg.contains("42"));
            }
            other => panic!("Expected NotFound, got {:?}", other),
        }

        let api_err: ApiError = RepositoryError::LockError("poisoned".to_string()).into();
        assert_eq!(api_err.kind(), "DatabaseError");
        assert!(api_err.is_retryable());
    }

    #[test]
    fn test_schedule_error_taxonomy() {
        let err: ApiError = ScheduleError::NoRouteDefined {
            product_code: "PFP-X".to_string(),
        }
        .into();
        assert_eq!(err.kind(), "RouteMissing");
        assert!(!err.is_retryable());

        let err: ApiError = ScheduleError::ProgressExpired("k".to_string()).into();
        assert_eq!(err.kind(), "Expired");

        let day = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        let err: ApiError = ScheduleError::ResourceConflict {
            conflicts: vec![EventConflict {
                resource: ResourceRef::Operator(1),
                event_id: Some(7),
                event_title: "WO-01-202503001 SMT".to_string(),
                start: day.and_hms_opt(9, 0, 0).unwrap(),
                end: day.and_hms_opt(11, 0, 0).unwrap(),
            }],
        }
        .into();
        match &err {
            ApiError::ResourceConflict { message, conflicts } => {
                assert_eq!(conflicts.len(), 1);
                assert!(message.contains("#7"));
            }
            other => panic!("Expected ResourceConflict, got {:?}", other),
        }
        assert!(err.is_retryable());
    }

    #[test]
    fn test_ingestion_and_completion_errors() {
        let err: ApiError = IngestionError::AlreadyApproved {
            kind: "operator_supplement".to_string(),
            id: 3,
            status: "approved".to_string(),
        }
        .into();
        assert_eq!(err.kind(), "AlreadyApproved");

        let err: ApiError = CompletionError::MissingReason.into();
        assert_eq!(err.kind(), "InvalidInput");

        let err: ApiError = CompletionError::Inconsistent("负数量".to_string()).into();
        assert_eq!(err.kind(), "Fatal");
    }
}
