// ==========================================
// 制造执行系统 (MES) - 后台作业审计
// ==========================================

use crate::domain::types::JobRunStatus;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// 后台作业名称
pub mod job_names {
    pub const ERP_SYNC: &str = "erp_sync";
    pub const AUTO_CONVERT: &str = "auto_convert";
    pub const AUTO_ALLOCATION: &str = "auto_allocation";
    pub const COMPLETION_SWEEP: &str = "completion_sweep";
    pub const WARNING_TRIM: &str = "warning_trim";
}

// ==========================================
// JobRun - 单次后台作业执行记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRun {
    pub id: i64,
    pub job_name: String,
    pub status: JobRunStatus,
    pub started_at: NaiveDateTime,
    pub finished_at: NaiveDateTime,
    pub processed: i64,
    pub failed: i64,
    pub message: Option<String>,
}

/// 作业执行结果（写入 job_run 前）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub processed: i64,
    pub failed: i64,
    pub timed_out: bool,
    pub message: Option<String>,
}

impl JobOutcome {
    /// 超时或存在单项失败记为 partial_success
    pub fn status(&self) -> JobRunStatus {
        if self.timed_out || (self.failed > 0 && self.processed > 0) {
            JobRunStatus::PartialSuccess
        } else if self.failed > 0 {
            JobRunStatus::Failed
        } else {
            JobRunStatus::Success
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_status() {
        assert_eq!(JobOutcome::default().status(), JobRunStatus::Success);
        let partial = JobOutcome {
            processed: 3,
            failed: 1,
            ..JobOutcome::default()
        };
        assert_eq!(partial.status(), JobRunStatus::PartialSuccess);
        let timeout = JobOutcome {
            timed_out: true,
            ..JobOutcome::default()
        };
        assert_eq!(timeout.status(), JobRunStatus::PartialSuccess);
        let failed = JobOutcome {
            failed: 2,
            ..JobOutcome::default()
        };
        assert_eq!(failed.status(), JobRunStatus::Failed);
    }
}
