// ==========================================
// 制造执行系统 (MES) - 排程 API
// ==========================================
// 职责: 手动 / 自动 / 半自动 / 混合排程、冲突查询、进度查询、警告看板
// 说明: 部分成功时返回 failed 列表，调用方可重新提交
// ==========================================

use crate::api::context::MesContext;
use crate::api::error::{ApiError, ApiResult};
use crate::domain::calendar::EventConflict;
use crate::domain::resource::ResourceRef;
use crate::domain::types::ScheduleMode;
use crate::domain::warning::{ScheduleWarning, WarningSummary};
use crate::engine::scheduler::CommittedOrder;
use crate::engine::{ProgressSnapshot, ScheduleOptions, ScheduleOutcome, TaskAssignment};
use crate::repository::WarningRepository;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::info;

/// 自动 / 半自动 / 混合排程请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub mode: ScheduleMode,
    pub order_ids: Vec<i64>,
    pub start_from: Option<NaiveDateTime>,
    #[serde(default)]
    pub overtime: bool,
    pub production_line: Option<String>,
    pub created_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleResponse {
    /// 可用 get_progress 查询
    pub progress_key: String,
    pub outcome: ScheduleOutcome,
}

pub struct ScheduleApi {
    ctx: MesContext,
}

impl ScheduleApi {
    pub fn new(ctx: MesContext) -> Self {
        Self { ctx }
    }

    /// 自动 / 半自动 / 混合排程
    pub fn request_schedule(&self, request: &ScheduleRequest) -> ApiResult<ScheduleResponse> {
        if request.mode == ScheduleMode::Manual {
            return Err(ApiError::InvalidInput(
                "手动排程请使用 submit_manual_schedule".to_string(),
            ));
        }
        if request.order_ids.is_empty() {
            return Err(ApiError::InvalidInput("未指定工单".to_string()));
        }

        let scheduler = self.ctx.scheduler();
        let progress_key = self.ctx.progress().start(request.order_ids.len());
        let mut options = ScheduleOptions::new(request.mode, request.order_ids.clone(), self.ctx.now());
        options.start_from = request.start_from;
        options.overtime = request.overtime;
        options.production_line = request.production_line.clone();
        options.created_by = request.created_by.clone();
        options.progress_key = Some(progress_key.clone());

        let outcome = scheduler.run(&options)?;
        info!(
            mode = %request.mode,
            committed = outcome.committed.len(),
            candidates = outcome.candidates.len(),
            failed = outcome.failed.len(),
            "排程请求完成"
        );
        Ok(ScheduleResponse {
            progress_key,
            outcome,
        })
    }

    /// 手动排程: 冲突时返回 ResourceConflict（含占用事件）
    pub fn submit_manual_schedule(
        &self,
        order_id: i64,
        tasks: &[TaskAssignment],
        created_by: &str,
    ) -> ApiResult<CommittedOrder> {
        if tasks.is_empty() {
            return Err(ApiError::InvalidInput("任务列表为空".to_string()));
        }
        Ok(self
            .ctx
            .scheduler()
            .commit_manual(order_id, tasks, created_by, self.ctx.now())?)
    }

    /// 提交半自动拆分结果
    pub fn submit_semi_auto(
        &self,
        order_id: i64,
        splits: &[TaskAssignment],
        created_by: &str,
    ) -> ApiResult<CommittedOrder> {
        if splits.is_empty() {
            return Err(ApiError::InvalidInput("拆分列表为空".to_string()));
        }
        Ok(self
            .ctx
            .scheduler()
            .submit_semi_auto(order_id, splits, created_by, self.ctx.now())?)
    }

    /// 咨询性冲突检查（不写库）
    pub fn check_conflicts(
        &self,
        resource: ResourceRef,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> ApiResult<Vec<EventConflict>> {
        if end <= start {
            return Err(ApiError::InvalidInput(format!("时段无效: {} ~ {}", start, end)));
        }
        Ok(self.ctx.scheduler().check_conflicts(resource, start, end)?)
    }

    /// 排程进度；超过保留时长返回 Expired
    pub fn get_progress(&self, progress_key: &str) -> ApiResult<ProgressSnapshot> {
        Ok(self.ctx.progress().get(progress_key)?)
    }

    // ==========================================
    // 警告看板
    // ==========================================

    pub fn list_warnings(&self, limit: u32) -> ApiResult<Vec<ScheduleWarning>> {
        Ok(WarningRepository::new(self.ctx.conn().clone()).list_recent(limit.clamp(1, 1000))?)
    }

    pub fn warning_summary(&self) -> ApiResult<WarningSummary> {
        Ok(WarningRepository::new(self.ctx.conn().clone()).summary()?)
    }
}
