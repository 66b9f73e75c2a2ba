// ==========================================
// 制造执行系统 (MES) - 自动分配 API
// ==========================================
// 职责: 自动分配设置、立即执行、分配日志
// ==========================================

use crate::api::context::MesContext;
use crate::api::error::{ApiError, ApiResult};
use crate::domain::allocation::{AllocationLog, AllocationRunSummary, AutoAllocationSettings};
use crate::repository::AllocationRepository;

pub struct AllocationApi {
    ctx: MesContext,
}

impl AllocationApi {
    pub fn new(ctx: MesContext) -> Self {
        Self { ctx }
    }

    pub fn get_settings(&self) -> ApiResult<AutoAllocationSettings> {
        Ok(self.ctx.allocation().settings()?)
    }

    pub fn update_settings(&self, settings: &AutoAllocationSettings) -> ApiResult<()> {
        if settings.interval_minutes == 0 {
            return Err(ApiError::InvalidInput("执行间隔必须大于 0 分钟".to_string()));
        }
        if settings.max_execution_minutes == 0 {
            return Err(ApiError::InvalidInput("最长执行时间必须大于 0 分钟".to_string()));
        }
        if settings.start_time == settings.end_time {
            return Err(ApiError::InvalidInput("执行窗口起讫时间不能相同".to_string()));
        }
        Ok(self.ctx.allocation().save_settings(settings)?)
    }

    /// 立即执行（忽略执行窗口与总开关）
    pub fn run_now(&self) -> ApiResult<AllocationRunSummary> {
        let engine = self.ctx.allocation();
        let settings = engine.settings()?;
        Ok(engine.run(&settings, self.ctx.now())?)
    }

    pub fn list_logs(&self, limit: u32) -> ApiResult<Vec<AllocationLog>> {
        Ok(AllocationRepository::new(self.ctx.conn().clone()).list_logs(limit.clamp(1, 1000))?)
    }
}
