// ==========================================
// 制造执行系统 (MES) - 报工 API
// ==========================================
// 职责: 补登报工提交与审核、现场报工入账、待关联重新关联
// ==========================================

use crate::api::context::MesContext;
use crate::api::error::{ApiError, ApiResult};
use crate::domain::report::{FillWorkReport, NewReport, Report};
use crate::domain::types::ReportKind;
use crate::engine::{IngestionOutcome, RelinkSummary, SubmittedReport};
use crate::repository::ReportRepository;

pub struct ReportApi {
    ctx: MesContext,
}

impl ReportApi {
    pub fn new(ctx: MesContext) -> Self {
        Self { ctx }
    }

    /// 提交补登报工（待审核）；时段重叠只提示不拒绝
    pub fn submit_fill_work(&self, kind: ReportKind, report: &NewReport) -> ApiResult<SubmittedReport> {
        Ok(self.ctx.ingestion().submit_fill_work(kind, report, self.ctx.now())?)
    }

    /// 现场报工（免审核，立即入账）
    pub fn submit_onsite(&self, report: &NewReport) -> ApiResult<SubmittedReport> {
        Ok(self.ctx.ingestion().submit_onsite(report, self.ctx.now())?)
    }

    pub fn approve_report(&self, report_id: i64, approver: &str) -> ApiResult<IngestionOutcome> {
        if approver.trim().is_empty() {
            return Err(ApiError::InvalidInput("审核人不能为空".to_string()));
        }
        Ok(self.ctx.ingestion().approve(report_id, approver, self.ctx.now())?)
    }

    pub fn reject_report(&self, report_id: i64, approver: &str) -> ApiResult<()> {
        if approver.trim().is_empty() {
            return Err(ApiError::InvalidInput("审核人不能为空".to_string()));
        }
        Ok(self.ctx.ingestion().reject(report_id, approver, self.ctx.now())?)
    }

    pub fn get_report(&self, kind: ReportKind, report_id: i64) -> ApiResult<Report> {
        ReportRepository::new(self.ctx.conn().clone())
            .find(kind, report_id)?
            .ok_or_else(|| ApiError::NotFound(format!("{}(id={})不存在", kind, report_id)))
    }

    pub fn list_pending_approval(&self) -> ApiResult<Vec<FillWorkReport>> {
        Ok(ReportRepository::new(self.ctx.conn().clone()).list_pending_approval()?)
    }

    pub fn list_pending_link(&self) -> ApiResult<Vec<Report>> {
        Ok(ReportRepository::new(self.ctx.conn().clone()).list_pending_link()?)
    }

    pub fn relink_pending(&self) -> ApiResult<RelinkSummary> {
        Ok(self.ctx.ingestion().relink_pending(self.ctx.now())?)
    }
}
