// ==========================================
// 制造执行系统 (MES) - ERP 同步 API
// ==========================================
// 职责: 手动触发 ERP 同步 / 自动转工单、查询后台作业记录
// ==========================================

use crate::api::context::MesContext;
use crate::api::error::ApiResult;
use crate::domain::erp::{ConvertSummary, ErpSyncSummary};
use crate::domain::job::JobRun;
use crate::engine::ErpOrderSource;
use crate::importer::ErpFileSource;
use crate::repository::JobRunRepository;
use std::path::Path;

pub struct ErpApi {
    ctx: MesContext,
}

impl ErpApi {
    pub fn new(ctx: MesContext) -> Self {
        Self { ctx }
    }

    pub fn sync(&self, source: &dyn ErpOrderSource) -> ApiResult<ErpSyncSummary> {
        Ok(self.ctx.erp_sync().sync(source, self.ctx.now())?)
    }

    /// 从 ERP 导出文件同步
    pub fn sync_from_file(&self, path: &Path, default_company_code: &str) -> ApiResult<ErpSyncSummary> {
        let source = ErpFileSource::new(path, default_company_code);
        self.sync(&source)
    }

    /// 未转换订单建立工单，并重新关联待关联报工
    pub fn convert_pending(&self) -> ApiResult<ConvertSummary> {
        let ingestion = self.ctx.ingestion();
        Ok(self.ctx.erp_sync().auto_convert(Some(&ingestion), self.ctx.now(), None)?)
    }

    pub fn list_job_runs(&self, job_name: Option<&str>, limit: u32) -> ApiResult<Vec<JobRun>> {
        Ok(JobRunRepository::new(self.ctx.conn().clone()).list_recent(job_name, limit.clamp(1, 500))?)
    }
}
