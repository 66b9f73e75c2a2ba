// ==========================================
// 制造执行系统 (MES) - 完工 API
// ==========================================
// 职责: 完工检查、强制完工、重新转移、完工工单查询
// ==========================================

use crate::api::context::MesContext;
use crate::api::error::{ApiError, ApiResult};
use crate::domain::completed::{CompletedProductionReport, CompletedWorkOrder, CompletedWorkOrderProcess};
use crate::engine::{CompletionCheck, RetransferSummary};
use crate::repository::CompletedRepository;
use serde::{Deserialize, Serialize};

/// 完工工单及其快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedOrderDetail {
    pub order: CompletedWorkOrder,
    pub processes: Vec<CompletedWorkOrderProcess>,
    pub reports: Vec<CompletedProductionReport>,
}

pub struct CompletionApi {
    ctx: MesContext,
}

impl CompletionApi {
    pub fn new(ctx: MesContext) -> Self {
        Self { ctx }
    }

    /// 包装累计达标时完工，返回 {completed, summary}
    pub fn check_and_complete(&self, work_order_id: i64) -> ApiResult<CompletionCheck> {
        Ok(self.ctx.completion().check_and_complete(work_order_id, self.ctx.now())?)
    }

    /// 强制完工（必须填写原因），返回完工工单 id
    pub fn force_complete(&self, work_order_id: i64, reason: &str) -> ApiResult<i64> {
        Ok(self
            .ctx
            .completion()
            .force_complete(work_order_id, reason, self.ctx.now())?)
    }

    /// 以原始报工重建完工工序与汇总
    pub fn retransfer(&self, completed_work_order_id: i64) -> ApiResult<RetransferSummary> {
        Ok(self
            .ctx
            .completion()
            .retransfer(completed_work_order_id, self.ctx.now())?)
    }

    pub fn get_completed(&self, completed_work_order_id: i64) -> ApiResult<CompletedOrderDetail> {
        let repo = CompletedRepository::new(self.ctx.conn().clone());
        let order = repo.find_by_id(completed_work_order_id)?.ok_or_else(|| {
            ApiError::NotFound(format!(
                "CompletedWorkOrder(id={})不存在",
                completed_work_order_id
            ))
        })?;
        Ok(CompletedOrderDetail {
            processes: repo.list_processes(order.id)?,
            reports: repo.list_reports(order.id)?,
            order,
        })
    }

    pub fn find_completed_by_number(
        &self,
        company_code: &str,
        order_number: &str,
    ) -> ApiResult<Option<CompletedWorkOrder>> {
        Ok(CompletedRepository::new(self.ctx.conn().clone()).find_by_number(company_code, order_number)?)
    }
}
