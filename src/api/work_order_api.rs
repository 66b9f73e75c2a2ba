// ==========================================
// 制造执行系统 (MES) - 工单 API
// ==========================================
// 职责: 工单查询、建立、状态变更、派工、删除
// ==========================================

use crate::api::context::MesContext;
use crate::api::error::{ApiError, ApiResult};
use crate::domain::work_order::{NewWorkOrder, Page, WorkOrder, WorkOrderFilter};
use crate::engine::WorkOrderDetail;

/// 默认分页大小
pub const DEFAULT_PAGE_SIZE: u32 = 50;

pub struct WorkOrderApi {
    ctx: MesContext,
}

impl WorkOrderApi {
    pub fn new(ctx: MesContext) -> Self {
        Self { ctx }
    }

    /// 分页查询工单（状态 / 公司 / 建立日期区间）
    pub fn list_work_orders(
        &self,
        filter: &WorkOrderFilter,
        page: u32,
        page_size: Option<u32>,
    ) -> ApiResult<Page<WorkOrder>> {
        if let (Some(from), Some(to)) = (filter.created_from, filter.created_to) {
            if from > to {
                return Err(ApiError::InvalidInput(format!(
                    "日期区间无效: {} > {}",
                    from, to
                )));
            }
        }
        Ok(self
            .ctx
            .work_orders()
            .list(filter, page, page_size.unwrap_or(DEFAULT_PAGE_SIZE))?)
    }

    pub fn get_work_order(&self, id: i64) -> ApiResult<WorkOrderDetail> {
        Ok(self.ctx.work_orders().get(id)?)
    }

    pub fn create_work_order(&self, request: &NewWorkOrder) -> ApiResult<WorkOrder> {
        if request.company_code.trim().is_empty() {
            return Err(ApiError::InvalidInput("公司代码不能为空".to_string()));
        }
        Ok(self.ctx.work_orders().create(request, self.ctx.now())?)
    }

    pub fn start_work_order(&self, id: i64) -> ApiResult<WorkOrder> {
        Ok(self.ctx.work_orders().start(id, self.ctx.now())?)
    }

    pub fn pause_work_order(&self, id: i64) -> ApiResult<WorkOrder> {
        Ok(self.ctx.work_orders().pause(id, self.ctx.now())?)
    }

    pub fn resume_work_order(&self, id: i64) -> ApiResult<WorkOrder> {
        Ok(self.ctx.work_orders().resume(id, self.ctx.now())?)
    }

    /// 派工，返回派工记录 id
    pub fn dispatch_process(
        &self,
        work_order_id: i64,
        process_name: &str,
        operator: &str,
        quantity: i64,
        created_by: &str,
    ) -> ApiResult<i64> {
        Ok(self.ctx.work_orders().dispatch_process(
            work_order_id,
            process_name,
            operator,
            quantity,
            created_by,
            self.ctx.now(),
        )?)
    }

    pub fn delete_work_order(&self, id: i64) -> ApiResult<()> {
        Ok(self.ctx.work_orders().delete(id)?)
    }
}
