// ==========================================
// 制造执行系统 (MES) - 引擎依赖接口
// ==========================================
// 排程依赖 资源 + 行事历 + 工单存储；不直接拼 SQL
// 提交阶段另走事务（见 scheduler.rs）
// ==========================================

use crate::domain::calendar::CalendarEvent;
use crate::domain::resource::{Equipment, Operator, ProductionLine, ResourceRef, SmtEquipment};
use crate::domain::route::ProductRoute;
use crate::domain::work_order::{WorkOrder, WorkOrderProcess};
use crate::engine::error::ScheduleResult;
use crate::repository::WorkOrderRepository;
use chrono::{NaiveDate, NaiveDateTime};

/// 行事历查询
pub trait CalendarQuery: Send + Sync {
    /// 某日是否为工作日（补班日 > 假日 > 产线周历 > 默认周一至周五）
    fn is_workday(&self, date: NaiveDate, line: Option<&ProductionLine>) -> ScheduleResult<bool>;

    /// 与 [start, end) 重叠且占用该资源的事件
    fn occupying_events(
        &self,
        resource: ResourceRef,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> ScheduleResult<Vec<CalendarEvent>>;
}

/// 资源目录与产能查询（读多写少，每次排程整批读取）
pub trait ResourceQuery: Send + Sync {
    fn operators(&self) -> ScheduleResult<Vec<Operator>>;

    fn equipment(&self) -> ScheduleResult<Vec<Equipment>>;

    fn smt_equipment(&self) -> ScheduleResult<Vec<SmtEquipment>>;

    /// 产品工艺路线（step_order 升序）；无路线返回空
    fn route(&self, product_code: &str) -> ScheduleResult<Vec<ProductRoute>>;

    /// 最新启用版本的标准产能，缺省 1000/小时
    fn capacity_per_hour(&self, product_code: &str, process_name: &str) -> ScheduleResult<f64>;

    /// 解析产线: 指定名称 → 配置默认 → 第一条启用产线 → 内建默认
    fn production_line(&self, name: Option<&str>) -> ScheduleResult<ProductionLine>;
}

/// 工单存储（排程只读）
pub trait WorkOrderStore: Send + Sync {
    fn find_order(&self, id: i64) -> ScheduleResult<Option<WorkOrder>>;

    fn list_processes(&self, work_order_id: i64) -> ScheduleResult<Vec<WorkOrderProcess>>;
}

impl WorkOrderStore for WorkOrderRepository {
    fn find_order(&self, id: i64) -> ScheduleResult<Option<WorkOrder>> {
        Ok(self.find_by_id(id)?)
    }

    fn list_processes(&self, work_order_id: i64) -> ScheduleResult<Vec<WorkOrderProcess>> {
        Ok(WorkOrderRepository::list_processes(self, work_order_id)?)
    }
}
