// ==========================================
// 制造执行系统 (MES) - 工单生命周期
// ==========================================
// 建立: 工单号自动生成，工序按产品工艺路线实例化（planned = quantity）
// 状态: pending → in_progress ↔ paused；completed 只由完工引擎写入
// 派工: 写派工记录并指派作业员
// ==========================================

use crate::db::{begin_immediate, SharedConnection};
use crate::domain::types::WorkOrderStatus;
use crate::domain::work_order::{
    format_order_number, DispatchRecord, NewWorkOrder, Page, WorkOrder, WorkOrderFilter,
    WorkOrderProcess,
};
use crate::engine::error::{ScheduleError, ScheduleResult};
use crate::repository::{
    CompletedRepository, ProductionRepository, RepositoryError, RouteRepository, WorkOrderInsert,
    WorkOrderRepository,
};
use chrono::{Datelike, NaiveDateTime};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// 工单及其工序
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkOrderDetail {
    pub order: WorkOrder,
    pub processes: Vec<WorkOrderProcess>,
    pub dispatch: Vec<DispatchRecord>,
}

pub struct WorkOrderService {
    conn: SharedConnection,
    repo: WorkOrderRepository,
}

impl WorkOrderService {
    pub fn new(conn: SharedConnection) -> Self {
        let repo = WorkOrderRepository::new(conn.clone());
        Self { conn, repo }
    }

    fn get_conn(&self) -> ScheduleResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ScheduleError::Repository(RepositoryError::LockError(e.to_string())))
    }

    /// 建立工单
    #[instrument(skip(self, request), fields(company = %request.company_code, product = %request.product_code))]
    pub fn create(&self, request: &NewWorkOrder, now: NaiveDateTime) -> ScheduleResult<WorkOrder> {
        let conn = self.get_conn()?;
        let tx = begin_immediate(&conn)?;
        let order = Self::create_tx(&tx, request, now)?;
        tx.commit()?;
        info!(order = %order.order_number, quantity = order.quantity, "工单已建立");
        Ok(order)
    }

    /// 事务内建立（ERP 自动转工单共用）
    pub fn create_tx(
        conn: &Connection,
        request: &NewWorkOrder,
        now: NaiveDateTime,
    ) -> ScheduleResult<WorkOrder> {
        let company_code = request.company_code.trim();
        let product_code = request.product_code.trim();
        if company_code.is_empty() || product_code.is_empty() {
            return Err(ScheduleError::InvalidInput(
                "company_code / product_code 不能为空".to_string(),
            ));
        }
        if request.quantity <= 0 {
            return Err(ScheduleError::InvalidInput(format!(
                "工单数量必须为正数: {}",
                request.quantity
            )));
        }

        let route = RouteRepository::find_route_tx(conn, product_code)?;
        if route.is_empty() {
            return Err(ScheduleError::NoRouteDefined {
                product_code: product_code.to_string(),
            });
        }

        let order_number = match request
            .order_number
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
        {
            Some(number) => {
                // 已完工的工单号不可重用
                if CompletedRepository::find_by_number_tx(conn, company_code, number)?.is_some() {
                    return Err(ScheduleError::InvalidInput(format!(
                        "工单号已完工，不能重复使用: {}-{}",
                        company_code, number
                    )));
                }
                number.to_string()
            }
            None => {
                let (year, month) = (now.year(), now.month());
                let seq = WorkOrderRepository::next_sequence_tx(conn, company_code, year, month)?;
                format_order_number(company_code, year, month, seq)
            }
        };

        let id = WorkOrderRepository::insert_tx(
            conn,
            &WorkOrderInsert {
                company_code,
                order_number: &order_number,
                product_code,
                quantity: request.quantity,
                priority: request.priority,
                pre_in_date: request.pre_in_date,
                now,
            },
        )?;
        for step in &route {
            WorkOrderRepository::insert_process_tx(
                conn,
                id,
                &step.process_name,
                step.step_order,
                request.quantity,
            )?;
        }

        WorkOrderRepository::find_by_id_tx(conn, id)?
            .ok_or_else(|| ScheduleError::not_found("WorkOrder", id))
    }

    pub fn start(&self, id: i64, now: NaiveDateTime) -> ScheduleResult<WorkOrder> {
        self.transition(id, WorkOrderStatus::InProgress, now)
    }

    pub fn pause(&self, id: i64, now: NaiveDateTime) -> ScheduleResult<WorkOrder> {
        self.transition(id, WorkOrderStatus::Paused, now)
    }

    pub fn resume(&self, id: i64, now: NaiveDateTime) -> ScheduleResult<WorkOrder> {
        self.transition(id, WorkOrderStatus::InProgress, now)
    }

    fn transition(
        &self,
        id: i64,
        next: WorkOrderStatus,
        now: NaiveDateTime,
    ) -> ScheduleResult<WorkOrder> {
        let conn = self.get_conn()?;
        let tx = begin_immediate(&conn)?;
        let order = WorkOrderRepository::find_by_id_tx(&tx, id)?
            .ok_or_else(|| ScheduleError::not_found("WorkOrder", id))?;
        if !order.status.can_transition_to(next) {
            return Err(ScheduleError::Repository(RepositoryError::InvalidStateTransition {
                from: order.status.to_db_str().to_string(),
                to: next.to_db_str().to_string(),
            }));
        }
        WorkOrderRepository::update_status_tx(&tx, id, next, now)?;
        ProductionRepository::set_record_status_tx(&tx, id, next, now)?;
        let updated = WorkOrderRepository::find_by_id_tx(&tx, id)?
            .ok_or_else(|| ScheduleError::not_found("WorkOrder", id))?;
        tx.commit()?;
        info!(order = %updated.order_number, from = %order.status, to = %next, "工单状态变更");
        Ok(updated)
    }

    /// 派工: 写派工记录并指派作业员
    #[instrument(skip(self))]
    pub fn dispatch_process(
        &self,
        work_order_id: i64,
        process_name: &str,
        operator: &str,
        quantity: i64,
        created_by: &str,
        now: NaiveDateTime,
    ) -> ScheduleResult<i64> {
        if quantity <= 0 {
            return Err(ScheduleError::InvalidInput(format!(
                "派工数量必须为正数: {}",
                quantity
            )));
        }
        if operator.trim().is_empty() {
            return Err(ScheduleError::InvalidInput("派工必须指定作业员".to_string()));
        }

        let conn = self.get_conn()?;
        let tx = begin_immediate(&conn)?;
        let order = WorkOrderRepository::find_by_id_tx(&tx, work_order_id)?
            .ok_or_else(|| ScheduleError::not_found("WorkOrder", work_order_id))?;
        let processes = WorkOrderRepository::list_processes_tx(&tx, work_order_id)?;
        let process = processes
            .iter()
            .find(|p| p.process_name == process_name)
            .ok_or_else(|| {
                ScheduleError::not_found(
                    "WorkOrderProcess",
                    format!("{}/{}", order.order_number, process_name),
                )
            })?;
        if quantity > process.planned_quantity {
            return Err(ScheduleError::InvalidInput(format!(
                "派工数量 {} 超过工序计划数量 {}",
                quantity, process.planned_quantity
            )));
        }

        let dispatch_id = WorkOrderRepository::insert_dispatch_tx(
            &tx,
            work_order_id,
            process_name,
            Some(operator),
            quantity,
            created_by,
            now,
        )?;
        WorkOrderRepository::assign_process_tx(&tx, work_order_id, process_name, Some(operator), None, None)?;
        tx.commit()?;

        info!(order = %order.order_number, process = process_name, operator, quantity, "已派工");
        Ok(dispatch_id)
    }

    pub fn get(&self, id: i64) -> ScheduleResult<WorkOrderDetail> {
        let order = self
            .repo
            .find_by_id(id)?
            .ok_or_else(|| ScheduleError::not_found("WorkOrder", id))?;
        Ok(WorkOrderDetail {
            processes: self.repo.list_processes(id)?,
            dispatch: self.repo.list_dispatch(id)?,
            order,
        })
    }

    pub fn list(
        &self,
        filter: &WorkOrderFilter,
        page: u32,
        page_size: u32,
    ) -> ScheduleResult<Page<WorkOrder>> {
        Ok(self.repo.list(filter, page, page_size)?)
    }

    pub fn list_active(&self) -> ScheduleResult<Vec<WorkOrder>> {
        Ok(self.repo.list_active()?)
    }

    /// 删除工单（工序/派工/生产记录/明细级联删除）
    pub fn delete(&self, id: i64) -> ScheduleResult<()> {
        match self.repo.delete(id) {
            Ok(()) => {
                info!(work_order_id = id, "工单已删除");
                Ok(())
            }
            Err(RepositoryError::NotFound { .. }) => Err(ScheduleError::not_found("WorkOrder", id)),
            Err(e) => Err(e.into()),
        }
    }
}
