// ==========================================
// 制造执行系统 (MES) - 完工引擎
// ==========================================
// 完工条件: 包装工序累计（良品 + 不良）≥ 工单数量
// 双累加器: 生产明细 / 已审核补登，任一达标即完工
// 转移（单事务）:
//   1. 删除同一原工单的既有快照（重写）
//   2. 工单 → completed，工序全部 completed
//   3. 写入完工工单 / 工序 / 报工快照
//   4. 删除明细 → 生产记录 → 工序 → 派工 → 工单
// ==========================================

use crate::config::MesConfig;
use crate::db::{begin_immediate, SharedConnection};
use crate::domain::completed::{
    to_offset_datetime, CompletedProductionReport, CompletedWorkOrder, CompletedWorkOrderProcess,
    CompletionTotals,
};
use crate::domain::report::{Report, ReportView};
use crate::domain::types::{ProcessStatus, QuantitySource, WorkOrderStatus};
use crate::domain::work_order::{ProductionDetail, WorkOrder, WorkOrderProcess};
use crate::engine::error::{CompletionError, CompletionResult};
use crate::engine::events::{MesEvent, MesEventType, OptionalEventPublisher};
use crate::i18n::t_with_args;
use crate::repository::{
    CompletedRepository, ProductionRepository, ReportRepository, RepositoryError,
    WorkOrderRepository,
};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// 完工检查结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionCheck {
    pub work_order_id: i64,
    pub order_number: String,
    /// 生产明细累加器
    pub detail_quantity: i64,
    /// 已审核补登累加器
    pub approved_report_quantity: i64,
    pub target_quantity: i64,
    pub completed: bool,
    pub completed_work_order_id: Option<i64>,
    pub summary: String,
}

impl CompletionCheck {
    pub fn packaged_quantity(&self) -> i64 {
        self.detail_quantity.max(self.approved_report_quantity)
    }
}

/// 重新转移结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetransferSummary {
    pub completed_work_order_id: i64,
    pub processes_rebuilt: usize,
    pub reports_added: usize,
    pub completed_quantity: i64,
    pub changed: bool,
}

/// 完工巡检结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepSummary {
    pub examined: usize,
    pub completed: usize,
    pub failed: usize,
    pub timed_out: bool,
}

// ==========================================
// CompletionEngine
// ==========================================
pub struct CompletionEngine {
    conn: SharedConnection,
    config: MesConfig,
    events: OptionalEventPublisher,
}

impl CompletionEngine {
    pub fn new(conn: SharedConnection, config: MesConfig, events: OptionalEventPublisher) -> Self {
        Self { conn, config, events }
    }

    pub fn config(&self) -> &MesConfig {
        &self.config
    }

    fn get_conn(&self) -> CompletionResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| CompletionError::Repository(RepositoryError::LockError(e.to_string())))
    }

    /// 检查并在达标时完工
    #[instrument(skip(self))]
    pub fn check_and_complete(
        &self,
        work_order_id: i64,
        now: NaiveDateTime,
    ) -> CompletionResult<CompletionCheck> {
        let check = {
            let conn = self.get_conn()?;
            let tx = begin_immediate(&conn)?;
            let check = Self::check_and_complete_tx(&tx, &self.config, work_order_id, now)?;
            tx.commit()?;
            check
        };
        if check.completed {
            self.publish_completed(work_order_id, &check, now);
        }
        Ok(check)
    }

    /// 事务内版本（报工入账时调用）
    pub fn check_and_complete_tx(
        conn: &Connection,
        config: &MesConfig,
        work_order_id: i64,
        now: NaiveDateTime,
    ) -> CompletionResult<CompletionCheck> {
        let order = WorkOrderRepository::find_by_id_tx(conn, work_order_id)?
            .ok_or_else(|| CompletionError::WorkOrderNotFound(work_order_id.to_string()))?;

        let (detail_quantity, approved_report_quantity) = Self::accumulators_tx(conn, config, &order)?;
        let packaged = detail_quantity.max(approved_report_quantity);
        let ready = order.quantity > 0 && packaged >= order.quantity;

        let completed_work_order_id = if ready {
            Some(Self::transfer_tx(conn, config, &order, packaged, None, now)?)
        } else {
            None
        };

        let key = if ready {
            "completion.summary.completed"
        } else {
            "completion.summary.not_ready"
        };
        let quantity = packaged.to_string();
        let target = order.quantity.to_string();
        let summary = t_with_args(
            key,
            &[
                ("order", order.order_number.as_str()),
                ("quantity", quantity.as_str()),
                ("target", target.as_str()),
            ],
        );

        Ok(CompletionCheck {
            work_order_id,
            order_number: order.order_number,
            detail_quantity,
            approved_report_quantity,
            target_quantity: order.quantity,
            completed: ready,
            completed_work_order_id,
            summary,
        })
    }

    /// 强制完工: 跳过数量门槛，completed_quantity 取当前包装累计
    #[instrument(skip(self, reason))]
    pub fn force_complete(
        &self,
        work_order_id: i64,
        reason: &str,
        now: NaiveDateTime,
    ) -> CompletionResult<i64> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(CompletionError::MissingReason);
        }

        let (order, completed_id, packaged) = {
            let conn = self.get_conn()?;
            let tx = begin_immediate(&conn)?;
            let order = WorkOrderRepository::find_by_id_tx(&tx, work_order_id)?
                .ok_or_else(|| CompletionError::WorkOrderNotFound(work_order_id.to_string()))?;
            let (detail, approved) = Self::accumulators_tx(&tx, &self.config, &order)?;
            let packaged = detail.max(approved);
            let completed_id = Self::transfer_tx(&tx, &self.config, &order, packaged, Some(reason), now)?;
            tx.commit()?;
            (order, completed_id, packaged)
        };

        warn!(
            order = %order.order_number,
            packaged,
            target = order.quantity,
            reason,
            "工单强制完工"
        );
        self.events.publish(
            MesEvent::new(
                MesEventType::WorkOrderCompleted,
                &order.company_code,
                &order.order_number,
                now,
            )
            .with_work_order(order.id)
            .with_completed(completed_id)
            .with_source("force_complete"),
        );
        Ok(completed_id)
    }

    /// 以补登/现场报工原始表为来源重建完工工序与汇总
    #[instrument(skip(self))]
    pub fn retransfer(
        &self,
        completed_work_order_id: i64,
        now: NaiveDateTime,
    ) -> CompletionResult<RetransferSummary> {
        let (summary, order) = {
            let conn = self.get_conn()?;
            let tx = begin_immediate(&conn)?;
            let summary = Self::retransfer_tx(&tx, &self.config, completed_work_order_id)?;
            let order = CompletedRepository::find_by_id_tx(&tx, completed_work_order_id)?;
            tx.commit()?;
            (summary, order)
        };
        if let (true, Some(order)) = (summary.changed, order) {
            self.events.publish(
                MesEvent::new(
                    MesEventType::WorkOrderRetransferred,
                    &order.company_code,
                    &order.order_number,
                    now,
                )
                .with_work_order(order.original_workorder_id)
                .with_completed(order.id),
            );
        }
        Ok(summary)
    }

    pub fn retransfer_tx(
        conn: &Connection,
        config: &MesConfig,
        completed_work_order_id: i64,
    ) -> CompletionResult<RetransferSummary> {
        let completed = CompletedRepository::find_by_id_tx(conn, completed_work_order_id)?
            .ok_or_else(|| CompletionError::CompletedOrderNotFound(completed_work_order_id.to_string()))?;

        let reports = ReportRepository::list_effective_for_order_tx(
            conn,
            &completed.company_code,
            &completed.order_number,
            &completed.product_code,
        )?;
        let existing_processes = CompletedRepository::list_processes_tx(conn, completed.id)?;
        let existing_reports = CompletedRepository::list_reports_tx(conn, completed.id)?;

        // 补入尚未快照的报工
        let known: HashSet<(i64, String)> = existing_reports
            .iter()
            .filter_map(|r| {
                r.original_report_id
                    .zip(r.original_report_type.map(|k| k.to_db_str().to_string()))
            })
            .collect();
        let offset = config.factory_offset();
        let mut reports_added = 0;
        for report in &reports {
            let key = (report.report_id(), report.kind().to_db_str().to_string());
            if known.contains(&key) {
                continue;
            }
            CompletedRepository::insert_report_tx(conn, &snapshot_from_report(completed.id, report, offset))?;
            reports_added += 1;
        }

        // 工序重建
        let rebuilt = rebuild_processes(&completed, &existing_processes, &reports);
        let processes_changed = !same_processes(&existing_processes, &rebuilt);
        if processes_changed {
            CompletedRepository::delete_processes_tx(conn, completed.id)?;
            for process in &rebuilt {
                CompletedRepository::insert_process_tx(conn, process)?;
            }
        }

        // 汇总重算
        let mut totals = CompletionTotals::default();
        let mut packaged_all = 0;
        let mut packaged_approved_fill = 0;
        for report in &reports {
            let (work_hours, overtime_hours, _) = report.work_time();
            totals.add_line(
                report.work_quantity(),
                report.defect_quantity(),
                work_hours,
                overtime_hours,
                report.operator(),
                report.equipment(),
            );
            if report.process_name() == config.packaging_process_name {
                let qty = report.work_quantity() + report.defect_quantity();
                packaged_all += qty;
                if report.kind().requires_approval() {
                    packaged_approved_fill += qty;
                }
            }
        }
        let totals = totals.rounded();
        let completed_quantity = packaged_all.max(packaged_approved_fill);
        let totals_changed = totals != completed.totals || completed_quantity != completed.completed_quantity;
        if totals_changed {
            CompletedRepository::update_totals_tx(conn, completed.id, completed_quantity, &totals)?;
        }

        let changed = processes_changed || totals_changed || reports_added > 0;
        if changed {
            info!(
                order = %completed.order_number,
                reports_added,
                completed_quantity,
                "完工工单已重新转移"
            );
        }
        Ok(RetransferSummary {
            completed_work_order_id: completed.id,
            processes_rebuilt: if processes_changed { rebuilt.len() } else { 0 },
            reports_added,
            completed_quantity,
            changed,
        })
    }

    /// 巡检全部在制工单（后台作业）；到达 deadline 后停止
    pub fn sweep(
        &self,
        orders: &[WorkOrder],
        now: NaiveDateTime,
        deadline: Option<Instant>,
    ) -> SweepSummary {
        let mut summary = SweepSummary::default();
        for order in orders.iter().filter(|o| o.status.is_active()) {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                summary.timed_out = true;
                warn!(examined = summary.examined, "完工巡检到达截止时间");
                break;
            }
            summary.examined += 1;
            match self.check_and_complete(order.id, now) {
                Ok(check) if check.completed => summary.completed += 1,
                Ok(_) => {}
                Err(CompletionError::WorkOrderNotFound(_)) => {}
                Err(err) => {
                    summary.failed += 1;
                    warn!(order = %order.order_number, error = %err, "完工巡检失败");
                }
            }
        }
        summary
    }

    fn publish_completed(&self, work_order_id: i64, check: &CompletionCheck, now: NaiveDateTime) {
        let Some(completed_id) = check.completed_work_order_id else {
            return;
        };
        let company = CompletedRepository::new(self.conn.clone())
            .find_by_id(completed_id)
            .ok()
            .flatten()
            .map(|c| c.company_code)
            .unwrap_or_default();
        self.events.publish(
            MesEvent::new(
                MesEventType::WorkOrderCompleted,
                &company,
                &check.order_number,
                now,
            )
            .with_work_order(work_order_id)
            .with_completed(completed_id)
            .with_source("packaging"),
        );
    }

    // ==========================================
    // 内部
    // ==========================================

    fn accumulators_tx(
        conn: &Connection,
        config: &MesConfig,
        order: &WorkOrder,
    ) -> CompletionResult<(i64, i64)> {
        let detail = ProductionRepository::packaging_sum_tx(conn, order.id, &config.packaging_process_name)?;
        let approved = ReportRepository::approved_packaging_sum_tx(
            conn,
            &order.company_code,
            &order.order_number,
            &order.product_code,
            &config.packaging_process_name,
        )?;
        Ok((detail, approved))
    }

    /// 转移到完工表并删除在制数据，返回完工工单 id
    fn transfer_tx(
        conn: &Connection,
        config: &MesConfig,
        order: &WorkOrder,
        completed_quantity: i64,
        force_reason: Option<&str>,
        now: NaiveDateTime,
    ) -> CompletionResult<i64> {
        CompletedRepository::delete_by_original_id_tx(conn, order.id)?;

        WorkOrderRepository::update_status_tx(conn, order.id, WorkOrderStatus::Completed, now)?;
        WorkOrderRepository::complete_all_processes_tx(conn, order.id, now)?;
        ProductionRepository::mark_completed_tx(conn, order.id, now)?;

        let processes = WorkOrderRepository::list_processes_tx(conn, order.id)?;
        let details = ProductionRepository::list_details_by_order_tx(conn, order.id)?;

        let mut totals = CompletionTotals::default();
        for d in &details {
            totals.add_line(
                d.work_quantity,
                d.defect_quantity,
                d.work_hours,
                d.overtime_hours,
                d.operator.as_deref(),
                d.equipment.as_deref(),
            );
        }

        let completed_id = CompletedRepository::insert_order_tx(
            conn,
            &CompletedWorkOrder {
                id: 0,
                original_workorder_id: order.id,
                company_code: order.company_code.clone(),
                order_number: order.order_number.clone(),
                product_code: order.product_code.clone(),
                quantity: order.quantity,
                completed_quantity,
                totals: totals.rounded(),
                forced: force_reason.is_some(),
                force_reason: force_reason.map(str::to_string),
                order_created_at: order.created_at,
                completed_at: now,
                transferred_at: now,
            },
        )?;

        for p in &processes {
            CompletedRepository::insert_process_tx(conn, &snapshot_process(completed_id, p, &details))?;
        }
        let offset = config.factory_offset();
        for d in &details {
            CompletedRepository::insert_report_tx(conn, &snapshot_detail(completed_id, d, offset))?;
        }

        ProductionRepository::delete_by_order_tx(conn, order.id)?;
        WorkOrderRepository::delete_processes_by_order_tx(conn, order.id)?;
        WorkOrderRepository::delete_dispatch_by_order_tx(conn, order.id)?;
        WorkOrderRepository::delete_tx(conn, order.id)?;

        info!(
            order = %order.order_number,
            completed_work_order_id = completed_id,
            completed_quantity,
            reports = details.len(),
            forced = force_reason.is_some(),
            "工单已完工转移"
        );
        Ok(completed_id)
    }
}

// ==========================================
// 快照构造
// ==========================================

/// 起讫时间转为带偏移时间戳；结束早于开始视为跨午夜
fn span_timestamps(
    date: NaiveDate,
    start: Option<NaiveTime>,
    end: Option<NaiveTime>,
    offset: FixedOffset,
) -> (Option<DateTime<FixedOffset>>, Option<DateTime<FixedOffset>>) {
    let start_at = to_offset_datetime(date, start, offset);
    let end_date = match (start, end) {
        (Some(s), Some(e)) if e < s => date + Duration::days(1),
        _ => date,
    };
    (start_at, to_offset_datetime(end_date, end, offset))
}

fn snapshot_detail(
    completed_work_order_id: i64,
    d: &ProductionDetail,
    offset: FixedOffset,
) -> CompletedProductionReport {
    let (start_at, end_at) = span_timestamps(d.report_date, d.start_time, d.end_time, offset);
    CompletedProductionReport {
        id: 0,
        completed_work_order_id,
        process_name: d.process_name.clone(),
        report_date: d.report_date,
        report_time: d.report_time,
        start_at,
        end_at,
        work_quantity: d.work_quantity,
        defect_quantity: d.defect_quantity,
        operator: d.operator.clone(),
        equipment: d.equipment.clone(),
        report_source: d.report_source,
        work_hours: d.work_hours,
        overtime_hours: d.overtime_hours,
        break_hours: d.break_hours,
        approval_status: d.approval_status,
        approved_by: d.approved_by.clone(),
        approved_at: d.approved_at,
        allocated_quantity: d.allocated_quantity,
        quantity_source: d.quantity_source,
        allocation_method: None,
        is_completed: d.is_completed,
        remarks: d.remarks.clone(),
        abnormal_notes: d.abnormal_notes.clone(),
        original_report_id: d.original_report_id,
        original_report_type: d.original_report_type,
    }
}

fn snapshot_from_report(
    completed_work_order_id: i64,
    report: &Report,
    offset: FixedOffset,
) -> CompletedProductionReport {
    let (start_at, end_at) = span_timestamps(
        report.report_date(),
        report.start_time(),
        report.end_time(),
        offset,
    );
    let (approval_status, approved_by, approved_at) = report.approval();
    let (work_hours, overtime_hours, break_hours) = report.work_time();
    CompletedProductionReport {
        id: 0,
        completed_work_order_id,
        process_name: report.process_name().to_string(),
        report_date: report.report_date(),
        report_time: report.report_time(),
        start_at,
        end_at,
        work_quantity: report.work_quantity(),
        defect_quantity: report.defect_quantity(),
        operator: report.operator().map(str::to_string),
        equipment: report.equipment().map(str::to_string),
        report_source: report.kind().report_source(),
        work_hours,
        overtime_hours,
        break_hours,
        approval_status,
        approved_by: approved_by.map(str::to_string),
        approved_at,
        allocated_quantity: 0,
        quantity_source: QuantitySource::Original,
        allocation_method: None,
        is_completed: true,
        remarks: report.remarks().map(str::to_string),
        abnormal_notes: report.abnormal_notes().map(str::to_string),
        original_report_id: Some(report.report_id()),
        original_report_type: Some(report.kind()),
    }
}

fn snapshot_process(
    completed_work_order_id: i64,
    p: &WorkOrderProcess,
    details: &[ProductionDetail],
) -> CompletedWorkOrderProcess {
    let mut operators: Vec<String> = Vec::new();
    let mut equipment: Vec<String> = Vec::new();
    for d in details.iter().filter(|d| d.process_name == p.process_name) {
        push_unique(&mut operators, d.operator.as_deref());
        push_unique(&mut equipment, d.equipment.as_deref());
    }
    CompletedWorkOrderProcess {
        id: 0,
        completed_work_order_id,
        process_name: p.process_name.clone(),
        process_order: p.step_order,
        planned_quantity: p.planned_quantity,
        completed_quantity: p.completed_quantity,
        status: ProcessStatus::Completed,
        assigned_operator: p.assigned_operator.clone(),
        assigned_equipment: p.assigned_equipment.clone(),
        actual_start_time: p.actual_start_time,
        actual_end_time: p.actual_end_time,
        operators,
        equipment,
    }
}

/// 以原始报工重建完工工序（保留既有工序的顺序、计划数量与时间）
fn rebuild_processes(
    completed: &CompletedWorkOrder,
    existing: &[CompletedWorkOrderProcess],
    reports: &[Report],
) -> Vec<CompletedWorkOrderProcess> {
    let mut rebuilt: Vec<CompletedWorkOrderProcess> = existing
        .iter()
        .map(|p| CompletedWorkOrderProcess {
            id: 0,
            completed_quantity: 0,
            operators: Vec::new(),
            equipment: Vec::new(),
            ..p.clone()
        })
        .collect();

    for report in reports {
        let idx = match rebuilt.iter().position(|p| p.process_name == report.process_name()) {
            Some(idx) => idx,
            None => {
                let next_order = rebuilt.iter().map(|p| p.process_order).max().unwrap_or(0) + 1;
                rebuilt.push(CompletedWorkOrderProcess {
                    id: 0,
                    completed_work_order_id: completed.id,
                    process_name: report.process_name().to_string(),
                    process_order: next_order,
                    planned_quantity: completed.quantity,
                    completed_quantity: 0,
                    status: ProcessStatus::Completed,
                    assigned_operator: None,
                    assigned_equipment: None,
                    actual_start_time: None,
                    actual_end_time: None,
                    operators: Vec::new(),
                    equipment: Vec::new(),
                });
                rebuilt.len() - 1
            }
        };
        let p = &mut rebuilt[idx];
        p.completed_quantity += report.work_quantity();
        push_unique(&mut p.operators, report.operator());
        push_unique(&mut p.equipment, report.equipment());
    }

    for p in &mut rebuilt {
        p.completed_quantity = p.completed_quantity.min(p.planned_quantity);
    }
    rebuilt
}

fn same_processes(a: &[CompletedWorkOrderProcess], b: &[CompletedWorkOrderProcess]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| {
            x.process_name == y.process_name
                && x.process_order == y.process_order
                && x.planned_quantity == y.planned_quantity
                && x.completed_quantity == y.completed_quantity
                && x.operators == y.operators
                && x.equipment == y.equipment
        })
}

fn push_unique(list: &mut Vec<String>, value: Option<&str>) {
    if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
        if !list.iter().any(|x| x == v) {
            list.push(v.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_timestamps_cross_midnight() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        let (s, e) = span_timestamps(
            date,
            NaiveTime::from_hms_opt(22, 0, 0),
            NaiveTime::from_hms_opt(2, 0, 0),
            FixedOffset::east_opt(8 * 3600).unwrap(),
        );
        assert_eq!(s.unwrap().to_rfc3339(), "2025-03-03T22:00:00+08:00");
        assert_eq!(e.unwrap().to_rfc3339(), "2025-03-04T02:00:00+08:00");
    }

    #[test]
    fn test_rebuild_caps_at_planned_and_appends_unknown_process() {
        let now = NaiveDate::from_ymd_opt(2025, 3, 3)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let completed = CompletedWorkOrder {
            id: 7,
            original_workorder_id: 1,
            company_code: "01".to_string(),
            order_number: "WO-01-202503001".to_string(),
            product_code: "PFP-X".to_string(),
            quantity: 100,
            completed_quantity: 100,
            totals: CompletionTotals::default(),
            forced: false,
            force_reason: None,
            order_created_at: now,
            completed_at: now,
            transferred_at: now,
        };
        let existing = vec![CompletedWorkOrderProcess {
            id: 3,
            completed_work_order_id: 7,
            process_name: "SMT".to_string(),
            process_order: 1,
            planned_quantity: 100,
            completed_quantity: 100,
            status: ProcessStatus::Completed,
            assigned_operator: Some("OP1".to_string()),
            assigned_equipment: None,
            actual_start_time: Some(now),
            actual_end_time: Some(now),
            operators: vec!["OP1".to_string()],
            equipment: Vec::new(),
        }];
        let onsite = |process: &str, qty: i64| {
            Report::OnSite(crate::domain::report::OnsiteReport {
                id: 1,
                company_code: "01".to_string(),
                order_number: "WO-01-202503001".to_string(),
                product_code: "PFP-X".to_string(),
                process_name: process.to_string(),
                report_date: now.date(),
                report_time: now.time(),
                start_time: None,
                end_time: None,
                operator: Some("OP1".to_string()),
                equipment: None,
                production_line: None,
                work_quantity: qty,
                defect_quantity: 0,
                remarks: None,
                abnormal_notes: None,
                work_hours: 0.0,
                overtime_hours: 0.0,
                break_hours: 0.0,
                link_status: crate::domain::types::LinkStatus::Linked,
                created_at: now,
            })
        };
        let reports = vec![onsite("SMT", 80), onsite("SMT", 40), onsite("出貨包裝", 100)];
        let rebuilt = rebuild_processes(&completed, &existing, &reports);
        assert_eq!(rebuilt.len(), 2);
        assert_eq!(rebuilt[0].completed_quantity, 100);
        assert_eq!(rebuilt[0].actual_start_time, Some(now));
        assert_eq!(rebuilt[1].process_name, "出貨包裝");
        assert_eq!(rebuilt[1].process_order, 2);
    }
}
