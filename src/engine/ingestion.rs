// ==========================================
// 制造执行系统 (MES) - 报工入账
// ==========================================
// 审核通过（现场报工为建立时）即入账，单事务完成:
//   1. 写回工时 → 2. 按来源键 upsert 生产明细
//   3. 刷新生产记录与工序累计 → 4. 完工检查
// 工单不存在: 已完工则重新转移，否则保留为待关联
// 工时计算在取锁之前完成（行事历查询会自行加锁）
// ==========================================

use crate::config::MesConfig;
use crate::db::{begin_immediate, SharedConnection};
use crate::domain::report::{NewReport, Report, ReportView};
use crate::domain::types::{LinkStatus, ProcessStatus, ReportKind, WorkOrderStatus};
use crate::domain::work_order::NewProductionDetail;
use crate::engine::completion::{CompletionCheck, CompletionEngine, RetransferSummary};
use crate::engine::error::{IngestionError, IngestionResult};
use crate::engine::events::{MesEvent, MesEventType, OptionalEventPublisher};
use crate::engine::work_time::{WorkTimeBreakdown, WorkTimeCalculator};
use crate::i18n::t_with_args;
use crate::repository::{
    CompletedRepository, ProductionRepository, ReportRepository, RepositoryError,
    WorkOrderRepository,
};
use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

/// 报工提交结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmittedReport {
    pub kind: ReportKind,
    pub report_id: i64,
    /// 同一作业员同日时段重叠的提示（报工仍被接受）
    pub conflicts: Vec<String>,
    /// 现场报工立即入账的结果
    pub ingestion: Option<IngestionOutcome>,
}

/// 单笔报工入账结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionOutcome {
    pub kind: ReportKind,
    pub report_id: i64,
    pub link_status: LinkStatus,
    pub work_order_id: Option<i64>,
    pub detail_id: Option<i64>,
    pub detail_inserted: bool,
    pub work_time: WorkTimeBreakdown,
    pub completion: Option<CompletionCheck>,
    pub retransfer: Option<RetransferSummary>,
}

impl IngestionOutcome {
    pub fn completed(&self) -> bool {
        self.completion.as_ref().map(|c| c.completed).unwrap_or(false)
    }
}

/// 待关联报工重新关联结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelinkSummary {
    pub examined: usize,
    pub linked: usize,
    pub still_pending: usize,
    pub failed: usize,
}

// ==========================================
// ReportIngestion
// ==========================================
pub struct ReportIngestion {
    conn: SharedConnection,
    calculator: WorkTimeCalculator,
    config: MesConfig,
    events: OptionalEventPublisher,
}

impl ReportIngestion {
    pub fn new(
        conn: SharedConnection,
        calculator: WorkTimeCalculator,
        config: MesConfig,
        events: OptionalEventPublisher,
    ) -> Self {
        Self {
            conn,
            calculator,
            config,
            events,
        }
    }

    fn get_conn(&self) -> IngestionResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| IngestionError::Repository(RepositoryError::LockError(e.to_string())))
    }

    /// 提交补登报工（作业员 / SMT），待审核
    #[instrument(skip(self, report), fields(order = %report.order_number, process = %report.process_name))]
    pub fn submit_fill_work(
        &self,
        kind: ReportKind,
        report: &NewReport,
        now: NaiveDateTime,
    ) -> IngestionResult<SubmittedReport> {
        if !kind.requires_approval() {
            return Err(IngestionError::InvalidInput(format!(
                "{} 不是补登报工",
                kind.to_db_str()
            )));
        }
        report.validate().map_err(IngestionError::InvalidInput)?;

        let (report_id, conflicts) = {
            let conn = self.get_conn()?;
            let tx = begin_immediate(&conn)?;
            let id = ReportRepository::insert_fill_work_tx(&tx, kind, report, now)?;
            let conflicts = operator_overlaps_tx(&tx, kind, id, report)?;
            tx.commit()?;
            (id, conflicts)
        };

        if !conflicts.is_empty() {
            warn!(report_id, conflicts = conflicts.len(), "报工时段与既有报工重叠");
        }
        info!(report_id, kind = kind.to_db_str(), "补登报工已提交，待审核");
        Ok(SubmittedReport {
            kind,
            report_id,
            conflicts,
            ingestion: None,
        })
    }

    /// 提交现场报工（免审核，立即入账）
    #[instrument(skip(self, report), fields(order = %report.order_number, process = %report.process_name))]
    pub fn submit_onsite(
        &self,
        report: &NewReport,
        now: NaiveDateTime,
    ) -> IngestionResult<SubmittedReport> {
        report.validate().map_err(IngestionError::InvalidInput)?;

        let (report_id, conflicts) = {
            let conn = self.get_conn()?;
            let tx = begin_immediate(&conn)?;
            let id = ReportRepository::insert_onsite_tx(&tx, report, now)?;
            let conflicts = operator_overlaps_tx(&tx, ReportKind::Onsite, id, report)?;
            tx.commit()?;
            (id, conflicts)
        };

        let outcome = self.ingest(ReportKind::Onsite, report_id, now)?;
        Ok(SubmittedReport {
            kind: ReportKind::Onsite,
            report_id,
            conflicts,
            ingestion: Some(outcome),
        })
    }

    /// 审核通过并入账
    #[instrument(skip(self))]
    pub fn approve(
        &self,
        report_id: i64,
        approver: &str,
        now: NaiveDateTime,
    ) -> IngestionResult<IngestionOutcome> {
        let report = self.load_pending(report_id)?;
        let kind = report.kind();
        let work_time = self.calculator.calculate_for(&report)?;

        let outcome = {
            let conn = self.get_conn()?;
            let tx = begin_immediate(&conn)?;
            if !ReportRepository::approve_tx(&tx, report_id, approver, now)? {
                return Err(already_approved(&report));
            }
            let outcome = Self::ingest_tx(&tx, &self.config, kind, report_id, work_time, now)?;
            tx.commit()?;
            outcome
        };

        info!(report_id, approver, link = outcome.link_status.to_db_str(), "补登报工已审核");
        self.publish(&report, &outcome, now);
        Ok(outcome)
    }

    /// 驳回（不入账）
    pub fn reject(&self, report_id: i64, approver: &str, now: NaiveDateTime) -> IngestionResult<()> {
        let report = self.load_pending(report_id)?;
        let conn = self.get_conn()?;
        if !ReportRepository::reject_tx(&conn, report_id, approver, now)? {
            return Err(already_approved(&report));
        }
        info!(report_id, approver, "补登报工已驳回");
        Ok(())
    }

    /// 入账一笔已生效的报工（现场报工 / 已审核补登的重新同步）
    #[instrument(skip(self))]
    pub fn ingest(
        &self,
        kind: ReportKind,
        report_id: i64,
        now: NaiveDateTime,
    ) -> IngestionResult<IngestionOutcome> {
        let report = ReportRepository::new(self.conn.clone())
            .find(kind, report_id)?
            .ok_or_else(|| not_found(kind, report_id))?;
        let work_time = self.calculator.calculate_for(&report)?;

        let outcome = {
            let conn = self.get_conn()?;
            let tx = begin_immediate(&conn)?;
            let outcome = Self::ingest_tx(&tx, &self.config, kind, report_id, work_time, now)?;
            tx.commit()?;
            outcome
        };
        self.publish(&report, &outcome, now);
        Ok(outcome)
    }

    /// 重新关联待关联报工（工单建立后调用）
    pub fn relink_pending(&self, now: NaiveDateTime) -> IngestionResult<RelinkSummary> {
        let pending = ReportRepository::new(self.conn.clone()).list_pending_link()?;
        let mut summary = RelinkSummary {
            examined: pending.len(),
            ..Default::default()
        };
        for report in pending {
            match self.ingest(report.kind(), report.report_id(), now) {
                Ok(outcome) if outcome.link_status == LinkStatus::PendingLink => {
                    summary.still_pending += 1
                }
                Ok(_) => summary.linked += 1,
                Err(err) => {
                    summary.failed += 1;
                    warn!(
                        report_id = report.report_id(),
                        kind = report.kind().to_db_str(),
                        error = %err,
                        "待关联报工重新关联失败"
                    );
                }
            }
        }
        if summary.linked > 0 {
            info!(linked = summary.linked, still_pending = summary.still_pending, "待关联报工已重新关联");
        }
        Ok(summary)
    }

    /// 事务内入账；补登报工必须已审核
    pub fn ingest_tx(
        conn: &Connection,
        config: &MesConfig,
        kind: ReportKind,
        report_id: i64,
        work_time: WorkTimeBreakdown,
        now: NaiveDateTime,
    ) -> IngestionResult<IngestionOutcome> {
        ReportRepository::update_work_time_tx(
            conn,
            kind,
            report_id,
            work_time.regular,
            work_time.overtime,
            work_time.break_hours,
        )?;
        let report = ReportRepository::find_tx(conn, kind, report_id)?
            .ok_or_else(|| not_found(kind, report_id))?;
        let (approval_status, _, _) = report.approval();
        if !approval_status.is_approved() {
            return Err(IngestionError::InvalidInput(format!(
                "报工 #{} 尚未审核，不能入账",
                report_id
            )));
        }

        let mut outcome = IngestionOutcome {
            kind,
            report_id,
            link_status: LinkStatus::PendingLink,
            work_order_id: None,
            detail_id: None,
            detail_inserted: false,
            work_time,
            completion: None,
            retransfer: None,
        };

        let order = WorkOrderRepository::find_by_key_tx(
            conn,
            report.company_code(),
            report.order_number(),
            report.product_code(),
        )?;

        let Some(order) = order else {
            // 已完工转移的工单: 重新转移
            let completed = CompletedRepository::find_by_number_tx(
                conn,
                report.company_code(),
                report.order_number(),
            )?
            .filter(|c| c.product_code == report.product_code());
            if let Some(completed) = completed {
                outcome.retransfer = Some(CompletionEngine::retransfer_tx(conn, config, completed.id)?);
                outcome.link_status = LinkStatus::LinkedCompleted;
            }
            ReportRepository::set_link_status_tx(conn, kind, report_id, outcome.link_status)?;
            return Ok(outcome);
        };

        // 首笔报工即视为开工
        let status = if order.status == WorkOrderStatus::Pending {
            WorkOrderRepository::update_status_tx(conn, order.id, WorkOrderStatus::InProgress, now)?;
            WorkOrderStatus::InProgress
        } else {
            order.status
        };
        let record_id = ProductionRepository::ensure_record_tx(conn, order.id, status, now)?;
        ProductionRepository::set_record_status_tx(conn, order.id, status, now)?;

        let upsert = ProductionRepository::upsert_detail_tx(conn, record_id, &detail_from_report(&report), now)?;
        outcome.work_order_id = Some(order.id);
        outcome.detail_id = Some(upsert.detail_id);
        outcome.detail_inserted = upsert.inserted;

        ProductionRepository::refresh_record_counters_tx(conn, order.id, now)?;
        refresh_process_progress_tx(conn, order.id)?;

        let check = CompletionEngine::check_and_complete_tx(conn, config, order.id, now)?;
        outcome.link_status = if check.completed {
            LinkStatus::LinkedCompleted
        } else {
            LinkStatus::Linked
        };
        outcome.completion = Some(check);
        ReportRepository::set_link_status_tx(conn, kind, report_id, outcome.link_status)?;
        Ok(outcome)
    }

    fn load_pending(&self, report_id: i64) -> IngestionResult<Report> {
        let report = ReportRepository::new(self.conn.clone())
            .find(ReportKind::OperatorSupplement, report_id)?
            .ok_or_else(|| not_found(ReportKind::OperatorSupplement, report_id))?;
        let (status, _, _) = report.approval();
        if !status.is_pending() {
            return Err(already_approved(&report));
        }
        Ok(report)
    }

    fn publish(&self, report: &Report, outcome: &IngestionOutcome, now: NaiveDateTime) {
        let mut event = MesEvent::new(
            MesEventType::ReportIngested,
            report.company_code(),
            report.order_number(),
            now,
        )
        .with_source(report.kind().to_db_str());
        if let Some(id) = outcome.work_order_id {
            event = event.with_work_order(id);
        }
        self.events.publish(event);

        if let Some(completed_id) = outcome
            .completion
            .as_ref()
            .and_then(|c| c.completed_work_order_id)
        {
            let mut event = MesEvent::new(
                MesEventType::WorkOrderCompleted,
                report.company_code(),
                report.order_number(),
                now,
            )
            .with_completed(completed_id)
            .with_source("packaging");
            if let Some(id) = outcome.work_order_id {
                event = event.with_work_order(id);
            }
            self.events.publish(event);
        }
        if let Some(summary) = outcome.retransfer.as_ref().filter(|s| s.changed) {
            self.events.publish(
                MesEvent::new(
                    MesEventType::WorkOrderRetransferred,
                    report.company_code(),
                    report.order_number(),
                    now,
                )
                .with_completed(summary.completed_work_order_id),
            );
        }
    }
}

// ==========================================
// 内部
// ==========================================

fn not_found(kind: ReportKind, id: i64) -> IngestionError {
    IngestionError::NotFound {
        kind: kind.to_db_str().to_string(),
        id,
    }
}

fn already_approved(report: &Report) -> IngestionError {
    let (status, _, _) = report.approval();
    IngestionError::AlreadyApproved {
        kind: report.kind().to_db_str().to_string(),
        id: report.report_id(),
        status: status.to_db_str().to_string(),
    }
}

fn detail_from_report(report: &Report) -> NewProductionDetail {
    let (approval_status, approved_by, approved_at) = report.approval();
    let (work_hours, overtime_hours, break_hours) = report.work_time();
    NewProductionDetail {
        process_name: report.process_name().to_string(),
        report_date: report.report_date(),
        report_time: report.report_time(),
        start_time: report.start_time(),
        end_time: report.end_time(),
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
        remarks: report.remarks().map(str::to_string),
        abnormal_notes: report.abnormal_notes().map(str::to_string),
        original_report_id: Some(report.report_id()),
        original_report_type: Some(report.kind()),
    }
}

/// 工序完成数量 = 该工序明细良品合计，以计划数量为上限
fn refresh_process_progress_tx(conn: &Connection, work_order_id: i64) -> IngestionResult<()> {
    let sums = ProductionRepository::process_work_sums_tx(conn, work_order_id)?;
    for process in WorkOrderRepository::list_processes_tx(conn, work_order_id)? {
        let done = sums
            .get(&process.process_name)
            .copied()
            .unwrap_or(0)
            .min(process.planned_quantity);
        let status = if process.planned_quantity > 0 && done >= process.planned_quantity {
            ProcessStatus::Completed
        } else if done > 0 && process.status == ProcessStatus::Pending {
            ProcessStatus::InProgress
        } else {
            process.status
        };
        if done != process.completed_quantity || status != process.status {
            WorkOrderRepository::update_process_progress_tx(conn, process.id, done, status)?;
        }
    }
    Ok(())
}

/// 同一作业员同日时段重叠的报工
fn operator_overlaps_tx(
    conn: &Connection,
    kind: ReportKind,
    report_id: i64,
    report: &NewReport,
) -> IngestionResult<Vec<String>> {
    let (Some(operator), Some(start), Some(end)) =
        (report.operator.as_deref(), report.start_time, report.end_time)
    else {
        return Ok(Vec::new());
    };
    let overlaps = ReportRepository::find_operator_overlaps_tx(
        conn,
        operator,
        report.report_date,
        start,
        end,
        Some((kind, report_id)),
    )?;
    let date = report.report_date.format("%Y-%m-%d").to_string();
    Ok(overlaps
        .iter()
        .map(|o| {
            let other = format!(
                "{} ({}~{})",
                o.report_id,
                o.start_time.format("%H:%M"),
                o.end_time.format("%H:%M")
            );
            t_with_args(
                "report.conflict.operator_overlap",
                &[
                    ("operator", operator),
                    ("date", date.as_str()),
                    ("other", other.as_str()),
                ],
            )
        })
        .collect())
}
