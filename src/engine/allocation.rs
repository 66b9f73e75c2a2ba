// ==========================================
// 制造执行系统 (MES) - 自动分配
// ==========================================
// 同一工单同一工序的报工跨多日、但数量集中在某一笔时，
// 按每笔工时比例把合计数量分摊到各日明细（allocated_quantity）
// 取整余数计入最后一天
// 仅末日计量的工序（关键字配置）不分摊
// ==========================================

use crate::config::MesConfig;
use crate::db::{begin_immediate, SharedConnection};
use crate::domain::allocation::{AllocationRunSummary, AllocationTarget, AutoAllocationSettings};
use crate::domain::completed::ALLOCATION_METHOD_PROPORTIONAL_HOURS;
use crate::domain::types::QuantitySource;
use crate::engine::error::{JobError, JobResult};
use crate::repository::{
    AllocationRepository, CompletedRepository, ProductionRepository, RepositoryError,
};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// 参与分配的一行（明细或完工报工）
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationRow {
    pub id: i64,
    pub report_date: NaiveDate,
    pub work_quantity: i64,
    pub hours: f64,
    pub allocated: bool,
}

/// 一组的分配方案
#[derive(Debug, Clone, PartialEq)]
pub struct GroupPlan {
    /// 携带汇总数量的来源行
    pub source_id: i64,
    pub target_ids: Vec<i64>,
    pub quantities: Vec<i64>,
}

/// 按权重比例分摊整数数量，余数计入最后一项
pub fn allocate_proportional(total: i64, weights: &[f64]) -> Vec<i64> {
    let sum: f64 = weights.iter().filter(|w| **w > 0.0).sum();
    if weights.is_empty() || sum <= 0.0 {
        return vec![0; weights.len()];
    }
    let mut shares: Vec<i64> = weights
        .iter()
        .map(|w| ((total as f64) * w.max(0.0) / sum).floor() as i64)
        .collect();
    let assigned: i64 = shares.iter().sum();
    if let Some(last) = shares.last_mut() {
        *last += total - assigned;
    }
    shares
}

/// 计算一组（同工单同工序）的分配方案；不需要分配时返回 None
pub fn plan_group(rows: &[AllocationRow]) -> Option<GroupPlan> {
    if rows.len() < 2 || rows.iter().all(|r| r.allocated) {
        return None;
    }
    let mut sorted: Vec<&AllocationRow> = rows.iter().collect();
    sorted.sort_by_key(|r| (r.report_date, r.id));

    let days = sorted
        .iter()
        .map(|r| r.report_date)
        .collect::<std::collections::BTreeSet<_>>()
        .len();
    // 需跨日，且存在有工时无数量的行
    if days < 2 || !sorted.iter().any(|r| r.work_quantity == 0 && r.hours > 0.0) {
        return None;
    }
    let total: i64 = sorted.iter().map(|r| r.work_quantity).sum();
    if total <= 0 {
        return None;
    }
    let weights: Vec<f64> = sorted.iter().map(|r| r.hours).collect();
    if weights.iter().all(|w| *w <= 0.0) {
        return None;
    }

    let source = sorted
        .iter()
        .max_by_key(|r| (r.work_quantity, r.report_date, r.id))?;
    Some(GroupPlan {
        source_id: source.id,
        target_ids: sorted.iter().map(|r| r.id).collect(),
        quantities: allocate_proportional(total, &weights),
    })
}

// ==========================================
// AllocationEngine
// ==========================================
pub struct AllocationEngine {
    conn: SharedConnection,
    config: MesConfig,
    repo: AllocationRepository,
}

impl AllocationEngine {
    pub fn new(conn: SharedConnection, config: MesConfig) -> Self {
        let repo = AllocationRepository::new(conn.clone());
        Self { conn, config, repo }
    }

    pub fn settings(&self) -> JobResult<AutoAllocationSettings> {
        Ok(self.repo.load_settings()?)
    }

    pub fn save_settings(&self, settings: &AutoAllocationSettings) -> JobResult<()> {
        self.repo.save_settings(settings)?;
        info!(
            enabled = settings.enabled,
            interval = settings.interval_minutes,
            "自动分配设置已更新"
        );
        Ok(())
    }

    /// 定时执行入口: 检查开关与执行窗口；窗口外返回 None
    #[instrument(skip(self))]
    pub fn run_scheduled(&self, now: NaiveDateTime) -> JobResult<Option<AllocationRunSummary>> {
        let settings = self.settings()?;
        if !settings.enabled || !settings.in_window(now.time()) {
            debug!(enabled = settings.enabled, "自动分配不在执行窗口内，跳过");
            return Ok(None);
        }
        self.run(&settings, now).map(Some)
    }

    /// 立即执行（忽略执行窗口）
    pub fn run(
        &self,
        settings: &AutoAllocationSettings,
        now: NaiveDateTime,
    ) -> JobResult<AllocationRunSummary> {
        let deadline =
            Instant::now() + Duration::from_secs(u64::from(settings.max_execution_minutes) * 60);
        let mut summary = AllocationRunSummary::default();
        if settings.auto_allocation_enabled {
            self.allocate_active(now, deadline, &mut summary)?;
        }
        if settings.completed_allocation_enabled && !summary.timed_out {
            self.allocate_completed(now, deadline, &mut summary)?;
        }
        if summary.timed_out {
            warn!(
                max_minutes = settings.max_execution_minutes,
                allocated = summary.groups_allocated,
                "自动分配超时，剩余分组留待下次执行"
            );
        }
        info!(
            examined = summary.groups_examined,
            allocated = summary.groups_allocated,
            rows = summary.rows_updated,
            "自动分配完成"
        );
        Ok(summary)
    }

    /// 在制工单的生产明细
    fn allocate_active(
        &self,
        now: NaiveDateTime,
        deadline: Instant,
        summary: &mut AllocationRunSummary,
    ) -> JobResult<()> {
        let details = ProductionRepository::new(self.conn.clone()).list_details_of_active_orders()?;
        let mut groups: BTreeMap<(i64, String), Vec<AllocationRow>> = BTreeMap::new();
        for d in details {
            groups
                .entry((d.work_order_id, d.detail.process_name.clone()))
                .or_default()
                .push(AllocationRow {
                    id: d.detail.id,
                    report_date: d.detail.report_date,
                    work_quantity: d.detail.work_quantity,
                    hours: d.detail.work_hours + d.detail.overtime_hours,
                    allocated: d.detail.quantity_source == QuantitySource::Allocated,
                });
        }

        let write = |conn: &Connection, plan: &GroupPlan| -> Result<(), RepositoryError> {
            for (id, qty) in plan.target_ids.iter().zip(&plan.quantities) {
                ProductionRepository::update_allocation_tx(conn, *id, *qty, now)?;
            }
            Ok(())
        };
        self.apply_groups(groups, AllocationTarget::ProductionDetail, now, deadline, summary, write)
    }

    /// 完工报工快照
    fn allocate_completed(
        &self,
        now: NaiveDateTime,
        deadline: Instant,
        summary: &mut AllocationRunSummary,
    ) -> JobResult<()> {
        let reports = CompletedRepository::new(self.conn.clone()).list_unallocated_reports()?;
        let mut groups: BTreeMap<(i64, String), Vec<AllocationRow>> = BTreeMap::new();
        for r in reports {
            groups
                .entry((r.completed_work_order_id, r.report.process_name.clone()))
                .or_default()
                .push(AllocationRow {
                    id: r.report.id,
                    report_date: r.report.report_date,
                    work_quantity: r.report.work_quantity,
                    hours: r.report.work_hours + r.report.overtime_hours,
                    allocated: false,
                });
        }

        let write = |conn: &Connection, plan: &GroupPlan| -> Result<(), RepositoryError> {
            for (id, qty) in plan.target_ids.iter().zip(&plan.quantities) {
                CompletedRepository::update_report_allocation_tx(
                    conn,
                    *id,
                    *qty,
                    ALLOCATION_METHOD_PROPORTIONAL_HOURS,
                )?;
            }
            Ok(())
        };
        self.apply_groups(groups, AllocationTarget::CompletedReport, now, deadline, summary, write)
    }

    fn apply_groups<F>(
        &self,
        groups: BTreeMap<(i64, String), Vec<AllocationRow>>,
        target: AllocationTarget,
        now: NaiveDateTime,
        deadline: Instant,
        summary: &mut AllocationRunSummary,
        write: F,
    ) -> JobResult<()>
    where
        F: Fn(&Connection, &GroupPlan) -> Result<(), RepositoryError>,
    {
        for ((owner_id, process_name), rows) in groups {
            if Instant::now() >= deadline {
                summary.timed_out = true;
                break;
            }
            summary.groups_examined += 1;
            if self.config.is_final_day_only(&process_name) {
                summary.skipped_final_day_only += 1;
                continue;
            }
            let Some(plan) = plan_group(&rows) else {
                continue;
            };

            let conn = self
                .conn
                .lock()
                .map_err(|e| JobError::Repository(RepositoryError::LockError(e.to_string())))?;
            let tx = begin_immediate(&conn)?;
            write(&*tx, &plan)?;
            AllocationRepository::insert_log_tx(
                &tx,
                plan.source_id,
                target,
                ALLOCATION_METHOD_PROPORTIONAL_HOURS,
                &plan.quantities,
                &plan.target_ids,
                now,
            )?;
            tx.commit()?;

            summary.groups_allocated += 1;
            summary.rows_updated += plan.target_ids.len();
            debug!(
                owner_id,
                process = %process_name,
                target = target.to_db_str(),
                quantities = ?plan.quantities,
                "分组已分配"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, day: u32, qty: i64, hours: f64) -> AllocationRow {
        AllocationRow {
            id,
            report_date: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
            work_quantity: qty,
            hours,
            allocated: false,
        }
    }

    #[test]
    fn test_proportional_residual_on_last() {
        assert_eq!(allocate_proportional(100, &[1.0, 1.0, 1.0]), vec![33, 33, 34]);
        assert_eq!(allocate_proportional(10, &[8.0, 2.0]), vec![8, 2]);
        assert_eq!(allocate_proportional(10, &[0.0, 0.0]), vec![0, 0]);
    }

    #[test]
    fn test_plan_spreads_aggregate_by_hours() {
        let rows = vec![row(3, 5, 300, 8.0), row(1, 3, 0, 8.0), row(2, 4, 0, 4.0)];
        let plan = plan_group(&rows).unwrap();
        assert_eq!(plan.source_id, 3);
        assert_eq!(plan.target_ids, vec![1, 2, 3]);
        assert_eq!(plan.quantities, vec![120, 60, 120]);
        assert_eq!(plan.quantities.iter().sum::<i64>(), 300);
    }

    #[test]
    fn test_plan_skips_single_day_and_fully_reported_groups() {
        // 同一天
        assert!(plan_group(&[row(1, 3, 0, 4.0), row(2, 3, 100, 4.0)]).is_none());
        // 每天都有数量
        assert!(plan_group(&[row(1, 3, 50, 4.0), row(2, 4, 50, 4.0)]).is_none());
        // 已分配
        let mut done = vec![row(1, 3, 0, 4.0), row(2, 4, 100, 4.0)];
        for r in &mut done {
            r.allocated = true;
        }
        assert!(plan_group(&done).is_none());
    }
}
