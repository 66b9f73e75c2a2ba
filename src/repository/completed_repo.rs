// ==========================================
// 制造执行系统 (MES) - 完工快照仓储
// ==========================================
// 只由完工引擎在事务内写入；对外只读
// ==========================================

use crate::db::SharedConnection;
use crate::domain::completed::{
    CompletedProductionReport, CompletedWorkOrder, CompletedWorkOrderProcess, CompletionTotals,
};
use crate::domain::types::{ApprovalStatus, ProcessStatus, QuantitySource, ReportKind, ReportSource};
use crate::repository::codec::{
    fmt_date, fmt_datetime, fmt_time, get_date, get_datetime, get_json, get_opt_datetime,
    get_opt_rfc3339, get_time, to_json,
};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};

const ORDER_COLUMNS: &str = r#"
    id, original_workorder_id, company_code, order_number, product_code, quantity,
    completed_quantity, total_good_quantity, total_defect_quantity, total_work_hours,
    total_overtime_hours, total_all_hours, total_report_count, unique_operators,
    unique_equipment, forced, force_reason, order_created_at, completed_at, transferred_at
"#;

const PROCESS_COLUMNS: &str = r#"
    id, completed_work_order_id, process_name, process_order, planned_quantity,
    completed_quantity, status, assigned_operator, assigned_equipment, actual_start_time,
    actual_end_time, operators, equipment
"#;

const REPORT_COLUMNS: &str = r#"
    id, completed_work_order_id, process_name, report_date, report_time, start_at, end_at,
    work_quantity, defect_quantity, operator, equipment, report_source, work_hours,
    overtime_hours, break_hours, approval_status, approved_by, approved_at, allocated_quantity,
    quantity_source, allocation_method, is_completed, remarks, abnormal_notes,
    original_report_id, original_report_type
"#;

/// 带所属工单号的完工报工（完工分配作业整批读取用）
#[derive(Debug, Clone)]
pub struct CompletedReportWithOrder {
    pub completed_work_order_id: i64,
    pub report: CompletedProductionReport,
}

// ==========================================
// CompletedRepository - 完工快照仓储
// ==========================================
pub struct CompletedRepository {
    conn: SharedConnection,
}

impl CompletedRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_order(row: &Row<'_>) -> SqliteResult<CompletedWorkOrder> {
        Ok(CompletedWorkOrder {
            id: row.get(0)?,
            original_workorder_id: row.get(1)?,
            company_code: row.get(2)?,
            order_number: row.get(3)?,
            product_code: row.get(4)?,
            quantity: row.get(5)?,
            completed_quantity: row.get(6)?,
            totals: CompletionTotals {
                total_good_quantity: row.get(7)?,
                total_defect_quantity: row.get(8)?,
                total_work_hours: row.get(9)?,
                total_overtime_hours: row.get(10)?,
                total_all_hours: row.get(11)?,
                total_report_count: row.get(12)?,
                unique_operators: get_json(row, 13)?,
                unique_equipment: get_json(row, 14)?,
            },
            forced: row.get::<_, i64>(15)? != 0,
            force_reason: row.get(16)?,
            order_created_at: get_datetime(row, 17)?,
            completed_at: get_datetime(row, 18)?,
            transferred_at: get_datetime(row, 19)?,
        })
    }

    fn map_process(row: &Row<'_>) -> SqliteResult<CompletedWorkOrderProcess> {
        Ok(CompletedWorkOrderProcess {
            id: row.get(0)?,
            completed_work_order_id: row.get(1)?,
            process_name: row.get(2)?,
            process_order: row.get(3)?,
            planned_quantity: row.get(4)?,
            completed_quantity: row.get(5)?,
            status: ProcessStatus::from_str(&row.get::<_, String>(6)?),
            assigned_operator: row.get(7)?,
            assigned_equipment: row.get(8)?,
            actual_start_time: get_opt_datetime(row, 9)?,
            actual_end_time: get_opt_datetime(row, 10)?,
            operators: get_json(row, 11)?,
            equipment: get_json(row, 12)?,
        })
    }

    fn map_report(row: &Row<'_>) -> SqliteResult<CompletedProductionReport> {
        Ok(CompletedProductionReport {
            id: row.get(0)?,
            completed_work_order_id: row.get(1)?,
            process_name: row.get(2)?,
            report_date: get_date(row, 3)?,
            report_time: get_time(row, 4)?,
            start_at: get_opt_rfc3339(row, 5)?,
            end_at: get_opt_rfc3339(row, 6)?,
            work_quantity: row.get(7)?,
            defect_quantity: row.get(8)?,
            operator: row.get(9)?,
            equipment: row.get(10)?,
            report_source: ReportSource::from_str(&row.get::<_, String>(11)?),
            work_hours: row.get(12)?,
            overtime_hours: row.get(13)?,
            break_hours: row.get(14)?,
            approval_status: ApprovalStatus::from_str(&row.get::<_, String>(15)?),
            approved_by: row.get(16)?,
            approved_at: get_opt_datetime(row, 17)?,
            allocated_quantity: row.get(18)?,
            quantity_source: QuantitySource::from_str(&row.get::<_, String>(19)?),
            allocation_method: row.get(20)?,
            is_completed: row.get::<_, i64>(21)? != 0,
            remarks: row.get(22)?,
            abnormal_notes: row.get(23)?,
            original_report_id: row.get(24)?,
            original_report_type: row
                .get::<_, Option<String>>(25)?
                .as_deref()
                .map(ReportKind::from_str),
        })
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    /// 删除同一原工单的既有快照（级联删除工序/报工快照）
    pub fn delete_by_original_id_tx(conn: &Connection, original_workorder_id: i64) -> RepositoryResult<usize> {
        Ok(conn.execute(
            "DELETE FROM completed_work_order WHERE original_workorder_id = ?1",
            params![original_workorder_id],
        )?)
    }

    pub fn insert_order_tx(conn: &Connection, order: &CompletedWorkOrder) -> RepositoryResult<i64> {
        conn.execute(
            r#"
            INSERT INTO completed_work_order (
                original_workorder_id, company_code, order_number, product_code, quantity,
                completed_quantity, total_good_quantity, total_defect_quantity, total_work_hours,
                total_overtime_hours, total_all_hours, total_report_count, unique_operators,
                unique_equipment, forced, force_reason, order_created_at, completed_at,
                transferred_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
            "#,
            params![
                order.original_workorder_id,
                order.company_code,
                order.order_number,
                order.product_code,
                order.quantity,
                order.completed_quantity,
                order.totals.total_good_quantity,
                order.totals.total_defect_quantity,
                order.totals.total_work_hours,
                order.totals.total_overtime_hours,
                order.totals.total_all_hours,
                order.totals.total_report_count,
                to_json(&order.totals.unique_operators),
                to_json(&order.totals.unique_equipment),
                order.forced as i64,
                order.force_reason,
                fmt_datetime(order.order_created_at),
                fmt_datetime(order.completed_at),
                fmt_datetime(order.transferred_at),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_process_tx(conn: &Connection, process: &CompletedWorkOrderProcess) -> RepositoryResult<i64> {
        conn.execute(
            r#"
            INSERT INTO completed_work_order_process (
                completed_work_order_id, process_name, process_order, planned_quantity,
                completed_quantity, status, assigned_operator, assigned_equipment,
                actual_start_time, actual_end_time, operators, equipment
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                process.completed_work_order_id,
                process.process_name,
                process.process_order,
                process.planned_quantity,
                process.completed_quantity,
                process.status.to_db_str(),
                process.assigned_operator,
                process.assigned_equipment,
                process.actual_start_time.map(fmt_datetime),
                process.actual_end_time.map(fmt_datetime),
                to_json(&process.operators),
                to_json(&process.equipment),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_report_tx(conn: &Connection, report: &CompletedProductionReport) -> RepositoryResult<i64> {
        conn.execute(
            r#"
            INSERT INTO completed_production_report (
                completed_work_order_id, process_name, report_date, report_time, start_at, end_at,
                work_quantity, defect_quantity, operator, equipment, report_source, work_hours,
                overtime_hours, break_hours, approval_status, approved_by, approved_at,
                allocated_quantity, quantity_source, allocation_method, is_completed, remarks,
                abnormal_notes, original_report_id, original_report_type
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                      ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)
            "#,
            params![
                report.completed_work_order_id,
                report.process_name,
                fmt_date(report.report_date),
                fmt_time(report.report_time),
                report.start_at.map(|t| t.to_rfc3339()),
                report.end_at.map(|t| t.to_rfc3339()),
                report.work_quantity,
                report.defect_quantity,
                report.operator,
                report.equipment,
                report.report_source.to_db_str(),
                report.work_hours,
                report.overtime_hours,
                report.break_hours,
                report.approval_status.to_db_str(),
                report.approved_by,
                report.approved_at.map(fmt_datetime),
                report.allocated_quantity,
                report.quantity_source.to_db_str(),
                report.allocation_method,
                report.is_completed as i64,
                report.remarks,
                report.abnormal_notes,
                report.original_report_id,
                report.original_report_type.map(|k| k.to_db_str()),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn find_by_id_tx(conn: &Connection, id: i64) -> RepositoryResult<Option<CompletedWorkOrder>> {
        let sql = format!("SELECT {} FROM completed_work_order WHERE id = ?1", ORDER_COLUMNS);
        Ok(conn.query_row(&sql, params![id], Self::map_order).optional()?)
    }

    /// 按 (公司, 工单号) 查询最新快照
    pub fn find_by_number_tx(
        conn: &Connection,
        company_code: &str,
        order_number: &str,
    ) -> RepositoryResult<Option<CompletedWorkOrder>> {
        let sql = format!(
            r#"
            SELECT {} FROM completed_work_order
            WHERE company_code = ?1 AND order_number = ?2
            ORDER BY id DESC LIMIT 1
            "#,
            ORDER_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![company_code, order_number], Self::map_order)
            .optional()?)
    }

    pub fn list_processes_tx(
        conn: &Connection,
        completed_work_order_id: i64,
    ) -> RepositoryResult<Vec<CompletedWorkOrderProcess>> {
        let sql = format!(
            r#"
            SELECT {} FROM completed_work_order_process
            WHERE completed_work_order_id = ?1 ORDER BY process_order, id
            "#,
            PROCESS_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![completed_work_order_id], Self::map_process)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn list_reports_tx(
        conn: &Connection,
        completed_work_order_id: i64,
    ) -> RepositoryResult<Vec<CompletedProductionReport>> {
        let sql = format!(
            r#"
            SELECT {} FROM completed_production_report
            WHERE completed_work_order_id = ?1 ORDER BY report_date, report_time, id
            "#,
            REPORT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![completed_work_order_id], Self::map_report)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn delete_processes_tx(conn: &Connection, completed_work_order_id: i64) -> RepositoryResult<usize> {
        Ok(conn.execute(
            "DELETE FROM completed_work_order_process WHERE completed_work_order_id = ?1",
            params![completed_work_order_id],
        )?)
    }

    /// 重写汇总字段（重新转移）
    pub fn update_totals_tx(
        conn: &Connection,
        id: i64,
        completed_quantity: i64,
        totals: &CompletionTotals,
    ) -> RepositoryResult<()> {
        let affected = conn.execute(
            r#"
            UPDATE completed_work_order SET
                completed_quantity = ?2, total_good_quantity = ?3, total_defect_quantity = ?4,
                total_work_hours = ?5, total_overtime_hours = ?6, total_all_hours = ?7,
                total_report_count = ?8, unique_operators = ?9, unique_equipment = ?10
            WHERE id = ?1
            "#,
            params![
                id,
                completed_quantity,
                totals.total_good_quantity,
                totals.total_defect_quantity,
                totals.total_work_hours,
                totals.total_overtime_hours,
                totals.total_all_hours,
                totals.total_report_count,
                to_json(&totals.unique_operators),
                to_json(&totals.unique_equipment),
            ],
        )?;
        if affected == 0 {
            return Err(RepositoryError::not_found("CompletedWorkOrder", id));
        }
        Ok(())
    }

    pub fn update_report_allocation_tx(
        conn: &Connection,
        report_id: i64,
        allocated_quantity: i64,
        method: &str,
    ) -> RepositoryResult<()> {
        conn.execute(
            r#"
            UPDATE completed_production_report
            SET allocated_quantity = ?2, quantity_source = 'allocated', allocation_method = ?3
            WHERE id = ?1
            "#,
            params![report_id, allocated_quantity, method],
        )?;
        Ok(())
    }

    // ==========================================
    // 常规操作
    // ==========================================

    pub fn find_by_id(&self, id: i64) -> RepositoryResult<Option<CompletedWorkOrder>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, id)
    }

    pub fn find_by_number(&self, company_code: &str, order_number: &str) -> RepositoryResult<Option<CompletedWorkOrder>> {
        let conn = self.get_conn()?;
        Self::find_by_number_tx(&conn, company_code, order_number)
    }

    pub fn find_by_original_id(&self, original_workorder_id: i64) -> RepositoryResult<Option<CompletedWorkOrder>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM completed_work_order WHERE original_workorder_id = ?1 ORDER BY id DESC LIMIT 1",
            ORDER_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![original_workorder_id], Self::map_order)
            .optional()?)
    }

    pub fn list_processes(&self, completed_work_order_id: i64) -> RepositoryResult<Vec<CompletedWorkOrderProcess>> {
        let conn = self.get_conn()?;
        Self::list_processes_tx(&conn, completed_work_order_id)
    }

    pub fn list_reports(&self, completed_work_order_id: i64) -> RepositoryResult<Vec<CompletedProductionReport>> {
        let conn = self.get_conn()?;
        Self::list_reports_tx(&conn, completed_work_order_id)
    }

    /// 尚未分配的完工报工（完工分配作业用）
    pub fn list_unallocated_reports(&self) -> RepositoryResult<Vec<CompletedReportWithOrder>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM completed_production_report
            WHERE allocation_method IS NULL
            ORDER BY completed_work_order_id, report_date, id
            "#,
            REPORT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                let report = Self::map_report(row)?;
                Ok(CompletedReportWithOrder {
                    completed_work_order_id: report.completed_work_order_id,
                    report,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    /// 最近完工工单
    pub fn list_recent(&self, since: NaiveDateTime, limit: u32) -> RepositoryResult<Vec<CompletedWorkOrder>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM completed_work_order
            WHERE completed_at >= ?1
            ORDER BY completed_at DESC, id DESC
            LIMIT ?2
            "#,
            ORDER_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![fmt_datetime(since), limit], Self::map_order)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }
}
