// ==========================================
// 制造执行系统 (MES) - 报工来源仓储
// ==========================================
// fill_work_report: 作业员补登 / SMT 补登（需审核）
// onsite_report: 现场报工（免审核）
// 两表在完工转移时保留，作为重新转移的来源
// ==========================================

use crate::db::SharedConnection;
use crate::domain::report::{FillWorkReport, NewReport, OnsiteReport, Report};
use crate::domain::types::{ApprovalStatus, LinkStatus, ReportKind};
use crate::repository::codec::{
    fmt_date, fmt_datetime, fmt_time, get_date, get_datetime, get_opt_datetime, get_opt_time,
    get_time,
};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};

const FILL_WORK_COLUMNS: &str = r#"
    id, report_kind, company_code, order_number, product_code, process_name, report_date,
    start_time, end_time, operator, equipment, production_line, work_quantity, defect_quantity,
    remarks, abnormal_notes, approval_status, approved_by, approved_at, work_hours,
    overtime_hours, break_hours, link_status, created_by, created_at
"#;

const ONSITE_COLUMNS: &str = r#"
    id, company_code, order_number, product_code, process_name, report_date, report_time,
    start_time, end_time, operator, equipment, production_line, work_quantity, defect_quantity,
    remarks, abnormal_notes, work_hours, overtime_hours, break_hours, link_status, created_at
"#;

/// 与某时段重叠的既有报工
#[derive(Debug, Clone, PartialEq)]
pub struct OverlappingReport {
    pub kind: ReportKind,
    pub report_id: i64,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

// ==========================================
// ReportRepository - 报工仓储
// ==========================================
pub struct ReportRepository {
    conn: SharedConnection,
}

impl ReportRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_fill_work(row: &Row<'_>) -> SqliteResult<FillWorkReport> {
        Ok(FillWorkReport {
            id: row.get(0)?,
            kind: ReportKind::from_str(&row.get::<_, String>(1)?),
            company_code: row.get(2)?,
            order_number: row.get(3)?,
            product_code: row.get(4)?,
            process_name: row.get(5)?,
            report_date: get_date(row, 6)?,
            start_time: get_opt_time(row, 7)?,
            end_time: get_opt_time(row, 8)?,
            operator: row.get(9)?,
            equipment: row.get(10)?,
            production_line: row.get(11)?,
            work_quantity: row.get(12)?,
            defect_quantity: row.get(13)?,
            remarks: row.get(14)?,
            abnormal_notes: row.get(15)?,
            approval_status: ApprovalStatus::from_str(&row.get::<_, String>(16)?),
            approved_by: row.get(17)?,
            approved_at: get_opt_datetime(row, 18)?,
            work_hours: row.get(19)?,
            overtime_hours: row.get(20)?,
            break_hours: row.get(21)?,
            link_status: LinkStatus::from_str(&row.get::<_, String>(22)?),
            created_by: row.get(23)?,
            created_at: get_datetime(row, 24)?,
        })
    }

    fn map_onsite(row: &Row<'_>) -> SqliteResult<OnsiteReport> {
        Ok(OnsiteReport {
            id: row.get(0)?,
            company_code: row.get(1)?,
            order_number: row.get(2)?,
            product_code: row.get(3)?,
            process_name: row.get(4)?,
            report_date: get_date(row, 5)?,
            report_time: get_time(row, 6)?,
            start_time: get_opt_time(row, 7)?,
            end_time: get_opt_time(row, 8)?,
            operator: row.get(9)?,
            equipment: row.get(10)?,
            production_line: row.get(11)?,
            work_quantity: row.get(12)?,
            defect_quantity: row.get(13)?,
            remarks: row.get(14)?,
            abnormal_notes: row.get(15)?,
            work_hours: row.get(16)?,
            overtime_hours: row.get(17)?,
            break_hours: row.get(18)?,
            link_status: LinkStatus::from_str(&row.get::<_, String>(19)?),
            created_at: get_datetime(row, 20)?,
        })
    }

    fn table_of(kind: ReportKind) -> &'static str {
        match kind {
            ReportKind::Onsite => "onsite_report",
            _ => "fill_work_report",
        }
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    pub fn insert_fill_work_tx(
        conn: &Connection,
        kind: ReportKind,
        report: &NewReport,
        now: NaiveDateTime,
    ) -> RepositoryResult<i64> {
        if !kind.requires_approval() {
            return Err(RepositoryError::ValidationError(format!(
                "补登报工种类不合法: {}",
                kind
            )));
        }
        conn.execute(
            r#"
            INSERT INTO fill_work_report (
                report_kind, company_code, order_number, product_code, process_name, report_date,
                start_time, end_time, operator, equipment, production_line, work_quantity,
                defect_quantity, remarks, abnormal_notes, approval_status, link_status,
                created_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                      'pending', 'unlinked', ?16, ?17)
            "#,
            params![
                kind.to_db_str(),
                report.company_code,
                report.order_number,
                report.product_code,
                report.process_name,
                fmt_date(report.report_date),
                report.start_time.map(fmt_time),
                report.end_time.map(fmt_time),
                report.operator,
                report.equipment,
                report.production_line,
                report.work_quantity,
                report.defect_quantity,
                report.remarks,
                report.abnormal_notes,
                report.created_by,
                fmt_datetime(now),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_onsite_tx(
        conn: &Connection,
        report: &NewReport,
        now: NaiveDateTime,
    ) -> RepositoryResult<i64> {
        conn.execute(
            r#"
            INSERT INTO onsite_report (
                company_code, order_number, product_code, process_name, report_date, report_time,
                start_time, end_time, operator, equipment, production_line, work_quantity,
                defect_quantity, remarks, abnormal_notes, link_status, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                      'unlinked', ?16)
            "#,
            params![
                report.company_code,
                report.order_number,
                report.product_code,
                report.process_name,
                fmt_date(report.report_date),
                fmt_time(now.time()),
                report.start_time.map(fmt_time),
                report.end_time.map(fmt_time),
                report.operator,
                report.equipment,
                report.production_line,
                report.work_quantity,
                report.defect_quantity,
                report.remarks,
                report.abnormal_notes,
                fmt_datetime(now),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn find_tx(conn: &Connection, kind: ReportKind, id: i64) -> RepositoryResult<Option<Report>> {
        let report = match kind {
            ReportKind::Onsite => {
                let sql = format!("SELECT {} FROM onsite_report WHERE id = ?1", ONSITE_COLUMNS);
                conn.query_row(&sql, params![id], Self::map_onsite)
                    .optional()?
                    .map(Report::OnSite)
            }
            _ => {
                let sql = format!(
                    "SELECT {} FROM fill_work_report WHERE id = ?1",
                    FILL_WORK_COLUMNS
                );
                conn.query_row(&sql, params![id], Self::map_fill_work)
                    .optional()?
                    .map(Report::from_fill_work)
            }
        };
        Ok(report)
    }

    /// 审核通过（只更新 pending 行，返回是否更新）
    pub fn approve_tx(
        conn: &Connection,
        id: i64,
        approver: &str,
        now: NaiveDateTime,
    ) -> RepositoryResult<bool> {
        let affected = conn.execute(
            r#"
            UPDATE fill_work_report
            SET approval_status = 'approved', approved_by = ?2, approved_at = ?3
            WHERE id = ?1 AND approval_status = 'pending'
            "#,
            params![id, approver, fmt_datetime(now)],
        )?;
        Ok(affected > 0)
    }

    pub fn reject_tx(
        conn: &Connection,
        id: i64,
        approver: &str,
        now: NaiveDateTime,
    ) -> RepositoryResult<bool> {
        let affected = conn.execute(
            r#"
            UPDATE fill_work_report
            SET approval_status = 'rejected', approved_by = ?2, approved_at = ?3
            WHERE id = ?1 AND approval_status = 'pending'
            "#,
            params![id, approver, fmt_datetime(now)],
        )?;
        Ok(affected > 0)
    }

    pub fn update_work_time_tx(
        conn: &Connection,
        kind: ReportKind,
        id: i64,
        work_hours: f64,
        overtime_hours: f64,
        break_hours: f64,
    ) -> RepositoryResult<()> {
        let sql = format!(
            "UPDATE {} SET work_hours = ?2, overtime_hours = ?3, break_hours = ?4 WHERE id = ?1",
            Self::table_of(kind)
        );
        conn.execute(&sql, params![id, work_hours, overtime_hours, break_hours])?;
        Ok(())
    }

    pub fn set_link_status_tx(
        conn: &Connection,
        kind: ReportKind,
        id: i64,
        status: LinkStatus,
    ) -> RepositoryResult<()> {
        let sql = format!(
            "UPDATE {} SET link_status = ?2 WHERE id = ?1",
            Self::table_of(kind)
        );
        conn.execute(&sql, params![id, status.to_db_str()])?;
        Ok(())
    }

    /// 某工单号对应的全部有效报工（已审核补登 + 现场报工）
    pub fn list_effective_for_order_tx(
        conn: &Connection,
        company_code: &str,
        order_number: &str,
        product_code: &str,
    ) -> RepositoryResult<Vec<Report>> {
        let sql = format!(
            r#"
            SELECT {} FROM fill_work_report
            WHERE company_code = ?1 AND order_number = ?2 AND product_code = ?3
              AND approval_status = 'approved'
            ORDER BY report_date, id
            "#,
            FILL_WORK_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut reports = stmt
            .query_map(
                params![company_code, order_number, product_code],
                Self::map_fill_work,
            )?
            .map(|r| r.map(Report::from_fill_work))
            .collect::<SqliteResult<Vec<_>>>()?;

        let sql = format!(
            r#"
            SELECT {} FROM onsite_report
            WHERE company_code = ?1 AND order_number = ?2 AND product_code = ?3
            ORDER BY report_date, report_time, id
            "#,
            ONSITE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let onsite = stmt
            .query_map(
                params![company_code, order_number, product_code],
                Self::map_onsite,
            )?
            .map(|r| r.map(Report::OnSite))
            .collect::<SqliteResult<Vec<_>>>()?;
        reports.extend(onsite);
        Ok(reports)
    }

    /// 已审核补登报工中包装工序的累计（良品 + 不良）
    pub fn approved_packaging_sum_tx(
        conn: &Connection,
        company_code: &str,
        order_number: &str,
        product_code: &str,
        packaging_process: &str,
    ) -> RepositoryResult<i64> {
        let sum: i64 = conn.query_row(
            r#"
            SELECT COALESCE(SUM(work_quantity + defect_quantity), 0)
            FROM fill_work_report
            WHERE company_code = ?1 AND order_number = ?2 AND product_code = ?3
              AND process_name = ?4 AND approval_status = 'approved'
            "#,
            params![company_code, order_number, product_code, packaging_process],
            |row| row.get(0),
        )?;
        Ok(sum)
    }

    /// 同一作业员同日时段重叠的报工（两表合并；排除自身）
    pub fn find_operator_overlaps_tx(
        conn: &Connection,
        operator: &str,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        exclude: Option<(ReportKind, i64)>,
    ) -> RepositoryResult<Vec<OverlappingReport>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT report_kind, id, start_time, end_time FROM fill_work_report
            WHERE operator = ?1 AND report_date = ?2 AND approval_status <> 'rejected'
              AND start_time IS NOT NULL AND end_time IS NOT NULL
              AND start_time < ?4 AND end_time > ?3
            UNION ALL
            SELECT 'onsite', id, start_time, end_time FROM onsite_report
            WHERE operator = ?1 AND report_date = ?2
              AND start_time IS NOT NULL AND end_time IS NOT NULL
              AND start_time < ?4 AND end_time > ?3
            "#,
        )?;
        let rows = stmt
            .query_map(
                params![operator, fmt_date(date), fmt_time(start), fmt_time(end)],
                |row| {
                    Ok(OverlappingReport {
                        kind: ReportKind::from_str(&row.get::<_, String>(0)?),
                        report_id: row.get(1)?,
                        start_time: get_time(row, 2)?,
                        end_time: get_time(row, 3)?,
                    })
                },
            )?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(rows
            .into_iter()
            .filter(|r| exclude != Some((r.kind, r.report_id)))
            .collect())
    }

    // ==========================================
    // 常规操作
    // ==========================================

    pub fn find(&self, kind: ReportKind, id: i64) -> RepositoryResult<Option<Report>> {
        let conn = self.get_conn()?;
        Self::find_tx(&conn, kind, id)
    }

    /// 待关联报工（工单尚不存在时保留）
    pub fn list_pending_link(&self) -> RepositoryResult<Vec<Report>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM fill_work_report WHERE link_status = 'pending_link' ORDER BY id",
            FILL_WORK_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut reports = stmt
            .query_map([], Self::map_fill_work)?
            .map(|r| r.map(Report::from_fill_work))
            .collect::<SqliteResult<Vec<_>>>()?;

        let sql = format!(
            "SELECT {} FROM onsite_report WHERE link_status = 'pending_link' ORDER BY id",
            ONSITE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let onsite = stmt
            .query_map([], Self::map_onsite)?
            .map(|r| r.map(Report::OnSite))
            .collect::<SqliteResult<Vec<_>>>()?;
        reports.extend(onsite);
        Ok(reports)
    }

    /// 待审核补登
    pub fn list_pending_approval(&self) -> RepositoryResult<Vec<FillWorkReport>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM fill_work_report WHERE approval_status = 'pending' ORDER BY id",
            FILL_WORK_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], Self::map_fill_work)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }
}
