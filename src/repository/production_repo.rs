// ==========================================
// 制造执行系统 (MES) - 生产记录与报工明细仓储
// ==========================================
// 明细 upsert 键:
// - 有来源报工: (production_record_id, original_report_id, original_report_type)
// - 否则: (记录, 工序, 日期, 作业员, 设备, 良品, 不良, 来源) 全元组
// ==========================================

use crate::db::SharedConnection;
use crate::domain::types::{ApprovalStatus, QuantitySource, ReportKind, ReportSource, WorkOrderStatus};
use crate::domain::work_order::{
    DetailUpsert, NewProductionDetail, ProductionCounters, ProductionDetail, ProductionRecord,
};
use crate::repository::codec::{
    fmt_date, fmt_datetime, fmt_time, get_date, get_datetime, get_opt_datetime, get_opt_time,
    get_time,
};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::collections::HashMap;

const DETAIL_COLUMNS: &str = r#"
    d.id, d.production_record_id, d.process_name, d.report_date, d.report_time,
    d.start_time, d.end_time, d.work_quantity, d.defect_quantity, d.operator, d.equipment,
    d.report_source, d.work_hours, d.overtime_hours, d.break_hours, d.approval_status,
    d.approved_by, d.approved_at, d.allocated_quantity, d.quantity_source, d.is_completed,
    d.remarks, d.abnormal_notes, d.original_report_id, d.original_report_type
"#;

/// 带工单 id 的明细（分配作业整批读取用）
#[derive(Debug, Clone)]
pub struct DetailWithOrder {
    pub work_order_id: i64,
    pub detail: ProductionDetail,
}

// ==========================================
// ProductionRepository - 生产记录仓储
// ==========================================
pub struct ProductionRepository {
    conn: SharedConnection,
}

impl ProductionRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_record(row: &Row<'_>) -> SqliteResult<ProductionRecord> {
        Ok(ProductionRecord {
            id: row.get(0)?,
            work_order_id: row.get(1)?,
            current_process: row.get(2)?,
            status: WorkOrderStatus::from_str(&row.get::<_, String>(3)?),
            total_good_quantity: row.get(4)?,
            total_defect_quantity: row.get(5)?,
            total_work_hours: row.get(6)?,
            report_count: row.get(7)?,
            started_at: get_opt_datetime(row, 8)?,
            updated_at: get_datetime(row, 9)?,
        })
    }

    pub(crate) fn map_detail(row: &Row<'_>) -> SqliteResult<ProductionDetail> {
        Ok(ProductionDetail {
            id: row.get(0)?,
            production_record_id: row.get(1)?,
            process_name: row.get(2)?,
            report_date: get_date(row, 3)?,
            report_time: get_time(row, 4)?,
            start_time: get_opt_time(row, 5)?,
            end_time: get_opt_time(row, 6)?,
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
            is_completed: row.get::<_, i64>(20)? != 0,
            remarks: row.get(21)?,
            abnormal_notes: row.get(22)?,
            original_report_id: row.get(23)?,
            original_report_type: row
                .get::<_, Option<String>>(24)?
                .as_deref()
                .map(ReportKind::from_str),
        })
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    /// 确保工单有生产记录，返回记录 id
    pub fn ensure_record_tx(
        conn: &Connection,
        work_order_id: i64,
        status: WorkOrderStatus,
        now: NaiveDateTime,
    ) -> RepositoryResult<i64> {
        conn.execute(
            r#"
            INSERT OR IGNORE INTO production_record (work_order_id, status, started_at, updated_at)
            VALUES (?1, ?2, ?3, ?3)
            "#,
            params![work_order_id, status.to_db_str(), fmt_datetime(now)],
        )?;
        let id: i64 = conn.query_row(
            "SELECT id FROM production_record WHERE work_order_id = ?1",
            params![work_order_id],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn find_record_by_order_tx(
        conn: &Connection,
        work_order_id: i64,
    ) -> RepositoryResult<Option<ProductionRecord>> {
        Ok(conn
            .query_row(
                r#"
                SELECT id, work_order_id, current_process, status, total_good_quantity,
                       total_defect_quantity, total_work_hours, report_count, started_at, updated_at
                FROM production_record WHERE work_order_id = ?1
                "#,
                params![work_order_id],
                Self::map_record,
            )
            .optional()?)
    }

    pub fn set_record_status_tx(
        conn: &Connection,
        work_order_id: i64,
        status: WorkOrderStatus,
        now: NaiveDateTime,
    ) -> RepositoryResult<()> {
        conn.execute(
            "UPDATE production_record SET status = ?2, updated_at = ?3 WHERE work_order_id = ?1",
            params![work_order_id, status.to_db_str(), fmt_datetime(now)],
        )?;
        Ok(())
    }

    fn find_existing_detail_tx(
        conn: &Connection,
        record_id: i64,
        detail: &NewProductionDetail,
    ) -> RepositoryResult<Option<i64>> {
        let existing = match (detail.original_report_id, detail.original_report_type) {
            (Some(report_id), Some(kind)) => conn
                .query_row(
                    r#"
                    SELECT id FROM production_detail
                    WHERE production_record_id = ?1 AND original_report_id = ?2
                      AND original_report_type = ?3
                    "#,
                    params![record_id, report_id, kind.to_db_str()],
                    |row| row.get(0),
                )
                .optional()?,
            _ => conn
                .query_row(
                    r#"
                    SELECT id FROM production_detail
                    WHERE production_record_id = ?1 AND process_name = ?2 AND report_date = ?3
                      AND operator IS ?4 AND equipment IS ?5
                      AND work_quantity = ?6 AND defect_quantity = ?7 AND report_source = ?8
                      AND original_report_id IS NULL
                    ORDER BY id LIMIT 1
                    "#,
                    params![
                        record_id,
                        detail.process_name,
                        fmt_date(detail.report_date),
                        detail.operator,
                        detail.equipment,
                        detail.work_quantity,
                        detail.defect_quantity,
                        detail.report_source.to_db_str(),
                    ],
                    |row| row.get(0),
                )
                .optional()?,
        };
        Ok(existing)
    }

    /// 新增或更新明细（重新同步时覆盖全部报工属性，保留分配结果）
    pub fn upsert_detail_tx(
        conn: &Connection,
        record_id: i64,
        detail: &NewProductionDetail,
        now: NaiveDateTime,
    ) -> RepositoryResult<DetailUpsert> {
        let now_str = fmt_datetime(now);
        if let Some(id) = Self::find_existing_detail_tx(conn, record_id, detail)? {
            conn.execute(
                r#"
                UPDATE production_detail SET
                    process_name = ?2, report_date = ?3, report_time = ?4, start_time = ?5,
                    end_time = ?6, work_quantity = ?7, defect_quantity = ?8, operator = ?9,
                    equipment = ?10, report_source = ?11, work_hours = ?12, overtime_hours = ?13,
                    break_hours = ?14, approval_status = ?15, approved_by = ?16, approved_at = ?17,
                    remarks = ?18, abnormal_notes = ?19, updated_at = ?20
                WHERE id = ?1
                "#,
                params![
                    id,
                    detail.process_name,
                    fmt_date(detail.report_date),
                    fmt_time(detail.report_time),
                    detail.start_time.map(fmt_time),
                    detail.end_time.map(fmt_time),
                    detail.work_quantity,
                    detail.defect_quantity,
                    detail.operator,
                    detail.equipment,
                    detail.report_source.to_db_str(),
                    detail.work_hours,
                    detail.overtime_hours,
                    detail.break_hours,
                    detail.approval_status.to_db_str(),
                    detail.approved_by,
                    detail.approved_at.map(fmt_datetime),
                    detail.remarks,
                    detail.abnormal_notes,
                    now_str,
                ],
            )?;
            return Ok(DetailUpsert {
                detail_id: id,
                inserted: false,
            });
        }

        conn.execute(
            r#"
            INSERT INTO production_detail (
                production_record_id, process_name, report_date, report_time, start_time,
                end_time, work_quantity, defect_quantity, operator, equipment, report_source,
                work_hours, overtime_hours, break_hours, approval_status, approved_by,
                approved_at, allocated_quantity, quantity_source, is_completed, remarks,
                abnormal_notes, original_report_id, original_report_type, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                ?17, 0, 'original', 0, ?18, ?19, ?20, ?21, ?22, ?22
            )
            "#,
            params![
                record_id,
                detail.process_name,
                fmt_date(detail.report_date),
                fmt_time(detail.report_time),
                detail.start_time.map(fmt_time),
                detail.end_time.map(fmt_time),
                detail.work_quantity,
                detail.defect_quantity,
                detail.operator,
                detail.equipment,
                detail.report_source.to_db_str(),
                detail.work_hours,
                detail.overtime_hours,
                detail.break_hours,
                detail.approval_status.to_db_str(),
                detail.approved_by,
                detail.approved_at.map(fmt_datetime),
                detail.remarks,
                detail.abnormal_notes,
                detail.original_report_id,
                detail.original_report_type.map(|k| k.to_db_str()),
                now_str,
            ],
        )?;
        Ok(DetailUpsert {
            detail_id: conn.last_insert_rowid(),
            inserted: true,
        })
    }

    pub fn list_details_by_order_tx(
        conn: &Connection,
        work_order_id: i64,
    ) -> RepositoryResult<Vec<ProductionDetail>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM production_detail d
            JOIN production_record r ON r.id = d.production_record_id
            WHERE r.work_order_id = ?1
            ORDER BY d.report_date, d.report_time, d.id
            "#,
            DETAIL_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![work_order_id], Self::map_detail)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    /// 各工序良品合计
    pub fn process_work_sums_tx(
        conn: &Connection,
        work_order_id: i64,
    ) -> RepositoryResult<HashMap<String, i64>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT d.process_name, COALESCE(SUM(d.work_quantity), 0)
            FROM production_detail d
            JOIN production_record r ON r.id = d.production_record_id
            WHERE r.work_order_id = ?1
            GROUP BY d.process_name
            "#,
        )?;
        let rows = stmt
            .query_map(params![work_order_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<SqliteResult<HashMap<_, _>>>()?;
        Ok(rows)
    }

    /// 汇总明细并写回生产记录
    pub fn refresh_record_counters_tx(
        conn: &Connection,
        work_order_id: i64,
        now: NaiveDateTime,
    ) -> RepositoryResult<ProductionCounters> {
        let (good, defect, hours, count): (i64, i64, f64, i64) = conn.query_row(
            r#"
            SELECT COALESCE(SUM(d.work_quantity), 0), COALESCE(SUM(d.defect_quantity), 0),
                   COALESCE(SUM(d.work_hours + d.overtime_hours), 0), COUNT(d.id)
            FROM production_detail d
            JOIN production_record r ON r.id = d.production_record_id
            WHERE r.work_order_id = ?1
            "#,
            params![work_order_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;
        let current_process: Option<String> = conn
            .query_row(
                r#"
                SELECT d.process_name
                FROM production_detail d
                JOIN production_record r ON r.id = d.production_record_id
                WHERE r.work_order_id = ?1
                ORDER BY d.report_date DESC, d.report_time DESC, d.id DESC
                LIMIT 1
                "#,
                params![work_order_id],
                |row| row.get(0),
            )
            .optional()?;

        let counters = ProductionCounters {
            total_good_quantity: good,
            total_defect_quantity: defect,
            total_work_hours: (hours * 100.0).round() / 100.0,
            report_count: count,
            current_process,
        };
        conn.execute(
            r#"
            UPDATE production_record SET
                total_good_quantity = ?2, total_defect_quantity = ?3, total_work_hours = ?4,
                report_count = ?5, current_process = ?6, updated_at = ?7
            WHERE work_order_id = ?1
            "#,
            params![
                work_order_id,
                counters.total_good_quantity,
                counters.total_defect_quantity,
                counters.total_work_hours,
                counters.report_count,
                counters.current_process,
                fmt_datetime(now),
            ],
        )?;
        Ok(counters)
    }

    /// 包装工序累计数量（良品 + 不良）
    pub fn packaging_sum_tx(
        conn: &Connection,
        work_order_id: i64,
        packaging_process: &str,
    ) -> RepositoryResult<i64> {
        let sum: i64 = conn.query_row(
            r#"
            SELECT COALESCE(SUM(d.work_quantity + d.defect_quantity), 0)
            FROM production_detail d
            JOIN production_record r ON r.id = d.production_record_id
            WHERE r.work_order_id = ?1 AND d.process_name = ?2
            "#,
            params![work_order_id, packaging_process],
            |row| row.get(0),
        )?;
        Ok(sum)
    }

    /// 工单完工时标记全部明细
    pub fn mark_completed_tx(
        conn: &Connection,
        work_order_id: i64,
        now: NaiveDateTime,
    ) -> RepositoryResult<usize> {
        Ok(conn.execute(
            r#"
            UPDATE production_detail
            SET is_completed = 1, updated_at = ?2
            WHERE production_record_id IN (SELECT id FROM production_record WHERE work_order_id = ?1)
            "#,
            params![work_order_id, fmt_datetime(now)],
        )?)
    }

    /// 删除工单的全部明细与生产记录
    pub fn delete_by_order_tx(conn: &Connection, work_order_id: i64) -> RepositoryResult<usize> {
        let details = conn.execute(
            r#"
            DELETE FROM production_detail
            WHERE production_record_id IN (SELECT id FROM production_record WHERE work_order_id = ?1)
            "#,
            params![work_order_id],
        )?;
        conn.execute(
            "DELETE FROM production_record WHERE work_order_id = ?1",
            params![work_order_id],
        )?;
        Ok(details)
    }

    pub fn update_allocation_tx(
        conn: &Connection,
        detail_id: i64,
        allocated_quantity: i64,
        now: NaiveDateTime,
    ) -> RepositoryResult<()> {
        conn.execute(
            r#"
            UPDATE production_detail
            SET allocated_quantity = ?2, quantity_source = 'allocated', updated_at = ?3
            WHERE id = ?1
            "#,
            params![detail_id, allocated_quantity, fmt_datetime(now)],
        )?;
        Ok(())
    }

    // ==========================================
    // 常规操作
    // ==========================================

    pub fn find_record_by_order(&self, work_order_id: i64) -> RepositoryResult<Option<ProductionRecord>> {
        let conn = self.get_conn()?;
        Self::find_record_by_order_tx(&conn, work_order_id)
    }

    pub fn list_details_by_order(&self, work_order_id: i64) -> RepositoryResult<Vec<ProductionDetail>> {
        let conn = self.get_conn()?;
        Self::list_details_by_order_tx(&conn, work_order_id)
    }

    pub fn packaging_sum(&self, work_order_id: i64, packaging_process: &str) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        Self::packaging_sum_tx(&conn, work_order_id, packaging_process)
    }

    /// 所有未完工工单的明细（自动分配用）
    pub fn list_details_of_active_orders(&self) -> RepositoryResult<Vec<DetailWithOrder>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            SELECT {}, r.work_order_id
            FROM production_detail d
            JOIN production_record r ON r.id = d.production_record_id
            JOIN work_order w ON w.id = r.work_order_id
            WHERE w.status <> 'completed'
            ORDER BY r.work_order_id, d.report_date, d.id
            "#,
            DETAIL_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(DetailWithOrder {
                    detail: Self::map_detail(row)?,
                    work_order_id: row.get(25)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }
}
