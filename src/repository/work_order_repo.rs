// ==========================================
// 制造执行系统 (MES) - 工单数据仓储
// ==========================================
// 工单 / 工单工序 / 派工记录
// 红线: Repository 不含业务逻辑（状态机校验在引擎/API 层）
// ==========================================

use crate::db::SharedConnection;
use crate::domain::types::{OrderPriority, ProcessStatus, WorkOrderStatus};
use crate::domain::work_order::{
    order_number_prefix, parse_order_sequence, DispatchRecord, Page, WorkOrder, WorkOrderFilter,
    WorkOrderProcess,
};
use crate::repository::codec::{
    fmt_date, fmt_datetime, get_datetime, get_json, get_opt_date, get_opt_datetime, to_json,
};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};

const ORDER_COLUMNS: &str = r#"
    id, company_code, order_number, product_code, quantity, status, priority,
    pre_in_date, created_at, updated_at, completed_at
"#;

const PROCESS_COLUMNS: &str = r#"
    id, work_order_id, process_name, step_order, planned_quantity, completed_quantity,
    status, assigned_operator, assigned_equipment, actual_start_time, actual_end_time,
    capacity_multiplier, additional_operators, additional_equipment, target_hourly_output
"#;

/// 新工单行（工单号已确定）
#[derive(Debug, Clone)]
pub struct WorkOrderInsert<'a> {
    pub company_code: &'a str,
    pub order_number: &'a str,
    pub product_code: &'a str,
    pub quantity: i64,
    pub priority: OrderPriority,
    pub pre_in_date: Option<NaiveDate>,
    pub now: NaiveDateTime,
}

// ==========================================
// WorkOrderRepository - 工单仓储
// ==========================================
pub struct WorkOrderRepository {
    conn: SharedConnection,
}

impl WorkOrderRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_order(row: &Row<'_>) -> SqliteResult<WorkOrder> {
        Ok(WorkOrder {
            id: row.get(0)?,
            company_code: row.get(1)?,
            order_number: row.get(2)?,
            product_code: row.get(3)?,
            quantity: row.get(4)?,
            status: WorkOrderStatus::from_str(&row.get::<_, String>(5)?),
            priority: OrderPriority::from_str(&row.get::<_, String>(6)?),
            pre_in_date: get_opt_date(row, 7)?,
            created_at: get_datetime(row, 8)?,
            updated_at: get_datetime(row, 9)?,
            completed_at: get_opt_datetime(row, 10)?,
        })
    }

    fn map_process(row: &Row<'_>) -> SqliteResult<WorkOrderProcess> {
        Ok(WorkOrderProcess {
            id: row.get(0)?,
            work_order_id: row.get(1)?,
            process_name: row.get(2)?,
            step_order: row.get(3)?,
            planned_quantity: row.get(4)?,
            completed_quantity: row.get(5)?,
            status: ProcessStatus::from_str(&row.get::<_, String>(6)?),
            assigned_operator: row.get(7)?,
            assigned_equipment: row.get(8)?,
            actual_start_time: get_opt_datetime(row, 9)?,
            actual_end_time: get_opt_datetime(row, 10)?,
            capacity_multiplier: row.get(11)?,
            additional_operators: get_json(row, 12)?,
            additional_equipment: get_json(row, 13)?,
            target_hourly_output: row.get(14)?,
        })
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    /// 下一个可用序号（在制与完工工单都计入，避免号码复用）
    pub fn next_sequence_tx(
        conn: &Connection,
        company_code: &str,
        year: i32,
        month: u32,
    ) -> RepositoryResult<u32> {
        let prefix = order_number_prefix(company_code, year, month);
        let pattern = format!("{}%", prefix);
        let mut stmt = conn.prepare(
            r#"
            SELECT order_number FROM work_order WHERE order_number LIKE ?1
            UNION ALL
            SELECT order_number FROM completed_work_order WHERE order_number LIKE ?1
            "#,
        )?;
        let numbers = stmt
            .query_map(params![pattern], |row| row.get::<_, String>(0))?
            .collect::<SqliteResult<Vec<_>>>()?;

        let max_seq = numbers
            .iter()
            .filter_map(|n| parse_order_sequence(&prefix, n))
            .max()
            .unwrap_or(0);
        Ok(max_seq + 1)
    }

    pub fn insert_tx(conn: &Connection, order: &WorkOrderInsert<'_>) -> RepositoryResult<i64> {
        conn.execute(
            r#"
            INSERT INTO work_order (
                company_code, order_number, product_code, quantity, status, priority,
                pre_in_date, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6, ?7, ?7)
            "#,
            params![
                order.company_code,
                order.order_number,
                order.product_code,
                order.quantity,
                order.priority.to_db_str(),
                order.pre_in_date.map(fmt_date),
                fmt_datetime(order.now),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_process_tx(
        conn: &Connection,
        work_order_id: i64,
        process_name: &str,
        step_order: i32,
        planned_quantity: i64,
    ) -> RepositoryResult<i64> {
        conn.execute(
            r#"
            INSERT INTO work_order_process (
                work_order_id, process_name, step_order, planned_quantity, completed_quantity, status
            ) VALUES (?1, ?2, ?3, ?4, 0, 'pending')
            "#,
            params![work_order_id, process_name, step_order, planned_quantity],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn find_by_id_tx(conn: &Connection, id: i64) -> RepositoryResult<Option<WorkOrder>> {
        let sql = format!("SELECT {} FROM work_order WHERE id = ?1", ORDER_COLUMNS);
        Ok(conn.query_row(&sql, params![id], Self::map_order).optional()?)
    }

    pub fn find_by_number_tx(
        conn: &Connection,
        company_code: &str,
        order_number: &str,
    ) -> RepositoryResult<Option<WorkOrder>> {
        let sql = format!(
            "SELECT {} FROM work_order WHERE company_code = ?1 AND order_number = ?2",
            ORDER_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![company_code, order_number], Self::map_order)
            .optional()?)
    }

    /// 按 (公司, 工单号, 产品) 查询（报工关联用）
    pub fn find_by_key_tx(
        conn: &Connection,
        company_code: &str,
        order_number: &str,
        product_code: &str,
    ) -> RepositoryResult<Option<WorkOrder>> {
        let sql = format!(
            r#"
            SELECT {} FROM work_order
            WHERE company_code = ?1 AND order_number = ?2 AND product_code = ?3
            "#,
            ORDER_COLUMNS
        );
        Ok(conn
            .query_row(
                &sql,
                params![company_code, order_number, product_code],
                Self::map_order,
            )
            .optional()?)
    }

    pub fn update_status_tx(
        conn: &Connection,
        id: i64,
        status: WorkOrderStatus,
        now: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let completed_at = matches!(status, WorkOrderStatus::Completed).then(|| fmt_datetime(now));
        let affected = conn.execute(
            r#"
            UPDATE work_order
            SET status = ?2, updated_at = ?3, completed_at = COALESCE(?4, completed_at)
            WHERE id = ?1
            "#,
            params![id, status.to_db_str(), fmt_datetime(now), completed_at],
        )?;
        if affected == 0 {
            return Err(RepositoryError::not_found("WorkOrder", id));
        }
        Ok(())
    }

    pub fn delete_tx(conn: &Connection, id: i64) -> RepositoryResult<()> {
        let affected = conn.execute("DELETE FROM work_order WHERE id = ?1", params![id])?;
        if affected == 0 {
            return Err(RepositoryError::not_found("WorkOrder", id));
        }
        Ok(())
    }

    pub fn list_processes_tx(conn: &Connection, work_order_id: i64) -> RepositoryResult<Vec<WorkOrderProcess>> {
        let sql = format!(
            "SELECT {} FROM work_order_process WHERE work_order_id = ?1 ORDER BY step_order",
            PROCESS_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![work_order_id], Self::map_process)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    /// 指派作业员/设备；首次指派时记录实际开工时间
    pub fn assign_process_tx(
        conn: &Connection,
        work_order_id: i64,
        process_name: &str,
        operator: Option<&str>,
        equipment: Option<&str>,
        start: Option<NaiveDateTime>,
    ) -> RepositoryResult<()> {
        let affected = conn.execute(
            r#"
            UPDATE work_order_process
            SET assigned_operator = COALESCE(?3, assigned_operator),
                assigned_equipment = COALESCE(?4, assigned_equipment),
                actual_start_time = COALESCE(actual_start_time, ?5)
            WHERE work_order_id = ?1 AND process_name = ?2
            "#,
            params![
                work_order_id,
                process_name,
                operator,
                equipment,
                start.map(fmt_datetime)
            ],
        )?;
        if affected == 0 {
            return Err(RepositoryError::not_found(
                "WorkOrderProcess",
                format!("{}/{}", work_order_id, process_name),
            ));
        }
        Ok(())
    }

    /// 更新工序并行资源
    pub fn set_parallel_resources_tx(
        conn: &Connection,
        process_id: i64,
        capacity_multiplier: i32,
        additional_operators: &[String],
        additional_equipment: &[String],
        target_hourly_output: f64,
    ) -> RepositoryResult<()> {
        if capacity_multiplier < 1 {
            return Err(RepositoryError::FieldValueError {
                field: "capacity_multiplier".to_string(),
                message: format!("必须 ≥ 1: {}", capacity_multiplier),
            });
        }
        let affected = conn.execute(
            r#"
            UPDATE work_order_process
            SET capacity_multiplier = ?2, additional_operators = ?3,
                additional_equipment = ?4, target_hourly_output = ?5
            WHERE id = ?1
            "#,
            params![
                process_id,
                capacity_multiplier,
                to_json(&additional_operators),
                to_json(&additional_equipment),
                target_hourly_output
            ],
        )?;
        if affected == 0 {
            return Err(RepositoryError::not_found("WorkOrderProcess", process_id));
        }
        Ok(())
    }

    /// 写入工序完成数量与状态
    pub fn update_process_progress_tx(
        conn: &Connection,
        process_id: i64,
        completed_quantity: i64,
        status: ProcessStatus,
    ) -> RepositoryResult<()> {
        conn.execute(
            "UPDATE work_order_process SET completed_quantity = ?2, status = ?3 WHERE id = ?1",
            params![process_id, completed_quantity, status.to_db_str()],
        )?;
        Ok(())
    }

    /// 完工时将所有工序置为 completed，补齐 actual_end_time
    pub fn complete_all_processes_tx(
        conn: &Connection,
        work_order_id: i64,
        now: NaiveDateTime,
    ) -> RepositoryResult<usize> {
        let affected = conn.execute(
            r#"
            UPDATE work_order_process
            SET status = 'completed', actual_end_time = COALESCE(actual_end_time, ?2)
            WHERE work_order_id = ?1
            "#,
            params![work_order_id, fmt_datetime(now)],
        )?;
        Ok(affected)
    }

    pub fn insert_dispatch_tx(
        conn: &Connection,
        work_order_id: i64,
        process_name: &str,
        operator: Option<&str>,
        quantity: i64,
        created_by: &str,
        now: NaiveDateTime,
    ) -> RepositoryResult<i64> {
        conn.execute(
            r#"
            INSERT INTO dispatch_record (work_order_id, process_name, operator, quantity, created_by, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                work_order_id,
                process_name,
                operator,
                quantity,
                created_by,
                fmt_datetime(now)
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn delete_dispatch_by_order_tx(conn: &Connection, work_order_id: i64) -> RepositoryResult<usize> {
        Ok(conn.execute(
            "DELETE FROM dispatch_record WHERE work_order_id = ?1",
            params![work_order_id],
        )?)
    }

    pub fn delete_processes_by_order_tx(conn: &Connection, work_order_id: i64) -> RepositoryResult<usize> {
        Ok(conn.execute(
            "DELETE FROM work_order_process WHERE work_order_id = ?1",
            params![work_order_id],
        )?)
    }

    // ==========================================
    // 常规操作
    // ==========================================

    pub fn find_by_id(&self, id: i64) -> RepositoryResult<Option<WorkOrder>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, id)
    }

    pub fn find_by_number(&self, company_code: &str, order_number: &str) -> RepositoryResult<Option<WorkOrder>> {
        let conn = self.get_conn()?;
        Self::find_by_number_tx(&conn, company_code, order_number)
    }

    pub fn find_by_ids(&self, ids: &[i64]) -> RepositoryResult<Vec<WorkOrder>> {
        let conn = self.get_conn()?;
        let mut orders = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(order) = Self::find_by_id_tx(&conn, *id)? {
                orders.push(order);
            }
        }
        Ok(orders)
    }

    /// 未完工工单（排程/分配/完工巡检用）
    pub fn list_active(&self) -> RepositoryResult<Vec<WorkOrder>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM work_order WHERE status <> 'completed' ORDER BY id",
            ORDER_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], Self::map_order)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    /// 分页查询（page 从 1 开始）
    pub fn list(
        &self,
        filter: &WorkOrderFilter,
        page: u32,
        page_size: u32,
    ) -> RepositoryResult<Page<WorkOrder>> {
        let conn = self.get_conn()?;
        let page = page.max(1);
        let page_size = page_size.clamp(1, 500);
        let offset = i64::from(page - 1) * i64::from(page_size);

        let where_clause = r#"
            WHERE (?1 IS NULL OR status = ?1)
              AND (?2 IS NULL OR company_code = ?2)
              AND (?3 IS NULL OR substr(created_at, 1, 10) >= ?3)
              AND (?4 IS NULL OR substr(created_at, 1, 10) <= ?4)
        "#;
        let status = filter.status.map(|s| s.to_db_str());
        let from = filter.created_from.map(fmt_date);
        let to = filter.created_to.map(fmt_date);

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM work_order {}", where_clause),
            params![status, filter.company_code, from, to],
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT {} FROM work_order {} ORDER BY created_at DESC, id DESC LIMIT ?5 OFFSET ?6",
            ORDER_COLUMNS, where_clause
        );
        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map(
                params![status, filter.company_code, from, to, page_size, offset],
                Self::map_order,
            )?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(Page {
            items,
            total,
            page,
            page_size,
        })
    }

    pub fn update_status(&self, id: i64, status: WorkOrderStatus, now: NaiveDateTime) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        Self::update_status_tx(&conn, id, status, now)
    }

    /// 删除工单（级联删除工序/派工/生产记录）
    pub fn delete(&self, id: i64) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        Self::delete_tx(&conn, id)
    }

    pub fn list_processes(&self, work_order_id: i64) -> RepositoryResult<Vec<WorkOrderProcess>> {
        let conn = self.get_conn()?;
        Self::list_processes_tx(&conn, work_order_id)
    }

    pub fn list_dispatch(&self, work_order_id: i64) -> RepositoryResult<Vec<DispatchRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, work_order_id, process_name, operator, quantity, created_by, created_at
            FROM dispatch_record WHERE work_order_id = ?1 ORDER BY id
            "#,
        )?;
        let rows = stmt
            .query_map(params![work_order_id], |row| {
                Ok(DispatchRecord {
                    id: row.get(0)?,
                    work_order_id: row.get(1)?,
                    process_name: row.get(2)?,
                    operator: row.get(3)?,
                    quantity: row.get(4)?,
                    created_by: row.get(5)?,
                    created_at: get_datetime(row, 6)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }
}
