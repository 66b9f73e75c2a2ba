// ==========================================
// 制造执行系统 (MES) - ERP 公司订单仓储
// ==========================================
// 唯一键: (company_code, bill_no, product_code)
// ==========================================

use crate::db::SharedConnection;
use crate::domain::erp::{CompanyOrder, ErpOrigin};
use crate::repository::codec::{fmt_datetime, get_datetime};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Result as SqliteResult, Row};

const COLUMNS: &str = r#"
    id, company_code, bill_no, origin, customer_name, product_code, qty_remain, bill_date,
    pre_in_date, bill_status, converted_work_order_id, synced_at
"#;

/// 待写入的公司订单（日期已转换为 ISO 或 "N/A"）
#[derive(Debug, Clone, PartialEq)]
pub struct CompanyOrderUpsert {
    pub company_code: String,
    pub bill_no: String,
    pub origin: ErpOrigin,
    pub customer_name: Option<String>,
    pub product_code: String,
    pub qty_remain: i64,
    pub bill_date: String,
    pub pre_in_date: String,
    pub bill_status: Option<i64>,
}

// ==========================================
// CompanyOrderRepository - 公司订单仓储
// ==========================================
pub struct CompanyOrderRepository {
    conn: SharedConnection,
}

impl CompanyOrderRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row<'_>) -> SqliteResult<CompanyOrder> {
        Ok(CompanyOrder {
            id: row.get(0)?,
            company_code: row.get(1)?,
            bill_no: row.get(2)?,
            origin: ErpOrigin::from_str(&row.get::<_, String>(3)?),
            customer_name: row.get(4)?,
            product_code: row.get(5)?,
            qty_remain: row.get(6)?,
            bill_date: row.get(7)?,
            pre_in_date: row.get(8)?,
            bill_status: row.get(9)?,
            converted_work_order_id: row.get(10)?,
            synced_at: get_datetime(row, 11)?,
        })
    }

    /// 批量 upsert（单事务），返回写入行数
    pub fn upsert_many(&self, rows: &[CompanyOrderUpsert], now: NaiveDateTime) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO company_order (
                    company_code, bill_no, origin, customer_name, product_code, qty_remain,
                    bill_date, pre_in_date, bill_status, synced_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT(company_code, bill_no, product_code) DO UPDATE SET
                    origin = excluded.origin,
                    customer_name = excluded.customer_name,
                    qty_remain = excluded.qty_remain,
                    bill_date = excluded.bill_date,
                    pre_in_date = excluded.pre_in_date,
                    bill_status = excluded.bill_status,
                    synced_at = excluded.synced_at
                "#,
            )?;
            for r in rows {
                stmt.execute(params![
                    r.company_code,
                    r.bill_no,
                    r.origin.to_db_str(),
                    r.customer_name,
                    r.product_code,
                    r.qty_remain,
                    r.bill_date,
                    r.pre_in_date,
                    r.bill_status,
                    fmt_datetime(now),
                ])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    /// 尚未转为工单的订单
    pub fn list_unconverted(&self) -> RepositoryResult<Vec<CompanyOrder>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM company_order
            WHERE converted_work_order_id IS NULL AND qty_remain > 0
            ORDER BY pre_in_date, id
            "#,
            COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], Self::map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn mark_converted_tx(conn: &Connection, id: i64, work_order_id: i64) -> RepositoryResult<()> {
        conn.execute(
            "UPDATE company_order SET converted_work_order_id = ?2 WHERE id = ?1",
            params![id, work_order_id],
        )?;
        Ok(())
    }

    pub fn find(&self, company_code: &str, bill_no: &str, product_code: &str) -> RepositoryResult<Option<CompanyOrder>> {
        use rusqlite::OptionalExtension;
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM company_order WHERE company_code = ?1 AND bill_no = ?2 AND product_code = ?3",
            COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![company_code, bill_no, product_code], Self::map_row)
            .optional()?)
    }
}
