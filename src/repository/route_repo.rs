// ==========================================
// 制造执行系统 (MES) - 工艺路线与标准产能仓储
// ==========================================
// 标准产能只有一个查询入口: standard_capacity
// ==========================================

use crate::db::SharedConnection;
use crate::domain::route::{ProductProcessStandardCapacity, ProductRoute, DEFAULT_CAPACITY_PER_HOUR};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};

// ==========================================
// RouteRepository - 路线与产能仓储
// ==========================================
pub struct RouteRepository {
    conn: SharedConnection,
}

impl RouteRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 在事务中读取产品路线（step_order 升序）
    pub fn find_route_tx(conn: &Connection, product_code: &str) -> RepositoryResult<Vec<ProductRoute>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT id, product_code, step_order, process_name, is_smt
            FROM product_route
            WHERE product_code = ?1
            ORDER BY step_order
            "#,
        )?;
        let steps = stmt
            .query_map(params![product_code], |row| {
                Ok(ProductRoute {
                    id: row.get(0)?,
                    product_code: row.get(1)?,
                    step_order: row.get(2)?,
                    process_name: row.get(3)?,
                    is_smt: row.get::<_, i64>(4)? != 0,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(steps)
    }

    pub fn find_route(&self, product_code: &str) -> RepositoryResult<Vec<ProductRoute>> {
        let conn = self.get_conn()?;
        Self::find_route_tx(&conn, product_code)
    }

    /// 新增或更新路线的一步
    pub fn upsert_step(
        &self,
        product_code: &str,
        step_order: i32,
        process_name: &str,
        is_smt: bool,
    ) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO product_route (product_code, step_order, process_name, is_smt)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(product_code, step_order) DO UPDATE SET
                process_name = excluded.process_name,
                is_smt = excluded.is_smt
            "#,
            params![product_code, step_order, process_name, is_smt as i64],
        )?;
        let id: i64 = conn.query_row(
            "SELECT id FROM product_route WHERE product_code = ?1 AND step_order = ?2",
            params![product_code, step_order],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// 某工序在任意路线中是否标记为 SMT
    pub fn is_smt_process(&self, process_name: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let flag = conn
            .query_row(
                "SELECT MAX(is_smt) FROM product_route WHERE process_name = ?1",
                params![process_name],
                |row| row.get::<_, Option<i64>>(0),
            )?
            .unwrap_or(0);
        Ok(flag != 0)
    }

    // ===== 标准产能 =====

    /// 新增一个产能版本（版本号自动递增），返回版本号
    pub fn insert_capacity_version(
        &self,
        product_code: &str,
        process_name: &str,
        capacity_per_hour: f64,
    ) -> RepositoryResult<i32> {
        if capacity_per_hour <= 0.0 {
            return Err(RepositoryError::FieldValueError {
                field: "standard_capacity_per_hour".to_string(),
                message: format!("必须为正数: {}", capacity_per_hour),
            });
        }
        let conn = self.get_conn()?;
        let next_version: i32 = conn.query_row(
            r#"
            SELECT COALESCE(MAX(version), 0) + 1
            FROM product_process_standard_capacity
            WHERE product_code = ?1 AND process_name = ?2
            "#,
            params![product_code, process_name],
            |row| row.get(0),
        )?;
        conn.execute(
            r#"
            INSERT INTO product_process_standard_capacity (
                product_code, process_name, version, standard_capacity_per_hour, is_active, created_at
            ) VALUES (?1, ?2, ?3, ?4, 1, datetime('now', 'localtime'))
            "#,
            params![product_code, process_name, next_version, capacity_per_hour],
        )?;
        Ok(next_version)
    }

    pub fn set_capacity_active(
        &self,
        product_code: &str,
        process_name: &str,
        version: i32,
        active: bool,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"
            UPDATE product_process_standard_capacity SET is_active = ?4
            WHERE product_code = ?1 AND process_name = ?2 AND version = ?3
            "#,
            params![product_code, process_name, version, active as i64],
        )?;
        if affected == 0 {
            return Err(RepositoryError::not_found(
                "ProductProcessStandardCapacity",
                format!("{}/{}/v{}", product_code, process_name, version),
            ));
        }
        Ok(())
    }

    /// 最新启用版本
    pub fn find_latest_capacity(
        &self,
        product_code: &str,
        process_name: &str,
    ) -> RepositoryResult<Option<ProductProcessStandardCapacity>> {
        let conn = self.get_conn()?;
        let row = conn
            .query_row(
                r#"
                SELECT id, product_code, process_name, version, standard_capacity_per_hour, is_active
                FROM product_process_standard_capacity
                WHERE product_code = ?1 AND process_name = ?2 AND is_active = 1
                ORDER BY version DESC
                LIMIT 1
                "#,
                params![product_code, process_name],
                |row| {
                    Ok(ProductProcessStandardCapacity {
                        id: row.get(0)?,
                        product_code: row.get(1)?,
                        process_name: row.get(2)?,
                        version: row.get(3)?,
                        standard_capacity_per_hour: row.get(4)?,
                        is_active: row.get::<_, i64>(5)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// 标准产能（件/小时）：最新启用版本，否则 1000
    pub fn standard_capacity(&self, product_code: &str, process_name: &str) -> RepositoryResult<f64> {
        Ok(self
            .find_latest_capacity(product_code, process_name)?
            .map(|c| c.standard_capacity_per_hour)
            .unwrap_or(DEFAULT_CAPACITY_PER_HOUR))
    }
}
