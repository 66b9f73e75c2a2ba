// ==========================================
// 制造执行系统 (MES) - 自动分配设置与日志仓储
// ==========================================

use crate::db::SharedConnection;
use crate::domain::allocation::{AllocationLog, AllocationTarget, AutoAllocationSettings};
use crate::repository::codec::{fmt_datetime, fmt_time, get_datetime, get_json, get_time, to_json};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};

// ==========================================
// AllocationRepository - 分配设置/日志仓储
// ==========================================
pub struct AllocationRepository {
    conn: SharedConnection,
}

impl AllocationRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 读取设置（行缺失时返回默认值）
    pub fn load_settings(&self) -> RepositoryResult<AutoAllocationSettings> {
        let conn = self.get_conn()?;
        let settings = conn
            .query_row(
                r#"
                SELECT enabled, interval_minutes, start_time, end_time, max_execution_minutes,
                       auto_allocation_enabled, completed_allocation_enabled
                FROM auto_allocation_settings WHERE id = 1
                "#,
                [],
                |row| {
                    Ok(AutoAllocationSettings {
                        enabled: row.get::<_, i64>(0)? != 0,
                        interval_minutes: row.get::<_, i64>(1)?.max(1) as u32,
                        start_time: get_time(row, 2)?,
                        end_time: get_time(row, 3)?,
                        max_execution_minutes: row.get::<_, i64>(4)?.max(1) as u32,
                        auto_allocation_enabled: row.get::<_, i64>(5)? != 0,
                        completed_allocation_enabled: row.get::<_, i64>(6)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(settings.unwrap_or_default())
    }

    pub fn save_settings(&self, settings: &AutoAllocationSettings) -> RepositoryResult<()> {
        if settings.interval_minutes == 0 || settings.max_execution_minutes == 0 {
            return Err(RepositoryError::ValidationError(
                "interval_minutes / max_execution_minutes 必须为正数".to_string(),
            ));
        }
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO auto_allocation_settings (
                id, enabled, interval_minutes, start_time, end_time, max_execution_minutes,
                auto_allocation_enabled, completed_allocation_enabled, updated_at
            ) VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, datetime('now', 'localtime'))
            ON CONFLICT(id) DO UPDATE SET
                enabled = excluded.enabled,
                interval_minutes = excluded.interval_minutes,
                start_time = excluded.start_time,
                end_time = excluded.end_time,
                max_execution_minutes = excluded.max_execution_minutes,
                auto_allocation_enabled = excluded.auto_allocation_enabled,
                completed_allocation_enabled = excluded.completed_allocation_enabled,
                updated_at = excluded.updated_at
            "#,
            params![
                settings.enabled as i64,
                settings.interval_minutes,
                fmt_time(settings.start_time),
                fmt_time(settings.end_time),
                settings.max_execution_minutes,
                settings.auto_allocation_enabled as i64,
                settings.completed_allocation_enabled as i64,
            ],
        )?;
        Ok(())
    }

    pub fn insert_log_tx(
        conn: &Connection,
        source_detail_id: i64,
        target: AllocationTarget,
        method: &str,
        allocated_quantities: &[i64],
        target_detail_ids: &[i64],
        now: NaiveDateTime,
    ) -> RepositoryResult<i64> {
        conn.execute(
            r#"
            INSERT INTO allocation_log (
                source_detail_id, target_kind, method, allocated_quantities, target_detail_ids, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                source_detail_id,
                target.to_db_str(),
                method,
                to_json(&allocated_quantities),
                to_json(&target_detail_ids),
                fmt_datetime(now),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_logs(&self, limit: u32) -> RepositoryResult<Vec<AllocationLog>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, source_detail_id, target_kind, method, allocated_quantities,
                   target_detail_ids, created_at
            FROM allocation_log ORDER BY id DESC LIMIT ?1
            "#,
        )?;
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok(AllocationLog {
                    id: row.get(0)?,
                    source_detail_id: row.get(1)?,
                    target: AllocationTarget::from_str(&row.get::<_, String>(2)?),
                    method: row.get(3)?,
                    allocated_quantities: get_json(row, 4)?,
                    target_detail_ids: get_json(row, 5)?,
                    created_at: get_datetime(row, 6)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }
}
