// ==========================================
// 制造执行系统 (MES) - 排程警告看板仓储
// ==========================================
// 只追加；裁剪按批删除最旧行，每批单独提交以缩短锁持有时间
// ==========================================

use crate::db::SharedConnection;
use crate::domain::warning::{NewScheduleWarning, ScheduleWarning, WarningCategory, WarningSummary};
use crate::repository::codec::{fmt_datetime, get_datetime};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use std::time::Instant;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};

// ==========================================
// WarningRepository - 警告看板仓储
// ==========================================
pub struct WarningRepository {
    conn: SharedConnection,
}

impl WarningRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn insert_tx(
        conn: &Connection,
        warning: &NewScheduleWarning,
        now: NaiveDateTime,
    ) -> RepositoryResult<i64> {
        conn.execute(
            r#"
            INSERT INTO schedule_warning (order_id, process_name, warning_message, category, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                warning.order_id,
                warning.process_name,
                warning.warning_message,
                warning.category().to_db_str(),
                fmt_datetime(now),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_many(&self, warnings: &[NewScheduleWarning], now: NaiveDateTime) -> RepositoryResult<usize> {
        if warnings.is_empty() {
            return Ok(0);
        }
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        for w in warnings {
            Self::insert_tx(&tx, w, now)?;
        }
        tx.commit()?;
        Ok(warnings.len())
    }

    /// 最新警告（id 倒序）
    pub fn list_recent(&self, limit: u32) -> RepositoryResult<Vec<ScheduleWarning>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, order_id, process_name, warning_message, category, created_at
            FROM schedule_warning ORDER BY id DESC LIMIT ?1
            "#,
        )?;
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok(ScheduleWarning {
                    id: row.get(0)?,
                    order_id: row.get(1)?,
                    process_name: row.get(2)?,
                    warning_message: row.get(3)?,
                    category: WarningCategory::from_str(&row.get::<_, String>(4)?),
                    created_at: get_datetime(row, 5)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn count(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM schedule_warning", [], |row| row.get(0))?)
    }

    pub fn summary(&self) -> RepositoryResult<WarningSummary> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT category, COUNT(*) FROM schedule_warning GROUP BY category")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<SqliteResult<Vec<_>>>()?;
        let mut summary = WarningSummary::default();
        for (category, count) in rows {
            summary.add(WarningCategory::from_str(&category), count);
        }
        Ok(summary)
    }

    /// 保留最新 keep 行，按批删除更旧的行；返回删除总数
    /// 到达 deadline 后不再开始新批次
    pub fn trim(&self, keep: i64, batch: i64, deadline: Option<Instant>) -> RepositoryResult<usize> {
        let batch = batch.max(1);
        let keep = keep.max(0);
        let mut deleted_total = 0usize;
        loop {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break;
            }
            // 每批重新取锁，批间让出连接
            let conn = self.get_conn()?;
            let threshold: Option<i64> = conn
                .query_row(
                    "SELECT id FROM schedule_warning ORDER BY id DESC LIMIT 1 OFFSET ?1",
                    params![keep],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(threshold) = threshold else {
                break;
            };
            let deleted = conn.execute(
                r#"
                DELETE FROM schedule_warning
                WHERE id IN (
                    SELECT id FROM schedule_warning WHERE id <= ?1 ORDER BY id LIMIT ?2
                )
                "#,
                params![threshold, batch],
            )?;
            deleted_total += deleted;
            if deleted == 0 {
                break;
            }
        }
        Ok(deleted_total)
    }
}
