// ==========================================
// 制造执行系统 (MES) - 后台作业审计仓储
// ==========================================

use crate::db::SharedConnection;
use crate::domain::job::{JobOutcome, JobRun};
use crate::domain::types::JobRunStatus;
use crate::repository::codec::{fmt_datetime, get_datetime};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Result as SqliteResult};

pub struct JobRunRepository {
    conn: SharedConnection,
}

impl JobRunRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn record(
        &self,
        job_name: &str,
        status: JobRunStatus,
        started_at: NaiveDateTime,
        finished_at: NaiveDateTime,
        outcome: &JobOutcome,
    ) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO job_run (job_name, status, started_at, finished_at, processed, failed, message)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                job_name,
                status.to_db_str(),
                fmt_datetime(started_at),
                fmt_datetime(finished_at),
                outcome.processed,
                outcome.failed,
                outcome.message,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_recent(&self, job_name: Option<&str>, limit: u32) -> RepositoryResult<Vec<JobRun>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, job_name, status, started_at, finished_at, processed, failed, message
            FROM job_run
            WHERE (?1 IS NULL OR job_name = ?1)
            ORDER BY id DESC LIMIT ?2
            "#,
        )?;
        let rows = stmt
            .query_map(params![job_name, limit], |row| {
                Ok(JobRun {
                    id: row.get(0)?,
                    job_name: row.get(1)?,
                    status: JobRunStatus::from_str(&row.get::<_, String>(2)?),
                    started_at: get_datetime(row, 3)?,
                    finished_at: get_datetime(row, 4)?,
                    processed: row.get(5)?,
                    failed: row.get(6)?,
                    message: row.get(7)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }
}
