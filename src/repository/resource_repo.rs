// ==========================================
// 制造执行系统 (MES) - 资源目录数据仓储
// ==========================================
// 作业员 / 一般设备 / SMT 设备 / 产线
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::db::SharedConnection;
use crate::domain::resource::{Equipment, Operator, ProductionLine, SmtEquipment};
use crate::repository::codec::{fmt_time, get_json, get_time, parse_time_str, to_json};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};

const LINE_COLUMNS: &str = r#"
    id, name, work_start, work_end, lunch_start, lunch_end,
    overtime_start, overtime_end, work_days, is_active
"#;

// ==========================================
// ResourceRepository - 资源目录仓储
// ==========================================
pub struct ResourceRepository {
    conn: SharedConnection,
}

impl ResourceRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ===== 作业员 =====

    pub fn insert_operator(&self, name: &str, skill_set: &[String]) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO operator (name, skill_set, is_active) VALUES (?1, ?2, 1)",
            params![name, to_json(&skill_set)],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn set_operator_active(&self, id: i64, active: bool) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE operator SET is_active = ?2 WHERE id = ?1",
            params![id, active as i64],
        )?;
        if affected == 0 {
            return Err(RepositoryError::not_found("Operator", id));
        }
        Ok(())
    }

    pub fn list_active_operators(&self) -> RepositoryResult<Vec<Operator>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, skill_set, is_active FROM operator WHERE is_active = 1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Operator {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    skill_set: get_json(row, 2)?,
                    is_active: row.get::<_, i64>(3)? != 0,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn find_operator_by_name(&self, name: &str) -> RepositoryResult<Option<Operator>> {
        let conn = self.get_conn()?;
        let op = conn
            .query_row(
                "SELECT id, name, skill_set, is_active FROM operator WHERE name = ?1 ORDER BY id LIMIT 1",
                params![name],
                |row| {
                    Ok(Operator {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        skill_set: get_json(row, 2)?,
                        is_active: row.get::<_, i64>(3)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(op)
    }

    // ===== 一般设备 =====

    pub fn insert_equipment(
        &self,
        name: &str,
        process_set: &[String],
        unit_name: Option<&str>,
    ) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO equipment (name, process_set, unit_name, is_active) VALUES (?1, ?2, ?3, 1)",
            params![name, to_json(&process_set), unit_name],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_active_equipment(&self) -> RepositoryResult<Vec<Equipment>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, name, process_set, unit_name, is_active
            FROM equipment WHERE is_active = 1 ORDER BY id
            "#,
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Equipment {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    process_set: get_json(row, 2)?,
                    unit_name: row.get(3)?,
                    is_active: row.get::<_, i64>(4)? != 0,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    // ===== SMT 设备 =====

    pub fn insert_smt_equipment(&self, name: &str) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO smt_equipment (name, is_active) VALUES (?1, 1)",
            params![name],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_active_smt_equipment(&self) -> RepositoryResult<Vec<SmtEquipment>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, is_active FROM smt_equipment WHERE is_active = 1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(SmtEquipment {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    is_active: row.get::<_, i64>(2)? != 0,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    // ===== 产线 =====

    fn map_line(row: &Row<'_>) -> SqliteResult<ProductionLine> {
        let opt_time = |idx: usize| -> SqliteResult<_> {
            Ok(row
                .get::<_, Option<String>>(idx)?
                .as_deref()
                .and_then(parse_time_str))
        };
        Ok(ProductionLine {
            id: row.get(0)?,
            name: row.get(1)?,
            work_start: get_time(row, 2)?,
            work_end: get_time(row, 3)?,
            lunch_start: opt_time(4)?,
            lunch_end: opt_time(5)?,
            overtime_start: opt_time(6)?,
            overtime_end: opt_time(7)?,
            work_days: ProductionLine::parse_work_days(&row.get::<_, String>(8)?),
            is_active: row.get::<_, i64>(9)? != 0,
        })
    }

    /// 新增或按名称更新产线
    pub fn upsert_line(&self, line: &ProductionLine) -> RepositoryResult<i64> {
        if line.work_end <= line.work_start {
            return Err(RepositoryError::ValidationError(format!(
                "产线 {} 下班时间必须晚于上班时间",
                line.name
            )));
        }
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO production_line (
                name, work_start, work_end, lunch_start, lunch_end,
                overtime_start, overtime_end, work_days, is_active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(name) DO UPDATE SET
                work_start = excluded.work_start,
                work_end = excluded.work_end,
                lunch_start = excluded.lunch_start,
                lunch_end = excluded.lunch_end,
                overtime_start = excluded.overtime_start,
                overtime_end = excluded.overtime_end,
                work_days = excluded.work_days,
                is_active = excluded.is_active
            "#,
            params![
                line.name,
                fmt_time(line.work_start),
                fmt_time(line.work_end),
                line.lunch_start.map(fmt_time),
                line.lunch_end.map(fmt_time),
                line.overtime_start.map(fmt_time),
                line.overtime_end.map(fmt_time),
                line.work_days_to_db_str(),
                line.is_active as i64,
            ],
        )?;
        let id: i64 = conn.query_row(
            "SELECT id FROM production_line WHERE name = ?1",
            params![line.name],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn find_line_by_name(&self, name: &str) -> RepositoryResult<Option<ProductionLine>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM production_line WHERE name = ?1", LINE_COLUMNS);
        let line = conn.query_row(&sql, params![name], Self::map_line).optional()?;
        Ok(line)
    }

    pub fn list_active_lines(&self) -> RepositoryResult<Vec<ProductionLine>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM production_line WHERE is_active = 1 ORDER BY id",
            LINE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let lines = stmt
            .query_map([], Self::map_line)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(lines)
    }
}
