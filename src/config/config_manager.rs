// ==========================================
// 制造执行系统 (MES) - 配置管理器
// ==========================================
// 职责: 配置加载、查询、写入、快照
// 存储: system_config 表 (key-value)
// ==========================================

use crate::config::mes_config::{MesConfig, DEFAULT_FINAL_DAY_ONLY_KEYWORDS};
use crate::config::mes_config_trait::{ConfigResult, MesConfigReader};
use crate::db::{open_sqlite_connection, SharedConnection};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

/// 单条配置项
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
    pub description: Option<String>,
    pub updated_at: String,
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: SharedConnection,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    pub fn new(db_path: &str) -> ConfigResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: SharedConnection) -> ConfigResult<Self> {
        {
            let guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&guard)?;
        }
        Ok(Self { conn })
    }

    fn lock(&self) -> ConfigResult<std::sync::MutexGuard<'_, Connection>> {
        Ok(self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?)
    }

    /// 读取配置值
    pub fn get(&self, key: &str) -> ConfigResult<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM system_config WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入配置值（upsert）
    pub fn set(&self, key: &str, value: &str, description: Option<&str>) -> ConfigResult<()> {
        let key = key.trim();
        if key.is_empty() {
            return Err("配置键不能为空".into());
        }
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO system_config (key, value, description, updated_at)
            VALUES (?1, ?2, ?3, datetime('now', 'localtime'))
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                description = COALESCE(excluded.description, system_config.description),
                updated_at = excluded.updated_at
            "#,
            params![key, value, description],
        )?;
        tracing::info!(config_key = key, "配置已更新");
        Ok(())
    }

    pub fn list(&self) -> ConfigResult<Vec<ConfigEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT key, value, description, updated_at FROM system_config ORDER BY key",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ConfigEntry {
                    key: row.get(0)?,
                    value: row.get(1)?,
                    description: row.get(2)?,
                    updated_at: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// 获取所有配置的快照（JSON 对象，键有序）
    pub fn get_config_snapshot(&self) -> ConfigResult<String> {
        let entries = self.list()?;
        let map: BTreeMap<String, String> =
            entries.into_iter().map(|e| (e.key, e.value)).collect();
        Ok(serde_json::to_string(&json!(map))?)
    }

    /// 从快照恢复配置，返回写入条数
    pub fn restore_config_from_snapshot(&self, snapshot_json: &str) -> ConfigResult<usize> {
        let map: BTreeMap<String, String> = serde_json::from_str(snapshot_json)?;
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        let mut count = 0;
        for (key, value) in &map {
            count += tx.execute(
                r#"
                INSERT INTO system_config (key, value, updated_at)
                VALUES (?1, ?2, datetime('now', 'localtime'))
                ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
                "#,
                params![key, value],
            )?;
        }
        tx.commit()?;
        Ok(count)
    }

    fn parsed_or<T: FromStr>(&self, key: &str, default: T) -> ConfigResult<T> {
        match self.get(key)? {
            None => Ok(default),
            Some(raw) => match raw.trim().parse::<T>() {
                Ok(v) => Ok(v),
                Err(_) => {
                    tracing::warn!(config_key = key, raw_value = %raw, "配置值无法解析，使用默认值");
                    Ok(default)
                }
            },
        }
    }

    fn bool_or(&self, key: &str, default: bool) -> ConfigResult<bool> {
        match self.get(key)? {
            None => Ok(default),
            Some(raw) => match raw.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" => Ok(false),
                _ => {
                    tracing::warn!(config_key = key, raw_value = %raw, "布尔配置无法解析，使用默认值");
                    Ok(default)
                }
            },
        }
    }
}

// ==========================================
// MesConfigReader Trait 实现
// ==========================================
#[async_trait]
impl MesConfigReader for ConfigManager {
    // ===== 后台作业 =====

    async fn get_erp_sync_interval_minutes(&self) -> ConfigResult<u64> {
        Ok(self.parsed_or(config_keys::AUTO_SYNC_INTERVAL, 1u64)?.max(1))
    }

    async fn get_erp_sync_enabled(&self) -> ConfigResult<bool> {
        self.bool_or(config_keys::AUTO_SYNC_ENABLED, true)
    }

    async fn get_auto_convert_interval_minutes(&self) -> ConfigResult<u64> {
        Ok(self.parsed_or(config_keys::AUTO_CONVERT_INTERVAL, 1u64)?.max(1))
    }

    async fn get_auto_convert_enabled(&self) -> ConfigResult<bool> {
        self.bool_or(config_keys::AUTO_CONVERT_ENABLED, true)
    }

    async fn get_batch_dispatch_interval_minutes(&self) -> ConfigResult<u64> {
        Ok(self.parsed_or(config_keys::BATCH_DISPATCH_INTERVAL, 60u64)?.max(1))
    }

    // ===== 工序口径 =====

    async fn get_final_day_only_keywords(&self) -> ConfigResult<Vec<String>> {
        let raw = self
            .get(config_keys::FINAL_DAY_ONLY_KEYWORDS)?
            .unwrap_or_else(|| DEFAULT_FINAL_DAY_ONLY_KEYWORDS.to_string());
        let keywords: Vec<String> = raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if keywords.is_empty() {
            Ok(MesConfig::default().final_day_only_keywords)
        } else {
            Ok(keywords)
        }
    }

    async fn get_packaging_process_name(&self) -> ConfigResult<String> {
        let value = self.get(config_keys::PACKAGING_PROCESS_NAME)?;
        Ok(value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| MesConfig::default().packaging_process_name))
    }

    // ===== 排程 =====

    async fn get_schedule_safety_days(&self) -> ConfigResult<i64> {
        Ok(self.parsed_or(config_keys::SCHEDULE_SAFETY_DAYS, 0i64)?.max(0))
    }

    async fn get_factory_utc_offset_hours(&self) -> ConfigResult<i32> {
        let hours = self.parsed_or(config_keys::FACTORY_UTC_OFFSET_HOURS, 8i32)?;
        if (-12..=14).contains(&hours) {
            Ok(hours)
        } else {
            tracing::warn!(hours, "时区偏移超出范围，使用 +8");
            Ok(8)
        }
    }

    async fn get_default_production_line(&self) -> ConfigResult<Option<String>> {
        Ok(self
            .get(config_keys::DEFAULT_PRODUCTION_LINE)?
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty()))
    }

    async fn get_schedule_progress_ttl_minutes(&self) -> ConfigResult<i64> {
        Ok(self.parsed_or(config_keys::SCHEDULE_PROGRESS_TTL, 60i64)?.max(1))
    }

    // ===== 警告看板 =====

    async fn get_warning_keep_rows(&self) -> ConfigResult<i64> {
        Ok(self.parsed_or(config_keys::WARNING_KEEP_ROWS, 10_000i64)?.max(0))
    }

    async fn get_warning_trim_batch(&self) -> ConfigResult<i64> {
        Ok(self.parsed_or(config_keys::WARNING_TRIM_BATCH, 10_000i64)?.max(1))
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 后台作业
    pub const AUTO_SYNC_INTERVAL: &str = "auto_sync_companyorder_interval";
    pub const AUTO_SYNC_ENABLED: &str = "auto_sync_companyorder_enabled";
    pub const AUTO_CONVERT_INTERVAL: &str = "auto_convert_interval";
    pub const AUTO_CONVERT_ENABLED: &str = "auto_convert_enabled";
    pub const BATCH_DISPATCH_INTERVAL: &str = "auto_batch_dispatch_interval";

    // 工序口径
    pub const FINAL_DAY_ONLY_KEYWORDS: &str = "final_day_only_process_keywords";
    pub const PACKAGING_PROCESS_NAME: &str = "packaging_process_name";

    // 排程
    pub const SCHEDULE_SAFETY_DAYS: &str = "schedule_safety_days";
    pub const FACTORY_UTC_OFFSET_HOURS: &str = "factory_utc_offset_hours";
    pub const DEFAULT_PRODUCTION_LINE: &str = "default_production_line";
    pub const SCHEDULE_PROGRESS_TTL: &str = "schedule_progress_ttl_minutes";

    // 警告看板
    pub const WARNING_KEEP_ROWS: &str = "warning_board_keep_rows";
    pub const WARNING_TRIM_BATCH: &str = "warning_board_trim_batch";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_shared;
    use tempfile::NamedTempFile;

    fn manager() -> (NamedTempFile, ConfigManager) {
        let file = NamedTempFile::new().unwrap();
        let conn = open_shared(file.path().to_str().unwrap()).unwrap();
        {
            let guard = conn.lock().unwrap();
            crate::db::init_schema(&guard).unwrap();
        }
        (file, ConfigManager::from_connection(conn).unwrap())
    }

    #[tokio::test]
    async fn test_defaults_when_table_empty() {
        let (_f, cm) = manager();
        let cfg = cm.load_mes_config().await.unwrap();
        assert_eq!(cfg, MesConfig::default());
    }

    #[tokio::test]
    async fn test_unparsable_value_falls_back() {
        let (_f, cm) = manager();
        cm.set(config_keys::AUTO_CONVERT_INTERVAL, "abc", None).unwrap();
        cm.set(config_keys::AUTO_SYNC_ENABLED, "false", None).unwrap();
        cm.set(config_keys::FINAL_DAY_ONLY_KEYWORDS, " 包裝 , 入庫 ,", None).unwrap();

        assert_eq!(cm.get_auto_convert_interval_minutes().await.unwrap(), 1);
        assert!(!cm.get_erp_sync_enabled().await.unwrap());
        assert_eq!(
            cm.get_final_day_only_keywords().await.unwrap(),
            vec!["包裝".to_string(), "入庫".to_string()]
        );
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let (_f, cm) = manager();
        cm.set("a", "1", Some("first")).unwrap();
        cm.set("b", "2", None).unwrap();
        let snap = cm.get_config_snapshot().unwrap();
        cm.set("a", "9", None).unwrap();
        assert_eq!(cm.restore_config_from_snapshot(&snap).unwrap(), 2);
        assert_eq!(cm.get("a").unwrap().as_deref(), Some("1"));
        let entries = cm.list().unwrap();
        assert_eq!(entries[0].description.as_deref(), Some("first"));
    }
}
