// ==========================================
// 制造执行系统 (MES) - 配置管理 API
// ==========================================
// 职责: 配置查询、更新、快照管理、类型化配置重载
// 说明: 写入后由下一次作业 tick 生效；reload 可立即生效
// ==========================================

use crate::api::context::MesContext;
use crate::api::error::{ApiError, ApiResult};
use crate::config::config_manager::{config_keys, ConfigEntry, ConfigManager};
use crate::config::{MesConfig, MesConfigReader};
use std::sync::Arc;
use tracing::info;

/// 只接受正整数的配置键
const POSITIVE_INTEGER_KEYS: &[&str] = &[
    config_keys::AUTO_SYNC_INTERVAL,
    config_keys::AUTO_CONVERT_INTERVAL,
    config_keys::BATCH_DISPATCH_INTERVAL,
    config_keys::SCHEDULE_PROGRESS_TTL,
    config_keys::WARNING_TRIM_BATCH,
];

// ==========================================
// ConfigApi - 配置管理 API
// ==========================================

/// 配置管理API
///
/// 职责：
/// 1. 配置查询（全部、单个）
/// 2. 配置更新（单个，带格式校验）
/// 3. 配置快照管理
/// 4. 重载类型化配置到共享快照
pub struct ConfigApi {
    ctx: MesContext,
    config_manager: Arc<ConfigManager>,
}

impl ConfigApi {
    pub fn new(ctx: MesContext, config_manager: Arc<ConfigManager>) -> Self {
        Self { ctx, config_manager }
    }

    /// 查询所有配置
    pub fn list_configs(&self) -> ApiResult<Vec<ConfigEntry>> {
        self.config_manager
            .list()
            .map_err(|e| ApiError::DatabaseError(e.to_string()))
    }

    /// 查询单个配置
    ///
    /// # 返回
    /// - Ok(Some(value)): 配置值
    /// - Ok(None): 配置不存在（使用默认值）
    pub fn get_config(&self, key: &str) -> ApiResult<Option<String>> {
        self.config_manager
            .get(key)
            .map_err(|e| ApiError::DatabaseError(e.to_string()))
    }

    /// 更新配置
    ///
    /// # 参数
    /// - key: 配置键
    /// - value: 配置值
    /// - description: 说明（可选）
    pub fn update_config(&self, key: &str, value: &str, description: Option<&str>) -> ApiResult<()> {
        if key.trim().is_empty() {
            return Err(ApiError::InvalidInput("配置键不能为空".to_string()));
        }
        validate_value(key.trim(), value)?;

        self.config_manager
            .set(key.trim(), value.trim(), description)
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?;
        info!(config_key = key, value, "配置已更新，下一次作业周期生效");
        Ok(())
    }

    /// 当前生效的类型化配置
    pub fn current(&self) -> MesConfig {
        self.ctx.config()
    }

    /// 从 system_config 重新加载并替换共享快照
    pub async fn reload(&self) -> ApiResult<MesConfig> {
        let config = self
            .config_manager
            .load_mes_config()
            .await
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?;
        self.ctx.replace_config(config.clone());
        Ok(config)
    }

    /// 获取配置快照（JSON）
    pub fn get_config_snapshot(&self) -> ApiResult<String> {
        self.config_manager
            .get_config_snapshot()
            .map_err(|e| ApiError::DatabaseError(e.to_string()))
    }

    /// 从快照恢复配置，返回恢复的配置数量
    pub fn restore_from_snapshot(&self, snapshot_json: &str) -> ApiResult<usize> {
        if snapshot_json.trim().is_empty() {
            return Err(ApiError::InvalidInput("快照JSON不能为空".to_string()));
        }
        self.config_manager
            .restore_config_from_snapshot(snapshot_json)
            .map_err(|e| ApiError::InvalidInput(e.to_string()))
    }
}

fn validate_value(key: &str, value: &str) -> ApiResult<()> {
    let value = value.trim();
    let invalid = |expect: &str| {
        Err(ApiError::InvalidInput(format!(
            "配置 {} 的值 {:?} 无效，应为{}",
            key, value, expect
        )))
    };

    if POSITIVE_INTEGER_KEYS.contains(&key) {
        return match value.parse::<i64>() {
            Ok(v) if v > 0 => Ok(()),
            _ => invalid("正整数"),
        };
    }
    match key {
        config_keys::AUTO_SYNC_ENABLED | config_keys::AUTO_CONVERT_ENABLED => {
            match value.to_lowercase().as_str() {
                "true" | "false" | "1" | "0" | "yes" | "no" | "on" | "off" => Ok(()),
                _ => invalid("布尔值"),
            }
        }
        config_keys::SCHEDULE_SAFETY_DAYS | config_keys::WARNING_KEEP_ROWS => {
            match value.parse::<i64>() {
                Ok(v) if v >= 0 => Ok(()),
                _ => invalid("非负整数"),
            }
        }
        config_keys::FACTORY_UTC_OFFSET_HOURS => match value.parse::<i32>() {
            Ok(v) if (-12..=14).contains(&v) => Ok(()),
            _ => invalid("-12 到 14 之间的整数"),
        },
        config_keys::PACKAGING_PROCESS_NAME if value.is_empty() => invalid("非空工序名"),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_value() {
        assert!(validate_value(config_keys::AUTO_CONVERT_INTERVAL, "5").is_ok());
        assert!(validate_value(config_keys::AUTO_CONVERT_INTERVAL, "0").is_err());
        assert!(validate_value(config_keys::AUTO_SYNC_ENABLED, "off").is_ok());
        assert!(validate_value(config_keys::AUTO_SYNC_ENABLED, "maybe").is_err());
        assert!(validate_value(config_keys::FACTORY_UTC_OFFSET_HOURS, "15").is_err());
        assert!(validate_value(config_keys::PACKAGING_PROCESS_NAME, " ").is_err());
        // 未知键不校验
        assert!(validate_value("custom_note", "anything").is_ok());
    }
}
