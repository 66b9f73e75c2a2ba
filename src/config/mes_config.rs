// ==========================================
// 制造执行系统 (MES) - 类型化配置
// ==========================================

use crate::domain::completed::factory_offset;
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

pub const DEFAULT_PACKAGING_PROCESS: &str = "出貨包裝";
pub const DEFAULT_FINAL_DAY_ONLY_KEYWORDS: &str = "出貨包裝,包裝";

/// 启动时与每次作业 tick 时加载的配置快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MesConfig {
    pub erp_sync_interval_minutes: u64,
    pub erp_sync_enabled: bool,
    pub auto_convert_interval_minutes: u64,
    pub auto_convert_enabled: bool,
    pub batch_dispatch_interval_minutes: u64,
    pub final_day_only_keywords: Vec<String>,
    pub packaging_process_name: String,
    pub schedule_safety_days: i64,
    pub factory_utc_offset_hours: i32,
    pub default_production_line: Option<String>,
    pub schedule_progress_ttl_minutes: i64,
    pub warning_keep_rows: i64,
    pub warning_trim_batch: i64,
}

impl Default for MesConfig {
    fn default() -> Self {
        Self {
            erp_sync_interval_minutes: 1,
            erp_sync_enabled: true,
            auto_convert_interval_minutes: 1,
            auto_convert_enabled: true,
            batch_dispatch_interval_minutes: 60,
            final_day_only_keywords: DEFAULT_FINAL_DAY_ONLY_KEYWORDS
                .split(',')
                .map(str::to_string)
                .collect(),
            packaging_process_name: DEFAULT_PACKAGING_PROCESS.to_string(),
            schedule_safety_days: 0,
            factory_utc_offset_hours: 8,
            default_production_line: None,
            schedule_progress_ttl_minutes: 60,
            warning_keep_rows: 10_000,
            warning_trim_batch: 10_000,
        }
    }
}

impl MesConfig {
    pub fn factory_offset(&self) -> FixedOffset {
        factory_offset(self.factory_utc_offset_hours)
    }

    /// 工序名是否命中"只在最后一天"关键字
    pub fn is_final_day_only(&self, process_name: &str) -> bool {
        self.final_day_only_keywords
            .iter()
            .any(|k| !k.is_empty() && process_name.contains(k.as_str()))
    }
}

/// 前台 API 与后台作业共用的配置快照；作业 tick 时整体替换
pub type SharedMesConfig = Arc<RwLock<MesConfig>>;

pub fn shared(config: MesConfig) -> SharedMesConfig {
    Arc::new(RwLock::new(config))
}

/// 读取当前快照（锁中毒时仍返回最后写入的值）
pub fn snapshot(shared: &SharedMesConfig) -> MesConfig {
    match shared.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

pub fn replace(shared: &SharedMesConfig, config: MesConfig) {
    match shared.write() {
        Ok(mut guard) => *guard = config,
        Err(poisoned) => *poisoned.into_inner() = config,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_day_only_keywords() {
        let cfg = MesConfig::default();
        assert!(cfg.is_final_day_only("出貨包裝"));
        assert!(cfg.is_final_day_only("彩盒包裝"));
        assert!(!cfg.is_final_day_only("SMT"));
    }

    #[test]
    fn test_factory_offset_default() {
        assert_eq!(MesConfig::default().factory_offset().local_minus_utc(), 8 * 3600);
    }
}
