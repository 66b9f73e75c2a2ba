// ==========================================
// 制造执行系统 (MES) - 配置读取 Trait
// ==========================================
// 职责: 定义引擎与后台作业所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::config::mes_config::MesConfig;
use async_trait::async_trait;
use std::error::Error;

pub type ConfigResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

// ==========================================
// MesConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 system_config 表读取）
// 约定: 值缺失或无法解析时返回默认值，仅在存储层故障时返回 Err
#[async_trait]
pub trait MesConfigReader: Send + Sync {
    // ===== 后台作业 =====

    /// ERP 同步间隔（分钟，默认 1）
    async fn get_erp_sync_interval_minutes(&self) -> ConfigResult<u64>;

    async fn get_erp_sync_enabled(&self) -> ConfigResult<bool>;

    /// 自动转工单间隔（分钟，默认 1）
    async fn get_auto_convert_interval_minutes(&self) -> ConfigResult<u64>;

    async fn get_auto_convert_enabled(&self) -> ConfigResult<bool>;

    /// 完工巡检与警告裁剪间隔（分钟，默认 60）
    async fn get_batch_dispatch_interval_minutes(&self) -> ConfigResult<u64>;

    // ===== 工序口径 =====

    /// 只在最后一天报工的工序关键字（默认 出貨包裝,包裝）
    async fn get_final_day_only_keywords(&self) -> ConfigResult<Vec<String>>;

    /// 包装工序名称（默认 出貨包裝）
    async fn get_packaging_process_name(&self) -> ConfigResult<String>;

    // ===== 排程 =====

    /// 交期前的安全天数（默认 0）
    async fn get_schedule_safety_days(&self) -> ConfigResult<i64>;

    /// 工厂时区偏移（小时，默认 +8）
    async fn get_factory_utc_offset_hours(&self) -> ConfigResult<i32>;

    /// 默认产线名称（None = 第一条启用产线）
    async fn get_default_production_line(&self) -> ConfigResult<Option<String>>;

    /// 排程进度保留时长（分钟，默认 60）
    async fn get_schedule_progress_ttl_minutes(&self) -> ConfigResult<i64>;

    // ===== 警告看板 =====

    async fn get_warning_keep_rows(&self) -> ConfigResult<i64>;

    async fn get_warning_trim_batch(&self) -> ConfigResult<i64>;

    /// 一次性读取全部配置
    async fn load_mes_config(&self) -> ConfigResult<MesConfig> {
        Ok(MesConfig {
            erp_sync_interval_minutes: self.get_erp_sync_interval_minutes().await?,
            erp_sync_enabled: self.get_erp_sync_enabled().await?,
            auto_convert_interval_minutes: self.get_auto_convert_interval_minutes().await?,
            auto_convert_enabled: self.get_auto_convert_enabled().await?,
            batch_dispatch_interval_minutes: self.get_batch_dispatch_interval_minutes().await?,
            final_day_only_keywords: self.get_final_day_only_keywords().await?,
            packaging_process_name: self.get_packaging_process_name().await?,
            schedule_safety_days: self.get_schedule_safety_days().await?,
            factory_utc_offset_hours: self.get_factory_utc_offset_hours().await?,
            default_production_line: self.get_default_production_line().await?,
            schedule_progress_ttl_minutes: self.get_schedule_progress_ttl_minutes().await?,
            warning_keep_rows: self.get_warning_keep_rows().await?,
            warning_trim_batch: self.get_warning_trim_batch().await?,
        })
    }
}
