// ==========================================
// 制造执行系统 (MES) - 配置层
// ==========================================
// 职责: 系统配置管理与类型化读取
// 存储: system_config 表
// ==========================================

pub mod config_manager;
pub mod mes_config;
pub mod mes_config_trait;

pub use config_manager::{config_keys, ConfigEntry, ConfigManager};
pub use mes_config::{MesConfig, SharedMesConfig, DEFAULT_PACKAGING_PROCESS};
pub use mes_config_trait::{ConfigResult, MesConfigReader};
