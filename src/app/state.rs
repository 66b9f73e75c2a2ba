// ==========================================
// 制造执行系统 (MES) - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// ==========================================

use std::sync::Arc;

use crate::api::{
    AllocationApi, CalendarApi, CompletionApi, ConfigApi, ErpApi, MesContext, ReportApi,
    ScheduleApi, WorkOrderApi,
};
use crate::config::{ConfigManager, MesConfig, MesConfigReader};
use crate::db::{self, SharedConnection};
use crate::engine::OptionalEventPublisher;

/// 数据库路径环境变量
pub const DB_PATH_ENV: &str = "FACTORY_MES_DB_PATH";

/// 应用状态
///
/// 包含所有API实例和共享资源，前台调用与后台作业共用同一上下文
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 共享上下文（连接、配置快照、行事历缓存、排程进度）
    pub ctx: MesContext,

    pub config_manager: Arc<ConfigManager>,

    pub work_order_api: Arc<WorkOrderApi>,
    pub schedule_api: Arc<ScheduleApi>,
    pub calendar_api: Arc<CalendarApi>,
    pub report_api: Arc<ReportApi>,
    pub completion_api: Arc<CompletionApi>,
    pub allocation_api: Arc<AllocationApi>,
    pub erp_api: Arc<ErpApi>,
    pub config_api: Arc<ConfigApi>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// 打开（必要时建立）数据库并执行建表脚本，加载类型化配置后组装各 API
    pub async fn new(db_path: String) -> Result<Self, String> {
        tracing::info!(db_path = %db_path, "初始化AppState");

        let conn = db::open_shared(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        Self::from_connection(db_path, conn, OptionalEventPublisher::none()).await
    }

    /// 基于已打开的共享连接创建（测试与嵌入场景）
    pub async fn from_connection(
        db_path: String,
        conn: SharedConnection,
        events: OptionalEventPublisher,
    ) -> Result<Self, String> {
        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );
        let config = match config_manager.load_mes_config().await {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "配置加载失败，使用默认配置启动");
                MesConfig::default()
            }
        };
        tracing::info!(
            packaging = %config.packaging_process_name,
            offset_hours = config.factory_utc_offset_hours,
            "配置已加载"
        );

        let ctx = MesContext::new(conn, config, events);
        Ok(Self::from_context(db_path, ctx, config_manager))
    }

    /// 由上下文组装全部 API
    pub fn from_context(db_path: String, ctx: MesContext, config_manager: Arc<ConfigManager>) -> Self {
        Self {
            db_path,
            work_order_api: Arc::new(WorkOrderApi::new(ctx.clone())),
            schedule_api: Arc::new(ScheduleApi::new(ctx.clone())),
            calendar_api: Arc::new(CalendarApi::new(ctx.clone())),
            report_api: Arc::new(ReportApi::new(ctx.clone())),
            completion_api: Arc::new(CompletionApi::new(ctx.clone())),
            allocation_api: Arc::new(AllocationApi::new(ctx.clone())),
            erp_api: Arc::new(ErpApi::new(ctx.clone())),
            config_api: Arc::new(ConfigApi::new(ctx.clone(), config_manager.clone())),
            config_manager,
            ctx,
        }
    }
}

/// 获取默认数据库路径
///
/// 优先使用 FACTORY_MES_DB_PATH；否则放在用户数据目录下（开发构建使用独立目录）
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./factory_mes.db");

    if let Some(data_dir) = dirs::data_dir() {
        // 开发环境使用独立目录，避免污染生产数据
        #[cfg(debug_assertions)]
        {
            path = data_dir.join("factory-mes-dev");
        }

        #[cfg(not(debug_assertions))]
        {
            path = data_dir.join("factory-mes");
        }

        if let Err(e) = std::fs::create_dir_all(&path) {
            tracing::warn!(error = %e, dir = %path.display(), "数据目录创建失败，改用当前目录");
            return "./factory_mes.db".to_string();
        }
        path = path.join("factory_mes.db");
    }

    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_default_db_path() {
        let path = get_default_db_path();
        assert!(!path.is_empty());
        assert!(path.ends_with(".db"));
    }

    #[tokio::test]
    async fn test_app_state_new_creates_schema() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("mes.db").to_string_lossy().to_string();

        let state = AppState::new(db_path.clone()).await.unwrap();
        assert_eq!(state.db_path, db_path);
        assert_eq!(
            state.config_api.current().packaging_process_name,
            MesConfig::default().packaging_process_name
        );
        // 建表后自动分配设置可读
        assert!(state.allocation_api.get_settings().is_ok());
    }
}
