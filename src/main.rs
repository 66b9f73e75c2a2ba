// ==========================================
// 制造执行系统 (MES) - 服务主入口
// ==========================================
// 启动流程: 日志 → 数据库 → 配置 → 后台作业，Ctrl-C 退出
// ==========================================

use std::sync::Arc;

use anyhow::{anyhow, Context};
use factory_mes::app::{get_default_db_path, AppState, WorkerRunner};
use factory_mes::importer::ErpFileSource;
use factory_mes::logging;
use futures::future::join_all;

/// ERP 导出文件路径（未设置则不执行 ERP 同步）
const ERP_FILE_ENV: &str = "FACTORY_MES_ERP_FILE";
/// ERP 导出文件缺少公司代码列时使用的公司代码
const ERP_COMPANY_ENV: &str = "FACTORY_MES_ERP_COMPANY";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    tracing::info!("==================================================");
    tracing::info!("{}", factory_mes::APP_NAME);
    tracing::info!("系统版本: {}", factory_mes::VERSION);
    tracing::info!("==================================================");

    let db_path = get_default_db_path();
    tracing::info!("使用数据库: {}", db_path);

    let state = AppState::new(db_path)
        .await
        .map_err(|e| anyhow!(e))
        .context("无法初始化AppState")?;

    let mut runner = WorkerRunner::new(&state);
    if let Ok(path) = std::env::var(ERP_FILE_ENV) {
        let company = std::env::var(ERP_COMPANY_ENV).unwrap_or_else(|_| "01".to_string());
        tracing::info!(file = %path, company = %company, "ERP 文件数据源已启用");
        runner = runner.with_erp_source(Arc::new(ErpFileSource::new(path, &company)));
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handles = Arc::new(runner).spawn_all(shutdown_rx);
    tracing::info!(jobs = handles.len(), "后台作业已启动，按 Ctrl-C 退出");

    tokio::signal::ctrl_c().await.context("等待退出信号失败")?;
    tracing::info!("收到退出信号，正在停止后台作业");

    shutdown_tx.send(true).ok();
    for result in join_all(handles).await {
        if let Err(e) = result {
            tracing::warn!(error = %e, "后台作业退出异常");
        }
    }

    tracing::info!("服务已退出");
    Ok(())
}
