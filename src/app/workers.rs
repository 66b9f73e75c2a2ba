// ==========================================
// 制造执行系统 (MES) - 后台作业
// ==========================================
// 职责: ERP 同步、自动转工单、自动分配、完工巡检、警告看板裁剪
// 约定: 每次 tick 重新加载配置；单项失败记录日志后继续
// 审计: 每次实际执行写一条 job_run 记录
// ==========================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api::MesContext;
use crate::app::state::AppState;
use crate::config::{ConfigManager, MesConfig, MesConfigReader};
use crate::domain::job::{job_names, JobOutcome};
use crate::engine::{ErpOrderSource, JobError, JobResult};
use crate::repository::{JobRunRepository, WarningRepository};

/// 作业最长执行时间（分钟）
pub const DEFAULT_MAX_EXECUTION_MINUTES: u32 = 30;

/// 停止信号（true = 停止）
pub type ShutdownSignal = watch::Receiver<bool>;

// ==========================================
// WorkerRunner - 周期作业执行器
// ==========================================
pub struct WorkerRunner {
    ctx: MesContext,
    config_manager: Arc<ConfigManager>,
    erp_source: Option<Arc<dyn ErpOrderSource>>,
    max_execution_minutes: u32,
}

impl WorkerRunner {
    pub fn new(state: &AppState) -> Self {
        Self {
            ctx: state.ctx.clone(),
            config_manager: state.config_manager.clone(),
            erp_source: None,
            max_execution_minutes: DEFAULT_MAX_EXECUTION_MINUTES,
        }
    }

    /// 未设置数据源时跳过 ERP 同步
    pub fn with_erp_source(mut self, source: Arc<dyn ErpOrderSource>) -> Self {
        self.erp_source = Some(source);
        self
    }

    pub fn with_max_execution_minutes(mut self, minutes: u32) -> Self {
        self.max_execution_minutes = minutes.max(1);
        self
    }

    /// 启动全部周期作业，收到停止信号后各自退出
    pub fn spawn_all(self: Arc<Self>, shutdown: ShutdownSignal) -> Vec<JoinHandle<()>> {
        [
            job_names::ERP_SYNC,
            job_names::AUTO_CONVERT,
            job_names::AUTO_ALLOCATION,
            job_names::COMPLETION_SWEEP,
            job_names::WARNING_TRIM,
        ]
        .into_iter()
        .map(|job| tokio::spawn(self.clone().run_loop(job, shutdown.clone())))
        .collect()
    }

    async fn run_loop(self: Arc<Self>, job: &'static str, mut shutdown: ShutdownSignal) {
        info!(job, "后台作业已启动");
        loop {
            let interval = self.interval_for(job);
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }
            self.run_job(job).await;
        }
        info!(job, "后台作业已停止");
    }

    /// 作业间隔：每轮按当前配置重新计算
    fn interval_for(&self, job: &str) -> Duration {
        let config = self.ctx.config();
        let minutes = match job {
            job_names::ERP_SYNC => config.erp_sync_interval_minutes,
            job_names::AUTO_CONVERT => config.auto_convert_interval_minutes,
            job_names::AUTO_ALLOCATION => match self.ctx.allocation().settings() {
                Ok(settings) => u64::from(settings.interval_minutes),
                Err(err) => {
                    warn!(error = %err, "自动分配设置读取失败，使用默认间隔");
                    30
                }
            },
            _ => config.batch_dispatch_interval_minutes,
        };
        Duration::from_secs(minutes.max(1) * 60)
    }

    /// 从 system_config 重新加载配置（失败时沿用上一份）
    pub async fn reload_config(&self) -> MesConfig {
        match self.config_manager.load_mes_config().await {
            Ok(config) => {
                self.ctx.replace_config(config.clone());
                config
            }
            Err(err) => {
                warn!(error = %err, "配置重新加载失败，沿用当前配置");
                self.ctx.config()
            }
        }
    }

    /// 执行一次作业并写入审计记录；跳过时返回 None
    pub async fn run_job(&self, job: &'static str) -> Option<JobOutcome> {
        self.reload_config().await;
        let started_at = self.ctx.now();

        let ctx = self.ctx.clone();
        let source = self.erp_source.clone();
        let limit = Duration::from_secs(u64::from(self.max_execution_minutes) * 60);
        // 阻塞线程无法中止，作业在项与项之间自行检查截止时间
        let deadline = Instant::now() + limit;
        let task =
            tokio::task::spawn_blocking(move || execute(job, &ctx, source.as_deref(), deadline));

        let outcome = match tokio::time::timeout(limit, task).await {
            Ok(Ok(Ok(Some(outcome)))) => outcome,
            Ok(Ok(Ok(None))) => {
                debug!(job, "作业未启用或不在执行窗口，跳过");
                return None;
            }
            Ok(Ok(Err(err))) => {
                error!(job, error = %err, "后台作业失败");
                JobOutcome {
                    failed: 1,
                    message: Some(err.to_string()),
                    ..JobOutcome::default()
                }
            }
            Ok(Err(join_err)) => {
                error!(job, error = %join_err, "后台作业线程异常退出");
                JobOutcome {
                    failed: 1,
                    message: Some(join_err.to_string()),
                    ..JobOutcome::default()
                }
            }
            Err(_) => {
                let err = JobError::Timeout {
                    job: job.to_string(),
                    minutes: self.max_execution_minutes,
                };
                warn!(job, error = %err, "后台作业超时，剩余工作留待下次执行");
                JobOutcome {
                    timed_out: true,
                    message: Some(err.to_string()),
                    ..JobOutcome::default()
                }
            }
        };

        let finished_at = self.ctx.now();
        if let Err(err) = JobRunRepository::new(self.ctx.conn().clone()).record(
            job,
            outcome.status(),
            started_at,
            finished_at,
            &outcome,
        ) {
            warn!(job, error = %err, "作业审计记录写入失败");
        }
        Some(outcome)
    }
}

/// 在阻塞线程中执行单个作业；逐项处理的作业到达 deadline 后停止
pub(crate) fn execute(
    job: &str,
    ctx: &MesContext,
    erp_source: Option<&dyn ErpOrderSource>,
    deadline: Instant,
) -> JobResult<Option<JobOutcome>> {
    let config = ctx.config();
    let now = ctx.now();
    match job {
        job_names::ERP_SYNC => {
            if !config.erp_sync_enabled {
                return Ok(None);
            }
            let Some(source) = erp_source else {
                debug!("未配置 ERP 数据源");
                return Ok(None);
            };
            let summary = ctx.erp_sync().sync(source, now)?;
            Ok(Some(JobOutcome {
                processed: summary.upserted as i64,
                failed: 0,
                timed_out: false,
                message: Some(format!(
                    "{}: fetched={} discarded={} date_parse_failures={}",
                    source.name(),
                    summary.fetched,
                    summary.discarded,
                    summary.date_parse_failures
                )),
            }))
        }
        job_names::AUTO_CONVERT => {
            if !config.auto_convert_enabled {
                return Ok(None);
            }
            let ingestion = ctx.ingestion();
            let summary = ctx.erp_sync().auto_convert(Some(&ingestion), now, Some(deadline))?;
            Ok(Some(JobOutcome {
                processed: summary.converted as i64,
                failed: summary.failed as i64,
                timed_out: summary.timed_out,
                message: Some(format!("relinked_reports={}", summary.relinked_reports)),
            }))
        }
        job_names::AUTO_ALLOCATION => {
            let Some(summary) = ctx.allocation().run_scheduled(now)? else {
                return Ok(None);
            };
            Ok(Some(JobOutcome {
                processed: summary.groups_allocated as i64,
                failed: 0,
                timed_out: summary.timed_out,
                message: Some(format!(
                    "groups={} rows={} skipped_final_day_only={}",
                    summary.groups_examined, summary.rows_updated, summary.skipped_final_day_only
                )),
            }))
        }
        job_names::COMPLETION_SWEEP => {
            let orders = ctx.work_orders().list_active()?;
            let summary = ctx.completion().sweep(&orders, now, Some(deadline));
            Ok(Some(JobOutcome {
                processed: summary.completed as i64,
                failed: summary.failed as i64,
                timed_out: summary.timed_out,
                message: Some(format!("examined={}", summary.examined)),
            }))
        }
        job_names::WARNING_TRIM => {
            let deleted = WarningRepository::new(ctx.conn().clone()).trim(
                config.warning_keep_rows,
                config.warning_trim_batch,
                Some(deadline),
            )?;
            let purged = ctx.progress().purge_expired();
            if deleted > 0 || purged > 0 {
                info!(deleted, purged, "警告看板已裁剪");
            }
            Ok(Some(JobOutcome {
                processed: deleted as i64,
                failed: 0,
                timed_out: Instant::now() >= deadline,
                message: Some(format!("expired_progress={}", purged)),
            }))
        }
        other => Err(JobError::Source(format!("未知作业: {}", other))),
    }
}
