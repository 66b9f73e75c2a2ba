// ==========================================
// 制造执行系统 (MES) - API 共享上下文
// ==========================================
// 持有共享连接、行事历缓存、进度登记与配置快照
// 引擎按调用即时组装，确保使用最新配置
// ==========================================

use crate::config::mes_config::{self, SharedMesConfig};
use crate::config::MesConfig;
use crate::db::SharedConnection;
use crate::engine::{
    AllocationEngine, CalendarService, CatalogService, CompletionEngine, ErpSyncService,
    OptionalEventPublisher, ProgressRegistry, ReportIngestion, Scheduler, WorkOrderService,
    WorkTimeCalculator,
};
use crate::repository::WorkOrderRepository;
use chrono::{FixedOffset, NaiveDateTime, Utc};
use std::sync::{Arc, Mutex};

// ==========================================
// Clock - 工厂本地时间来源
// ==========================================
pub trait Clock: Send + Sync {
    fn now(&self, offset: FixedOffset) -> NaiveDateTime;
}

/// 系统时钟，按配置的工厂时区换算
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self, offset: FixedOffset) -> NaiveDateTime {
        Utc::now().with_timezone(&offset).naive_local()
    }
}

/// 固定时钟（测试与回放用）
pub struct FixedClock {
    now: Mutex<NaiveDateTime>,
}

impl FixedClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: NaiveDateTime) {
        match self.now.lock() {
            Ok(mut guard) => *guard = now,
            Err(poisoned) => *poisoned.into_inner() = now,
        }
    }
}

impl Clock for FixedClock {
    fn now(&self, _offset: FixedOffset) -> NaiveDateTime {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[derive(Clone)]
pub struct MesContext {
    conn: SharedConnection,
    config: SharedMesConfig,
    calendar: Arc<CalendarService>,
    progress: Arc<ProgressRegistry>,
    events: OptionalEventPublisher,
    clock: Arc<dyn Clock>,
}

impl MesContext {
    pub fn new(conn: SharedConnection, config: MesConfig, events: OptionalEventPublisher) -> Self {
        let progress = Arc::new(ProgressRegistry::with_ttl_minutes(
            config.schedule_progress_ttl_minutes,
        ));
        Self {
            calendar: Arc::new(CalendarService::new(conn.clone())),
            config: mes_config::shared(config),
            conn,
            progress,
            events,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// 工厂本地时间
    pub fn now(&self) -> NaiveDateTime {
        self.clock.now(self.config().factory_offset())
    }

    pub fn conn(&self) -> &SharedConnection {
        &self.conn
    }

    /// 当前配置快照
    pub fn config(&self) -> MesConfig {
        mes_config::snapshot(&self.config)
    }

    pub fn shared_config(&self) -> &SharedMesConfig {
        &self.config
    }

    pub fn replace_config(&self, config: MesConfig) {
        mes_config::replace(&self.config, config);
    }

    pub fn calendar(&self) -> &Arc<CalendarService> {
        &self.calendar
    }

    pub fn progress(&self) -> &Arc<ProgressRegistry> {
        &self.progress
    }

    pub fn events(&self) -> &OptionalEventPublisher {
        &self.events
    }

    // ==========================================
    // 引擎组装
    // ==========================================

    pub fn catalog(&self, config: &MesConfig) -> Arc<CatalogService> {
        Arc::new(CatalogService::new(
            self.conn.clone(),
            config.default_production_line.clone(),
        ))
    }

    pub fn scheduler(&self) -> Scheduler {
        let config = self.config();
        Scheduler::new(
            self.conn.clone(),
            self.calendar.clone(),
            self.catalog(&config),
            Arc::new(WorkOrderRepository::new(self.conn.clone())),
            self.progress.clone(),
            self.events.clone(),
            config,
        )
    }

    pub fn work_time_calculator(&self, config: &MesConfig) -> WorkTimeCalculator {
        WorkTimeCalculator::new(self.calendar.clone(), self.catalog(config))
    }

    pub fn ingestion(&self) -> ReportIngestion {
        let config = self.config();
        ReportIngestion::new(
            self.conn.clone(),
            self.work_time_calculator(&config),
            config,
            self.events.clone(),
        )
    }

    pub fn completion(&self) -> CompletionEngine {
        CompletionEngine::new(self.conn.clone(), self.config(), self.events.clone())
    }

    pub fn allocation(&self) -> AllocationEngine {
        AllocationEngine::new(self.conn.clone(), self.config())
    }

    pub fn erp_sync(&self) -> ErpSyncService {
        ErpSyncService::new(self.conn.clone())
    }

    pub fn work_orders(&self) -> WorkOrderService {
        WorkOrderService::new(self.conn.clone())
    }
}
