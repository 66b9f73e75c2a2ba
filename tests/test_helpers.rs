// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 临时数据库、固定时钟、基础数据（作业员/路线/工单/报工）
// ==========================================

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tempfile::NamedTempFile;

use factory_mes::api::{FixedClock, MesContext};
use factory_mes::app::AppState;
use factory_mes::config::{ConfigManager, MesConfig};
use factory_mes::db::{self, SharedConnection};
use factory_mes::domain::{NewReport, NewWorkOrder, OrderPriority, WorkOrder};
use factory_mes::engine::OptionalEventPublisher;
use factory_mes::repository::{ResourceRepository, RouteRepository};

pub const COMPANY: &str = "01";
pub const PACKAGING: &str = "出貨包裝";

/// 测试环境（临时文件需保持存活）
pub struct TestEnv {
    _temp_file: NamedTempFile,
    pub db_path: String,
    pub conn: SharedConnection,
    pub clock: Arc<FixedClock>,
    pub state: AppState,
}

impl TestEnv {
    /// 建立临时数据库，时钟固定在 now
    pub fn new(now: NaiveDateTime) -> Self {
        Self::with_events(now, OptionalEventPublisher::none())
    }

    pub fn with_events(now: NaiveDateTime, events: OptionalEventPublisher) -> Self {
        let temp_file = NamedTempFile::new().expect("无法创建临时文件");
        let db_path = temp_file.path().to_string_lossy().to_string();
        let conn = db::open_shared(&db_path).expect("无法初始化数据库");

        let clock = Arc::new(FixedClock::new(now));
        let ctx = MesContext::new(conn.clone(), MesConfig::default(), events).with_clock(clock.clone());
        let config_manager =
            Arc::new(ConfigManager::from_connection(conn.clone()).expect("无法创建ConfigManager"));
        let state = AppState::from_context(db_path.clone(), ctx, config_manager);

        Self {
            _temp_file: temp_file,
            db_path,
            conn,
            clock,
            state,
        }
    }

    pub fn ctx(&self) -> &MesContext {
        &self.state.ctx
    }

    pub fn set_now(&self, now: NaiveDateTime) {
        self.clock.set(now);
    }

    pub fn resources(&self) -> ResourceRepository {
        ResourceRepository::new(self.conn.clone())
    }

    pub fn add_operator(&self, name: &str, skills: &[&str]) -> i64 {
        let skills: Vec<String> = skills.iter().map(|s| s.to_string()).collect();
        self.resources()
            .insert_operator(name, &skills)
            .expect("新增作业员失败")
    }

    /// 路线: [(工序, 是否 SMT, 每小时产能)]，step_order 从 1 开始
    pub fn add_route(&self, product: &str, steps: &[(&str, bool, f64)]) {
        let routes = RouteRepository::new(self.conn.clone());
        for (idx, (process, is_smt, capacity)) in steps.iter().enumerate() {
            routes
                .upsert_step(product, idx as i32 + 1, process, *is_smt)
                .expect("新增路线失败");
            routes
                .insert_capacity_version(product, process, *capacity)
                .expect("新增产能失败");
        }
    }

    /// 标准三段路线 SMT → DIP → 出貨包裝，各 100/小时
    pub fn add_standard_route(&self, product: &str) {
        self.add_route(
            product,
            &[("SMT", true, 100.0), ("DIP", false, 100.0), (PACKAGING, false, 100.0)],
        );
    }

    pub fn create_order(&self, product: &str, quantity: i64, pre_in_date: Option<NaiveDate>) -> WorkOrder {
        self.state
            .work_order_api
            .create_work_order(&NewWorkOrder {
                company_code: COMPANY.to_string(),
                order_number: None,
                product_code: product.to_string(),
                quantity,
                priority: OrderPriority::Normal,
                pre_in_date,
            })
            .expect("建立工单失败")
    }
}

// ==========================================
// 时间构造
// ==========================================

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("非法日期")
}

pub fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).expect("非法时间")
}

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    date(y, m, d).and_time(time(h, min))
}

/// 2025-03-03 为周一
pub fn monday() -> NaiveDate {
    date(2025, 3, 3)
}

pub fn monday_at(h: u32, m: u32) -> NaiveDateTime {
    monday().and_time(time(h, m))
}

// ==========================================
// 报工构造
// ==========================================

pub fn report_for(
    order: &WorkOrder,
    process: &str,
    report_date: NaiveDate,
    span: Option<(NaiveTime, NaiveTime)>,
    operator: &str,
    work_quantity: i64,
    defect_quantity: i64,
) -> NewReport {
    NewReport {
        company_code: order.company_code.clone(),
        order_number: order.order_number.clone(),
        product_code: order.product_code.clone(),
        process_name: process.to_string(),
        report_date,
        start_time: span.map(|(s, _)| s),
        end_time: span.map(|(_, e)| e),
        operator: Some(operator.to_string()),
        equipment: None,
        production_line: None,
        work_quantity,
        defect_quantity,
        remarks: None,
        abnormal_notes: None,
        created_by: Some("tester".to_string()),
    }
}

/// 包装工序补登报工（09:00–11:00）
pub fn packaging_report(order: &WorkOrder, work_quantity: i64, defect_quantity: i64) -> NewReport {
    report_for(
        order,
        PACKAGING,
        monday(),
        Some((time(9, 0), time(11, 0))),
        "陳志強",
        work_quantity,
        defect_quantity,
    )
}
