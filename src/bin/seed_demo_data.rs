// ==========================================
// 制造执行系统 (MES) - 演示数据
// ==========================================
// 用法: seed-demo-data [db_path]
// 写入一条产线、作业员、设备、产品路线与标准产能，以及两张演示工单
// ==========================================

use std::error::Error;

use chrono::{Duration, Local, NaiveTime, Weekday};

use factory_mes::app::get_default_db_path;
use factory_mes::config::{config_keys, ConfigManager};
use factory_mes::db::open_shared;
use factory_mes::domain::{NewWorkOrder, OrderPriority, ProductionLine};
use factory_mes::engine::WorkOrderService;
use factory_mes::repository::{ResourceRepository, RouteRepository};

const DEMO_LINE: &str = "LINE-A";
const DEMO_COMPANY: &str = "01";

/// (产品, [(工序, 是否 SMT, 每小时标准产能)])
const DEMO_ROUTES: &[(&str, &[(&str, bool, f64)])] = &[
    (
        "PFP-X",
        &[("SMT", true, 100.0), ("DIP", false, 100.0), ("出貨包裝", false, 100.0)],
    ),
    (
        "PFP-Y",
        &[
            ("SMT", true, 250.0),
            ("測試", false, 80.0),
            ("組裝", false, 60.0),
            ("出貨包裝", false, 200.0),
        ],
    ),
];

fn main() -> Result<(), Box<dyn Error>> {
    let db_path = std::env::args().nth(1).unwrap_or_else(get_default_db_path);
    println!("写入演示数据: {}", db_path);

    let conn = open_shared(&db_path)?;
    let resources = ResourceRepository::new(conn.clone());
    let routes = RouteRepository::new(conn.clone());

    // ===== 产线 =====
    let line_id = resources.upsert_line(&ProductionLine {
        id: 0,
        name: DEMO_LINE.to_string(),
        work_start: time(8, 30),
        work_end: time(17, 30),
        lunch_start: Some(time(12, 0)),
        lunch_end: Some(time(13, 0)),
        overtime_start: Some(time(18, 0)),
        overtime_end: Some(time(21, 0)),
        work_days: vec![Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri],
        is_active: true,
    })?;
    ConfigManager::from_connection(conn.clone())
        .and_then(|manager| {
            manager.set(config_keys::DEFAULT_PRODUCTION_LINE, DEMO_LINE, Some("演示产线"))
        })
        .map_err(|e| e.to_string())?;

    // ===== 作业员与设备 =====
    let operators = [
        ("王小明", skills(&["SMT", "DIP"])),
        ("林美華", skills(&["DIP", "組裝", "測試"])),
        ("陳志強", skills(&["出貨包裝", "組裝"])),
        ("張雅婷", skills(&["SMT", "測試", "出貨包裝"])),
    ];
    for (name, skill_set) in &operators {
        if resources.find_operator_by_name(name)?.is_none() {
            resources.insert_operator(name, skill_set)?;
        }
    }
    if resources.list_active_equipment()?.is_empty() {
        resources.insert_equipment("DIP-01", &skills(&["DIP"]), Some("台"))?;
        resources.insert_equipment("TEST-01", &skills(&["測試"]), Some("台"))?;
    }
    if resources.list_active_smt_equipment()?.is_empty() {
        resources.insert_smt_equipment("SMT-L1")?;
        resources.insert_smt_equipment("SMT-L2")?;
    }

    // ===== 路线与标准产能 =====
    for (product, steps) in DEMO_ROUTES {
        for (index, (process, is_smt, capacity)) in steps.iter().enumerate() {
            routes.upsert_step(product, index as i32 + 1, process, *is_smt)?;
            let existing = routes.find_latest_capacity(product, process)?;
            if existing.is_none() {
                routes.insert_capacity_version(product, process, *capacity)?;
            }
        }
    }

    // ===== 演示工单 =====
    let service = WorkOrderService::new(conn.clone());
    let now = Local::now().naive_local();
    let demo_orders = [
        ("PFP-X", 200, OrderPriority::Normal, 14),
        ("PFP-Y", 500, OrderPriority::Urgent, 7),
    ];
    for (product, quantity, priority, due_in_days) in demo_orders {
        let order = service.create(
            &NewWorkOrder {
                company_code: DEMO_COMPANY.to_string(),
                order_number: None,
                product_code: product.to_string(),
                quantity,
                priority,
                pre_in_date: Some(now.date() + Duration::days(due_in_days)),
            },
            now,
        )?;
        println!("  工单 {} ({} x {})", order.order_number, product, quantity);
    }

    println!(
        "完成: 产线 id={}，作业员 {} 名，路线 {} 条",
        line_id,
        resources.list_active_operators()?.len(),
        DEMO_ROUTES.len()
    );
    Ok(())
}

fn skills(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN)
}
