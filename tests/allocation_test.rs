// ==========================================
// 自动分配集成测试
// ==========================================

mod test_helpers;

use factory_mes::app::WorkerRunner;
use factory_mes::domain::job::job_names;
use factory_mes::domain::{
    AllocationTarget, AutoAllocationSettings, NewReport, QuantitySource, ReportKind, WorkOrder,
};
use factory_mes::repository::ProductionRepository;
use test_helpers::*;

fn approve(env: &TestEnv, report: &NewReport) {
    let submitted = env
        .state
        .report_api
        .submit_fill_work(ReportKind::OperatorSupplement, report)
        .expect("提交报工失败");
    env.state
        .report_api
        .approve_report(submitted.report_id, "組長")
        .expect("审核失败");
}

/// 同一工序三天报工，数量只记在最后一天（每天 13:00–17:00）
fn spread_reports(env: &TestEnv, order: &WorkOrder, process: &str, quantities: &[i64]) {
    for (offset, qty) in quantities.iter().enumerate() {
        let day = monday() + chrono::Duration::days(offset as i64);
        approve(
            env,
            &report_for(order, process, day, Some((time(13, 0), time(17, 0))), "林美華", *qty, 0),
        );
    }
}

#[test]
fn test_run_now_spreads_quantity_by_hours() {
    let env = TestEnv::new(at(2025, 3, 5, 19, 0));
    env.add_standard_route("PFP-X");
    let order = env.create_order("PFP-X", 500, None);

    spread_reports(&env, &order, "DIP", &[0, 0, 300]);
    // 包装属于只在最后一天计量的工序
    spread_reports(&env, &order, PACKAGING, &[0, 50]);

    let summary = env.state.allocation_api.run_now().expect("分配失败");
    assert_eq!(summary.groups_examined, 2);
    assert_eq!(summary.groups_allocated, 1);
    assert_eq!(summary.rows_updated, 3);
    assert_eq!(summary.skipped_final_day_only, 1);
    assert!(!summary.timed_out);

    let details = ProductionRepository::new(env.conn.clone())
        .list_details_by_order(order.id)
        .unwrap();
    let dip: Vec<_> = details.iter().filter(|d| d.process_name == "DIP").collect();
    assert_eq!(dip.len(), 3);
    assert!(dip.iter().all(|d| d.quantity_source == QuantitySource::Allocated));
    assert_eq!(dip.iter().map(|d| d.allocated_quantity).collect::<Vec<_>>(), vec![100, 100, 100]);
    // 原始数量不被改写
    assert_eq!(dip.iter().map(|d| d.work_quantity).sum::<i64>(), 300);
    assert!(details
        .iter()
        .filter(|d| d.process_name == PACKAGING)
        .all(|d| d.quantity_source == QuantitySource::Original));

    let logs = env.state.allocation_api.list_logs(10).unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].target, AllocationTarget::ProductionDetail);
    assert_eq!(logs[0].allocated_quantities, vec![100, 100, 100]);
    assert_eq!(logs[0].target_detail_ids.len(), 3);

    // 已分配的分组不重复处理
    let again = env.state.allocation_api.run_now().unwrap();
    assert_eq!(again.groups_allocated, 0);
    assert_eq!(env.state.allocation_api.list_logs(10).unwrap().len(), 1);
}

#[test]
fn test_completed_reports_allocated_when_enabled() {
    let env = TestEnv::new(at(2025, 3, 5, 19, 0));
    env.add_standard_route("PFP-X");
    let order = env.create_order("PFP-X", 100, None);
    spread_reports(&env, &order, "DIP", &[0, 100]);
    approve(&env, &packaging_report(&order, 100, 0));

    let completed = env
        .state
        .completion_api
        .find_completed_by_number(COMPANY, &order.order_number)
        .unwrap()
        .expect("应已完工");

    env.state
        .allocation_api
        .update_settings(&AutoAllocationSettings {
            auto_allocation_enabled: false,
            completed_allocation_enabled: true,
            ..AutoAllocationSettings::default()
        })
        .expect("更新设置失败");
    let summary = env.state.allocation_api.run_now().unwrap();
    assert_eq!(summary.groups_allocated, 1);

    let detail = env.state.completion_api.get_completed(completed.id).unwrap();
    let dip: Vec<_> = detail
        .reports
        .iter()
        .filter(|r| r.process_name == "DIP")
        .collect();
    assert_eq!(dip.iter().map(|r| r.allocated_quantity).collect::<Vec<_>>(), vec![50, 50]);
    assert!(dip.iter().all(|r| r.allocation_method.is_some()));

    let logs = env.state.allocation_api.list_logs(10).unwrap();
    assert_eq!(logs[0].target, AllocationTarget::CompletedReport);
}

#[test]
fn test_update_settings_validation() {
    let env = TestEnv::new(monday_at(9, 0));
    let api = &env.state.allocation_api;
    assert_eq!(api.get_settings().unwrap(), AutoAllocationSettings::default());

    for bad in [
        AutoAllocationSettings {
            interval_minutes: 0,
            ..AutoAllocationSettings::default()
        },
        AutoAllocationSettings {
            max_execution_minutes: 0,
            ..AutoAllocationSettings::default()
        },
        AutoAllocationSettings {
            end_time: time(8, 0),
            ..AutoAllocationSettings::default()
        },
    ] {
        assert_eq!(api.update_settings(&bad).unwrap_err().kind(), "InvalidInput");
    }

    let night = AutoAllocationSettings {
        interval_minutes: 15,
        start_time: time(22, 0),
        end_time: time(6, 0),
        ..AutoAllocationSettings::default()
    };
    api.update_settings(&night).unwrap();
    assert_eq!(api.get_settings().unwrap(), night);
}

#[tokio::test]
async fn test_scheduled_run_respects_window() {
    let env = TestEnv::new(at(2025, 3, 5, 20, 0));
    env.add_standard_route("PFP-X");
    let order = env.create_order("PFP-X", 500, None);
    spread_reports(&env, &order, "DIP", &[0, 300]);
    let runner = WorkerRunner::new(&env.state);

    // 窗口外跳过，不写审计
    assert!(runner.run_job(job_names::AUTO_ALLOCATION).await.is_none());
    assert!(env.state.allocation_api.list_logs(10).unwrap().is_empty());
    assert!(env
        .state
        .erp_api
        .list_job_runs(Some(job_names::AUTO_ALLOCATION), 10)
        .unwrap()
        .is_empty());

    env.set_now(at(2025, 3, 6, 9, 0));
    let outcome = runner.run_job(job_names::AUTO_ALLOCATION).await.expect("窗口内应执行");
    assert_eq!(outcome.processed, 1);
    assert_eq!(env.state.allocation_api.list_logs(10).unwrap().len(), 1);

    // 总开关关闭
    env.state
        .allocation_api
        .update_settings(&AutoAllocationSettings {
            enabled: false,
            ..AutoAllocationSettings::default()
        })
        .unwrap();
    assert!(runner.run_job(job_names::AUTO_ALLOCATION).await.is_none());
}
