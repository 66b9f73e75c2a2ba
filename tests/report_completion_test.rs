// ==========================================
// 报工入账与完工转移集成测试
// ==========================================
// 测试范围:
// 1. 补登报工审核 → 明细 → 完工转移
// 2. 强制完工、重新转移
// 3. 工时拆分（非工作日全计加班）
// 4. 待关联报工重新关联
// ==========================================

mod test_helpers;

use factory_mes::domain::{ApprovalStatus, LinkStatus, Report, ReportKind};
use factory_mes::repository::ProductionRepository;
use test_helpers::*;

fn submit_and_approve(env: &TestEnv, report: &factory_mes::domain::NewReport) -> factory_mes::engine::IngestionOutcome {
    let submitted = env
        .state
        .report_api
        .submit_fill_work(ReportKind::OperatorSupplement, report)
        .expect("提交报工失败");
    assert!(submitted.ingestion.is_none());
    env.state
        .report_api
        .approve_report(submitted.report_id, "組長")
        .expect("审核失败")
}

// ==========================================
// 完工转移
// ==========================================

#[test]
fn test_packaging_reports_complete_order() {
    let env = TestEnv::new(monday_at(18, 0));
    env.add_standard_route("PFP-X");
    let order = env.create_order("PFP-X", 100, None);

    let first = submit_and_approve(&env, &packaging_report(&order, 40, 0));
    assert_eq!(first.link_status, LinkStatus::Linked);
    assert!(first.detail_inserted);
    let check = first.completion.as_ref().unwrap();
    assert!(!check.completed);
    assert_eq!(check.packaged_quantity(), 40);

    let second = submit_and_approve(&env, &packaging_report(&order, 40, 5));
    assert!(!second.completed());
    assert_eq!(second.completion.as_ref().unwrap().packaged_quantity(), 85);

    // 首笔报工后工单转为生产中
    let live = env.state.work_order_api.get_work_order(order.id).unwrap();
    assert_eq!(live.order.status, factory_mes::domain::WorkOrderStatus::InProgress);
    let packaging = live
        .processes
        .iter()
        .find(|p| p.process_name == PACKAGING)
        .unwrap();
    assert_eq!(packaging.completed_quantity, 80);

    let third = submit_and_approve(&env, &packaging_report(&order, 20, 0));
    assert!(third.completed());
    assert_eq!(third.link_status, LinkStatus::LinkedCompleted);
    let check = third.completion.as_ref().unwrap();
    assert_eq!(check.detail_quantity, 105);
    assert_eq!(check.approved_report_quantity, 105);
    let completed_id = check.completed_work_order_id.expect("应有完工工单");

    // 在制工单已删除
    let err = env.state.work_order_api.get_work_order(order.id).unwrap_err();
    assert_eq!(err.kind(), "NotFound");

    let found = env
        .state
        .completion_api
        .find_completed_by_number(COMPANY, &order.order_number)
        .unwrap()
        .expect("应可按工单号查到完工工单");
    assert_eq!(found.id, completed_id);
    assert_eq!(found.original_workorder_id, order.id);
    assert_eq!(found.completed_quantity, 105);
    assert!(!found.forced);
    assert_eq!(found.totals.total_good_quantity, 100);
    assert_eq!(found.totals.total_defect_quantity, 5);
    assert_eq!(found.totals.total_report_count, 3);
    assert_eq!(found.totals.unique_operators, vec!["陳志強".to_string()]);
    assert!((found.totals.total_work_hours - 6.0).abs() < 1e-9);

    let detail = env.state.completion_api.get_completed(completed_id).unwrap();
    assert_eq!(detail.processes.len(), 3);
    assert_eq!(detail.reports.len(), 3);
}

#[test]
fn test_completed_reports_match_production_details() {
    let env = TestEnv::new(monday_at(18, 0));
    env.add_standard_route("PFP-X");
    let order = env.create_order("PFP-X", 30, None);

    let mut smt = report_for(&order, "SMT", monday(), Some((time(8, 30), time(9, 30))), "王小明", 30, 1);
    smt.equipment = Some("SMT-L1".to_string());
    smt.remarks = Some("首件確認".to_string());
    submit_and_approve(&env, &smt);
    let live = ProductionRepository::new(env.conn.clone())
        .list_details_by_order(order.id)
        .unwrap();
    assert!(live.iter().all(|d| !d.is_completed));
    let done = submit_and_approve(&env, &packaging_report(&order, 30, 0));
    let completed_id = done.completion.unwrap().completed_work_order_id.unwrap();

    let detail = env.state.completion_api.get_completed(completed_id).unwrap();
    let snapshot = detail
        .reports
        .iter()
        .find(|r| r.process_name == "SMT")
        .expect("应有 SMT 快照");
    assert_eq!(snapshot.report_date, monday());
    assert_eq!(snapshot.work_quantity, 30);
    assert_eq!(snapshot.defect_quantity, 1);
    assert_eq!(snapshot.operator.as_deref(), Some("王小明"));
    assert_eq!(snapshot.equipment.as_deref(), Some("SMT-L1"));
    assert_eq!(snapshot.remarks.as_deref(), Some("首件確認"));
    assert_eq!(snapshot.approval_status, ApprovalStatus::Approved);
    assert_eq!(snapshot.approved_by.as_deref(), Some("組長"));
    assert_eq!(snapshot.start_at.map(|t| t.time()), Some(time(8, 30)));
    assert_eq!(snapshot.end_at.map(|t| t.time()), Some(time(9, 30)));
    assert_eq!(snapshot.original_report_type, Some(ReportKind::OperatorSupplement));
    assert!(snapshot.is_completed);

    let smt_process = detail
        .processes
        .iter()
        .find(|p| p.process_name == "SMT")
        .unwrap();
    assert_eq!(smt_process.completed_quantity, 30);
    assert_eq!(smt_process.operators, vec!["王小明".to_string()]);

    // 快照与原始报工一致时重新转移无变化
    let summary = env.state.completion_api.retransfer(completed_id).unwrap();
    assert!(!summary.changed, "{:?}", summary);
    assert_eq!(summary.reports_added, 0);
    assert_eq!(summary.completed_quantity, 30);
}

#[test]
fn test_report_after_completion_retransfers() {
    let env = TestEnv::new(monday_at(18, 0));
    env.add_standard_route("PFP-X");
    let order = env.create_order("PFP-X", 50, None);
    let done = submit_and_approve(&env, &packaging_report(&order, 50, 0));
    let completed_id = done.completion.unwrap().completed_work_order_id.unwrap();

    // 完工后补报 DIP
    let late = report_for(&order, "DIP", monday(), Some((time(13, 0), time(15, 0))), "林美華", 50, 0);
    let outcome = submit_and_approve(&env, &late);
    assert_eq!(outcome.link_status, LinkStatus::LinkedCompleted);
    let retransfer = outcome.retransfer.expect("应重新转移");
    assert_eq!(retransfer.completed_work_order_id, completed_id);
    assert_eq!(retransfer.reports_added, 1);
    assert!(retransfer.changed);

    let detail = env.state.completion_api.get_completed(completed_id).unwrap();
    let dip = detail.processes.iter().find(|p| p.process_name == "DIP").unwrap();
    assert_eq!(dip.completed_quantity, 50);
    assert_eq!(detail.order.totals.unique_operators.len(), 2);
    assert_eq!(detail.reports.len(), 2);
}

#[test]
fn test_force_complete() {
    let env = TestEnv::new(monday_at(18, 0));
    env.add_standard_route("PFP-X");
    let order = env.create_order("PFP-X", 100, None);
    submit_and_approve(&env, &packaging_report(&order, 40, 0));

    let err = env.state.completion_api.force_complete(order.id, "   ").unwrap_err();
    assert_eq!(err.kind(), "InvalidInput");
    // 原因为空时不变更
    assert!(env.state.work_order_api.get_work_order(order.id).is_ok());

    let completed_id = env
        .state
        .completion_api
        .force_complete(order.id, "客戶取消剩餘數量")
        .expect("强制完工失败");
    let detail = env.state.completion_api.get_completed(completed_id).unwrap();
    assert_eq!(detail.order.completed_quantity, 40);
    assert_eq!(detail.order.quantity, 100);
    assert!(detail.order.forced);
    assert_eq!(detail.order.force_reason.as_deref(), Some("客戶取消剩餘數量"));

    let err = env.state.completion_api.force_complete(order.id, "再次").unwrap_err();
    assert_eq!(err.kind(), "NotFound");
}

#[test]
fn test_check_and_complete_below_target() {
    let env = TestEnv::new(monday_at(18, 0));
    env.add_standard_route("PFP-X");
    let order = env.create_order("PFP-X", 100, None);
    submit_and_approve(&env, &packaging_report(&order, 10, 0));

    let check = env.state.completion_api.check_and_complete(order.id).unwrap();
    assert!(!check.completed);
    assert_eq!(check.target_quantity, 100);
    assert!(check.summary.contains(&order.order_number));
    assert!(check.completed_work_order_id.is_none());

    let err = env.state.completion_api.check_and_complete(424242).unwrap_err();
    assert_eq!(err.kind(), "NotFound");
}

// ==========================================
// 工时
// ==========================================

#[test]
fn test_saturday_report_counts_as_overtime() {
    let env = TestEnv::new(at(2025, 3, 10, 9, 0));
    env.add_standard_route("PFP-X");
    let order = env.create_order("PFP-X", 100, None);

    let report = report_for(
        &order,
        "DIP",
        date(2025, 3, 8),
        Some((time(9, 0), time(17, 0))),
        "林美華",
        20,
        0,
    );
    let outcome = submit_and_approve(&env, &report);
    assert_eq!(outcome.work_time.total, 8.0);
    assert_eq!(outcome.work_time.overtime, 8.0);
    assert_eq!(outcome.work_time.regular, 0.0);
    assert_eq!(outcome.work_time.break_hours, 0.0);

    match env
        .state
        .report_api
        .get_report(ReportKind::OperatorSupplement, outcome.report_id)
        .unwrap()
    {
        Report::OperatorSupplement(r) => {
            assert_eq!(r.overtime_hours, 8.0);
            assert_eq!(r.work_hours, 0.0);
            assert_eq!(r.link_status, LinkStatus::Linked);
        }
        other => panic!("应为作业员补登: {:?}", other),
    }
}

#[test]
fn test_weekday_report_deducts_lunch() {
    let env = TestEnv::new(monday_at(18, 0));
    env.add_standard_route("PFP-X");
    let order = env.create_order("PFP-X", 100, None);
    let report = report_for(&order, "DIP", monday(), Some((time(8, 30), time(17, 30))), "林美華", 20, 0);
    let outcome = submit_and_approve(&env, &report);
    assert_eq!(outcome.work_time.total, 9.0);
    assert_eq!(outcome.work_time.break_hours, 1.0);
    assert_eq!(outcome.work_time.regular, 8.0);
    assert_eq!(outcome.work_time.actual, 8.0);
    // 未填产线仍按内置产线计算；无加班时段时午休计入加班
    assert_eq!(outcome.work_time.overtime, 1.0);
}

// ==========================================
// 审核流程
// ==========================================

#[test]
fn test_approval_state_machine() {
    let env = TestEnv::new(monday_at(18, 0));
    env.add_standard_route("PFP-X");
    let order = env.create_order("PFP-X", 100, None);
    let api = &env.state.report_api;

    let submitted = api
        .submit_fill_work(ReportKind::OperatorSupplement, &packaging_report(&order, 5, 0))
        .unwrap();
    assert_eq!(api.list_pending_approval().unwrap().len(), 1);

    let err = api.approve_report(submitted.report_id, " ").unwrap_err();
    assert_eq!(err.kind(), "InvalidInput");

    api.approve_report(submitted.report_id, "組長").unwrap();
    let err = api.approve_report(submitted.report_id, "組長").unwrap_err();
    assert_eq!(err.kind(), "AlreadyApproved");
    let err = api.reject_report(submitted.report_id, "組長").unwrap_err();
    assert_eq!(err.kind(), "AlreadyApproved");

    let rejected = api
        .submit_fill_work(ReportKind::OperatorSupplement, &packaging_report(&order, 5, 0))
        .unwrap();
    api.reject_report(rejected.report_id, "組長").unwrap();
    let err = api.approve_report(rejected.report_id, "組長").unwrap_err();
    assert_eq!(err.kind(), "AlreadyApproved");
    assert!(api.list_pending_approval().unwrap().is_empty());

    let err = api.approve_report(9999, "組長").unwrap_err();
    assert_eq!(err.kind(), "NotFound");
}

#[test]
fn test_invalid_report_is_rejected_on_submit() {
    let env = TestEnv::new(monday_at(18, 0));
    env.add_standard_route("PFP-X");
    let order = env.create_order("PFP-X", 100, None);

    let negative = packaging_report(&order, -1, 0);
    let err = env
        .state
        .report_api
        .submit_fill_work(ReportKind::OperatorSupplement, &negative)
        .unwrap_err();
    assert_eq!(err.kind(), "InvalidInput");

    let err = env
        .state
        .report_api
        .submit_fill_work(ReportKind::Onsite, &packaging_report(&order, 1, 0))
        .unwrap_err();
    assert_eq!(err.kind(), "InvalidInput");
}

#[test]
fn test_onsite_report_ingests_immediately_and_flags_overlap() {
    let env = TestEnv::new(monday_at(18, 0));
    env.add_standard_route("PFP-X");
    let order = env.create_order("PFP-X", 100, None);

    let first = env
        .state
        .report_api
        .submit_onsite(&packaging_report(&order, 10, 0))
        .expect("现场报工失败");
    assert!(first.conflicts.is_empty());
    let ingestion = first.ingestion.expect("现场报工应立即入账");
    assert_eq!(ingestion.link_status, LinkStatus::Linked);
    assert!(ingestion.detail_inserted);

    // 同一作业员同一时段: 接受但提示
    let second = env
        .state
        .report_api
        .submit_onsite(&packaging_report(&order, 10, 0))
        .unwrap();
    assert_eq!(second.conflicts.len(), 1);
    assert!(second.conflicts[0].contains("陳志強"));
    assert_eq!(
        second.ingestion.unwrap().completion.unwrap().packaged_quantity(),
        20
    );
}

// ==========================================
// 待关联
// ==========================================

#[test]
fn test_pending_link_relinked_after_order_created() {
    let env = TestEnv::new(monday_at(18, 0));
    env.add_standard_route("PFP-X");

    let mut report = packaging_report(&env.create_order("PFP-X", 10, None), 5, 0);
    report.order_number = "WO-01-202503099".to_string();
    let outcome = submit_and_approve(&env, &report);
    assert_eq!(outcome.link_status, LinkStatus::PendingLink);
    assert!(outcome.work_order_id.is_none());
    assert_eq!(env.state.report_api.list_pending_link().unwrap().len(), 1);

    // 尚无工单时仍待关联
    let summary = env.state.report_api.relink_pending().unwrap();
    assert_eq!(summary.examined, 1);
    assert_eq!(summary.still_pending, 1);

    let order = env
        .state
        .work_order_api
        .create_work_order(&factory_mes::domain::NewWorkOrder {
            company_code: COMPANY.to_string(),
            order_number: Some("WO-01-202503099".to_string()),
            product_code: "PFP-X".to_string(),
            quantity: 10,
            priority: factory_mes::domain::OrderPriority::Normal,
            pre_in_date: None,
        })
        .unwrap();
    let summary = env.state.report_api.relink_pending().unwrap();
    assert_eq!(summary.linked, 1);
    assert_eq!(summary.failed, 0);
    assert!(env.state.report_api.list_pending_link().unwrap().is_empty());

    let live = env.state.work_order_api.get_work_order(order.id).unwrap();
    let packaging = live
        .processes
        .iter()
        .find(|p| p.process_name == PACKAGING)
        .unwrap();
    assert_eq!(packaging.completed_quantity, 5);
}
