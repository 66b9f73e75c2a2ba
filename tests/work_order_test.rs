// ==========================================
// 工单生命周期集成测试
// ==========================================

mod test_helpers;

use factory_mes::domain::{
    NewWorkOrder, OrderPriority, ReportKind, WorkOrderFilter, WorkOrderStatus,
};
use test_helpers::*;

#[test]
fn test_order_number_sequence_per_company_month() {
    let env = TestEnv::new(monday_at(9, 0));
    env.add_standard_route("PFP-X");

    let first = env.create_order("PFP-X", 10, None);
    let second = env.create_order("PFP-X", 20, None);
    assert_eq!(first.order_number, "WO-01-202503001");
    assert_eq!(second.order_number, "WO-01-202503002");
    assert_eq!(first.status, WorkOrderStatus::Pending);

    // 工序按路线展开
    let detail = env.state.work_order_api.get_work_order(first.id).unwrap();
    let names: Vec<_> = detail.processes.iter().map(|p| p.process_name.as_str()).collect();
    assert_eq!(names, vec!["SMT", "DIP", PACKAGING]);
    assert!(detail.processes.iter().all(|p| p.planned_quantity == 10));
}

#[test]
fn test_create_requires_route_and_positive_quantity() {
    let env = TestEnv::new(monday_at(9, 0));
    let request = NewWorkOrder {
        company_code: COMPANY.to_string(),
        order_number: None,
        product_code: "PFP-NOPE".to_string(),
        quantity: 10,
        priority: OrderPriority::Urgent,
        pre_in_date: None,
    };
    let err = env.state.work_order_api.create_work_order(&request).unwrap_err();
    assert_eq!(err.kind(), "RouteMissing");

    env.add_standard_route("PFP-X");
    let err = env
        .state
        .work_order_api
        .create_work_order(&NewWorkOrder {
            product_code: "PFP-X".to_string(),
            quantity: 0,
            ..request
        })
        .unwrap_err();
    assert_eq!(err.kind(), "InvalidInput");
}

#[test]
fn test_status_transitions() {
    let env = TestEnv::new(monday_at(9, 0));
    env.add_standard_route("PFP-X");
    let order = env.create_order("PFP-X", 10, None);
    let api = &env.state.work_order_api;

    // 未开工不能暂停
    let err = api.pause_work_order(order.id).unwrap_err();
    assert_eq!(err.kind(), "InvalidInput");

    assert_eq!(api.start_work_order(order.id).unwrap().status, WorkOrderStatus::InProgress);
    assert_eq!(api.pause_work_order(order.id).unwrap().status, WorkOrderStatus::Paused);
    assert_eq!(api.resume_work_order(order.id).unwrap().status, WorkOrderStatus::InProgress);

    let err = api.start_work_order(9999).unwrap_err();
    assert_eq!(err.kind(), "NotFound");
}

#[test]
fn test_dispatch_and_list_filters() {
    let env = TestEnv::new(monday_at(9, 0));
    env.add_standard_route("PFP-X");
    let order = env.create_order("PFP-X", 10, None);
    let api = &env.state.work_order_api;

    let dispatch_id = api
        .dispatch_process(order.id, "DIP", "林美華", 10, "leader")
        .expect("派工失败");
    assert!(dispatch_id > 0);
    let detail = api.get_work_order(order.id).unwrap();
    assert_eq!(detail.dispatch.len(), 1);
    let dip = detail.processes.iter().find(|p| p.process_name == "DIP").unwrap();
    assert_eq!(dip.assigned_operator.as_deref(), Some("林美華"));

    // 派工数量超过计划
    let err = api
        .dispatch_process(order.id, "DIP", "林美華", 11, "leader")
        .unwrap_err();
    assert_eq!(err.kind(), "InvalidInput");
    // 不存在的工序
    let err = api
        .dispatch_process(order.id, "噴漆", "林美華", 1, "leader")
        .unwrap_err();
    assert_eq!(err.kind(), "NotFound");

    api.start_work_order(order.id).unwrap();
    env.create_order("PFP-X", 5, None);

    let page = api
        .list_work_orders(
            &WorkOrderFilter {
                status: Some(WorkOrderStatus::InProgress),
                ..Default::default()
            },
            1,
            None,
        )
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].id, order.id);

    let err = api
        .list_work_orders(
            &WorkOrderFilter {
                created_from: Some(date(2025, 3, 10)),
                created_to: Some(date(2025, 3, 1)),
                ..Default::default()
            },
            1,
            None,
        )
        .unwrap_err();
    assert_eq!(err.kind(), "InvalidInput");
}

#[test]
fn test_delete_work_order() {
    let env = TestEnv::new(monday_at(9, 0));
    env.add_standard_route("PFP-X");
    let order = env.create_order("PFP-X", 10, None);
    env.state.work_order_api.delete_work_order(order.id).expect("删除失败");
    let err = env.state.work_order_api.get_work_order(order.id).unwrap_err();
    assert_eq!(err.kind(), "NotFound");
    let err = env.state.work_order_api.delete_work_order(order.id).unwrap_err();
    assert_eq!(err.kind(), "NotFound");
}

#[test]
fn test_explicit_number_of_completed_order_is_rejected() {
    let env = TestEnv::new(monday_at(18, 0));
    env.add_standard_route("PFP-X");
    let order = env.create_order("PFP-X", 10, None);

    let submitted = env
        .state
        .report_api
        .submit_fill_work(ReportKind::OperatorSupplement, &packaging_report(&order, 10, 0))
        .expect("提交报工失败");
    env.state
        .report_api
        .approve_report(submitted.report_id, "組長")
        .expect("审核失败");
    assert!(env
        .state
        .completion_api
        .find_completed_by_number(COMPANY, &order.order_number)
        .unwrap()
        .is_some());

    let request = NewWorkOrder {
        company_code: COMPANY.to_string(),
        order_number: Some(order.order_number.clone()),
        product_code: "PFP-X".to_string(),
        quantity: 5,
        priority: OrderPriority::Normal,
        pre_in_date: None,
    };
    let err = env.state.work_order_api.create_work_order(&request).unwrap_err();
    assert_eq!(err.kind(), "InvalidInput");

    // 未被占用的显式工单号照常建立
    let created = env
        .state
        .work_order_api
        .create_work_order(&NewWorkOrder {
            order_number: Some("WO-01-202503050".to_string()),
            ..request
        })
        .expect("建立工单失败");
    assert_eq!(created.order_number, "WO-01-202503050");
}
