// ==========================================
// ERP 同步、自动转工单与后台作业审计集成测试
// ==========================================

mod test_helpers;

use std::sync::Arc;
use std::time::{Duration, Instant};

use factory_mes::app::WorkerRunner;
use factory_mes::domain::erp::DATE_NOT_AVAILABLE;
use factory_mes::domain::job::job_names;
use factory_mes::domain::{ErpOrderRow, ErpOrigin, JobRunStatus};
use factory_mes::engine::{ErpOrderSource, JobError, JobResult};
use factory_mes::repository::CompanyOrderRepository;
use test_helpers::*;

/// 内存中的 ERP 数据源
struct StubErpSource {
    rows: Vec<ErpOrderRow>,
    fail: bool,
}

impl ErpOrderSource for StubErpSource {
    fn name(&self) -> &str {
        "stub"
    }

    fn fetch_orders(&self) -> JobResult<Vec<ErpOrderRow>> {
        if self.fail {
            return Err(JobError::Source("ERP 连线逾时".to_string()));
        }
        Ok(self.rows.clone())
    }
}

fn erp_row(bill_no: &str, product: &str, qty: i64) -> ErpOrderRow {
    ErpOrderRow {
        origin: ErpOrigin::Domestic,
        company_code: COMPANY.to_string(),
        bill_no: bill_no.to_string(),
        customer_name: Some("台灣電子".to_string()),
        product_code: product.to_string(),
        qty_remain: qty,
        bill_date: Some(20250301),
        pre_in_date: Some(20250320),
        bill_status: Some(0),
    }
}

fn sample_source() -> StubErpSource {
    StubErpSource {
        rows: vec![
            erp_row("SO-001", "PFP-X", 100),
            ErpOrderRow {
                bill_status: Some(1),
                ..erp_row("SO-002", "PFP-X", 50)
            },
            erp_row("SO-003", "PFP-X", 0),
            erp_row("SO-004", "FOO-1", 10),
            ErpOrderRow {
                origin: ErpOrigin::Foreign,
                bill_date: Some(20250231),
                pre_in_date: None,
                bill_status: None,
                ..erp_row("TR-001", "PFP-Y", 30)
            },
        ],
        fail: false,
    }
}

#[test]
fn test_sync_filters_rows_and_marks_bad_dates() {
    let env = TestEnv::new(monday_at(9, 0));
    let summary = env.state.erp_api.sync(&sample_source()).expect("同步失败");
    assert_eq!(summary.fetched, 5);
    assert_eq!(summary.discarded, 3);
    assert_eq!(summary.upserted, 2);
    assert_eq!(summary.date_parse_failures, 1);

    let repo = CompanyOrderRepository::new(env.conn.clone());
    let good = repo.find(COMPANY, "SO-001", "PFP-X").unwrap().expect("应已同步");
    assert_eq!(good.bill_date, "2025-03-01");
    assert_eq!(good.pre_in_date(), Some(date(2025, 3, 20)));
    assert!(good.converted_work_order_id.is_none());

    let foreign = repo.find(COMPANY, "TR-001", "PFP-Y").unwrap().expect("应已同步");
    assert_eq!(foreign.origin, ErpOrigin::Foreign);
    assert_eq!(foreign.bill_date, DATE_NOT_AVAILABLE);
    assert_eq!(foreign.pre_in_date, DATE_NOT_AVAILABLE);
    assert!(repo.find(COMPANY, "SO-002", "PFP-X").unwrap().is_none());

    // 重复同步为 upsert
    let again = env.state.erp_api.sync(&sample_source()).unwrap();
    assert_eq!(again.upserted, 2);
    assert_eq!(repo.list_unconverted().unwrap().len(), 2);
}

#[test]
fn test_convert_pending_continues_past_failed_order() {
    let env = TestEnv::new(monday_at(9, 0));
    env.add_standard_route("PFP-X");
    env.state.erp_api.sync(&sample_source()).unwrap();

    // PFP-Y 没有路线，单笔失败
    let summary = env.state.erp_api.convert_pending().expect("转工单失败");
    assert_eq!(summary.converted, 1);
    assert_eq!(summary.failed, 1);

    let repo = CompanyOrderRepository::new(env.conn.clone());
    let converted = repo.find(COMPANY, "SO-001", "PFP-X").unwrap().unwrap();
    let work_order_id = converted.converted_work_order_id.expect("应记录工单");
    let detail = env.state.work_order_api.get_work_order(work_order_id).unwrap();
    assert_eq!(detail.order.order_number, "WO-01-202503001");
    assert_eq!(detail.order.quantity, 100);
    assert_eq!(detail.order.pre_in_date, Some(date(2025, 3, 20)));

    let remaining = repo.list_unconverted().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].product_code, "PFP-Y");
}

#[test]
fn test_convert_relinks_pending_reports() {
    let env = TestEnv::new(monday_at(18, 0));
    env.add_standard_route("PFP-X");
    env.state
        .erp_api
        .sync(&StubErpSource {
            rows: vec![erp_row("SO-001", "PFP-X", 100)],
            fail: false,
        })
        .unwrap();

    // 报工先于工单到达（工单号按转单规则可预期）
    let ghost = factory_mes::domain::WorkOrder {
        id: 0,
        company_code: COMPANY.to_string(),
        order_number: "WO-01-202503001".to_string(),
        product_code: "PFP-X".to_string(),
        quantity: 100,
        status: factory_mes::domain::WorkOrderStatus::Pending,
        priority: factory_mes::domain::OrderPriority::Normal,
        pre_in_date: None,
        created_at: monday_at(9, 0),
        updated_at: monday_at(9, 0),
        completed_at: None,
    };
    let onsite = env
        .state
        .report_api
        .submit_onsite(&report_for(
            &ghost,
            "DIP",
            monday(),
            Some((time(8, 30), time(10, 30))),
            "林美華",
            20,
            0,
        ))
        .expect("现场报工失败");
    assert_eq!(
        onsite.ingestion.as_ref().map(|i| i.link_status),
        Some(factory_mes::domain::LinkStatus::PendingLink)
    );

    let summary = env.state.erp_api.convert_pending().unwrap();
    assert_eq!(summary.converted, 1);
    assert_eq!(summary.relinked_reports, 1);
}

// ==========================================
// 后台作业审计
// ==========================================

#[tokio::test]
async fn test_worker_jobs_write_audit_rows() {
    let env = TestEnv::new(monday_at(9, 0));
    env.add_standard_route("PFP-X");
    let runner = WorkerRunner::new(&env.state).with_erp_source(Arc::new(sample_source()));

    let outcome = runner.run_job(job_names::ERP_SYNC).await.expect("同步作业应执行");
    assert_eq!(outcome.processed, 2);
    assert_eq!(outcome.status(), JobRunStatus::Success);

    // 一笔成功一笔失败
    let outcome = runner.run_job(job_names::AUTO_CONVERT).await.unwrap();
    assert_eq!(outcome.processed, 1);
    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.status(), JobRunStatus::PartialSuccess);

    assert!(runner.run_job(job_names::COMPLETION_SWEEP).await.is_some());
    assert!(runner.run_job(job_names::WARNING_TRIM).await.is_some());

    let runs = env.state.erp_api.list_job_runs(Some(job_names::ERP_SYNC), 10).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, JobRunStatus::Success);
    assert_eq!(runs[0].processed, 2);
    assert!(runs[0].message.as_deref().unwrap_or("").contains("fetched=5"));

    let convert = env.state.erp_api.list_job_runs(Some(job_names::AUTO_CONVERT), 10).unwrap();
    assert_eq!(convert[0].status, JobRunStatus::PartialSuccess);

    let all = env.state.erp_api.list_job_runs(None, 10).unwrap();
    assert_eq!(all.len(), 4);
}

#[tokio::test]
async fn test_failed_source_is_recorded_as_failed_run() {
    let env = TestEnv::new(monday_at(9, 0));
    let runner = WorkerRunner::new(&env.state).with_erp_source(Arc::new(StubErpSource {
        rows: Vec::new(),
        fail: true,
    }));

    let outcome = runner.run_job(job_names::ERP_SYNC).await.unwrap();
    assert_eq!(outcome.status(), JobRunStatus::Failed);

    let runs = env.state.erp_api.list_job_runs(Some(job_names::ERP_SYNC), 10).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, JobRunStatus::Failed);
    assert!(runs[0].message.as_deref().unwrap_or("").contains("逾時"));
}

#[tokio::test]
async fn test_sync_without_source_is_skipped() {
    let env = TestEnv::new(monday_at(9, 0));
    let runner = WorkerRunner::new(&env.state);
    assert!(runner.run_job(job_names::ERP_SYNC).await.is_none());
    assert!(env.state.erp_api.list_job_runs(None, 10).unwrap().is_empty());
}

#[test]
fn test_expired_deadline_stops_between_items() {
    let env = TestEnv::new(monday_at(9, 0));
    env.add_standard_route("PFP-X");
    env.state.erp_api.sync(&sample_source()).unwrap();
    let now = env.ctx().now();

    // 截止时间已过: 一笔都不转
    let expired = Instant::now();
    let summary = env
        .ctx()
        .erp_sync()
        .auto_convert(None, now, Some(expired))
        .expect("转工单失败");
    assert!(summary.timed_out);
    assert_eq!(summary.converted + summary.failed, 0);
    let repo = CompanyOrderRepository::new(env.conn.clone());
    assert_eq!(repo.list_unconverted().unwrap().len(), 2);

    // 截止时间充裕则全部处理
    let later = Instant::now() + Duration::from_secs(600);
    let summary = env.ctx().erp_sync().auto_convert(None, now, Some(later)).unwrap();
    assert!(!summary.timed_out);
    assert_eq!(summary.converted, 1);
    assert_eq!(summary.failed, 1);

    let orders = env.ctx().work_orders().list_active().unwrap();
    assert_eq!(orders.len(), 1);
    let sweep = env.ctx().completion().sweep(&orders, now, Some(expired));
    assert!(sweep.timed_out);
    assert_eq!(sweep.examined, 0);
    let sweep = env.ctx().completion().sweep(&orders, now, None);
    assert!(!sweep.timed_out);
    assert_eq!(sweep.examined, 1);
}
