// ==========================================
// 制造执行系统 (MES) - ERP 订单同步与自动转工单
// ==========================================
// 同步: 数据源 → 过滤（BillStatus/QtyRemain/PFP-）→ 日期转换 → upsert
// 转工单: 未转换的公司订单逐笔建立工单，完成后重新关联待关联报工
// 单笔失败只记日志，不中断整批
// ==========================================

use crate::db::{begin_immediate, SharedConnection};
use crate::domain::erp::{
    yyyymmdd_to_iso, ConvertSummary, ErpOrderRow, ErpSyncSummary, DATE_NOT_AVAILABLE,
};
use crate::domain::types::OrderPriority;
use crate::domain::work_order::NewWorkOrder;
use crate::engine::error::{JobError, JobResult};
use crate::engine::ingestion::ReportIngestion;
use crate::engine::work_orders::WorkOrderService;
use crate::repository::{CompanyOrderRepository, CompanyOrderUpsert, RepositoryError};
use chrono::NaiveDateTime;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// ERP 订单数据源（SQL 适配器 / 文件导出）
pub trait ErpOrderSource: Send + Sync {
    fn name(&self) -> &str;

    /// 读取全部订单行（未过滤）
    fn fetch_orders(&self) -> JobResult<Vec<ErpOrderRow>>;
}

/// 过滤并转换为待写入行，返回 (写入行, 丢弃数, 日期转换失败数)
pub fn prepare_rows(rows: Vec<ErpOrderRow>) -> (Vec<CompanyOrderUpsert>, usize, usize) {
    let mut prepared = Vec::with_capacity(rows.len());
    let mut discarded = 0;
    let mut date_failures = 0;
    for row in rows {
        if !row.is_importable() {
            discarded += 1;
            continue;
        }
        let bill_date = yyyymmdd_to_iso(row.bill_date);
        let pre_in_date = yyyymmdd_to_iso(row.pre_in_date);
        if (row.bill_date.is_some() && bill_date == DATE_NOT_AVAILABLE)
            || (row.pre_in_date.is_some() && pre_in_date == DATE_NOT_AVAILABLE)
        {
            date_failures += 1;
        }
        prepared.push(CompanyOrderUpsert {
            company_code: row.company_code.trim().to_string(),
            bill_no: row.bill_no.trim().to_string(),
            origin: row.origin,
            customer_name: row.customer_name,
            product_code: row.product_code.trim().to_string(),
            qty_remain: row.qty_remain,
            bill_date,
            pre_in_date,
            bill_status: row.bill_status,
        });
    }
    (prepared, discarded, date_failures)
}

pub struct ErpSyncService {
    conn: SharedConnection,
    orders: CompanyOrderRepository,
}

impl ErpSyncService {
    pub fn new(conn: SharedConnection) -> Self {
        let orders = CompanyOrderRepository::new(conn.clone());
        Self { conn, orders }
    }

    /// 从数据源同步公司订单
    #[instrument(skip(self, source), fields(source = source.name()))]
    pub fn sync(&self, source: &dyn ErpOrderSource, now: NaiveDateTime) -> JobResult<ErpSyncSummary> {
        let rows = source.fetch_orders()?;
        let fetched = rows.len();
        let (prepared, discarded, date_parse_failures) = prepare_rows(rows);
        if date_parse_failures > 0 {
            warn!(date_parse_failures, "部分 ERP 日期无法解析，已记为 N/A");
        }
        let upserted = self.orders.upsert_many(&prepared, now)?;

        let summary = ErpSyncSummary {
            fetched,
            discarded,
            upserted,
            date_parse_failures,
        };
        info!(fetched, discarded, upserted, "ERP 订单同步完成");
        Ok(summary)
    }

    /// 未转换的公司订单自动建立工单；传入报工入账服务时顺带重新关联待关联报工
    /// 到达 deadline 后不再开始新订单
    #[instrument(skip(self, ingestion, deadline))]
    pub fn auto_convert(
        &self,
        ingestion: Option<&ReportIngestion>,
        now: NaiveDateTime,
        deadline: Option<Instant>,
    ) -> JobResult<ConvertSummary> {
        let pending = self.orders.list_unconverted()?;
        let mut summary = ConvertSummary::default();

        for order in pending {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                summary.timed_out = true;
                warn!(converted = summary.converted, "自动转工单到达截止时间，剩余订单留待下次");
                break;
            }
            let request = NewWorkOrder {
                company_code: order.company_code.clone(),
                order_number: None,
                product_code: order.product_code.clone(),
                quantity: order.qty_remain,
                priority: OrderPriority::Normal,
                pre_in_date: order.pre_in_date(),
            };
            let result = (|| -> JobResult<String> {
                let conn = self
                    .conn
                    .lock()
                    .map_err(|e| JobError::Repository(RepositoryError::LockError(e.to_string())))?;
                let tx = begin_immediate(&conn)?;
                let work_order = WorkOrderService::create_tx(&tx, &request, now)?;
                CompanyOrderRepository::mark_converted_tx(&tx, order.id, work_order.id)?;
                tx.commit()?;
                Ok(work_order.order_number)
            })();

            match result {
                Ok(order_number) => {
                    summary.converted += 1;
                    info!(bill_no = %order.bill_no, order = %order_number, "公司订单已转为工单");
                }
                Err(err) => {
                    summary.failed += 1;
                    warn!(bill_no = %order.bill_no, product = %order.product_code, error = %err, "公司订单转工单失败");
                }
            }
        }

        if let Some(ingestion) = ingestion.filter(|_| summary.converted > 0) {
            match ingestion.relink_pending(now) {
                Ok(relink) => summary.relinked_reports = relink.linked,
                Err(err) => warn!(error = %err, "待关联报工重新关联失败"),
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::erp::ErpOrigin;

    fn row(bill_no: &str) -> ErpOrderRow {
        ErpOrderRow {
            origin: ErpOrigin::Foreign,
            company_code: "01".to_string(),
            bill_no: bill_no.to_string(),
            customer_name: Some("ACME".to_string()),
            product_code: "PFP-X".to_string(),
            qty_remain: 10,
            bill_date: Some(20250301),
            pre_in_date: Some(20250320),
            bill_status: None,
        }
    }

    #[test]
    fn test_prepare_rows_filters_and_marks_bad_dates() {
        let rows = vec![
            row("A"),
            ErpOrderRow { bill_status: Some(1), ..row("B") },
            ErpOrderRow { qty_remain: 0, ..row("C") },
            ErpOrderRow { product_code: "FOO-1".to_string(), ..row("D") },
            ErpOrderRow { bill_date: Some(20250231), ..row("E") },
        ];
        let (prepared, discarded, failures) = prepare_rows(rows);
        assert_eq!(discarded, 3);
        assert_eq!(failures, 1);
        assert_eq!(prepared.len(), 2);
        assert_eq!(prepared[0].bill_date, "2025-03-01");
        assert_eq!(prepared[1].bill_no, "E");
        assert_eq!(prepared[1].bill_date, "N/A");
        assert_eq!(prepared[1].pre_in_date, "2025-03-20");
    }
}
