// ==========================================
// 制造执行系统 (MES) - ERP 订单领域模型
// ==========================================
// 两种 ERP 形状: 内销 (ordBill*, ProdID) / 外销 (TraBill*, ItemNo)
// 日期为 8 位 YYYYMMDD，转换失败记为 "N/A"
// ==========================================

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// 日期转换失败时的占位值
pub const DATE_NOT_AVAILABLE: &str = "N/A";

/// 可导入的产品代码前缀
pub const IMPORTABLE_PRODUCT_PREFIX: &str = "PFP-";

// ==========================================
// ErpOrigin - 订单来源形状
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErpOrigin {
    /// 内销: ordBillMain / ordBillSub
    Domestic,
    /// 外销: TraBillMain / TraBillSub
    Foreign,
}

impl ErpOrigin {
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "foreign" => ErpOrigin::Foreign,
            _ => ErpOrigin::Domestic,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            ErpOrigin::Domestic => "domestic",
            ErpOrigin::Foreign => "foreign",
        }
    }
}

// ==========================================
// ErpOrderRow - ERP 原始订单行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErpOrderRow {
    pub origin: ErpOrigin,
    pub company_code: String,
    pub bill_no: String,
    pub customer_name: Option<String>,
    /// ProdID（内销）或 ItemNo（外销）
    pub product_code: String,
    pub qty_remain: i64,
    /// 8 位 YYYYMMDD（原样）
    pub bill_date: Option<i64>,
    pub pre_in_date: Option<i64>,
    pub bill_status: Option<i64>,
}

impl ErpOrderRow {
    /// 导入过滤: BillStatus ∈ {0, null} ∧ QtyRemain > 0 ∧ 产品以 PFP- 开头
    pub fn is_importable(&self) -> bool {
        matches!(self.bill_status, None | Some(0))
            && self.qty_remain > 0
            && self.product_code.trim().starts_with(IMPORTABLE_PRODUCT_PREFIX)
    }
}

/// YYYYMMDD → YYYY-MM-DD；无法解析时返回 "N/A"
pub fn yyyymmdd_to_iso(raw: Option<i64>) -> String {
    raw.and_then(parse_yyyymmdd)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| DATE_NOT_AVAILABLE.to_string())
}

/// 解析 8 位十进制日期
pub fn parse_yyyymmdd(raw: i64) -> Option<NaiveDate> {
    if !(10_000_000..=99_999_999).contains(&raw) {
        return None;
    }
    let year = (raw / 10_000) as i32;
    let month = ((raw / 100) % 100) as u32;
    let day = (raw % 100) as u32;
    NaiveDate::from_ymd_opt(year, month, day)
}

// ==========================================
// CompanyOrder - 已同步的公司订单
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyOrder {
    pub id: i64,
    pub company_code: String,
    pub bill_no: String,
    pub origin: ErpOrigin,
    pub customer_name: Option<String>,
    pub product_code: String,
    pub qty_remain: i64,
    /// ISO 日期或 "N/A"
    pub bill_date: String,
    pub pre_in_date: String,
    pub bill_status: Option<i64>,
    pub converted_work_order_id: Option<i64>,
    pub synced_at: NaiveDateTime,
}

impl CompanyOrder {
    /// 交期（"N/A" 时为 None）
    pub fn pre_in_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.pre_in_date, "%Y-%m-%d").ok()
    }
}

/// 同步结果统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErpSyncSummary {
    pub fetched: usize,
    pub discarded: usize,
    pub upserted: usize,
    pub date_parse_failures: usize,
}

/// 自动转工单结果统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConvertSummary {
    pub converted: usize,
    pub failed: usize,
    pub relinked_reports: usize,
    /// 到达截止时间，剩余订单留待下次
    pub timed_out: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> ErpOrderRow {
        ErpOrderRow {
            origin: ErpOrigin::Domestic,
            company_code: "01".to_string(),
            bill_no: "SO-1".to_string(),
            customer_name: None,
            product_code: "PFP-X".to_string(),
            qty_remain: 10,
            bill_date: Some(20250301),
            pre_in_date: Some(20250320),
            bill_status: Some(0),
        }
    }

    #[test]
    fn test_filters() {
        assert!(row().is_importable());
        assert!(ErpOrderRow { bill_status: None, ..row() }.is_importable());
        assert!(!ErpOrderRow { bill_status: Some(1), ..row() }.is_importable());
        assert!(!ErpOrderRow { qty_remain: 0, ..row() }.is_importable());
        assert!(!ErpOrderRow { product_code: "FOO-1".to_string(), ..row() }.is_importable());
    }

    #[test]
    fn test_date_conversion() {
        assert_eq!(yyyymmdd_to_iso(Some(20250301)), "2025-03-01");
        assert_eq!(yyyymmdd_to_iso(Some(20250231)), "N/A");
        assert_eq!(yyyymmdd_to_iso(Some(2025)), "N/A");
        assert_eq!(yyyymmdd_to_iso(None), "N/A");
    }
}
