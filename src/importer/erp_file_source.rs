// ==========================================
// 制造执行系统 (MES) - ERP 导出文件数据源
// ==========================================
// 读取 ERP 导出的 CSV / Excel 订单行
// 内销: BillNo, ProdID；外销: BillNo, ItemNo（按表头自动识别）
// 其余: QtyRemain, BillDate, PreInDate, BillStatus, ShortName/CustomerName
// ==========================================

use crate::domain::erp::{ErpOrderRow, ErpOrigin};
use crate::engine::erp_sync::ErpOrderSource;
use crate::engine::error::JobResult;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::{field, RawRecord, UniversalFileParser};
use std::path::{Path, PathBuf};
use tracing::warn;

pub struct ErpFileSource {
    path: PathBuf,
    /// 文件未带公司代码栏时使用
    default_company_code: String,
    name: String,
}

impl ErpFileSource {
    pub fn new<P: AsRef<Path>>(path: P, default_company_code: &str) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = format!("file:{}", path.display());
        Self {
            path,
            default_company_code: default_company_code.to_string(),
            name,
        }
    }

    pub fn read_rows(&self) -> ImportResult<Vec<ErpOrderRow>> {
        let records = UniversalFileParser.parse(&self.path)?;
        let mut rows = Vec::with_capacity(records.len());
        for (idx, record) in records.iter().enumerate() {
            match row_from_record(record, idx + 2, &self.default_company_code) {
                Ok(row) => rows.push(row),
                // 单行错误不影响整批
                Err(err) => warn!(file = %self.path.display(), error = %err, "ERP 订单行无法解析，已略过"),
            }
        }
        Ok(rows)
    }
}

impl ErpOrderSource for ErpFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_orders(&self) -> JobResult<Vec<ErpOrderRow>> {
        Ok(self.read_rows()?)
    }
}

fn parse_i64(record: &RawRecord, names: &[&str], row: usize) -> ImportResult<Option<i64>> {
    let Some(raw) = field(record, names) else {
        return Ok(None);
    };
    // Excel 数值可能带小数点（20250301.0）
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| Some(v.trunc() as i64))
        .ok_or_else(|| ImportError::NumberFormatError {
            row,
            field: names[0].to_string(),
            value: raw.to_string(),
        })
}

/// 日期栏无法解析时记为 0，同步阶段转为 "N/A"
fn parse_date_number(record: &RawRecord, names: &[&str]) -> Option<i64> {
    field(record, names).map(|raw| {
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| v.trunc() as i64)
            .unwrap_or(0)
    })
}

pub fn row_from_record(record: &RawRecord, row: usize, default_company_code: &str) -> ImportResult<ErpOrderRow> {
    let (origin, product_code) = match (field(record, &["ProdID"]), field(record, &["ItemNo"])) {
        (Some(prod), _) => (ErpOrigin::Domestic, prod),
        (None, Some(item)) => (ErpOrigin::Foreign, item),
        (None, None) => {
            return Err(ImportError::MissingField {
                row,
                field: "ProdID/ItemNo".to_string(),
            })
        }
    };
    let bill_no = field(record, &["BillNo"]).ok_or_else(|| ImportError::MissingField {
        row,
        field: "BillNo".to_string(),
    })?;

    Ok(ErpOrderRow {
        origin,
        company_code: field(record, &["CompanyCode", "CompanyID"])
            .unwrap_or(default_company_code)
            .to_string(),
        bill_no: bill_no.to_string(),
        customer_name: field(record, &["ShortName", "CustomerName"]).map(str::to_string),
        product_code: product_code.to_string(),
        qty_remain: parse_i64(record, &["QtyRemain"], row)?.unwrap_or(0),
        bill_date: parse_date_number(record, &["BillDate"]),
        pre_in_date: parse_date_number(record, &["PreInDate"]),
        bill_status: parse_i64(record, &["BillStatus"], row)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn record(pairs: &[(&str, &str)]) -> RawRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>()
    }

    #[test]
    fn test_detects_origin_by_column() {
        let domestic = row_from_record(
            &record(&[("BillNo", "OB-1"), ("ProdID", "PFP-X"), ("QtyRemain", "20"), ("BillDate", "20250301")]),
            2,
            "01",
        )
        .unwrap();
        assert_eq!(domestic.origin, ErpOrigin::Domestic);
        assert_eq!(domestic.company_code, "01");
        assert_eq!(domestic.bill_date, Some(20250301));
        assert_eq!(domestic.bill_status, None);

        let foreign = row_from_record(
            &record(&[("BillNo", "TB-1"), ("ItemNo", "PFP-Y"), ("QtyRemain", "5.0"), ("BillStatus", "0")]),
            3,
            "01",
        )
        .unwrap();
        assert_eq!(foreign.origin, ErpOrigin::Foreign);
        assert_eq!(foreign.qty_remain, 5);
        assert_eq!(foreign.bill_status, Some(0));
    }

    #[test]
    fn test_bad_date_kept_for_na_conversion() {
        let row = row_from_record(
            &record(&[("BillNo", "OB-2"), ("ProdID", "PFP-X"), ("QtyRemain", "1"), ("PreInDate", "abc")]),
            2,
            "02",
        )
        .unwrap();
        assert_eq!(row.pre_in_date, Some(0));
    }

    #[test]
    fn test_missing_product_column() {
        let err = row_from_record(&record(&[("BillNo", "OB-3")]), 4, "01").unwrap_err();
        assert!(matches!(err, ImportError::MissingField { row: 4, .. }));
    }
}
