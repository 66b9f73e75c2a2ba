// ==========================================
// 制造执行系统 (MES) - 假日导入
// ==========================================
// 来源:
// - 政府行事历 CSV / xlsx: Subject, Start Date, End Date, All Day Event, Description
//   "例假日" 统一为 "週末"；"補行上班" 跳过（补班日走独立接口）
// - 台湾政府行事历 JSON: date (YYYY/M/D 或 YYYY-MM-DD), name
//   数据源不可用时退回内建 2024/2025 假日表
// 同日已有假日事件时跳过（可重复导入）
// ==========================================

use crate::engine::calendar::CalendarService;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::{field, parse_flexible_date, RawRecord, UniversalFileParser};
use crate::domain::types::CalendarEventType;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const SUBJECT_WEEKEND_RAW: &str = "例假日";
const SUBJECT_WEEKEND: &str = "週末";
const SUBJECT_MAKEUP_WORKDAY: &str = "補行上班";

/// 单个导入区间的最长天数
const MAX_SPAN_DAYS: i64 = 31;

/// 一条待导入的假日
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolidayEntry {
    pub date: NaiveDate,
    pub name: String,
    pub description: Option<String>,
}

/// 导入结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HolidayImportSummary {
    pub rows: usize,
    pub imported: usize,
    pub skipped_existing: usize,
    pub skipped_makeup: usize,
    /// 无法解析的行（行号: 原因）
    pub errors: Vec<String>,
    pub used_fallback: bool,
}

/// 台湾政府行事历 JSON 数据源
pub trait HolidayFeed: Send + Sync {
    /// 取得某年度的原始 JSON
    fn fetch_year(&self, year: i32) -> ImportResult<String>;
}

/// 本地文件数据源（`<dir>/<year>.json`）
pub struct FileHolidayFeed {
    dir: PathBuf,
}

impl FileHolidayFeed {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

impl HolidayFeed for FileHolidayFeed {
    fn fetch_year(&self, year: i32) -> ImportResult<String> {
        let path = self.dir.join(format!("{}.json", year));
        if !path.exists() {
            return Err(ImportError::FeedUnavailable(path.display().to_string()));
        }
        Ok(std::fs::read_to_string(path)?)
    }
}

// ==========================================
// 解析
// ==========================================

/// 解析政府行事历行（CSV / xlsx 共用）
pub fn entries_from_records(records: &[RawRecord], summary: &mut HolidayImportSummary) -> Vec<HolidayEntry> {
    let mut entries = Vec::new();
    for (idx, record) in records.iter().enumerate() {
        let row = idx + 2; // 表头占第 1 行
        summary.rows += 1;

        let Some(subject) = field(record, &["Subject", "subject", "主題"]) else {
            summary.errors.push(format!("{}: 缺少 Subject", row));
            continue;
        };
        if subject == SUBJECT_MAKEUP_WORKDAY {
            summary.skipped_makeup += 1;
            continue;
        }
        let name = if subject == SUBJECT_WEEKEND_RAW {
            SUBJECT_WEEKEND
        } else {
            subject
        };

        let Some(start_raw) = field(record, &["Start Date", "start_date", "開始日期"]) else {
            summary.errors.push(format!("{}: 缺少 Start Date", row));
            continue;
        };
        let Some(start) = parse_flexible_date(start_raw) else {
            summary.errors.push(format!("{}: 日期无法解析 {}", row, start_raw));
            continue;
        };
        let end = field(record, &["End Date", "end_date", "結束日期"])
            .and_then(parse_flexible_date)
            .filter(|end| *end >= start)
            .unwrap_or(start);
        if (end - start).num_days() > MAX_SPAN_DAYS {
            summary.errors.push(format!("{}: 区间过长 {} ~ {}", row, start, end));
            continue;
        }

        let description = field(record, &["Description", "description", "描述"]).map(str::to_string);
        let mut day = start;
        while day <= end {
            entries.push(HolidayEntry {
                date: day,
                name: name.to_string(),
                description: description.clone(),
            });
            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }
    }
    entries
}

#[derive(Debug, Deserialize)]
struct TaiwanCalendarItem {
    date: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "isHoliday")]
    is_holiday: Option<bool>,
    #[serde(default)]
    description: Option<String>,
}

/// 解析台湾政府行事历 JSON（数组）；name 为空或明确非假日者略过
pub fn entries_from_taiwan_json(json: &str) -> ImportResult<Vec<HolidayEntry>> {
    let items: Vec<TaiwanCalendarItem> = serde_json::from_str(json)?;
    let mut entries = Vec::new();
    for item in items {
        if item.is_holiday == Some(false) {
            continue;
        }
        let Some(name) = item.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) else {
            continue;
        };
        if name == SUBJECT_MAKEUP_WORKDAY {
            continue;
        }
        let date = parse_flexible_date(&item.date).ok_or_else(|| ImportError::DateFormatError {
            row: entries.len() + 1,
            field: "date".to_string(),
            value: item.date.clone(),
        })?;
        let name = if name == SUBJECT_WEEKEND_RAW { SUBJECT_WEEKEND } else { name };
        entries.push(HolidayEntry {
            date,
            name: name.to_string(),
            description: item.description.filter(|d| !d.trim().is_empty()),
        });
    }
    Ok(entries)
}

/// 内建假日表（国定假日与农历节日，含补假）
pub fn builtin_holidays(year: i32) -> Vec<HolidayEntry> {
    let table: &[(u32, u32, &str)] = match year {
        2024 => &[
            (1, 1, "中華民國開國紀念日"),
            (2, 8, "農曆除夕前一日"),
            (2, 9, "農曆除夕"),
            (2, 10, "春節"),
            (2, 11, "春節"),
            (2, 12, "春節"),
            (2, 13, "春節補假"),
            (2, 14, "春節補假"),
            (2, 28, "和平紀念日"),
            (4, 4, "兒童節"),
            (4, 5, "清明節"),
            (5, 1, "勞動節"),
            (6, 10, "端午節"),
            (9, 17, "中秋節"),
            (10, 10, "國慶日"),
        ],
        2025 => &[
            (1, 1, "中華民國開國紀念日"),
            (1, 27, "調整放假"),
            (1, 28, "農曆除夕"),
            (1, 29, "春節"),
            (1, 30, "春節"),
            (1, 31, "春節"),
            (2, 28, "和平紀念日"),
            (4, 3, "兒童節補假"),
            (4, 4, "兒童節及清明節"),
            (5, 1, "勞動節"),
            (5, 30, "端午節補假"),
            (5, 31, "端午節"),
            (9, 29, "教師節補假"),
            (10, 6, "中秋節"),
            (10, 10, "國慶日"),
            (10, 24, "臺灣光復暨金門古寧頭大捷紀念日"),
            (12, 25, "行憲紀念日"),
        ],
        _ => &[],
    };
    table
        .iter()
        .filter_map(|(m, d, name)| {
            NaiveDate::from_ymd_opt(year, *m, *d).map(|date| HolidayEntry {
                date,
                name: name.to_string(),
                description: Some("內建假日表".to_string()),
            })
        })
        .collect()
}

// ==========================================
// HolidayImporter
// ==========================================
pub struct HolidayImporter<'a> {
    calendar: &'a CalendarService,
    created_by: String,
}

impl<'a> HolidayImporter<'a> {
    pub fn new(calendar: &'a CalendarService, created_by: &str) -> Self {
        Self {
            calendar,
            created_by: created_by.to_string(),
        }
    }

    /// 导入政府行事历文件（.csv / .xlsx）
    pub fn import_file<P: AsRef<Path>>(&self, path: P) -> ImportResult<HolidayImportSummary> {
        let path = path.as_ref();
        let records = UniversalFileParser.parse(path)?;
        let mut summary = HolidayImportSummary::default();
        let entries = entries_from_records(&records, &mut summary);
        self.write_entries(&entries, &mut summary)?;
        info!(
            file = %path.display(),
            imported = summary.imported,
            skipped = summary.skipped_existing,
            errors = summary.errors.len(),
            "假日文件导入完成"
        );
        Ok(summary)
    }

    /// 导入台湾政府行事历；数据源不可用或解析失败时使用内建表
    pub fn import_taiwan_year(
        &self,
        feed: Option<&dyn HolidayFeed>,
        year: i32,
    ) -> ImportResult<HolidayImportSummary> {
        let mut summary = HolidayImportSummary::default();
        let fetched = match feed {
            Some(feed) => feed
                .fetch_year(year)
                .and_then(|json| entries_from_taiwan_json(&json)),
            None => Err(ImportError::FeedUnavailable("未配置行事历数据源".to_string())),
        };

        let entries = match fetched {
            Ok(entries) => entries
                .into_iter()
                .filter(|e| e.date.year() == year)
                .collect::<Vec<_>>(),
            Err(err) => {
                let builtin = builtin_holidays(year);
                if builtin.is_empty() {
                    return Err(err);
                }
                warn!(year, error = %err, "行事历数据源不可用，改用内建假日表");
                summary.used_fallback = true;
                builtin
            }
        };
        summary.rows = entries.len();
        self.write_entries(&entries, &mut summary)?;
        info!(year, imported = summary.imported, fallback = summary.used_fallback, "年度假日导入完成");
        Ok(summary)
    }

    fn write_entries(&self, entries: &[HolidayEntry], summary: &mut HolidayImportSummary) -> ImportResult<()> {
        for entry in entries {
            if self.calendar.has_all_day(CalendarEventType::Holiday, entry.date)? {
                summary.skipped_existing += 1;
                continue;
            }
            self.calendar.add_holiday(
                entry.date,
                &entry.name,
                entry.description.as_deref(),
                &self.created_by,
            )?;
            summary.imported += 1;
        }
        Ok(())
    }
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
    fn test_records_normalise_weekend_and_skip_makeup() {
        let records = vec![
            record(&[("Subject", "例假日"), ("Start Date", "2025/1/4"), ("End Date", "2025/1/5")]),
            record(&[("Subject", "補行上班"), ("Start Date", "2025/2/8")]),
            record(&[("Subject", "和平紀念日"), ("Start Date", "2025-02-28"), ("Description", "國定假日")]),
            record(&[("Subject", "壞資料"), ("Start Date", "2025/13/40")]),
        ];
        let mut summary = HolidayImportSummary::default();
        let entries = entries_from_records(&records, &mut summary);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].name, "週末");
        assert_eq!(entries[1].date, NaiveDate::from_ymd_opt(2025, 1, 5).unwrap());
        assert_eq!(entries[2].description.as_deref(), Some("國定假日"));
        assert_eq!(summary.rows, 4);
        assert_eq!(summary.skipped_makeup, 1);
        assert_eq!(summary.errors.len(), 1);
    }

    #[test]
    fn test_taiwan_json_accepts_both_date_shapes() {
        let json = r#"[
            {"date": "2025/1/1", "name": "開國紀念日", "isHoliday": true},
            {"date": "2025-02-28", "name": "和平紀念日"},
            {"date": "2025/2/8", "name": "補行上班", "isHoliday": false},
            {"date": "2025/3/3", "name": ""}
        ]"#;
        let entries = entries_from_taiwan_json(json).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].date, NaiveDate::from_ymd_opt(2025, 2, 28).unwrap());
    }

    #[test]
    fn test_builtin_table_covers_fallback_years() {
        assert!(builtin_holidays(2024).iter().any(|e| e.name == "中秋節"));
        assert!(builtin_holidays(2025)
            .iter()
            .any(|e| e.date == NaiveDate::from_ymd_opt(2025, 1, 29).unwrap()));
        assert!(builtin_holidays(2030).is_empty());
    }
}
