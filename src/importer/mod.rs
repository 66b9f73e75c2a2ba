// ==========================================
// 制造执行系统 (MES) - 导入层
// ==========================================
// 职责: 外部数据导入（假日行事历、ERP 导出文件）
// 支持: Excel, CSV, JSON
// ==========================================

pub mod erp_file_source;
pub mod error;
pub mod file_parser;
pub mod holiday_importer;

pub use erp_file_source::ErpFileSource;
pub use error::{ImportError, ImportResult};
pub use file_parser::{CsvParser, ExcelParser, FileParser, RawRecord, UniversalFileParser};
pub use holiday_importer::{
    FileHolidayFeed, HolidayEntry, HolidayFeed, HolidayImportSummary, HolidayImporter,
};
