// ==========================================
// 制造执行系统 (MES) - 行事历 API
// ==========================================
// 职责: 事件查询与维护、工作日判定、假日导入
// ==========================================

use crate::api::context::MesContext;
use crate::api::error::{ApiError, ApiResult};
use crate::domain::calendar::{CalendarEvent, CalendarEventFilter, NewCalendarEvent};
use crate::domain::resource::ProductionLine;
use crate::engine::CalendarQuery;
use crate::importer::{HolidayFeed, HolidayImportSummary, HolidayImporter};
use chrono::{NaiveDate, NaiveDateTime};
use std::path::Path;

/// 单次事件查询的最大窗口（天）
pub const MAX_EVENT_WINDOW_DAYS: i64 = 366;

pub struct CalendarApi {
    ctx: MesContext,
}

impl CalendarApi {
    pub fn new(ctx: MesContext) -> Self {
        Self { ctx }
    }

    /// 查询与窗口重叠的事件
    pub fn list_events(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        filter: &CalendarEventFilter,
    ) -> ApiResult<Vec<CalendarEvent>> {
        if (end - start).num_days() > MAX_EVENT_WINDOW_DAYS {
            return Err(ApiError::InvalidInput(format!(
                "查询窗口超过 {} 天",
                MAX_EVENT_WINDOW_DAYS
            )));
        }
        Ok(self.ctx.calendar().list_events(start, end, filter)?)
    }

    pub fn add_event(&self, event: &NewCalendarEvent) -> ApiResult<i64> {
        Ok(self.ctx.calendar().add_event(event)?)
    }

    pub fn remove_event(&self, id: i64) -> ApiResult<()> {
        Ok(self.ctx.calendar().remove_event(id)?)
    }

    pub fn add_holiday(
        &self,
        date: NaiveDate,
        name: &str,
        description: Option<&str>,
        created_by: &str,
    ) -> ApiResult<i64> {
        Ok(self.ctx.calendar().add_holiday(date, name, description, created_by)?)
    }

    /// 补班日（政府行事历的"補行上班"走这里）
    pub fn add_workday(
        &self,
        date: NaiveDate,
        description: Option<&str>,
        created_by: &str,
    ) -> ApiResult<i64> {
        Ok(self.ctx.calendar().add_workday(date, description, created_by)?)
    }

    // ==========================================
    // 工作日判定（按产线周历）
    // ==========================================

    fn line(&self, production_line: Option<&str>) -> ApiResult<ProductionLine> {
        use crate::engine::ResourceQuery;
        let config = self.ctx.config();
        Ok(self.ctx.catalog(&config).production_line(production_line)?)
    }

    pub fn is_workday(&self, date: NaiveDate, production_line: Option<&str>) -> ApiResult<bool> {
        let line = self.line(production_line)?;
        Ok(self.ctx.calendar().is_workday(date, Some(&line))?)
    }

    pub fn next_workday(&self, date: NaiveDate, production_line: Option<&str>) -> ApiResult<NaiveDate> {
        let line = self.line(production_line)?;
        Ok(self.ctx.calendar().next_workday(date, Some(&line))?)
    }

    pub fn previous_workday(
        &self,
        date: NaiveDate,
        production_line: Option<&str>,
    ) -> ApiResult<NaiveDate> {
        let line = self.line(production_line)?;
        Ok(self.ctx.calendar().previous_workday(date, Some(&line))?)
    }

    // ==========================================
    // 假日导入
    // ==========================================

    /// 政府行事历 CSV / Excel
    pub fn import_holiday_file(&self, path: &Path, created_by: &str) -> ApiResult<HolidayImportSummary> {
        let summary = HolidayImporter::new(self.ctx.calendar(), created_by).import_file(path)?;
        self.ctx.calendar().invalidate();
        Ok(summary)
    }

    /// 台湾政府行事历 JSON；数据源不可用时用内建表
    pub fn import_taiwan_year(
        &self,
        feed: Option<&dyn HolidayFeed>,
        year: i32,
        created_by: &str,
    ) -> ApiResult<HolidayImportSummary> {
        let summary =
            HolidayImporter::new(self.ctx.calendar(), created_by).import_taiwan_year(feed, year)?;
        self.ctx.calendar().invalidate();
        Ok(summary)
    }
}
