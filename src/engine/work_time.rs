// ==========================================
// 制造执行系统 (MES) - 报工工时计算
// ==========================================
// 输出: total / actual / break / overtime / regular（小时，两位小数）
// 规则:
//   1. 缺开始或结束时间 → 全 0
//   2. end < start → 跨午夜，end + 1 天
//   3. 无产线 → {total, total, 0, 0, total}
//   4. 非工作日 → 全部计加班
//   5. 工作日: regular = 与上班时段重叠；非 SMT 扣午休；
//      有加班时段取重叠，否则 overtime = max(0, total − regular)
// ==========================================

use crate::domain::completed::round2;
use crate::domain::report::ReportView;
use crate::domain::resource::ProductionLine;
use crate::engine::error::ScheduleResult;
use crate::engine::ports::{CalendarQuery, ResourceQuery};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 工时拆分结果（小时）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkTimeBreakdown {
    pub total: f64,
    pub actual: f64,
    pub break_hours: f64,
    pub overtime: f64,
    pub regular: f64,
}

impl WorkTimeBreakdown {
    fn unclassified(total: f64) -> Self {
        Self {
            total,
            actual: total,
            break_hours: 0.0,
            overtime: 0.0,
            regular: total,
        }
    }

    fn all_overtime(total: f64) -> Self {
        Self {
            total,
            actual: total,
            break_hours: 0.0,
            overtime: total,
            regular: 0.0,
        }
    }

    fn rounded(self) -> Self {
        Self {
            total: round2(self.total),
            actual: round2(self.actual),
            break_hours: round2(self.break_hours),
            overtime: round2(self.overtime),
            regular: round2(self.regular),
        }
    }
}

fn hours(d: Duration) -> f64 {
    d.num_seconds() as f64 / 3600.0
}

/// 区间重叠时长
fn overlap(a: (NaiveDateTime, NaiveDateTime), b: (NaiveDateTime, NaiveDateTime)) -> Duration {
    let start = a.0.max(b.0);
    let end = a.1.min(b.1);
    if end > start {
        end - start
    } else {
        Duration::zero()
    }
}

fn window_on(date: NaiveDate, w: (NaiveTime, NaiveTime)) -> (NaiveDateTime, NaiveDateTime) {
    (date.and_time(w.0), date.and_time(w.1))
}

/// 纯计算（工作日判定由调用方给出）
pub fn calculate(
    date: NaiveDate,
    start: Option<NaiveTime>,
    end: Option<NaiveTime>,
    is_smt: bool,
    line: Option<&ProductionLine>,
    is_workday: bool,
) -> WorkTimeBreakdown {
    let (Some(start), Some(end)) = (start, end) else {
        return WorkTimeBreakdown::default();
    };

    let span_start = date.and_time(start);
    let mut span_end = date.and_time(end);
    if end < start {
        span_end += Duration::days(1);
    }
    let span = (span_start, span_end);
    let total = hours(span_end - span_start);

    let Some(line) = line else {
        return WorkTimeBreakdown::unclassified(total).rounded();
    };
    if !is_workday {
        return WorkTimeBreakdown::all_overtime(total).rounded();
    }

    let work = window_on(date, (line.work_start, line.work_end));
    let mut regular = hours(overlap(span, work));
    let mut break_hours = 0.0;

    if !is_smt {
        if let Some(lunch) = line.lunch_window() {
            let lunch = window_on(date, lunch);
            break_hours = hours(overlap(span, lunch));
            // 只扣除落在上班时段内的午休部分
            let lunch_in_work = (lunch.0.max(work.0), lunch.1.min(work.1));
            if lunch_in_work.1 > lunch_in_work.0 {
                regular -= hours(overlap(span, lunch_in_work));
            }
        }
    }

    let overtime = match line.overtime_window() {
        Some(ot) => hours(overlap(span, window_on(date, ot))),
        // 无加班时段: 上班时段外的时间全部算加班（含午休）
        None => (total - regular).max(0.0),
    };

    WorkTimeBreakdown {
        total,
        actual: total - break_hours,
        break_hours,
        overtime,
        regular: regular.max(0.0),
    }
    .rounded()
}

// ==========================================
// WorkTimeCalculator - 按报工解析产线与工作日
// ==========================================
pub struct WorkTimeCalculator {
    calendar: Arc<dyn CalendarQuery>,
    resources: Arc<dyn ResourceQuery>,
}

impl WorkTimeCalculator {
    pub fn new(calendar: Arc<dyn CalendarQuery>, resources: Arc<dyn ResourceQuery>) -> Self {
        Self { calendar, resources }
    }

    /// 报工未填产线时使用默认产线
    pub fn calculate_for(&self, report: &dyn ReportView) -> ScheduleResult<WorkTimeBreakdown> {
        if report.start_time().is_none() || report.end_time().is_none() {
            return Ok(WorkTimeBreakdown::default());
        }
        let line = self.resources.production_line(report.production_line())?;
        let workday = self.calendar.is_workday(report.report_date(), Some(&line))?;
        Ok(calculate(
            report.report_date(),
            report.start_time(),
            report.end_time(),
            report.is_smt(),
            Some(&line),
            workday,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(h, m, 0)
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 3).unwrap()
    }

    fn assert_invariants(r: &WorkTimeBreakdown) {
        assert!(r.regular + r.overtime + r.break_hours >= 0.0);
        assert!((r.actual + r.break_hours - r.total).abs() < 0.011);
    }

    #[test]
    fn test_missing_times_are_zero() {
        let line = ProductionLine::builtin_default();
        let r = calculate(monday(), None, t(17, 0), false, Some(&line), true);
        assert_eq!(r, WorkTimeBreakdown::default());
    }

    #[test]
    fn test_without_line_is_unclassified() {
        let r = calculate(monday(), t(9, 0), t(12, 30), false, None, true);
        assert_eq!(r.total, 3.5);
        assert_eq!(r.regular, 3.5);
        assert_eq!(r.overtime, 0.0);
        assert_invariants(&r);
    }

    #[test]
    fn test_non_workday_is_full_overtime() {
        let line = ProductionLine::builtin_default();
        let sat = NaiveDate::from_ymd_opt(2025, 3, 8).unwrap();
        let r = calculate(sat, t(9, 0), t(17, 0), false, Some(&line), false);
        assert_eq!(
            r,
            WorkTimeBreakdown {
                total: 8.0,
                actual: 8.0,
                break_hours: 0.0,
                overtime: 8.0,
                regular: 0.0,
            }
        );
    }

    #[test]
    fn test_lunch_is_break_for_non_smt() {
        let line = ProductionLine::builtin_default();
        let r = calculate(monday(), t(8, 30), t(17, 30), false, Some(&line), true);
        assert_eq!(r.total, 9.0);
        assert_eq!(r.break_hours, 1.0);
        assert_eq!(r.regular, 8.0);
        assert_eq!(r.actual, 8.0);
        // 无加班时段时午休也计入加班
        assert_eq!(r.overtime, 1.0);
        assert_invariants(&r);
    }

    #[test]
    fn test_smt_has_no_break() {
        let line = ProductionLine::builtin_default();
        let r = calculate(monday(), t(8, 30), t(17, 30), true, Some(&line), true);
        assert_eq!(r.break_hours, 0.0);
        assert_eq!(r.regular, 9.0);
        assert_eq!(r.actual, 9.0);
        assert_invariants(&r);
    }

    #[test]
    fn test_after_hours_counts_as_overtime_without_window() {
        let line = ProductionLine::builtin_default();
        let r = calculate(monday(), t(16, 0), t(19, 0), false, Some(&line), true);
        assert_eq!(r.regular, 1.5);
        assert_eq!(r.overtime, 1.5);
        assert_invariants(&r);
    }

    #[test]
    fn test_overtime_window_overlap() {
        let mut line = ProductionLine::builtin_default();
        line.overtime_start = t(18, 0);
        line.overtime_end = t(20, 0);
        let r = calculate(monday(), t(17, 0), t(21, 0), false, Some(&line), true);
        assert_eq!(r.total, 4.0);
        assert_eq!(r.regular, 0.5);
        assert_eq!(r.overtime, 2.0);
        assert_invariants(&r);
    }

    #[test]
    fn test_cross_midnight() {
        let line = ProductionLine::builtin_default();
        let r = calculate(monday(), t(22, 0), t(2, 0), false, Some(&line), true);
        assert_eq!(r.total, 4.0);
        assert_eq!(r.regular, 0.0);
        assert_eq!(r.overtime, 4.0);
        assert_invariants(&r);
    }
}
