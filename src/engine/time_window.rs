// ==========================================
// 制造执行系统 (MES) - 任务工时与时间窗拟合
// ==========================================
// 工时: ceil(qty / cap * 60) 分钟，夹在 [15, 1440]；cap ≤ 0 → 60
// 拟合: 按日按时段消耗分钟数；非 SMT 工序跳过午休，
//       午休落在任务区间内时结束时间顺延（墙钟时间包含午休）
// ==========================================

use crate::domain::resource::ProductionLine;
use crate::engine::calendar::MAX_WORKDAY_SEARCH_DAYS;
use crate::engine::error::{ScheduleError, ScheduleResult};
use crate::engine::ports::CalendarQuery;
use chrono::{Duration, NaiveDateTime, NaiveTime};

pub const MIN_TASK_MINUTES: i64 = 15;
pub const MAX_TASK_MINUTES: i64 = 24 * 60;
pub const FALLBACK_TASK_MINUTES: i64 = 60;

/// 任务工时（分钟）
pub fn calculate_task_duration(order_qty: i64, capacity_per_hour: f64) -> i64 {
    if capacity_per_hour <= 0.0 || !capacity_per_hour.is_finite() {
        return FALLBACK_TASK_MINUTES;
    }
    let minutes = (order_qty.max(0) as f64 / capacity_per_hour * 60.0).ceil();
    (minutes as i64).clamp(MIN_TASK_MINUTES, MAX_TASK_MINUTES)
}

/// 一天内可生产的时段（已按午休切分，升序）
pub fn productive_segments(
    line: &ProductionLine,
    overtime: bool,
    apply_lunch: bool,
) -> Vec<(NaiveTime, NaiveTime)> {
    let mut periods = vec![(line.work_start, line.work_end)];
    if overtime {
        if let Some(window) = line.overtime_window() {
            periods.push(window);
        }
    }

    let lunch = if apply_lunch { line.lunch_window() } else { None };
    let mut segments = Vec::new();
    for (ps, pe) in periods {
        if ps >= pe {
            continue;
        }
        match lunch {
            Some((ls, le)) if ls < pe && le > ps => {
                if ps < ls {
                    segments.push((ps, ls));
                }
                if le < pe {
                    segments.push((le, pe));
                }
            }
            _ => segments.push((ps, pe)),
        }
    }
    segments.sort_by_key(|s| s.0);
    segments
}

// ==========================================
// TimeWindowFitter - 时间窗拟合
// ==========================================
pub struct TimeWindowFitter<'a> {
    calendar: &'a dyn CalendarQuery,
    line: &'a ProductionLine,
}

impl<'a> TimeWindowFitter<'a> {
    pub fn new(calendar: &'a dyn CalendarQuery, line: &'a ProductionLine) -> Self {
        Self { calendar, line }
    }

    /// 从 `from` 起拟合 `duration_minutes` 分钟的生产时间
    ///
    /// # 返回
    /// (实际开始, 结束)；开始时间会对齐到工作日的可生产时段
    pub fn fit(
        &self,
        from: NaiveDateTime,
        duration_minutes: i64,
        overtime: bool,
        is_smt: bool,
    ) -> ScheduleResult<(NaiveDateTime, NaiveDateTime)> {
        if duration_minutes <= 0 {
            return Err(ScheduleError::InvalidInput(format!(
                "任务工时必须为正数: {}",
                duration_minutes
            )));
        }
        let segments = productive_segments(self.line, overtime, !is_smt);
        if segments.is_empty() {
            return Err(ScheduleError::InvalidInput(format!(
                "产线 {} 没有可生产时段",
                self.line.name
            )));
        }

        let mut remaining = duration_minutes;
        let mut start: Option<NaiveDateTime> = None;
        let mut day = from.date();
        let mut cursor = Some(from.time());

        for _ in 0..MAX_WORKDAY_SEARCH_DAYS {
            if self.calendar.is_workday(day, Some(self.line))? {
                for &(seg_start, seg_end) in &segments {
                    let begin = match cursor {
                        Some(t) if t >= seg_end => continue,
                        Some(t) => t.max(seg_start),
                        None => seg_start,
                    };
                    let available = (seg_end - begin).num_minutes();
                    if available <= 0 {
                        continue;
                    }
                    let begin_at = day.and_time(begin);
                    let task_start = *start.get_or_insert(begin_at);
                    if remaining <= available {
                        return Ok((task_start, begin_at + Duration::minutes(remaining)));
                    }
                    remaining -= available;
                }
            }
            day = day
                .succ_opt()
                .ok_or_else(|| ScheduleError::InvalidInput(format!("日期越界: {}", day)))?;
            cursor = None;
        }

        Err(ScheduleError::InvalidInput(format!(
            "{} 起 {} 天内无法排入 {} 分钟",
            from, MAX_WORKDAY_SEARCH_DAYS, duration_minutes
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::calendar::CalendarEvent;
    use crate::domain::resource::ResourceRef;
    use crate::engine::calendar::resolve_workday;
    use chrono::NaiveDate;

    struct WeekdaysOnly;

    impl CalendarQuery for WeekdaysOnly {
        fn is_workday(&self, date: NaiveDate, line: Option<&ProductionLine>) -> ScheduleResult<bool> {
            Ok(resolve_workday(date, None, line))
        }

        fn occupying_events(
            &self,
            _resource: ResourceRef,
            _start: NaiveDateTime,
            _end: NaiveDateTime,
        ) -> ScheduleResult<Vec<CalendarEvent>> {
            Ok(Vec::new())
        }
    }

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        // 2025-03-03 为周一
        NaiveDate::from_ymd_opt(2025, 3, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_task_duration_clamps() {
        assert_eq!(calculate_task_duration(1, 1000.0), 15);
        assert_eq!(calculate_task_duration(1_000_000, 1.0), 1440);
        assert_eq!(calculate_task_duration(200, 100.0), 120);
        assert_eq!(calculate_task_duration(150, 100.0), 90);
        assert_eq!(calculate_task_duration(10, 0.0), 60);
        assert_eq!(calculate_task_duration(10, -5.0), 60);
    }

    #[test]
    fn test_fit_smt_ignores_lunch() {
        let line = ProductionLine::builtin_default();
        let fitter = TimeWindowFitter::new(&WeekdaysOnly, &line);
        let (s, e) = fitter.fit(at(3, 11, 0), 120, false, true).unwrap();
        assert_eq!(s, at(3, 11, 0));
        assert_eq!(e, at(3, 13, 0));
    }

    #[test]
    fn test_fit_shifts_over_lunch() {
        let line = ProductionLine::builtin_default();
        let fitter = TimeWindowFitter::new(&WeekdaysOnly, &line);
        let (s, e) = fitter.fit(at(3, 10, 30), 120, false, false).unwrap();
        assert_eq!(s, at(3, 10, 30));
        assert_eq!(e, at(3, 13, 30));
    }

    #[test]
    fn test_fit_start_inside_lunch_moves_to_lunch_end() {
        let line = ProductionLine::builtin_default();
        let fitter = TimeWindowFitter::new(&WeekdaysOnly, &line);
        let (s, e) = fitter.fit(at(3, 12, 15), 30, false, false).unwrap();
        assert_eq!(s, at(3, 13, 0));
        assert_eq!(e, at(3, 13, 30));
    }

    #[test]
    fn test_fit_spills_over_weekend() {
        let line = ProductionLine::builtin_default();
        let fitter = TimeWindowFitter::new(&WeekdaysOnly, &line);
        // 周五 16:30 起 120 分钟: 周五 60 分钟 + 周一 60 分钟
        let (s, e) = fitter.fit(at(7, 16, 30), 120, false, false).unwrap();
        assert_eq!(s, at(7, 16, 30));
        assert_eq!(e, at(10, 9, 30));
    }

    #[test]
    fn test_fit_after_hours_starts_next_workday() {
        let line = ProductionLine::builtin_default();
        let fitter = TimeWindowFitter::new(&WeekdaysOnly, &line);
        let (s, _) = fitter.fit(at(3, 18, 0), 60, false, false).unwrap();
        assert_eq!(s, at(4, 8, 30));
    }

    #[test]
    fn test_fit_uses_overtime_window() {
        let mut line = ProductionLine::builtin_default();
        line.overtime_start = Some(NaiveTime::from_hms_opt(18, 0, 0).unwrap());
        line.overtime_end = Some(NaiveTime::from_hms_opt(20, 0, 0).unwrap());
        let fitter = TimeWindowFitter::new(&WeekdaysOnly, &line);
        let (_, e) = fitter.fit(at(3, 17, 0), 90, true, false).unwrap();
        assert_eq!(e, at(3, 19, 0));
        let (_, e) = fitter.fit(at(3, 17, 0), 90, false, false).unwrap();
        assert_eq!(e, at(4, 9, 30));
    }
}
