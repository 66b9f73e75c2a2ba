// ==========================================
// 行事历与假日导入集成测试
// ==========================================

mod test_helpers;

use std::io::Write;

use factory_mes::domain::{CalendarEventFilter, CalendarEventType};
use factory_mes::importer::{FileHolidayFeed, HolidayFeed};
use tempfile::Builder;
use test_helpers::*;

fn holidays_in(env: &TestEnv, from: chrono::NaiveDate, to: chrono::NaiveDate) -> usize {
    env.state
        .calendar_api
        .list_events(
            from.and_time(time(0, 0)),
            to.and_time(time(23, 59)),
            &CalendarEventFilter {
                event_type: Some(CalendarEventType::Holiday),
                ..Default::default()
            },
        )
        .expect("查询事件失败")
        .len()
}

#[test]
fn test_next_workday_skips_weekend() {
    let env = TestEnv::new(monday_at(8, 0));
    let api = &env.state.calendar_api;

    // 2025-03-07 周五 → 2025-03-10 周一
    assert_eq!(api.next_workday(date(2025, 3, 7), None).unwrap(), date(2025, 3, 10));
    assert_eq!(api.previous_workday(date(2025, 3, 10), None).unwrap(), date(2025, 3, 7));
    assert!(!api.is_workday(date(2025, 3, 8), None).unwrap());
    assert!(api.is_workday(date(2025, 3, 10), None).unwrap());
}

#[test]
fn test_workday_override_beats_weekend_and_holiday() {
    let env = TestEnv::new(monday_at(8, 0));
    let api = &env.state.calendar_api;
    let saturday = date(2025, 3, 8);

    api.add_workday(saturday, Some("補行上班"), "admin").expect("新增补班日失败");
    assert!(api.is_workday(saturday, None).unwrap());
    assert_eq!(api.next_workday(date(2025, 3, 7), None).unwrap(), saturday);

    // 同日再加假日，补班优先
    api.add_holiday(saturday, "公司活動", None, "admin").unwrap();
    assert!(api.is_workday(saturday, None).unwrap());

    // 判定结果不受重复查询影响
    for _ in 0..3 {
        assert!(api.is_workday(saturday, None).unwrap());
    }
}

#[test]
fn test_holiday_blocks_weekday_until_removed() {
    let env = TestEnv::new(monday_at(8, 0));
    let api = &env.state.calendar_api;
    let tuesday = date(2025, 3, 4);

    let id = api.add_holiday(tuesday, "停電", Some("廠區停電"), "admin").unwrap();
    assert!(!api.is_workday(tuesday, None).unwrap());
    assert_eq!(api.next_workday(monday(), None).unwrap(), date(2025, 3, 5));

    api.remove_event(id).unwrap();
    assert!(api.is_workday(tuesday, None).unwrap());
}

#[test]
fn test_import_holiday_csv() {
    let env = TestEnv::new(monday_at(8, 0));
    let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
    writeln!(file, "Subject,Start Date,End Date,All Day Event,Description").unwrap();
    writeln!(file, "和平紀念日,2025/2/28,2025/2/28,TRUE,國定假日").unwrap();
    writeln!(file, "例假日,2025/3/1,2025/3/2,TRUE,").unwrap();
    writeln!(file, "補行上班,2025/2/8,2025/2/8,TRUE,").unwrap();
    writeln!(file, "壞資料,not-a-date,,TRUE,").unwrap();
    file.flush().unwrap();

    let summary = env
        .state
        .calendar_api
        .import_holiday_file(file.path(), "admin")
        .expect("导入失败");
    assert_eq!(summary.rows, 4);
    assert_eq!(summary.imported, 3);
    assert_eq!(summary.skipped_makeup, 1);
    assert_eq!(summary.errors.len(), 1);
    assert!(!summary.used_fallback);

    let weekend = env
        .state
        .calendar_api
        .list_events(
            at(2025, 3, 1, 0, 0),
            at(2025, 3, 1, 23, 59),
            &CalendarEventFilter::default(),
        )
        .unwrap();
    assert_eq!(weekend.len(), 1);
    assert_eq!(weekend[0].title, "週末");
    assert!(weekend[0].all_day);

    // 重复导入不产生重复事件
    let again = env
        .state
        .calendar_api
        .import_holiday_file(file.path(), "admin")
        .unwrap();
    assert_eq!(again.imported, 0);
    assert_eq!(again.skipped_existing, 3);
    assert_eq!(holidays_in(&env, date(2025, 2, 1), date(2025, 3, 31)), 3);
}

#[test]
fn test_import_missing_file_is_not_found() {
    let env = TestEnv::new(monday_at(8, 0));
    let err = env
        .state
        .calendar_api
        .import_holiday_file(std::path::Path::new("/nonexistent/holidays.csv"), "admin")
        .unwrap_err();
    assert_eq!(err.kind(), "NotFound");
}

#[test]
fn test_taiwan_year_falls_back_to_builtin_table() {
    let env = TestEnv::new(monday_at(8, 0));
    let summary = env
        .state
        .calendar_api
        .import_taiwan_year(None, 2025, "admin")
        .expect("导入失败");
    assert!(summary.used_fallback);
    assert!(summary.imported > 0);
    assert!(!env.state.calendar_api.is_workday(date(2025, 10, 10), None).unwrap());

    // 不在内建表的年度且无数据源
    let err = env
        .state
        .calendar_api
        .import_taiwan_year(None, 2031, "admin")
        .unwrap_err();
    assert_eq!(err.kind(), "DatabaseError");
}

#[test]
fn test_taiwan_year_from_feed_directory() {
    let env = TestEnv::new(monday_at(8, 0));
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("2026.json"),
        r#"[
            {"date": "2026/1/1", "name": "開國紀念日", "isHoliday": true},
            {"date": "2026-01-03", "name": "例假日", "isHoliday": true},
            {"date": "2026-01-05", "name": "", "isHoliday": false},
            {"date": "2026-02-07", "name": "補行上班", "isHoliday": false}
        ]"#,
    )
    .unwrap();
    let feed = FileHolidayFeed::new(dir.path());
    assert!(feed.fetch_year(2027).is_err());

    let summary = env
        .state
        .calendar_api
        .import_taiwan_year(Some(&feed), 2026, "admin")
        .expect("导入失败");
    assert!(!summary.used_fallback);
    assert_eq!(summary.imported, 2);
    assert!(!env.state.calendar_api.is_workday(date(2026, 1, 1), None).unwrap());
}
