// ==========================================
// 配置管理集成测试
// ==========================================
// 测试范围:
// 1. 配置更新校验: update_config
// 2. 类型化配置重载: ConfigApi::reload / 作业 tick
// 3. 配置快照: get_config_snapshot, restore_from_snapshot
// ==========================================

mod test_helpers;

use factory_mes::app::WorkerRunner;
use factory_mes::config::{config_keys, MesConfig};
use factory_mes::domain::job::job_names;
use test_helpers::*;

#[test]
fn test_update_config_validates_known_keys() {
    let env = TestEnv::new(monday_at(9, 0));
    let api = &env.state.config_api;

    for (key, value) in [
        (config_keys::AUTO_SYNC_INTERVAL, "0"),
        (config_keys::AUTO_SYNC_ENABLED, "maybe"),
        (config_keys::SCHEDULE_SAFETY_DAYS, "-1"),
        (config_keys::FACTORY_UTC_OFFSET_HOURS, "20"),
        (config_keys::PACKAGING_PROCESS_NAME, "  "),
        ("  ", "x"),
    ] {
        let err = api.update_config(key, value, None).unwrap_err();
        assert_eq!(err.kind(), "InvalidInput", "{} = {:?} 应被拒绝", key, value);
    }

    api.update_config(config_keys::SCHEDULE_SAFETY_DAYS, "2", Some("交期安全天数"))
        .expect("更新失败");
    assert_eq!(
        api.get_config(config_keys::SCHEDULE_SAFETY_DAYS).unwrap().as_deref(),
        Some("2")
    );
    // 写入后尚未重载
    assert_eq!(api.current().schedule_safety_days, 0);
}

#[tokio::test]
async fn test_reload_replaces_shared_snapshot() {
    let env = TestEnv::new(monday_at(9, 0));
    let api = &env.state.config_api;
    assert_eq!(api.current(), MesConfig::default());

    api.update_config(config_keys::SCHEDULE_SAFETY_DAYS, "3", None).unwrap();
    api.update_config(config_keys::FINAL_DAY_ONLY_KEYWORDS, "包裝, 入庫 ,", None).unwrap();
    api.update_config(config_keys::PACKAGING_PROCESS_NAME, "成品包裝", None).unwrap();

    let reloaded = api.reload().await.expect("重载失败");
    assert_eq!(reloaded.schedule_safety_days, 3);
    assert_eq!(reloaded.final_day_only_keywords, vec!["包裝", "入庫"]);
    assert_eq!(reloaded.packaging_process_name, "成品包裝");
    // 前台与后台共用同一份快照
    assert_eq!(env.ctx().config(), reloaded);
    assert!(reloaded.is_final_day_only("成品包裝"));
}

#[tokio::test]
async fn test_job_tick_picks_up_disabled_switch() {
    let env = TestEnv::new(monday_at(9, 0));
    env.add_standard_route("PFP-X");
    let runner = WorkerRunner::new(&env.state);

    assert!(runner.run_job(job_names::AUTO_CONVERT).await.is_some());

    env.state
        .config_api
        .update_config(config_keys::AUTO_CONVERT_ENABLED, "off", None)
        .unwrap();
    assert!(runner.run_job(job_names::AUTO_CONVERT).await.is_none());
    assert!(!env.ctx().config().auto_convert_enabled);

    let runs = env
        .state
        .erp_api
        .list_job_runs(Some(job_names::AUTO_CONVERT), 10)
        .unwrap();
    assert_eq!(runs.len(), 1);
}

#[test]
fn test_snapshot_round_trip() {
    let env = TestEnv::new(monday_at(9, 0));
    let api = &env.state.config_api;
    api.update_config(config_keys::WARNING_KEEP_ROWS, "500", None).unwrap();
    let snapshot = api.get_config_snapshot().expect("快照失败");

    api.update_config(config_keys::WARNING_KEEP_ROWS, "800", None).unwrap();
    let restored = api.restore_from_snapshot(&snapshot).expect("恢复失败");
    assert_eq!(restored, 1);
    assert_eq!(
        api.get_config(config_keys::WARNING_KEEP_ROWS).unwrap().as_deref(),
        Some("500")
    );

    assert_eq!(api.restore_from_snapshot(" ").unwrap_err().kind(), "InvalidInput");
    assert_eq!(api.restore_from_snapshot("[1,2]").unwrap_err().kind(), "InvalidInput");
}
