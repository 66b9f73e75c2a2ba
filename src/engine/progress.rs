// ==========================================
// 制造执行系统 (MES) - 排程进度登记
// ==========================================
// 每次排程运行一个进度键（uuid v4）
// 最后一次更新后超过 TTL 即过期，查询返回 ProgressExpired
// ==========================================

use crate::engine::error::{ScheduleError, ScheduleResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Running,
    Completed,
    Failed,
}

/// 进度快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub key: String,
    pub current: usize,
    pub total: usize,
    pub percent: f64,
    pub status: ProgressStatus,
    pub message: Option<String>,
}

impl ProgressSnapshot {
    fn recompute(&mut self) {
        self.percent = if self.total == 0 {
            100.0
        } else {
            ((self.current.min(self.total) as f64 / self.total as f64) * 10_000.0).round() / 100.0
        };
    }
}

struct Entry {
    snapshot: ProgressSnapshot,
    touched: Instant,
}

pub struct ProgressRegistry {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl ProgressRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_ttl_minutes(minutes: i64) -> Self {
        Self::new(Duration::from_secs(minutes.max(1) as u64 * 60))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 登记新进度，返回进度键
    pub fn start(&self, total: usize) -> String {
        let key = Uuid::new_v4().to_string();
        let mut snapshot = ProgressSnapshot {
            key: key.clone(),
            current: 0,
            total,
            percent: 0.0,
            status: ProgressStatus::Running,
            message: None,
        };
        snapshot.recompute();
        self.lock().insert(
            key.clone(),
            Entry {
                snapshot,
                touched: Instant::now(),
            },
        );
        key
    }

    /// 更新当前进度；键不存在时忽略
    pub fn advance(&self, key: &str, current: usize, message: Option<String>) {
        let mut entries = self.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.snapshot.current = current;
            if message.is_some() {
                entry.snapshot.message = message;
            }
            entry.snapshot.recompute();
            entry.touched = Instant::now();
        }
    }

    pub fn finish(&self, key: &str, status: ProgressStatus, message: Option<String>) {
        let mut entries = self.lock();
        if let Some(entry) = entries.get_mut(key) {
            if status == ProgressStatus::Completed {
                entry.snapshot.current = entry.snapshot.total;
            }
            entry.snapshot.status = status;
            if message.is_some() {
                entry.snapshot.message = message;
            }
            entry.snapshot.recompute();
            entry.touched = Instant::now();
        }
    }

    pub fn get(&self, key: &str) -> ScheduleResult<ProgressSnapshot> {
        self.get_at(key, Instant::now())
    }

    pub(crate) fn get_at(&self, key: &str, now: Instant) -> ScheduleResult<ProgressSnapshot> {
        let mut entries = self.lock();
        let expired = match entries.get(key) {
            None => return Err(ScheduleError::not_found("ScheduleProgress", key)),
            Some(entry) => now.saturating_duration_since(entry.touched) > self.ttl,
        };
        if expired {
            entries.remove(key);
            return Err(ScheduleError::ProgressExpired(key.to_string()));
        }
        entries
            .get(key)
            .map(|e| e.snapshot.clone())
            .ok_or_else(|| ScheduleError::not_found("ScheduleProgress", key))
    }

    /// 清除过期条目，返回清除数量
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let ttl = self.ttl;
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, e| now.saturating_duration_since(e.touched) <= ttl);
        before - entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percent_and_completion() {
        let registry = ProgressRegistry::with_ttl_minutes(60);
        let key = registry.start(4);
        registry.advance(&key, 1, Some("WO-01-202503001".to_string()));
        let snap = registry.get(&key).unwrap();
        assert_eq!(snap.current, 1);
        assert_eq!(snap.percent, 25.0);
        assert_eq!(snap.status, ProgressStatus::Running);

        registry.finish(&key, ProgressStatus::Completed, None);
        let snap = registry.get(&key).unwrap();
        assert_eq!(snap.current, 4);
        assert_eq!(snap.percent, 100.0);
        assert_eq!(snap.message.as_deref(), Some("WO-01-202503001"));
    }

    #[test]
    fn test_unknown_key_is_not_found() {
        let registry = ProgressRegistry::with_ttl_minutes(60);
        let err = registry.get("missing").unwrap_err();
        assert_eq!(err.kind(), "NotFound");
    }

    #[test]
    fn test_expired_key() {
        let registry = ProgressRegistry::new(Duration::from_secs(60));
        let key = registry.start(2);
        let later = Instant::now() + Duration::from_secs(120);
        let err = registry.get_at(&key, later).unwrap_err();
        assert_eq!(err.kind(), "Expired");
        // 过期后条目被移除
        assert_eq!(registry.get(&key).unwrap_err().kind(), "NotFound");
    }
}
