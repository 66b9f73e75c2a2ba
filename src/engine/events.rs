// ==========================================
// 制造执行系统 (MES) - 引擎层事件发布
// ==========================================
// 职责: 定义引擎事件发布 trait，实现依赖倒置
// 说明: 引擎只发布事件，下游（看板刷新、通知等）实现适配器
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;

// ==========================================
// 引擎事件类型
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MesEventType {
    /// 排程已提交（生成行事历生产事件）
    ScheduleCommitted,
    /// 报工已入账到生产明细
    ReportIngested,
    /// 工单完工并已转移
    WorkOrderCompleted,
    /// 已转移工单重新转移
    WorkOrderRetransferred,
}

impl MesEventType {
    pub fn as_str(&self) -> &str {
        match self {
            MesEventType::ScheduleCommitted => "ScheduleCommitted",
            MesEventType::ReportIngested => "ReportIngested",
            MesEventType::WorkOrderCompleted => "WorkOrderCompleted",
            MesEventType::WorkOrderRetransferred => "WorkOrderRetransferred",
        }
    }
}

/// 引擎事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MesEvent {
    pub event_type: MesEventType,
    pub company_code: String,
    pub order_number: String,
    /// 活动工单 id（完工后为原 id）
    pub work_order_id: Option<i64>,
    /// 完工工单 id
    pub completed_work_order_id: Option<i64>,
    pub source: Option<String>,
    pub occurred_at: NaiveDateTime,
}

impl MesEvent {
    pub fn new(
        event_type: MesEventType,
        company_code: &str,
        order_number: &str,
        occurred_at: NaiveDateTime,
    ) -> Self {
        Self {
            event_type,
            company_code: company_code.to_string(),
            order_number: order_number.to_string(),
            work_order_id: None,
            completed_work_order_id: None,
            source: None,
            occurred_at,
        }
    }

    pub fn with_work_order(mut self, id: i64) -> Self {
        self.work_order_id = Some(id);
        self
    }

    pub fn with_completed(mut self, id: i64) -> Self {
        self.completed_work_order_id = Some(id);
        self
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }
}

// ==========================================
// 事件发布 Trait
// ==========================================

/// 引擎事件发布者（完工接收端也经由此接口接入）
///
/// 发布在事务提交之后调用；发布失败只记录日志，不回滚业务数据。
pub trait MesEventPublisher: Send + Sync {
    fn publish(&self, event: MesEvent) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// 空操作事件发布者（单元测试等场景）
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

impl MesEventPublisher for NoOpEventPublisher {
    fn publish(&self, event: MesEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            event_type = event.event_type.as_str(),
            order_number = %event.order_number,
            "NoOpEventPublisher: 跳过事件发布"
        );
        Ok(())
    }
}

/// 可选的事件发布者包装
pub struct OptionalEventPublisher {
    inner: Option<Arc<dyn MesEventPublisher>>,
}

impl OptionalEventPublisher {
    pub fn with_publisher(publisher: Arc<dyn MesEventPublisher>) -> Self {
        Self {
            inner: Some(publisher),
        }
    }

    pub fn none() -> Self {
        Self { inner: None }
    }

    /// 发布事件；失败只记 warn
    pub fn publish(&self, event: MesEvent) {
        let Some(publisher) = &self.inner else {
            return;
        };
        let event_type = event.event_type;
        if let Err(e) = publisher.publish(event) {
            tracing::warn!(event_type = event_type.as_str(), error = %e, "事件发布失败");
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for OptionalEventPublisher {
    fn default() -> Self {
        Self::none()
    }
}

impl Clone for OptionalEventPublisher {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<MesEventType>>,
    }

    impl MesEventPublisher for Recorder {
        fn publish(&self, event: MesEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
            self.seen.lock().unwrap().push(event.event_type);
            Ok(())
        }
    }

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 3)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap()
    }

    #[test]
    fn test_optional_publisher_none_is_silent() {
        let publisher = OptionalEventPublisher::none();
        assert!(!publisher.is_configured());
        publisher.publish(MesEvent::new(MesEventType::ReportIngested, "01", "WO-01-202503001", at()));
    }

    #[test]
    fn test_optional_publisher_forwards() {
        let recorder = Arc::new(Recorder::default());
        let publisher = OptionalEventPublisher::with_publisher(recorder.clone());
        publisher.publish(
            MesEvent::new(MesEventType::WorkOrderCompleted, "01", "WO-01-202503001", at())
                .with_work_order(7)
                .with_completed(3),
        );
        assert_eq!(
            *recorder.seen.lock().unwrap(),
            vec![MesEventType::WorkOrderCompleted]
        );
    }
}
