// ==========================================
// 制造执行系统 (MES) - 排程引擎
// ==========================================
// 模式:
//   auto      - 交期优先，逐单拆解工艺路线，贪心选资源并提交
//   semi_auto - 同样拆解，只返回候选任务；调用方可拆分后提交
//   hybrid    - 按优先级分桶（urgent → normal → flexible），
//               交期问题只警告不阻断
//   manual    - 调用方给定完整任务，只做冲突检查与持久化
// 游标: 每次运行独立的 SchedulerSession，后一张工单排在前一张之后
// 提交: 每张工单一个 IMMEDIATE 事务，事务内复查冲突；
//       任一任务冲突则整单不落库
// ==========================================

use crate::config::MesConfig;
use crate::db::{begin_immediate, SharedConnection};
use crate::domain::calendar::{EventConflict, NewCalendarEvent};
use crate::domain::resource::{ProductionLine, ResourceRef};
use crate::domain::route::ProductRoute;
use crate::domain::types::{CalendarEventType, OrderPriority, ScheduleMode};
use crate::domain::warning::NewScheduleWarning;
use crate::domain::work_order::WorkOrder;
use crate::engine::conflict::{ConflictChecker, TentativeBooking};
use crate::engine::error::{ScheduleError, ScheduleResult};
use crate::engine::events::{MesEvent, MesEventType, OptionalEventPublisher};
use crate::engine::ports::{CalendarQuery, ResourceQuery, WorkOrderStore};
use crate::engine::progress::{ProgressRegistry, ProgressStatus};
use crate::engine::resource_selector::{ResourceChoice, ResourcePool};
use crate::engine::time_window::{calculate_task_duration, TimeWindowFitter};
use crate::i18n::{t_in_locale, t_with_args, WARNING_LOCALE};
use crate::repository::{
    CalendarEventRepository, RepositoryError, WarningRepository, WorkOrderRepository,
};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// 资源不可用时的顺延步长
pub const RETRY_STEP_MINUTES: i64 = 30;
/// 非混合模式的重试次数
pub const DEFAULT_RETRY_BUDGET: u32 = 5;

// ==========================================
// 请求 / 结果类型
// ==========================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleOptions {
    pub mode: ScheduleMode,
    pub order_ids: Vec<i64>,
    /// 排程基准时间（"现在"）
    pub now: NaiveDateTime,
    /// 首张工单最早开工时间，缺省为 now
    pub start_from: Option<NaiveDateTime>,
    pub overtime: bool,
    pub production_line: Option<String>,
    pub created_by: String,
    /// 进度键（由 ProgressRegistry::start 返回）
    pub progress_key: Option<String>,
}

impl ScheduleOptions {
    pub fn new(mode: ScheduleMode, order_ids: Vec<i64>, now: NaiveDateTime) -> Self {
        Self {
            mode,
            order_ids,
            now,
            start_from: None,
            overtime: false,
            production_line: None,
            created_by: "scheduler".to_string(),
            progress_key: None,
        }
    }
}

/// 一个工序的候选任务
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateTask {
    pub order_id: i64,
    pub order_number: String,
    pub process_name: String,
    pub step_order: i32,
    pub is_smt: bool,
    pub quantity: i64,
    pub duration_minutes: i64,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub resources: ResourceChoice,
}

impl CandidateTask {
    fn title(&self) -> String {
        format!("{} {}", self.order_number, self.process_name)
    }

    fn bookings(&self) -> Vec<TentativeBooking> {
        self.resources
            .resources()
            .into_iter()
            .map(|resource| TentativeBooking {
                resource,
                start: self.start,
                end: self.end,
                label: self.title(),
            })
            .collect()
    }
}

/// 单张工单的排程方案
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPlan {
    pub order_id: i64,
    pub company_code: String,
    pub order_number: String,
    pub product_code: String,
    pub priority: OrderPriority,
    pub qty_remain: i64,
    pub tasks: Vec<CandidateTask>,
    pub expected_finish: NaiveDateTime,
    /// 交期扣除安全天数
    pub deadline: Option<NaiveDate>,
    pub warnings: Vec<String>,
}

/// 失败工单（批次中其他工单继续）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedOrder {
    pub order_id: i64,
    pub order_number: Option<String>,
    pub kind: String,
    pub reason: String,
    pub suggestion: Option<String>,
}

impl FailedOrder {
    fn from_error(order_id: i64, order_number: Option<&str>, err: &ScheduleError) -> Self {
        let suggestion = match err {
            ScheduleError::DeliveryDateViolation { suggestion, .. } => Some(suggestion.clone()),
            _ => None,
        };
        Self {
            order_id,
            order_number: order_number.map(str::to_string),
            kind: err.kind().to_string(),
            reason: err.to_string(),
            suggestion,
        }
    }
}

/// 已提交工单
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommittedOrder {
    pub order_id: i64,
    pub order_number: String,
    pub event_ids: Vec<i64>,
    pub dispatch_ids: Vec<i64>,
    pub finish: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleOutcome {
    pub mode: ScheduleMode,
    pub committed: Vec<CommittedOrder>,
    /// semi_auto 的候选方案
    pub candidates: Vec<OrderPlan>,
    pub failed: Vec<FailedOrder>,
    pub warning_count: usize,
}

impl ScheduleOutcome {
    fn new(mode: ScheduleMode) -> Self {
        Self {
            mode,
            committed: Vec::new(),
            candidates: Vec::new(),
            failed: Vec::new(),
            warning_count: 0,
        }
    }

    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// 调用方给定的任务（手动排程 / 半自动拆分）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAssignment {
    pub process_name: String,
    pub quantity: i64,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub operator_id: Option<i64>,
    pub equipment_id: Option<i64>,
    pub smt_equipment_id: Option<i64>,
}

// ==========================================
// SchedulerSession - 单次运行的排程游标
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerSession {
    now: NaiveDateTime,
    cursor: NaiveDateTime,
}

impl SchedulerSession {
    pub fn new(now: NaiveDateTime, start_from: Option<NaiveDateTime>) -> Self {
        Self {
            now,
            cursor: start_from.map_or(now, |s| s.max(now)),
        }
    }

    pub fn cursor(&self) -> NaiveDateTime {
        self.cursor
    }

    pub fn now(&self) -> NaiveDateTime {
        self.now
    }

    /// 游标只前进不后退
    pub fn advance_to(&mut self, t: NaiveDateTime) {
        if t > self.cursor {
            self.cursor = t;
        }
    }
}

/// 单张工单拆解时的策略
#[derive(Debug, Clone, Copy)]
struct PlanPolicy {
    retry_budget: u32,
    /// true: 交期问题转为警告
    lenient_deadline: bool,
}

// ==========================================
// Scheduler - 排程引擎
// ==========================================
pub struct Scheduler {
    conn: SharedConnection,
    calendar: Arc<dyn CalendarQuery>,
    resources: Arc<dyn ResourceQuery>,
    store: Arc<dyn WorkOrderStore>,
    warnings: WarningRepository,
    progress: Arc<ProgressRegistry>,
    events: OptionalEventPublisher,
    config: MesConfig,
}

impl Scheduler {
    pub fn new(
        conn: SharedConnection,
        calendar: Arc<dyn CalendarQuery>,
        resources: Arc<dyn ResourceQuery>,
        store: Arc<dyn WorkOrderStore>,
        progress: Arc<ProgressRegistry>,
        events: OptionalEventPublisher,
        config: MesConfig,
    ) -> Self {
        Self {
            warnings: WarningRepository::new(conn.clone()),
            conn,
            calendar,
            resources,
            store,
            progress,
            events,
            config,
        }
    }

    pub fn progress(&self) -> &Arc<ProgressRegistry> {
        &self.progress
    }

    /// 按模式分派
    pub fn run(&self, options: &ScheduleOptions) -> ScheduleResult<ScheduleOutcome> {
        match options.mode {
            ScheduleMode::Auto => self.run_auto(options),
            ScheduleMode::Hybrid => self.run_hybrid(options),
            ScheduleMode::SemiAuto => self.run_semi_auto(options),
            ScheduleMode::Manual => Err(ScheduleError::InvalidInput(
                "手动排程需调用 commit_manual 并给定完整任务".to_string(),
            )),
        }
    }

    // ==========================================
    // 自动模式
    // ==========================================

    #[instrument(skip(self, options), fields(orders = options.order_ids.len()))]
    pub fn run_auto(&self, options: &ScheduleOptions) -> ScheduleResult<ScheduleOutcome> {
        let mut outcome = ScheduleOutcome::new(ScheduleMode::Auto);
        let mut orders = self.load_orders(&options.order_ids, &mut outcome);
        orders.sort_by(|a, b| by_delivery(a, b));

        let policy = PlanPolicy {
            retry_budget: DEFAULT_RETRY_BUDGET,
            lenient_deadline: false,
        };
        self.schedule_sequence(options, orders, |_| policy, true, &mut outcome)?;
        info!(
            committed = outcome.committed.len(),
            failed = outcome.failed.len(),
            "自动排程完成"
        );
        Ok(outcome)
    }

    // ==========================================
    // 混合模式
    // ==========================================

    #[instrument(skip(self, options), fields(orders = options.order_ids.len()))]
    pub fn run_hybrid(&self, options: &ScheduleOptions) -> ScheduleResult<ScheduleOutcome> {
        let mut outcome = ScheduleOutcome::new(ScheduleMode::Hybrid);
        let mut orders = self.load_orders(&options.order_ids, &mut outcome);
        orders.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| by_delivery(a, b)));

        self.schedule_sequence(
            options,
            orders,
            |order| PlanPolicy {
                retry_budget: order.priority.retry_budget(),
                lenient_deadline: true,
            },
            true,
            &mut outcome,
        )?;
        info!(
            committed = outcome.committed.len(),
            failed = outcome.failed.len(),
            warnings = outcome.warning_count,
            "混合排程完成"
        );
        Ok(outcome)
    }

    // ==========================================
    // 半自动模式
    // ==========================================

    /// 只生成候选任务，不写行事历
    #[instrument(skip(self, options), fields(orders = options.order_ids.len()))]
    pub fn run_semi_auto(&self, options: &ScheduleOptions) -> ScheduleResult<ScheduleOutcome> {
        let mut outcome = ScheduleOutcome::new(ScheduleMode::SemiAuto);
        let mut orders = self.load_orders(&options.order_ids, &mut outcome);
        orders.sort_by(|a, b| by_delivery(a, b));

        let policy = PlanPolicy {
            retry_budget: DEFAULT_RETRY_BUDGET,
            lenient_deadline: false,
        };
        self.schedule_sequence(options, orders, |_| policy, false, &mut outcome)?;
        Ok(outcome)
    }

    /// 提交半自动拆分: 每个工序的拆分数量之和必须等于剩余数量
    #[instrument(skip(self, splits), fields(splits = splits.len()))]
    pub fn submit_semi_auto(
        &self,
        order_id: i64,
        splits: &[TaskAssignment],
        created_by: &str,
        now: NaiveDateTime,
    ) -> ScheduleResult<CommittedOrder> {
        let order = self.require_order(order_id)?;
        let qty_remain = self.remaining_quantity(&order)?;
        if qty_remain <= 0 {
            return Err(ScheduleError::InvalidQuantity {
                order_number: order.order_number.clone(),
                qty_remain,
            });
        }

        let route = self.resources.route(&order.product_code)?;
        if route.is_empty() {
            return Err(ScheduleError::NoRouteDefined {
                product_code: order.product_code.clone(),
            });
        }
        let mut sums: BTreeMap<&str, i64> = route
            .iter()
            .map(|step| (step.process_name.as_str(), 0))
            .collect();
        for split in splits {
            let Some(sum) = sums.get_mut(split.process_name.as_str()) else {
                return Err(ScheduleError::InvalidInput(format!(
                    "工序 {} 不在产品 {} 的工艺路线中",
                    split.process_name, order.product_code
                )));
            };
            *sum += split.quantity;
        }
        // 路线上每个工序都必须拆满
        for (process, sum) in &sums {
            if *sum != qty_remain {
                return Err(ScheduleError::InvalidInput(format!(
                    "工序 {} 拆分数量合计 {} 不等于剩余数量 {}",
                    process, sum, qty_remain
                )));
            }
        }

        let tasks = self.resolve_assignments(&order, splits)?;
        let committed = self.commit_order(&order, &tasks, &[], created_by, now)?;
        self.publish_committed(&order, ScheduleMode::SemiAuto, now);
        Ok(committed)
    }

    // ==========================================
    // 手动模式
    // ==========================================

    /// 冲突检查后持久化；有冲突返回 ResourceConflict
    #[instrument(skip(self, tasks), fields(tasks = tasks.len()))]
    pub fn commit_manual(
        &self,
        order_id: i64,
        tasks: &[TaskAssignment],
        created_by: &str,
        now: NaiveDateTime,
    ) -> ScheduleResult<CommittedOrder> {
        let order = self.require_order(order_id)?;
        let tasks = self.resolve_assignments(&order, tasks)?;
        let committed = self.commit_order(&order, &tasks, &[], created_by, now)?;
        self.publish_committed(&order, ScheduleMode::Manual, now);
        Ok(committed)
    }

    /// 对任意时段做咨询性冲突检查（不写库）
    pub fn check_conflicts(
        &self,
        resource: ResourceRef,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> ScheduleResult<Vec<EventConflict>> {
        ConflictChecker::new(self.calendar.as_ref()).check(resource, start, end, &[])
    }

    // ==========================================
    // 内部: 批次处理
    // ==========================================

    fn schedule_sequence(
        &self,
        options: &ScheduleOptions,
        orders: Vec<WorkOrder>,
        policy_for: impl Fn(&WorkOrder) -> PlanPolicy,
        commit: bool,
        outcome: &mut ScheduleOutcome,
    ) -> ScheduleResult<()> {
        let line = self
            .resources
            .production_line(options.production_line.as_deref())?;
        let pool = ResourcePool::load(self.resources.as_ref())?;
        let mut checker = ConflictChecker::new(self.calendar.as_ref());
        let mut session = SchedulerSession::new(options.now, options.start_from);
        let mut failure_warnings: Vec<NewScheduleWarning> = Vec::new();

        let total = orders.len();
        for (idx, order) in orders.into_iter().enumerate() {
            let policy = policy_for(&order);
            let planned = self.plan_order(&order, &session, &line, &pool, &checker, policy, options.overtime);

            match planned {
                Ok(plan) => {
                    if commit {
                        let warnings: Vec<NewScheduleWarning> = plan
                            .warnings
                            .iter()
                            .map(|w| NewScheduleWarning::new(Some(order.id), None, w.clone()))
                            .collect();
                        match self.commit_order(&order, &plan.tasks, &warnings, &options.created_by, options.now) {
                            Ok(committed) => {
                                outcome.warning_count += warnings.len();
                                session.advance_to(committed.finish);
                                self.publish_committed(&order, outcome.mode, options.now);
                                outcome.committed.push(committed);
                            }
                            Err(err) => {
                                warn!(order = %order.order_number, error = %err, "提交排程失败");
                                failure_warnings.extend(self.warnings_for_error(&order, &err, &pool));
                                outcome.failed.push(FailedOrder::from_error(
                                    order.id,
                                    Some(&order.order_number),
                                    &err,
                                ));
                            }
                        }
                    } else {
                        session.advance_to(plan.expected_finish);
                        checker.accept(plan.tasks.iter().flat_map(CandidateTask::bookings));
                        outcome.candidates.push(plan);
                    }
                }
                Err(err) => {
                    debug!(order = %order.order_number, error = %err, "工单无法排程");
                    if commit {
                        failure_warnings.extend(self.warnings_for_error(&order, &err, &pool));
                    }
                    outcome.failed.push(FailedOrder::from_error(
                        order.id,
                        Some(&order.order_number),
                        &err,
                    ));
                }
            }

            if let Some(key) = options.progress_key.as_deref() {
                self.progress
                    .advance(key, idx + 1, Some(order.order_number.clone()));
            }
        }

        if !failure_warnings.is_empty() {
            outcome.warning_count += self.warnings.insert_many(&failure_warnings, options.now)?;
        }
        if let Some(key) = options.progress_key.as_deref() {
            let status = if outcome.failed.len() == total && total > 0 {
                ProgressStatus::Failed
            } else {
                ProgressStatus::Completed
            };
            self.progress.finish(key, status, None);
        }
        Ok(())
    }

    /// 拆解单张工单的工艺路线
    #[allow(clippy::too_many_arguments)]
    fn plan_order(
        &self,
        order: &WorkOrder,
        session: &SchedulerSession,
        line: &ProductionLine,
        pool: &ResourcePool,
        checker: &ConflictChecker<'_>,
        policy: PlanPolicy,
        overtime: bool,
    ) -> ScheduleResult<OrderPlan> {
        let mut warnings = Vec::new();

        // 交期扣除安全天数已早于现在
        let deadline = order
            .pre_in_date
            .map(|d| d - Duration::days(self.config.schedule_safety_days));
        if let Some(deadline) = deadline {
            if deadline < session.now().date() {
                let finish = session.now().format("%Y-%m-%d").to_string();
                let deadline_text = deadline.to_string();
                let message = t_in_locale(
                    WARNING_LOCALE,
                    "schedule.warning.late",
                    &[("finish", finish.as_str()), ("deadline", deadline_text.as_str())],
                );
                if policy.lenient_deadline {
                    warnings.push(message);
                } else {
                    return Err(ScheduleError::DeliveryDateViolation {
                        message,
                        suggestion: t_with_args("schedule.suggestion.deadline_passed", &[]),
                    });
                }
            }
        }

        let route = self.resources.route(&order.product_code)?;
        if route.is_empty() {
            return Err(ScheduleError::NoRouteDefined {
                product_code: order.product_code.clone(),
            });
        }

        let qty_remain = self.remaining_quantity(order)?;
        if qty_remain <= 0 {
            return Err(ScheduleError::InvalidQuantity {
                order_number: order.order_number.clone(),
                qty_remain,
            });
        }

        let fitter = TimeWindowFitter::new(self.calendar.as_ref(), line);
        let mut cursor = session.cursor();
        let mut tasks: Vec<CandidateTask> = Vec::with_capacity(route.len());
        let mut own: Vec<TentativeBooking> = Vec::new();

        for step in &route {
            let task = self.plan_step(order, step, qty_remain, cursor, &fitter, pool, checker, &own, policy, overtime)?;
            cursor = task.end;
            own.extend(task.bookings());
            tasks.push(task);
        }

        let expected_finish = tasks.last().map(|t| t.end).unwrap_or(cursor);
        if let Some(deadline) = deadline {
            let finish_date = expected_finish.date();
            if finish_date > deadline && deadline >= session.now().date() {
                let finish = expected_finish.format("%Y-%m-%d %H:%M").to_string();
                let deadline_text = deadline.to_string();
                let message = t_in_locale(
                    WARNING_LOCALE,
                    "schedule.warning.late",
                    &[("finish", finish.as_str()), ("deadline", deadline_text.as_str())],
                );
                if policy.lenient_deadline {
                    warnings.push(message);
                } else {
                    let days = (finish_date - deadline).num_days().to_string();
                    return Err(ScheduleError::DeliveryDateViolation {
                        message,
                        suggestion: t_with_args("schedule.suggestion.late", &[("days", days.as_str())]),
                    });
                }
            }
        }

        Ok(OrderPlan {
            order_id: order.id,
            company_code: order.company_code.clone(),
            order_number: order.order_number.clone(),
            product_code: order.product_code.clone(),
            priority: order.priority,
            qty_remain,
            tasks,
            expected_finish,
            deadline,
            warnings,
        })
    }

    /// 单个工序: 拟合时间窗 → 选资源；无资源时顺延 30 分钟重试
    #[allow(clippy::too_many_arguments)]
    fn plan_step(
        &self,
        order: &WorkOrder,
        step: &ProductRoute,
        qty_remain: i64,
        from: NaiveDateTime,
        fitter: &TimeWindowFitter<'_>,
        pool: &ResourcePool,
        checker: &ConflictChecker<'_>,
        own: &[TentativeBooking],
        policy: PlanPolicy,
        overtime: bool,
    ) -> ScheduleResult<CandidateTask> {
        let capacity = self
            .resources
            .capacity_per_hour(&order.product_code, &step.process_name)?;
        let duration = calculate_task_duration(qty_remain, capacity);

        let mut attempt_from = from;
        let mut retries = 0u32;
        loop {
            let (start, end) = fitter.fit(attempt_from, duration, overtime, step.is_smt)?;
            if let Some(choice) = pool.select(&step.process_name, step.is_smt, start, end, checker, own)? {
                return Ok(CandidateTask {
                    order_id: order.id,
                    order_number: order.order_number.clone(),
                    process_name: step.process_name.clone(),
                    step_order: step.step_order,
                    is_smt: step.is_smt,
                    quantity: qty_remain,
                    duration_minutes: duration,
                    start,
                    end,
                    resources: choice,
                });
            }
            if retries >= policy.retry_budget {
                return Err(ScheduleError::NoResourceAvailable {
                    process_name: step.process_name.clone(),
                    attempts: retries,
                });
            }
            retries += 1;
            attempt_from = start + Duration::minutes(RETRY_STEP_MINUTES);
        }
    }

    // ==========================================
    // 内部: 提交
    // ==========================================

    /// 单事务提交一张工单的全部任务
    fn commit_order(
        &self,
        order: &WorkOrder,
        tasks: &[CandidateTask],
        warnings: &[NewScheduleWarning],
        created_by: &str,
        now: NaiveDateTime,
    ) -> ScheduleResult<CommittedOrder> {
        if tasks.is_empty() {
            return Err(ScheduleError::InvalidInput(format!(
                "工单 {} 没有可提交的任务",
                order.order_number
            )));
        }

        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        let tx = begin_immediate(&conn)?;

        let mut event_ids = Vec::with_capacity(tasks.len());
        let mut dispatch_ids = Vec::with_capacity(tasks.len());
        for task in tasks {
            // 同一事务内先写入的任务对后续任务可见；冲突时 tx 随作用域结束回滚
            let mut conflicts = Vec::new();
            for resource in task.resources.resources() {
                conflicts.extend(ConflictChecker::check_tx(&tx, resource, task.start, task.end, None)?);
            }
            if !conflicts.is_empty() {
                return Err(ScheduleError::ResourceConflict { conflicts });
            }

            let event = NewCalendarEvent {
                event_type: CalendarEventType::Production,
                title: task.title(),
                description: Some(format!("製程: {} / 數量: {}", task.process_name, task.quantity)),
                start: task.start,
                end: task.end,
                all_day: false,
                unit: None,
                operator_id: task.resources.operator_id,
                equipment_id: task.resources.equipment_id,
                smt_equipment_id: task.resources.smt_equipment_id,
                order_id: Some(order.id),
                process_name: Some(task.process_name.clone()),
                created_by: Some(created_by.to_string()),
            };
            event_ids.push(CalendarEventRepository::insert_tx(&tx, &event)?);

            dispatch_ids.push(WorkOrderRepository::insert_dispatch_tx(
                &tx,
                order.id,
                &task.process_name,
                task.resources.operator_name.as_deref(),
                task.quantity,
                created_by,
                now,
            )?);

            match WorkOrderRepository::assign_process_tx(
                &tx,
                order.id,
                &task.process_name,
                task.resources.operator_name.as_deref(),
                task.resources.equipment_name.as_deref(),
                None,
            ) {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    warn!(order = %order.order_number, process = %task.process_name, "工单无对应工序，跳过指派");
                }
                Err(e) => return Err(e.into()),
            }
        }

        for warning in warnings {
            WarningRepository::insert_tx(&tx, warning, now)?;
        }
        tx.commit()?;

        let finish = tasks.iter().map(|t| t.end).max().unwrap_or(now);
        info!(
            order = %order.order_number,
            events = event_ids.len(),
            finish = %finish,
            "排程已提交"
        );
        Ok(CommittedOrder {
            order_id: order.id,
            order_number: order.order_number.clone(),
            event_ids,
            dispatch_ids,
            finish,
        })
    }

    fn publish_committed(&self, order: &WorkOrder, mode: ScheduleMode, now: NaiveDateTime) {
        self.events.publish(
            MesEvent::new(
                MesEventType::ScheduleCommitted,
                &order.company_code,
                &order.order_number,
                now,
            )
            .with_work_order(order.id)
            .with_source(mode.to_db_str()),
        );
    }

    // ==========================================
    // 内部: 辅助
    // ==========================================

    fn require_order(&self, order_id: i64) -> ScheduleResult<WorkOrder> {
        let order = self
            .store
            .find_order(order_id)?
            .ok_or_else(|| ScheduleError::not_found("WorkOrder", order_id))?;
        if !order.status.is_active() {
            return Err(ScheduleError::InvalidInput(format!(
                "工单 {} 已完工，不能排程",
                order.order_number
            )));
        }
        Ok(order)
    }

    fn load_orders(&self, ids: &[i64], outcome: &mut ScheduleOutcome) -> Vec<WorkOrder> {
        let mut orders = Vec::with_capacity(ids.len());
        for &id in ids {
            match self.require_order(id) {
                Ok(order) => orders.push(order),
                Err(err) => outcome.failed.push(FailedOrder::from_error(id, None, &err)),
            }
        }
        orders
    }

    /// 剩余数量 = 工单数量 − 包装工序已完成数量
    fn remaining_quantity(&self, order: &WorkOrder) -> ScheduleResult<i64> {
        let packaged = self
            .store
            .list_processes(order.id)?
            .into_iter()
            .find(|p| p.process_name == self.config.packaging_process_name)
            .map(|p| p.completed_quantity)
            .unwrap_or(0);
        Ok(order.quantity - packaged)
    }

    /// 调用方任务 → 候选任务（解析资源名称，校验时段）
    fn resolve_assignments(
        &self,
        order: &WorkOrder,
        assignments: &[TaskAssignment],
    ) -> ScheduleResult<Vec<CandidateTask>> {
        if assignments.is_empty() {
            return Err(ScheduleError::InvalidInput("任务列表为空".to_string()));
        }
        let pool = ResourcePool::load(self.resources.as_ref())?;
        let route = self.resources.route(&order.product_code)?;

        let mut tasks = Vec::with_capacity(assignments.len());
        for a in assignments {
            if a.end <= a.start {
                return Err(ScheduleError::InvalidInput(format!(
                    "工序 {} 结束时间必须晚于开始时间",
                    a.process_name
                )));
            }
            if a.quantity <= 0 {
                return Err(ScheduleError::InvalidInput(format!(
                    "工序 {} 数量必须为正数: {}",
                    a.process_name, a.quantity
                )));
            }
            let Some(operator_id) = a.operator_id else {
                return Err(ScheduleError::InvalidInput(format!(
                    "工序 {} 未指定作业员",
                    a.process_name
                )));
            };
            let operator_name = pool
                .operator_name(operator_id)
                .ok_or_else(|| ScheduleError::not_found("Operator", operator_id))?
                .to_string();
            let equipment_name = match (a.equipment_id, a.smt_equipment_id) {
                (Some(id), _) => Some(
                    pool.equipment_name(id)
                        .ok_or_else(|| ScheduleError::not_found("Equipment", id))?
                        .to_string(),
                ),
                (None, Some(id)) => Some(
                    pool.smt_equipment_name(id)
                        .ok_or_else(|| ScheduleError::not_found("SmtEquipment", id))?
                        .to_string(),
                ),
                (None, None) => None,
            };
            let Some(step) = route.iter().find(|s| s.process_name == a.process_name) else {
                return Err(ScheduleError::InvalidInput(format!(
                    "工序 {} 不在产品 {} 的工艺路线中",
                    a.process_name, order.product_code
                )));
            };

            tasks.push(CandidateTask {
                order_id: order.id,
                order_number: order.order_number.clone(),
                process_name: a.process_name.clone(),
                step_order: step.step_order,
                is_smt: step.is_smt,
                quantity: a.quantity,
                duration_minutes: (a.end - a.start).num_minutes(),
                start: a.start,
                end: a.end,
                resources: ResourceChoice {
                    operator_id: Some(operator_id),
                    operator_name: Some(operator_name),
                    equipment_id: a.equipment_id,
                    smt_equipment_id: if a.equipment_id.is_some() {
                        None
                    } else {
                        a.smt_equipment_id
                    },
                    equipment_name,
                },
            });
        }
        tasks.sort_by(|a, b| a.step_order.cmp(&b.step_order).then(a.start.cmp(&b.start)));
        Ok(tasks)
    }

    /// 失败原因 → 警告看板文案（繁中）
    fn warnings_for_error(
        &self,
        order: &WorkOrder,
        err: &ScheduleError,
        pool: &ResourcePool,
    ) -> Vec<NewScheduleWarning> {
        let messages: Vec<(Option<String>, String)> = match err {
            ScheduleError::NoRouteDefined { product_code } => vec![(
                None,
                t_in_locale(
                    WARNING_LOCALE,
                    "schedule.warning.route_missing",
                    &[("product", product_code.as_str())],
                ),
            )],
            ScheduleError::DeliveryDateViolation { message, .. } => vec![(None, message.clone())],
            ScheduleError::NoResourceAvailable {
                process_name,
                attempts,
            } => vec![(
                Some(process_name.clone()),
                t_in_locale(
                    WARNING_LOCALE,
                    "schedule.warning.no_resource",
                    &[
                        ("process", process_name.as_str()),
                        ("attempts", attempts.to_string().as_str()),
                    ],
                ),
            )],
            ScheduleError::ResourceConflict { conflicts } => conflicts
                .iter()
                .map(|c| (None, conflict_message(c, pool)))
                .collect(),
            _ => Vec::new(),
        };
        messages
            .into_iter()
            .map(|(process, message)| NewScheduleWarning::new(Some(order.id), process.as_deref(), message))
            .collect()
    }
}

/// 交期早者优先；无交期排最后
fn by_delivery(a: &WorkOrder, b: &WorkOrder) -> std::cmp::Ordering {
    match (a.pre_in_date, b.pre_in_date) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    }
    .then(a.id.cmp(&b.id))
}

/// 冲突 → 警告文案
pub fn conflict_message(conflict: &EventConflict, pool: &ResourcePool) -> String {
    let (key, name) = match conflict.resource {
        ResourceRef::Operator(id) => (
            "schedule.warning.operator_conflict",
            pool.operator_name(id).map(str::to_string),
        ),
        ResourceRef::Equipment(id) => (
            "schedule.warning.equipment_conflict",
            pool.equipment_name(id).map(str::to_string),
        ),
        ResourceRef::SmtEquipment(id) => (
            "schedule.warning.smt_conflict",
            pool.smt_equipment_name(id).map(str::to_string),
        ),
    };
    let name = name.unwrap_or_else(|| format!("#{}", conflict.resource.id()));
    let start = conflict.start.format("%m-%d %H:%M").to_string();
    let end = conflict.end.format("%m-%d %H:%M").to_string();
    t_in_locale(
        WARNING_LOCALE,
        key,
        &[
            ("resource", name.as_str()),
            ("start", start.as_str()),
            ("end", end.as_str()),
            ("event", conflict.event_title.as_str()),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_session_cursor_is_monotone() {
        let mut session = SchedulerSession::new(at(3, 8, 30), None);
        session.advance_to(at(3, 15, 30));
        session.advance_to(at(3, 10, 0));
        assert_eq!(session.cursor(), at(3, 15, 30));
    }

    #[test]
    fn test_session_start_never_before_now() {
        let session = SchedulerSession::new(at(3, 8, 30), Some(at(1, 9, 0)));
        assert_eq!(session.cursor(), at(3, 8, 30));
        let session = SchedulerSession::new(at(3, 8, 30), Some(at(4, 9, 0)));
        assert_eq!(session.cursor(), at(4, 9, 0));
    }

    #[test]
    fn test_conflict_message_uses_resource_name() {
        let pool = ResourcePool {
            operators: vec![crate::domain::resource::Operator {
                id: 1,
                name: "王小明".to_string(),
                skill_set: vec!["SMT".to_string()],
                is_active: true,
            }],
            ..Default::default()
        };
        let conflict = EventConflict {
            resource: ResourceRef::Operator(1),
            event_id: Some(42),
            event_title: "WO-01-202503001 SMT".to_string(),
            start: at(3, 9, 0),
            end: at(3, 11, 0),
        };
        let message = conflict_message(&conflict, &pool);
        assert!(message.contains("時間衝突"));
        assert!(message.contains("王小明"));
        assert!(message.contains("WO-01-202503001 SMT"));
    }
}
