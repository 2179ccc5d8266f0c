#[allow(missing_docs)]
pub mod tables; // skipcq: RS-D1001

mod worker;

use crate::clock::{SchedulerClock, SystemClock};
use crate::errors::CronmeshErrors;
use crate::executor::{NoOperationExecutor, TaskExecutor};
use crate::lock::{DistributedLock, ProcessLocalLock};
use crate::report::{LogResultReporter, LogWarningSink, ResultReporter, WarningPayload, WarningSink};
use crate::scheduler::tables::{ExecutingTable, PlanTable};
use crate::store::{EphemeralRunStatusStore, RunStatusStore};
use crate::task::{TaskEvent, TaskEventKind, TaskExecuteResult, TaskExecutingInfo, TaskSchedulePlan};
use crate::utils::{local_ip, to_local_time};
use chrono::{DateTime, Local};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, warn};
use typed_builder::TypedBuilder;

/// Capacity of each intake queue (events and results). Producers awaiting a full queue
/// is the agent's backpressure signal towards its ingress
const INTAKE_QUEUE_CAPACITY: usize = 3000;

/// Sleep returned by the ticker when the plan table is empty, a plain idle wake so that
/// freshly saved plans are never more than this far from their first inspection
const IDLE_WAKE_INTERVAL: Duration = Duration::from_secs(1);

fn default_client_ip() -> String {
    local_ip()
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "127.0.0.1".to_string())
}

/// Everything the loop, the ticker and the workers share. Lives behind one `Arc` so a
/// spawned firing can outlive any individual loop iteration.
pub(crate) struct SchedulerContext {
    pub(crate) plan_table: PlanTable,
    pub(crate) executing_table: ExecutingTable,
    pub(crate) event_tx: mpsc::Sender<TaskEvent>,
    pub(crate) result_tx: mpsc::Sender<TaskExecuteResult>,
    pub(crate) store: Arc<dyn RunStatusStore>,
    pub(crate) locks: Arc<dyn DistributedLock>,
    pub(crate) executor: Arc<dyn TaskExecutor>,
    pub(crate) reporter: Arc<dyn ResultReporter>,
    pub(crate) alerter: Arc<dyn WarningSink>,
    pub(crate) clock: Arc<dyn SchedulerClock>,
    pub(crate) client_ip: String,
}

/// This is the builder configs to use for building a [`Scheduler`] instance.
/// By itself it should not be used, and it resides in [`Scheduler::builder`]
#[derive(TypedBuilder)]
#[builder(build_method(into = Scheduler))]
pub struct SchedulerConfig {
    /// The [`RunStatusStore`] the workers push durable "running" transitions through,
    /// this is what the rest of the cluster reads a task's live state from
    ///
    /// # Default Value
    /// An in-memory [`EphemeralRunStatusStore`], fine for demos and tests, pointless
    /// for a real cluster
    #[builder(
        default = Arc::new(EphemeralRunStatusStore::new()),
        setter(transform = |s: impl RunStatusStore + 'static| Arc::new(s) as Arc<dyn RunStatusStore>),
    )]
    store: Arc<dyn RunStatusStore>,

    /// The [`DistributedLock`] provider deciding which agent of the cluster executes a
    /// firing whose task demands mutual exclusion
    ///
    /// # Default Value
    /// A [`ProcessLocalLock`], the degenerate single-agent cluster
    #[builder(
        default = Arc::new(ProcessLocalLock::new()),
        setter(transform = |l: impl DistributedLock + 'static| Arc::new(l) as Arc<dyn DistributedLock>),
    )]
    locks: Arc<dyn DistributedLock>,

    /// The [`TaskExecutor`] hosting the actual task bodies. Every deployment wants its
    /// own, the default exists so planning-only setups need no ceremony
    ///
    /// # Default Value
    /// [`NoOperationExecutor`], every body succeeds immediately with empty output
    #[builder(
        default = Arc::new(NoOperationExecutor),
        setter(transform = |e: impl TaskExecutor + 'static| Arc::new(e) as Arc<dyn TaskExecutor>),
    )]
    executor: Arc<dyn TaskExecutor>,

    /// The [`ResultReporter`] every drained [`TaskExecuteResult`] is forwarded to
    ///
    /// # Default Value
    /// [`LogResultReporter`], results land in the structured log
    #[builder(
        default = Arc::new(LogResultReporter),
        setter(transform = |r: impl ResultReporter + 'static| Arc::new(r) as Arc<dyn ResultReporter>),
    )]
    reporter: Arc<dyn ResultReporter>,

    /// The [`WarningSink`] alerted (before reporting) for every result carrying an error
    ///
    /// # Default Value
    /// [`LogWarningSink`], alerts land in the structured log at warn level
    #[builder(
        default = Arc::new(LogWarningSink),
        setter(transform = |w: impl WarningSink + 'static| Arc::new(w) as Arc<dyn WarningSink>),
    )]
    alerter: Arc<dyn WarningSink>,

    /// The [`SchedulerClock`] driving due-time math and the loop's idle waits
    ///
    /// # Default Value
    /// [`SystemClock`]. For unit tests and simulations prefer [`VirtualClock`], which
    /// only moves when explicitly advanced
    ///
    /// [`VirtualClock`]: crate::clock::VirtualClock
    #[builder(
        default = Arc::new(SystemClock),
        setter(transform = |c: impl SchedulerClock + 'static| Arc::new(c) as Arc<dyn SchedulerClock>),
    )]
    clock: Arc<dyn SchedulerClock>,

    /// The identity stamped into ``task.client_ip`` right before each execution, so
    /// results and alerts can be traced back to the agent that ran them
    ///
    /// # Default Value
    /// The host's outbound IP address, falling back to ``127.0.0.1`` on hosts with no
    /// usable route
    #[builder(default = default_client_ip())]
    client_ip: String,
}

impl From<SchedulerConfig> for Scheduler {
    fn from(config: SchedulerConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(INTAKE_QUEUE_CAPACITY);
        let (result_tx, result_rx) = mpsc::channel(INTAKE_QUEUE_CAPACITY);

        Self {
            ctx: Arc::new(SchedulerContext {
                plan_table: PlanTable::new(),
                executing_table: ExecutingTable::new(),
                event_tx,
                result_tx,
                store: config.store,
                locks: config.locks,
                executor: config.executor,
                reporter: config.reporter,
                alerter: config.alerter,
                clock: config.clock,
                client_ip: config.client_ip,
            }),
            event_rx: Mutex::new(Some(event_rx)),
            result_rx: Mutex::new(Some(result_rx)),
            process: Mutex::new(None),
        }
    }
}

/// [`Scheduler`] is one agent's local scheduling core. It owns the plan table (what
/// should run and when), the executing table (what runs right now), the two bounded
/// intake queues (mutation events in, execution results back) and the single cooperative
/// loop that multiplexes all of them against the clock.
///
/// The cluster-facing collaborators are composites, supplied through [`Scheduler::builder`]:
///
/// - [`DistributedLock`] for deciding which agent executes a contested firing
/// - [`RunStatusStore`] for the durable "running" flag peers observe
/// - [`TaskExecutor`] for the task bodies themselves
/// - [`ResultReporter`] / [`WarningSink`] for the completion and alerting pipeline
/// - [`SchedulerClock`] for due-time math and idle waits
///
/// # Threading Model
/// One spawned loop task owns every structural mutation of the plan table and every
/// worker prelude, which makes overlap checks for the same key totally ordered without a
/// lock. Each firing then runs as its own tokio task in parallel with the loop and with
/// other firings. Per-firing parallelism never exceeds one per scheduler-key
///
/// # Constructor(s)
/// If one wishes to construct a [`Scheduler`], they may do so via [`Scheduler::builder`],
/// every composite has a default so the minimal build is just ``Scheduler::builder().build()``
///
/// # Lifecycle
/// [`Scheduler::start`] spawns the loop (idempotent), [`Scheduler::abort`] stops it.
/// A stopped scheduler keeps its tables readable but cannot be restarted, the intake
/// receivers died with the loop
///
/// # Example
/// ```ignore
/// use cronmesh::scheduler::Scheduler;
/// use cronmesh::task::TaskEvent;
///
/// let scheduler = Scheduler::builder()
///     .executor(MY_EXECUTOR)
///     .locks(MY_ETCD_LOCKS)
///     .store(MY_ETCD_STORE)
///     .build();
///
/// scheduler.start().await;
/// scheduler.push_event(TaskEvent::save(my_task)).await?;
/// ```
pub struct Scheduler {
    ctx: Arc<SchedulerContext>,
    event_rx: Mutex<Option<mpsc::Receiver<TaskEvent>>>,
    result_rx: Mutex<Option<mpsc::Receiver<TaskExecuteResult>>>,
    process: Mutex<Option<JoinHandle<()>>>,
}

impl Debug for Scheduler {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("plan_table", &self.ctx.plan_table)
            .field("executing_table", &self.ctx.executing_table)
            .field("client_ip", &self.ctx.client_ip)
            .finish()
    }
}

impl Scheduler {
    /// Constructs a scheduler builder, used for supplying the cluster-facing composites
    /// before building the [`Scheduler`] itself
    pub fn builder() -> SchedulerConfigBuilder {
        SchedulerConfig::builder()
    }

    /// Starts the agent loop, if the scheduler has already started, this method does
    /// nothing. The loop can be stopped via [`Scheduler::abort`] and probed via
    /// [`Scheduler::has_started`]
    pub async fn start(&self) {
        if self.process.lock().await.is_some() {
            return;
        }
        let (Some(event_rx), Some(result_rx)) = (
            self.event_rx.lock().await.take(),
            self.result_rx.lock().await.take(),
        ) else {
            warn!("scheduler cannot be restarted, its intake receivers are gone");
            return;
        };
        let ctx = self.ctx.clone();
        *self.process.lock().await = Some(tokio::spawn(async move {
            run_loop(ctx, event_rx, result_rx).await;
        }));
    }

    /// Stops the agent loop. In-flight firings keep running to completion, their
    /// results just have nobody left to drain them. If the scheduler hasn't started
    /// yet, this method does nothing
    pub async fn abort(&self) {
        let process = self.process.lock().await.take();
        if let Some(p) = process {
            p.abort();
        }
    }

    /// Checks if the agent loop is currently running
    pub async fn has_started(&self) -> bool {
        self.process.lock().await.is_some()
    }

    /// Enqueues one mutation event for the loop. Completes immediately while the event
    /// intake has room and awaits otherwise, which is the backpressure signal ingress
    /// layers are expected to propagate
    ///
    /// # Returns
    /// ``Ok(())`` once enqueued, or [`CronmeshErrors::IntakeUnavailable`] when the loop
    /// is gone
    pub async fn push_event(&self, event: TaskEvent) -> Result<(), CronmeshErrors> {
        let key = event.task.scheduler_key();
        self.ctx
            .event_tx
            .send(event)
            .await
            .map_err(|_| CronmeshErrors::IntakeUnavailable(key))
    }

    /// Enqueues one execution result for the loop, the same backpressure semantics as
    /// [`Scheduler::push_event`]. Workers use this path internally, external callers
    /// only need it when they execute task bodies out-of-band
    pub async fn push_task_result(&self, result: TaskExecuteResult) -> Result<(), CronmeshErrors> {
        let key = result.execute_info.task().scheduler_key();
        self.ctx
            .result_tx
            .send(result)
            .await
            .map_err(|_| CronmeshErrors::IntakeUnavailable(key))
    }

    /// Gets the plan stored under ``key``, safe for concurrent callers
    pub fn get_plan(&self, key: &str) -> Option<Arc<TaskSchedulePlan>> {
        self.ctx.plan_table.load(key)
    }

    /// Removes the plan stored under ``key`` without going through the event intake.
    /// Prefer a [`TaskEventKind::Delete`] event, which serializes with every other
    /// mutation, this direct form exists for administrative tooling
    pub fn remove_plan(&self, key: &str) -> Option<Arc<TaskSchedulePlan>> {
        self.ctx.plan_table.delete(key)
    }

    /// Iterates a snapshot of the plan table, invoking ``f`` per entry until it
    /// returns ``false``
    pub fn plan_range<F>(&self, f: F)
    where
        F: FnMut(&str, &Arc<TaskSchedulePlan>) -> bool,
    {
        self.ctx.plan_table.range(f)
    }

    /// Gets the number of plans currently held, approximate under concurrent mutation
    pub fn plan_count(&self) -> usize {
        self.ctx.plan_table.count()
    }

    /// Gets the live execution registered under ``key``, if any
    pub fn get_executing(&self, key: &str) -> Option<Arc<TaskExecutingInfo>> {
        self.ctx.executing_table.load(key)
    }

    /// Gets the number of live executions on this agent
    pub fn executing_count(&self) -> usize {
        self.ctx.executing_table.count()
    }
}

/// The agent loop: a single cooperative task multiplexing the two intakes against the
/// clock. Every iteration ends with a fresh tick, the timer arm itself has no body,
/// firing due plans is the ticker's job.
async fn run_loop(
    ctx: Arc<SchedulerContext>,
    mut event_rx: mpsc::Receiver<TaskEvent>,
    mut result_rx: mpsc::Receiver<TaskExecuteResult>,
) {
    let mut idle = try_schedule(&ctx).await;
    loop {
        tokio::select! {
            event = event_rx.recv() => match event {
                Some(event) => handle_event(&ctx, event).await,
                None => break,
            },
            result = result_rx.recv() => match result {
                Some(result) => handle_result(&ctx, result).await,
                None => break,
            },
            _ = ctx.clock.idle(idle) => {}
        }
        idle = try_schedule(&ctx).await;
    }
}

/// Applies one mutation event to the tables. Runs on the loop thread, so every
/// structural write it performs is serial with the ticker and with worker preludes.
async fn handle_event(ctx: &Arc<SchedulerContext>, event: TaskEvent) {
    let now = to_local_time(ctx.clock.now().await);
    let key = event.task.scheduler_key();
    match event.kind {
        TaskEventKind::Temporary => match TaskSchedulePlan::build(event.task, &now) {
            Ok(plan) => worker::try_start_task(ctx, Arc::new(plan), now),
            Err(err) => warn!(%key, %err, "dropping one-shot event, its plan could not be built"),
        },
        TaskEventKind::Save => {
            if !event.task.is_schedulable() {
                ctx.plan_table.delete(&key);
                return;
            }
            match TaskSchedulePlan::build(event.task, &now) {
                Ok(plan) => ctx.plan_table.store(Arc::new(plan)),
                Err(err) => warn!(%key, %err, "dropping save event, its plan could not be built"),
            }
        }
        TaskEventKind::Delete => {
            ctx.plan_table.delete(&key);
        }
        TaskEventKind::Kill => {
            if let Some(info) = ctx.executing_table.load(&key) {
                info.cancel();
            }
        }
    }
}

/// Drains one completed result: alert first when it failed, then forward to the
/// reporter. Reporter failures are logged, never propagated, the loop runs forever.
async fn handle_result(ctx: &Arc<SchedulerContext>, result: TaskExecuteResult) {
    if result.err.is_some() {
        ctx.alerter
            .warning(WarningPayload::from_result(&result, &ctx.client_ip))
            .await;
    }
    if let Err(err) = ctx.reporter.report(&result).await {
        error!(task = %result.execute_info.task().name, %err, "forwarding an execution result failed");
    }
}

/// One tick: fire every due plan, advance it strictly past `now`, and report how long
/// the loop may sleep before the nearest plan comes due (clamped to zero when a plan is
/// already overdue, 1s when there is nothing to schedule at all). Duplicate-firing
/// protection is the worker prelude's in-flight check, not the ticker's.
async fn try_schedule(ctx: &Arc<SchedulerContext>) -> Duration {
    let now = to_local_time(ctx.clock.now().await);
    let mut nearest: Option<DateTime<Local>> = None;
    let mut stale: Vec<String> = Vec::new();

    ctx.plan_table.range(|key, plan| {
        if plan.next_time() <= now {
            worker::try_start_task(ctx, plan.clone(), now);
            if let Err(err) = plan.advance_after(&now) {
                error!(%key, %err, "schedule stopped advancing, evicting the plan");
                stale.push(key.to_string());
                return true;
            }
        }
        let next = plan.next_time();
        nearest = Some(match nearest {
            Some(current) if current <= next => current,
            _ => next,
        });
        true
    });

    for key in stale {
        ctx.plan_table.delete(&key);
    }

    let Some(nearest) = nearest else {
        return IDLE_WAKE_INTERVAL;
    };
    (nearest - now).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use crate::task::Task;
    use std::time::{Duration, UNIX_EPOCH};

    fn sample_task(task_id: &str, spec: &str) -> Task {
        Task {
            project_id: 11,
            task_id: task_id.to_string(),
            name: format!("task-{task_id}"),
            spec: spec.to_string(),
            command: String::new(),
            status: 1,
            noseize: 1,
            timeout_seconds: 0,
            client_ip: String::new(),
        }
    }

    #[tokio::test]
    async fn empty_plan_table_ticks_the_idle_interval() {
        let scheduler: Scheduler = Scheduler::builder().build();
        assert_eq!(try_schedule(&scheduler.ctx).await, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn due_plan_fires_and_advances_strictly_forward() {
        let clock = Arc::new(VirtualClock::new(UNIX_EPOCH + Duration::from_secs(1_000_000)));
        let scheduler: Scheduler = Scheduler::builder().clock(clock.clone()).build();

        let now = to_local_time(clock.now().await);
        let plan = TaskSchedulePlan::build(sample_task("alpha", "@every 1s"), &now).unwrap();
        let before = plan.next_time();
        scheduler.ctx.plan_table.store(Arc::new(plan));

        clock.advance(Duration::from_secs(3));
        let idle = try_schedule(&scheduler.ctx).await;

        let plan = scheduler.get_plan("11_alpha").unwrap();
        let now = to_local_time(clock.now().await);
        assert!(plan.next_time() > before, "advance must be strictly monotonic");
        assert!(plan.next_time() > now, "advance must land in the future");
        assert!(idle <= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn overlapping_firing_synthesizes_the_conflict_result() {
        let scheduler: Scheduler = Scheduler::builder().build();
        let mut result_rx = scheduler.result_rx.lock().await.take().unwrap();

        let now = to_local_time(scheduler.ctx.clock.now().await);
        let plan = Arc::new(
            TaskSchedulePlan::build(sample_task("beta", "@every 1s"), &now).unwrap(),
        );

        let occupying = Arc::new(TaskExecutingInfo::new(plan.clone(), "127.0.0.1", now));
        scheduler
            .ctx
            .executing_table
            .store(plan.scheduler_key(), occupying);

        worker::try_start_task(&scheduler.ctx, plan.clone(), now);

        let conflict = result_rx.recv().await.unwrap();
        assert_eq!(
            conflict.err.as_deref(),
            Some("task task-beta execute error: last task was not completed"),
        );
        assert_eq!(conflict.output, "last task was not completed");
        assert_eq!(conflict.start_time, conflict.end_time);
        assert_eq!(scheduler.executing_count(), 1);
    }

    #[tokio::test]
    async fn kill_before_registration_is_a_no_op() {
        let scheduler: Scheduler = Scheduler::builder().build();
        let task = sample_task("gamma", "@every 1s");
        handle_event(&scheduler.ctx, TaskEvent::kill(task)).await;
        assert_eq!(scheduler.executing_count(), 0);
        assert_eq!(scheduler.plan_count(), 0);
    }
}
