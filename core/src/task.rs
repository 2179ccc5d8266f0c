use crate::errors::CronmeshErrors;
use crate::schedule::{TaskSchedule, build_task_schedule};
use crate::utils::millis_to_date_time;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// A [`Task::status`] of this value marks the task as active / schedulable,
/// any other value means "do not schedule"
pub const TASK_STATUS_ACTIVE: i32 = 1;

/// Upper bound on how many times a plan re-evaluates its schedule while hunting for an
/// instant strictly in the future. A well-formed [`TaskSchedule`] needs exactly one round
const ADVANCE_GUARD: usize = 64;

/// [`Task`] is the schedulable unit of the agent, identified cluster-wide by the pair
/// ``(project_id, task_id)``. Tasks are plain values, they arrive from external ingress
/// (watch streams, RPC handlers) as serialized payloads, get value-copied into plans and
/// into executing infos, and never hold references back into the scheduler
///
/// # Fields of interest
/// - ``status`` only [`TASK_STATUS_ACTIVE`] makes the task eligible for planning
/// - ``noseize`` ``0`` means the distributed lock must be won before executing,
///   anything else executes lock-free
/// - ``spec`` the schedule expression, either classic cron or ``@every <duration>``
/// - ``command`` opaque payload handed to the task body, the core never interprets it
/// - ``timeout_seconds`` advisory for the task body, the agent imposes no deadline itself
/// - ``client_ip`` stamped with the executing agent's identity right before execution
///
/// # Trait Implementation(s)
/// [`Task`] implements [`Clone`], [`Debug`], [`PartialEq`] as well as serde's
/// [`Serialize`] and [`Deserialize`] for ingress payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub project_id: u64,
    pub task_id: String,
    pub name: String,
    pub spec: String,
    #[serde(default)]
    pub command: String,
    pub status: i32,
    #[serde(default)]
    pub noseize: i32,
    #[serde(default)]
    pub timeout_seconds: u32,
    #[serde(default)]
    pub client_ip: String,
}

impl Task {
    /// The stable string identity this task is keyed under in the plan and executing
    /// tables, derived from ``project_id`` and ``task_id``
    pub fn scheduler_key(&self) -> String {
        format!("{}_{}", self.project_id, self.task_id)
    }

    /// Whether the task is eligible for planning at all
    pub fn is_schedulable(&self) -> bool {
        self.status == TASK_STATUS_ACTIVE
    }

    /// Whether a firing must win the distributed lock before executing
    pub fn requires_lock(&self) -> bool {
        self.noseize == 0
    }
}

/// The kind of mutation a [`TaskEvent`] applies to the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskEventKind {
    /// One-shot "run now": the task executes immediately and never enters the plan table
    Temporary,
    /// Insert or overwrite the task's plan (or drop it, when the task is not schedulable)
    Save,
    /// Remove the task's plan, leaving any in-flight execution alone
    Delete,
    /// Cancel the task's in-flight execution, leaving the plan table alone
    Kill,
}

/// [`TaskEvent`] is an inbound mutation applied by the agent loop, one at a time and
/// strictly in arrival order. Events are plain serializable values so that ingress
/// layers can hand them over untouched
///
/// # Constructor(s)
/// The four kind-specific constructors ([`TaskEvent::temporary`], [`TaskEvent::save`],
/// [`TaskEvent::delete`], [`TaskEvent::kill`]) are preferred over struct literals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub kind: TaskEventKind,
    pub task: Task,
}

impl TaskEvent {
    /// Creates a one-shot "run now" event for ``task``
    pub fn temporary(task: Task) -> Self {
        Self { kind: TaskEventKind::Temporary, task }
    }

    /// Creates an insert/overwrite event for ``task``
    pub fn save(task: Task) -> Self {
        Self { kind: TaskEventKind::Save, task }
    }

    /// Creates a plan-removal event for ``task``
    pub fn delete(task: Task) -> Self {
        Self { kind: TaskEventKind::Delete, task }
    }

    /// Creates a cancel-execution event for ``task``
    pub fn kill(task: Task) -> Self {
        Self { kind: TaskEventKind::Kill, task }
    }
}

/// [`TaskSchedulePlan`] ties a value-copied [`Task`] to its parsed schedule and to the next
/// absolute instant it is due. Plans live in the agent's plan table and are the only unit
/// the ticker operates on
///
/// # Mutation discipline
/// ``next_time`` is stored as atomic epoch-milliseconds. It may be *read* from anywhere
/// (introspection is concurrent-safe) but is *advanced* exclusively by the ticker, which
/// runs on the loop thread, so advances never race each other and stay strictly monotonic
///
/// # Constructor(s)
/// [`TaskSchedulePlan::build`] is the only constructor, it parses the task's schedule
/// expression and fails on malformed input, which the event handler logs and drops
pub struct TaskSchedulePlan {
    task: Task,
    schedule: Arc<dyn TaskSchedule>,
    next_time: AtomicI64,
}

impl Debug for TaskSchedulePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSchedulePlan")
            .field("task", &self.task.scheduler_key())
            .field("next_time", &self.next_time())
            .finish()
    }
}

impl TaskSchedulePlan {
    /// Builds a plan for ``task``, parsing its schedule expression and computing the first
    /// due instant strictly after ``now``
    ///
    /// # Returns
    /// The plan, or [`CronmeshErrors::InvalidScheduleExpr`] when the expression is malformed
    pub fn build(task: Task, now: &DateTime<Local>) -> Result<Self, CronmeshErrors> {
        let schedule = build_task_schedule(&task.spec, now)?;
        let first = schedule.next_after(now)?;
        Ok(Self {
            task,
            schedule,
            next_time: AtomicI64::new(first.timestamp_millis()),
        })
    }

    /// Gets the task this plan was built from
    pub fn task(&self) -> &Task {
        &self.task
    }

    /// Gets the key this plan is stored under, see [`Task::scheduler_key`]
    pub fn scheduler_key(&self) -> String {
        self.task.scheduler_key()
    }

    /// Gets the parsed schedule for outside parties
    pub fn schedule(&self) -> Arc<dyn TaskSchedule> {
        self.schedule.clone()
    }

    /// Gets the next absolute instant this plan is due
    pub fn next_time(&self) -> DateTime<Local> {
        millis_to_date_time(self.next_time.load(Ordering::Acquire))
    }

    /// Advances ``next_time`` to the first schedule instant strictly after ``now``.
    /// Ticker-only: callers outside the loop thread would break the monotonicity of
    /// the stored instant
    pub(crate) fn advance_after(
        &self,
        now: &DateTime<Local>,
    ) -> Result<DateTime<Local>, CronmeshErrors> {
        let mut next = self.schedule.next_after(now)?;
        let mut rounds = 0usize;
        while next <= *now {
            rounds += 1;
            if rounds > ADVANCE_GUARD {
                return Err(CronmeshErrors::InvalidScheduleExpr(
                    self.task.spec.clone(),
                    "schedule does not advance past the present".to_string(),
                ));
            }
            next = self.schedule.next_after(&next)?;
        }
        self.next_time.store(next.timestamp_millis(), Ordering::Release);
        Ok(next)
    }
}

/// [`TaskExecutingInfo`] is the live record of one execution attempt, exactly one exists
/// per key in the executing table at any moment. It carries the stamped task copy handed
/// to the task body, the cancellation token (the sole cross-component cancellation
/// channel) and identity for log and report correlation
///
/// # Cancellation Semantics
/// [`TaskExecutingInfo::cancel`] is safe to invoke at any time and any number of times,
/// only the first call has an effect. Cancelling never removes the executing-table entry,
/// the owning worker's terminal steps do that once the body returns
pub struct TaskExecutingInfo {
    plan: Arc<TaskSchedulePlan>,
    task: Task,
    cancel_token: CancellationToken,
    start_time: DateTime<Local>,
    execute_id: Uuid,
}

impl Debug for TaskExecutingInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskExecutingInfo")
            .field("task", &self.task.scheduler_key())
            .field("execute_id", &self.execute_id)
            .field("start_time", &self.start_time)
            .finish()
    }
}

impl TaskExecutingInfo {
    pub(crate) fn new(
        plan: Arc<TaskSchedulePlan>,
        client_ip: &str,
        start_time: DateTime<Local>,
    ) -> Self {
        let mut task = plan.task().clone();
        task.client_ip = client_ip.to_string();
        Self {
            plan,
            task,
            cancel_token: CancellationToken::new(),
            start_time,
            execute_id: Uuid::new_v4(),
        }
    }

    /// Gets the plan this execution fired from
    pub fn plan(&self) -> &Arc<TaskSchedulePlan> {
        &self.plan
    }

    /// Gets the stamped task copy the body executes with
    pub fn task(&self) -> &Task {
        &self.task
    }

    /// Requests cancellation of this execution. Idempotent, see the type-level notes
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Completes once [`TaskExecutingInfo::cancel`] has been invoked. Task bodies are
    /// expected to select over this and wind down promptly
    pub async fn cancelled(&self) {
        self.cancel_token.cancelled().await
    }

    /// Whether cancellation has already been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Gets the instant this execution attempt began
    pub fn start_time(&self) -> DateTime<Local> {
        self.start_time
    }

    /// Gets the unique id of this firing
    pub fn execute_id(&self) -> &Uuid {
        &self.execute_id
    }
}

/// [`TaskExecuteResult`] is the terminal record of one execution attempt, produced exactly
/// once per firing that made it past the lock (plus once per declined overlap, see
/// [`CronmeshErrors::UnfinishedPreviousRun`]) and consumed by the agent loop which forwards
/// it to the configured reporter
#[derive(Debug, Clone)]
pub struct TaskExecuteResult {
    pub execute_info: Arc<TaskExecutingInfo>,
    pub output: String,
    pub err: Option<String>,
    pub start_time: DateTime<Local>,
    pub end_time: DateTime<Local>,
}

impl TaskExecuteResult {
    /// Builds the result of a body run that returned output
    pub(crate) fn success(
        info: Arc<TaskExecutingInfo>,
        output: String,
        end_time: DateTime<Local>,
    ) -> Self {
        let start_time = info.start_time();
        Self { execute_info: info, output, err: None, start_time, end_time }
    }

    /// Builds the result of a body run that failed or was cancelled
    pub(crate) fn failure(
        info: Arc<TaskExecutingInfo>,
        err: String,
        end_time: DateTime<Local>,
    ) -> Self {
        let start_time = info.start_time();
        Self {
            execute_info: info,
            output: String::new(),
            err: Some(err),
            start_time,
            end_time,
        }
    }

    /// Whether the attempt completed without an error
    pub fn is_success(&self) -> bool {
        self.err.is_none()
    }
}
