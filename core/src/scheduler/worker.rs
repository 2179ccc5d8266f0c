use crate::errors::CronmeshErrors;
use crate::scheduler::SchedulerContext;
use crate::task::{TaskEvent, TaskExecuteResult, TaskExecutingInfo, TaskSchedulePlan};
use crate::utils::{retry_times, to_local_time};
use chrono::{DateTime, Local};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Attempt budget for each durable run-status transition, and for the Temporary
/// self-event that recovers a firing whose "running" transition kept failing
const STATUS_TRANSITION_ATTEMPTS: u32 = 5;

/// Upper bound (exclusive, in milliseconds) of the uniform anti-skew delay slept before
/// contending for the distributed lock. Without it a clock-leading agent wins every
/// round and the cluster degenerates to a single executor
const LOCK_JITTER_MS: u64 = 1000;

/// Begins at most one execution for ``plan``'s scheduler-key. Runs its conflict check
/// synchronously on the caller's thread (the agent loop), then hands the real work to a
/// spawned task and returns immediately.
///
/// When the key is already in flight, no task is spawned, instead a synthesized failure
/// result is pushed so the overlap is visible downstream. The push must not block: this
/// thread is also the one that drains the result intake, so a full queue is logged and
/// the synthetic result dropped.
pub(crate) fn try_start_task(
    ctx: &Arc<SchedulerContext>,
    plan: Arc<TaskSchedulePlan>,
    now: DateTime<Local>,
) {
    let key = plan.scheduler_key();
    if ctx.executing_table.contains(&key) {
        let info = Arc::new(TaskExecutingInfo::new(plan, &ctx.client_ip, now));
        let conflict = TaskExecuteResult {
            err: Some(
                CronmeshErrors::UnfinishedPreviousRun(info.task().name.clone()).to_string(),
            ),
            output: "last task was not completed".to_string(),
            execute_info: info,
            start_time: now,
            end_time: now,
        };
        if ctx.result_tx.try_send(conflict).is_err() {
            error!(%key, "result intake rejected the overlap result, dropping it");
        }
        return;
    }

    let ctx = ctx.clone();
    tokio::spawn(async move {
        run_firing(ctx, plan).await;
    });
}

/// The asynchronous body of one firing: jittered lock acquisition, registration, durable
/// status transitions around the task body, deregistration, result push. The lock (when
/// the task requires one) is released on every exit path past acquisition.
async fn run_firing(ctx: Arc<SchedulerContext>, plan: Arc<TaskSchedulePlan>) {
    let start = to_local_time(ctx.clock.now().await);
    let info = Arc::new(TaskExecutingInfo::new(plan, &ctx.client_ip, start));
    let task_name = info.task().name.clone();

    let lock = if info.task().requires_lock() {
        let handle = ctx.locks.lock_for(info.task());
        tokio::time::sleep(Duration::from_millis(fastrand::u64(0..LOCK_JITTER_MS))).await;
        if let Err(err) = handle.try_lock().await {
            warn!(task = %task_name, %err, "declined firing, distributed lock was not won");
            return;
        }
        Some(handle)
    } else {
        None
    };

    execute_registered(&ctx, &info).await;

    if let Some(handle) = lock {
        handle.unlock().await;
    }
}

/// Registration through result push. Factored out so the caller can release the lock
/// after every one of these paths, including the abandoned-firing one.
async fn execute_registered(ctx: &Arc<SchedulerContext>, info: &Arc<TaskExecutingInfo>) {
    let key = info.task().scheduler_key();
    let task_name = info.task().name.clone();

    ctx.executing_table.store(key.clone(), info.clone());

    let running = retry_times(STATUS_TRANSITION_ATTEMPTS, || {
        ctx.store.set_task_running(info.task())
    })
    .await;
    if let Err(err) = running {
        error!(task = %task_name, %err, "marking the task running kept failing, abandoning the firing");
        let requeue = retry_times(STATUS_TRANSITION_ATTEMPTS, || {
            let event = TaskEvent::temporary(info.task().clone());
            let intake = ctx.event_tx.clone();
            let name = task_name.clone();
            async move {
                intake
                    .send(event)
                    .await
                    .map_err(|_| CronmeshErrors::IntakeUnavailable(name))
            }
        })
        .await;
        if let Err(err) = requeue {
            error!(task = %task_name, %err, "re-emitting the abandoned firing failed");
        }
        return;
    }

    debug!(task = %task_name, execute_id = %info.execute_id(), "task body starting");
    let outcome = ctx.executor.execute(info.clone()).await;
    let end = to_local_time(ctx.clock.now().await);
    let result = match outcome {
        Ok(output) => TaskExecuteResult::success(info.clone(), output, end),
        Err(err) => TaskExecuteResult::failure(info.clone(), err.to_string(), end),
    };

    let reset = retry_times(STATUS_TRANSITION_ATTEMPTS, || {
        ctx.store.set_task_not_running(info.task())
    })
    .await;
    if let Err(err) = reset {
        error!(task = %task_name, %err, "clearing the running mark kept failing");
    }

    ctx.executing_table.delete(&key);
    if ctx.result_tx.send(result).await.is_err() {
        debug!(task = %task_name, "result intake closed, the agent loop is gone");
    }
}
