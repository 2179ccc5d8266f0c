use async_trait::async_trait;
use cronmesh::errors::CronmeshErrors;
use cronmesh::executor::{TaskError, TaskExecutor};
use cronmesh::lock::{DistributedLock, LockHandle};
use cronmesh::report::ResultReporter;
use cronmesh::scheduler::Scheduler;
use cronmesh::task::{Task, TaskEvent, TaskExecuteResult, TaskExecutingInfo};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn active_task(task_id: &str, spec: &str, noseize: i32) -> Task {
    Task {
        project_id: 9,
        task_id: task_id.to_string(),
        name: format!("task-{task_id}"),
        spec: spec.to_string(),
        command: String::new(),
        status: 1,
        noseize,
        timeout_seconds: 0,
        client_ip: String::new(),
    }
}

#[derive(Debug, Clone, Default)]
struct RecordingReporter {
    results: Arc<Mutex<Vec<TaskExecuteResult>>>,
}

impl RecordingReporter {
    fn count(&self) -> usize {
        self.results.lock().unwrap().len()
    }

    fn snapshot(&self) -> Vec<TaskExecuteResult> {
        self.results.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResultReporter for RecordingReporter {
    async fn report(&self, result: &TaskExecuteResult) -> Result<(), CronmeshErrors> {
        self.results.lock().unwrap().push(result.clone());
        Ok(())
    }
}

/// A task body that runs for ``hold`` unless its cancellation token fires first.
struct HoldingExecutor {
    hold: Duration,
}

#[async_trait]
impl TaskExecutor for HoldingExecutor {
    async fn execute(&self, info: Arc<TaskExecutingInfo>) -> Result<String, TaskError> {
        tokio::select! {
            _ = info.cancelled() => Err("task body cancelled".into()),
            _ = tokio::time::sleep(self.hold) => Ok("held to completion".to_string()),
        }
    }
}

/// A lock domain where every acquisition loses to a phantom peer.
#[derive(Debug, Default)]
struct ContendedLock;

impl DistributedLock for ContendedLock {
    fn lock_for(&self, task: &Task) -> Arc<dyn LockHandle> {
        Arc::new(ContendedHandle(task.scheduler_key()))
    }
}

struct ContendedHandle(String);

#[async_trait]
impl LockHandle for ContendedHandle {
    async fn try_lock(&self) -> Result<(), CronmeshErrors> {
        Err(CronmeshErrors::LockContended(self.0.clone()))
    }

    async fn unlock(&self) {}
}

async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    condition()
}

#[tokio::test]
async fn overlapping_firing_reports_the_unfinished_previous_run() {
    let reporter = RecordingReporter::default();
    let scheduler = Scheduler::builder()
        .reporter(reporter.clone())
        .executor(HoldingExecutor { hold: Duration::from_millis(2500) })
        .build();
    scheduler.start().await;

    let task = active_task("overlap", "@every 1s", 1);
    let expected_err = format!(
        "task {} execute error: last task was not completed",
        task.name
    );
    scheduler.push_event(TaskEvent::save(task)).await.unwrap();

    let saw_conflict = wait_until(Duration::from_secs(5), || {
        assert!(scheduler.executing_count() <= 1, "one in-flight execution per key");
        reporter
            .snapshot()
            .iter()
            .any(|result| result.err.as_deref() == Some(expected_err.as_str()))
    })
    .await;
    assert!(saw_conflict, "the second firing should decline with the literal error");

    let conflict = reporter
        .snapshot()
        .into_iter()
        .find(|result| result.err.is_some())
        .unwrap();
    assert_eq!(conflict.output, "last task was not completed");
    assert_eq!(conflict.start_time, conflict.end_time);
}

#[tokio::test]
async fn kill_cancels_the_inflight_execution() {
    let reporter = RecordingReporter::default();
    let scheduler = Scheduler::builder()
        .reporter(reporter.clone())
        .executor(HoldingExecutor { hold: Duration::from_secs(30) })
        .build();
    scheduler.start().await;

    let task = active_task("kill", "@every 1s", 1);
    scheduler.push_event(TaskEvent::save(task.clone())).await.unwrap();

    assert!(
        wait_until(Duration::from_secs(3), || scheduler.executing_count() == 1).await,
        "the body should be in flight before the kill"
    );

    scheduler.push_event(TaskEvent::kill(task)).await.unwrap();

    assert!(
        wait_until(Duration::from_secs(2), || reporter.count() >= 1).await,
        "the cancelled body should still produce a result"
    );
    let cancelled = &reporter.snapshot()[0];
    assert_eq!(cancelled.err.as_deref(), Some("task body cancelled"));
    assert!(
        wait_until(Duration::from_secs(1), || scheduler.executing_count() == 0).await,
        "the worker should deregister after cancellation"
    );
    // The kill touched the executing side only.
    assert_eq!(scheduler.plan_count(), 1);
}

#[tokio::test]
async fn losing_the_lock_declines_the_firing_silently() {
    let reporter = RecordingReporter::default();
    let scheduler = Scheduler::builder()
        .reporter(reporter.clone())
        .locks(ContendedLock)
        .executor(HoldingExecutor { hold: Duration::from_secs(30) })
        .build();
    scheduler.start().await;

    let task = active_task("contended", "@every 1s", 0);
    scheduler.push_event(TaskEvent::save(task)).await.unwrap();

    // Two due instants plus the worst-case anti-skew jitter.
    tokio::time::sleep(Duration::from_millis(3500)).await;

    assert_eq!(reporter.count(), 0, "a lost lock round records no result");
    assert_eq!(scheduler.executing_count(), 0);
    assert!(scheduler.get_plan("9_contended").is_some(), "the plan stays installed");
}
