use async_trait::async_trait;
use cronmesh::errors::CronmeshErrors;
use cronmesh::executor::FnTaskExecutor;
use cronmesh::report::ResultReporter;
use cronmesh::scheduler::Scheduler;
use cronmesh::task::{Task, TaskEvent, TaskExecuteResult};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn active_task(task_id: &str, spec: &str) -> Task {
    Task {
        project_id: 7,
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
async fn saved_plan_fires_and_reports() {
    let reporter = RecordingReporter::default();
    let scheduler = Scheduler::builder()
        .reporter(reporter.clone())
        .executor(FnTaskExecutor::new(|_info| async { Ok("ok".to_string()) }))
        .build();
    scheduler.start().await;

    scheduler
        .push_event(TaskEvent::save(active_task("fire", "@every 1s")))
        .await
        .unwrap();

    assert!(
        wait_until(Duration::from_secs(3), || reporter.count() >= 1).await,
        "the plan never fired"
    );

    let first = &reporter.snapshot()[0];
    assert!(first.is_success());
    assert_eq!(first.output, "ok");
    assert!(first.end_time >= first.start_time);

    // The worker deregisters before pushing its result, so the table drains
    // as soon as the in-flight body (if any) finishes.
    assert!(
        wait_until(Duration::from_millis(500), || scheduler.executing_count() == 0).await
    );
    assert_eq!(scheduler.plan_count(), 1);
}

#[tokio::test]
async fn save_overwrites_the_previous_plan() {
    let scheduler = Scheduler::builder().build();
    scheduler.start().await;

    let mut first = active_task("overwrite", "@every 1h");
    first.name = "first".to_string();
    let mut second = active_task("overwrite", "@every 2h");
    second.name = "second".to_string();

    scheduler.push_event(TaskEvent::save(first)).await.unwrap();
    scheduler.push_event(TaskEvent::save(second)).await.unwrap();

    assert!(
        wait_until(Duration::from_secs(2), || {
            scheduler
                .get_plan("7_overwrite")
                .is_some_and(|plan| plan.task().name == "second")
        })
        .await,
        "the later save should win"
    );
    assert_eq!(scheduler.plan_count(), 1);
}

#[tokio::test]
async fn delete_is_idempotent() {
    let scheduler = Scheduler::builder().build();
    scheduler.start().await;

    let task = active_task("gone", "@every 1h");
    scheduler.push_event(TaskEvent::save(task.clone())).await.unwrap();
    assert!(wait_until(Duration::from_secs(2), || scheduler.plan_count() == 1).await);

    scheduler.push_event(TaskEvent::delete(task.clone())).await.unwrap();
    scheduler.push_event(TaskEvent::delete(task)).await.unwrap();

    assert!(wait_until(Duration::from_secs(2), || scheduler.plan_count() == 0).await);
}

#[tokio::test]
async fn save_with_inactive_status_behaves_as_delete() {
    let scheduler = Scheduler::builder().build();
    scheduler.start().await;

    let task = active_task("inactive", "@every 1h");
    scheduler.push_event(TaskEvent::save(task.clone())).await.unwrap();
    assert!(wait_until(Duration::from_secs(2), || scheduler.plan_count() == 1).await);

    let mut deactivated = task;
    deactivated.status = 0;
    scheduler.push_event(TaskEvent::save(deactivated)).await.unwrap();

    assert!(
        wait_until(Duration::from_secs(2), || scheduler.plan_count() == 0).await,
        "a non-schedulable save must remove the plan"
    );
}

#[tokio::test]
async fn malformed_spec_is_dropped_without_poisoning_the_loop() {
    let scheduler = Scheduler::builder().build();
    scheduler.start().await;

    scheduler
        .push_event(TaskEvent::save(active_task("broken", "definitely not cron")))
        .await
        .unwrap();
    scheduler
        .push_event(TaskEvent::save(active_task("fine", "*/5 * * * *")))
        .await
        .unwrap();

    assert!(
        wait_until(Duration::from_secs(2), || scheduler.get_plan("7_fine").is_some()).await,
        "the loop must survive a malformed save"
    );
    assert!(scheduler.get_plan("7_broken").is_none());
    assert_eq!(scheduler.plan_count(), 1);
}

#[tokio::test]
async fn temporary_event_fires_without_planning() {
    let reporter = RecordingReporter::default();
    let scheduler = Scheduler::builder()
        .reporter(reporter.clone())
        .executor(FnTaskExecutor::new(|_info| async { Ok("one-shot".to_string()) }))
        .build();
    scheduler.start().await;

    scheduler
        .push_event(TaskEvent::temporary(active_task("once", "@every 1h")))
        .await
        .unwrap();

    assert!(
        wait_until(Duration::from_secs(2), || reporter.count() == 1).await,
        "the one-shot should run immediately"
    );
    assert_eq!(scheduler.plan_count(), 0);
    assert_eq!(reporter.snapshot()[0].output, "one-shot");
}
