use cronmesh::executor::FnTaskExecutor;
use cronmesh::scheduler::Scheduler;
use cronmesh::task::{Task, TaskEvent};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn demo_task(task_id: &str, spec: &str, command: &str) -> Task {
    Task {
        project_id: 1,
        task_id: task_id.to_string(),
        name: format!("demo-{task_id}"),
        spec: spec.to_string(),
        command: command.to_string(),
        status: 1,
        noseize: 0,
        timeout_seconds: 0,
        client_ip: String::new(),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let scheduler = Scheduler::builder()
        .executor(FnTaskExecutor::new(|info| async move {
            info!(
                task = %info.task().name,
                command = %info.task().command,
                agent = %info.task().client_ip,
                "executing task body"
            );
            Ok(format!("ran `{}`", info.task().command))
        }))
        .build();

    scheduler.start().await;

    scheduler
        .push_event(TaskEvent::save(demo_task("heartbeat", "@every 2s", "echo beat")))
        .await
        .expect("scheduler loop should be accepting events");
    scheduler
        .push_event(TaskEvent::temporary(demo_task("once", "@every 1h", "echo once")))
        .await
        .expect("scheduler loop should be accepting events");

    tokio::time::sleep(Duration::from_secs(7)).await;

    info!(plans = scheduler.plan_count(), "shutting the demo agent down");
    scheduler.abort().await;
}
