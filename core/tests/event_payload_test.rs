use cronmesh::task::{Task, TaskEvent, TaskEventKind};
use cronmesh::utils::retry_times;
use std::sync::atomic::{AtomicUsize, Ordering};

fn ingress_task() -> Task {
    Task {
        project_id: 42,
        task_id: "payload".to_string(),
        name: "task-payload".to_string(),
        spec: "*/10 * * * *".to_string(),
        command: "echo hello".to_string(),
        status: 1,
        noseize: 0,
        timeout_seconds: 30,
        client_ip: String::new(),
    }
}

#[test]
fn task_events_round_trip_through_json() {
    let event = TaskEvent::save(ingress_task());
    let payload = serde_json::to_string(&event).unwrap();
    let back: TaskEvent = serde_json::from_str(&payload).unwrap();
    assert_eq!(back, event);
    assert_eq!(back.task.scheduler_key(), "42_payload");
}

#[test]
fn event_kinds_use_the_wire_spelling() {
    let payload = serde_json::to_string(&TaskEventKind::Temporary).unwrap();
    assert_eq!(payload, "\"TEMPORARY\"");

    let kind: TaskEventKind = serde_json::from_str("\"KILL\"").unwrap();
    assert_eq!(kind, TaskEventKind::Kill);
}

#[test]
fn ingress_payloads_may_omit_optional_fields() {
    let payload = r#"{
        "project_id": 5,
        "task_id": "bare",
        "name": "bare-task",
        "spec": "@every 1m",
        "status": 1
    }"#;
    let task: Task = serde_json::from_str(payload).unwrap();
    assert_eq!(task.noseize, 0);
    assert_eq!(task.command, "");
    assert!(task.requires_lock());
    assert!(task.is_schedulable());
}

#[tokio::test]
async fn retry_stops_at_the_first_success() {
    let attempts = AtomicUsize::new(0);
    let outcome: Result<&str, &str> = retry_times(5, || {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst);
        async move { if attempt < 2 { Err("not yet") } else { Ok("done") } }
    })
    .await;

    assert_eq!(outcome, Ok("done"));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn retry_exhausts_its_budget_and_keeps_the_last_error() {
    let attempts = AtomicUsize::new(0);
    let outcome: Result<(), String> = retry_times(5, || {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst);
        async move { Err(format!("attempt {attempt}")) }
    })
    .await;

    assert_eq!(outcome, Err("attempt 4".to_string()));
    assert_eq!(attempts.load(Ordering::SeqCst), 5);
}
