use crate::errors::CronmeshErrors;
use crate::task::TaskExecuteResult;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt::Debug;
use tracing::{info, warn};

/// [`ResultReporter`] is the seam towards whatever records completed executions, a result
/// service, a database, a message bus... The agent loop forwards every
/// [`TaskExecuteResult`] it drains from the result intake, successes and failures alike
///
/// # Trait Implementation(s)
/// The provided default is [`LogResultReporter`] which emits each result as a structured
/// log line and never fails
#[async_trait]
pub trait ResultReporter: Debug + Send + Sync {
    /// Forwards one completed result
    async fn report(&self, result: &TaskExecuteResult) -> Result<(), CronmeshErrors>;
}

/// [`WarningSink`] is the seam towards the alerting pipeline, invoked by the agent loop
/// for every result that carries an error before the result is forwarded to the reporter
///
/// # Trait Implementation(s)
/// The provided default is [`LogWarningSink`] which emits the payload at warn level
#[async_trait]
pub trait WarningSink: Debug + Send + Sync {
    /// Raises one alert, sinks are fire-and-forget and cannot fail the loop
    async fn warning(&self, payload: WarningPayload);
}

/// [`WarningPayload`] is the structured alert raised for a failed execution, shaped for
/// direct serialization into whatever transport the sink uses
#[derive(Debug, Clone, Serialize)]
pub struct WarningPayload {
    pub project_id: u64,
    pub task_name: String,
    pub agent_ip: String,
    pub error: String,
    /// Unix timestamp (seconds) the failing attempt ended at
    pub time: i64,
}

impl WarningPayload {
    /// Builds the payload for ``result``, which must carry an error
    pub fn from_result(result: &TaskExecuteResult, agent_ip: &str) -> Self {
        let task = result.execute_info.task();
        Self {
            project_id: task.project_id,
            task_name: task.name.clone(),
            agent_ip: agent_ip.to_string(),
            error: result.err.clone().unwrap_or_default(),
            time: result.end_time.timestamp(),
        }
    }
}

/// [`LogResultReporter`] is an implementation of [`ResultReporter`] that records results
/// as structured log lines, the default when no real result service is wired
#[derive(Debug, Default)]
pub struct LogResultReporter;

#[async_trait]
impl ResultReporter for LogResultReporter {
    async fn report(&self, result: &TaskExecuteResult) -> Result<(), CronmeshErrors> {
        let task = result.execute_info.task();
        info!(
            task = %task.name,
            key = %task.scheduler_key(),
            execute_id = %result.execute_info.execute_id(),
            success = result.is_success(),
            err = result.err.as_deref().unwrap_or(""),
            "task execution finished"
        );
        Ok(())
    }
}

/// [`LogWarningSink`] is an implementation of [`WarningSink`] that emits every alert at
/// warn level, the default when no real alerting pipeline is wired
#[derive(Debug, Default)]
pub struct LogWarningSink;

#[async_trait]
impl WarningSink for LogWarningSink {
    async fn warning(&self, payload: WarningPayload) {
        warn!(
            project_id = payload.project_id,
            task = %payload.task_name,
            agent = %payload.agent_ip,
            error = %payload.error,
            "task execution raised a warning"
        );
    }
}
