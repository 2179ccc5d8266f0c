use thiserror::Error;

#[allow(unused_imports)]
use crate::task::TaskSchedulePlan;

#[allow(unused_imports)]
use crate::lock::LockHandle;

#[allow(unused_imports)]
use crate::store::RunStatusStore;

/// [`CronmeshErrors`] is the main enum that contains all the errors which can be thrown by
/// cronmesh, it uses under the hood [`thiserror`] to make it as smooth sailing to add more
/// errors in the future as possible. None of these errors is fatal to the agent loop,
/// they either surface in logs or inside a [`TaskExecuteResult`]
///
/// [`TaskExecuteResult`]: crate::task::TaskExecuteResult
#[derive(Error, Debug)]
pub enum CronmeshErrors {
    /// This error is meant to happen when a schedule expression cannot be parsed while
    /// building a [`TaskSchedulePlan`]. The first field is the offending expression and
    /// the second is the parser's message
    #[error("Schedule expression `{0}` is invalid: {1}")]
    InvalidScheduleExpr(String, String),

    /// This error is meant to happen when a firing finds the previous execution of the
    /// same task still in flight. Its rendering is the exact message carried inside the
    /// synthesized failure result, peers and alert sinks match on it verbatim
    #[error("task {0} execute error: last task was not completed")]
    UnfinishedPreviousRun(String),

    /// This error is meant to happen when [`LockHandle::try_lock`] loses the race for a
    /// task's distributed lock because a peer agent already holds it
    #[error("Lock for task `{0}` is held by another agent")]
    LockContended(String),

    /// This error is meant to happen when the lock backend itself misbehaves (as opposed
    /// to the lock merely being held elsewhere). The firing is declined either way
    #[error("Lock backend failure for task `{0}`: {1}")]
    LockBackend(String, String),

    /// This error is meant to happen when a durable run-status transition through a
    /// [`RunStatusStore`] keeps failing after its retry budget is spent
    #[error("Persisting run status of task `{0}` failed: {1}")]
    RunStatusPersistence(String, String),

    /// This error is meant to happen when an intake queue can no longer accept entries,
    /// either because it is full on a path that must not block or because the consuming
    /// loop has shut down
    #[error("Intake queue rejected an entry for task `{0}`")]
    IntakeUnavailable(String),

    /// This error is meant to happen when forwarding a completed result to the
    /// configured reporter fails
    #[error("Reporting the result of task `{0}` failed: {1}")]
    ReportFailure(String, String),
}
