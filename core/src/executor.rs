use crate::task::TaskExecutingInfo;
use async_trait::async_trait;
use std::sync::Arc;

/// The error type task bodies report failures through, its rendering ends up verbatim in
/// [`TaskExecuteResult::err`]
///
/// [`TaskExecuteResult::err`]: crate::task::TaskExecuteResult
pub type TaskError = Box<dyn std::error::Error + Send + Sync>;

/// [`TaskExecutor`] is the seam towards the actual task body. The agent core never knows
/// what a task *does*, it hands the executor one [`TaskExecutingInfo`] per firing and
/// receives either the body's output or its error
///
/// # Cancellation
/// Implementations are expected to observe [`TaskExecutingInfo::cancelled`] and wind down
/// promptly when a kill arrives, returning an error describing the interruption. The core
/// does not enforce this, a body that ignores its token simply runs to completion
///
/// # Trait Implementation(s)
/// - [`NoOperationExecutor`] succeeds immediately with empty output
/// - [`FnTaskExecutor`] adapts an async closure, the go-to for demos and tests
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Runs the task body for one firing
    async fn execute(&self, info: Arc<TaskExecutingInfo>) -> Result<String, TaskError>;
}

/// [`NoOperationExecutor`] is an implementation of [`TaskExecutor`] whose body does
/// nothing and succeeds with empty output. It exists so a scheduler can be built without
/// wiring a real body, e.g. when only the planning side is under test
#[derive(Debug, Default)]
pub struct NoOperationExecutor;

#[async_trait]
impl TaskExecutor for NoOperationExecutor {
    async fn execute(&self, _info: Arc<TaskExecutingInfo>) -> Result<String, TaskError> {
        Ok(String::new())
    }
}

/// [`FnTaskExecutor`] adapts a plain async closure into a [`TaskExecutor`], acting as the
/// leaf unit of execution for callers that don't want a named type per task body
///
/// # Example
/// ```ignore
/// use cronmesh::executor::FnTaskExecutor;
///
/// let executor = FnTaskExecutor::new(|info| async move {
///     println!("running {}", info.task().name);
///     Ok("done".to_string())
/// });
/// ```
pub struct FnTaskExecutor<F: Send + Sync>(F);

impl<F, Fut> FnTaskExecutor<F>
where
    Fut: Future<Output = Result<String, TaskError>> + Send,
    F: Fn(Arc<TaskExecutingInfo>) -> Fut + Send + Sync,
{
    pub fn new(func: F) -> Self {
        FnTaskExecutor(func)
    }
}

#[async_trait]
impl<F, Fut> TaskExecutor for FnTaskExecutor<F>
where
    Fut: Future<Output = Result<String, TaskError>> + Send,
    F: Fn(Arc<TaskExecutingInfo>) -> Fut + Send + Sync,
{
    async fn execute(&self, info: Arc<TaskExecutingInfo>) -> Result<String, TaskError> {
        self.0(info).await
    }
}
