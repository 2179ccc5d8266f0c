use crate::errors::CronmeshErrors;
use crate::task::Task;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use dashmap::DashMap;
use std::fmt::Debug;

/// [`RunStatusStore`] is the seam towards the durable store that the rest of the cluster
/// reads a task's "running" flag from. Both transitions may fail transiently, the worker
/// retries them a bounded number of times and treats a persistent failure according to
/// which side of the execution it happened on (before: the firing is abandoned, after:
/// logged and the result still flows)
///
/// # Trait Implementation(s)
/// The provided default is [`EphemeralRunStatusStore`], which keeps the flags in process
/// memory, useful for demos and tests where no peer ever reads them
#[async_trait]
pub trait RunStatusStore: Debug + Send + Sync {
    /// Durably marks ``task`` as running on this agent
    async fn set_task_running(&self, task: &Task) -> Result<(), CronmeshErrors>;

    /// Durably clears the running mark of ``task``
    async fn set_task_not_running(&self, task: &Task) -> Result<(), CronmeshErrors>;
}

/// [`EphemeralRunStatusStore`] is an implementation of [`RunStatusStore`] that operates
/// in-memory
///
/// # Usage Note(s)
/// Due to the fact that [`EphemeralRunStatusStore`] operates in-memory by nature, peers
/// never observe its flags and a crash loses them, which is exactly as much durability as
/// demos and single-process tests need
///
/// # Constructor(s)
/// When constructing a new [`EphemeralRunStatusStore`], one can use
/// [`EphemeralRunStatusStore::new`] or [`EphemeralRunStatusStore::default`] via the
/// [`Default`] trait
#[derive(Debug, Default)]
pub struct EphemeralRunStatusStore {
    running: DashMap<String, DateTime<Local>>,
}

impl EphemeralRunStatusStore {
    /// Creates an empty store with no task marked running
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the instant ``key`` was marked running, if it currently is
    pub fn running_since(&self, key: &str) -> Option<DateTime<Local>> {
        self.running.get(key).map(|entry| *entry.value())
    }
}

#[async_trait]
impl RunStatusStore for EphemeralRunStatusStore {
    async fn set_task_running(&self, task: &Task) -> Result<(), CronmeshErrors> {
        self.running.insert(task.scheduler_key(), Local::now());
        Ok(())
    }

    async fn set_task_not_running(&self, task: &Task) -> Result<(), CronmeshErrors> {
        self.running.remove(&task.scheduler_key());
        Ok(())
    }
}
