use crate::errors::CronmeshErrors;
use crate::task::Task;
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// [`DistributedLock`] is the seam towards the cluster-wide mutual exclusion service that
/// decides which agent executes a given firing. The agent requests a fresh [`LockHandle`]
/// per firing, sleeps its anti-skew jitter, then attempts a fast-fail acquisition, losing
/// the race is an entirely normal outcome and merely declines the firing
///
/// # Required Method(s)
/// Implementors provide [`DistributedLock::lock_for`], producing a handle scoped to one
/// task. Handles are cheap, one is created per firing and dropped right after release
///
/// # Trait Implementation(s)
/// The provided default is [`ProcessLocalLock`], the degenerate single-agent cluster where
/// mutual exclusion only spans the current process. Production deployments implement this
/// seam on top of their coordination service (etcd, ZooKeeper, a database advisory lock...)
///
/// # See Also
/// - [`LockHandle`]
/// - [`ProcessLocalLock`]
pub trait DistributedLock: Debug + Send + Sync {
    /// Creates a lock handle scoped to ``task``, nothing is acquired yet
    fn lock_for(&self, task: &Task) -> Arc<dyn LockHandle>;
}

/// [`LockHandle`] is one task-scoped claim on the distributed lock
///
/// # Contract
/// - [`LockHandle::try_lock`] fails fast, it never blocks waiting for a peer to release
/// - [`LockHandle::unlock`] is idempotent and always safe after a successful lock,
///   callers invoke it unconditionally on every exit path past acquisition
#[async_trait]
pub trait LockHandle: Send + Sync {
    /// Attempts to acquire the lock without blocking
    ///
    /// # Returns
    /// ``Ok(())`` when this agent now holds the lock, [`CronmeshErrors::LockContended`]
    /// when a peer does, or [`CronmeshErrors::LockBackend`] when the backend failed
    async fn try_lock(&self) -> Result<(), CronmeshErrors>;

    /// Releases the lock if held by this handle, a no-op otherwise
    async fn unlock(&self);
}

/// [`ProcessLocalLock`] is the default [`DistributedLock`] implementation, scoping mutual
/// exclusion to the current process through a shared held-key set
///
/// # Usage Note(s)
/// With a single agent this is indistinguishable from a real coordination service. It is
/// meant for demos, tests and single-node deployments, a multi-agent cluster behind it
/// would happily double-execute
///
/// # Constructor(s)
/// [`ProcessLocalLock::new`] or the [`Default`] implementation
#[derive(Debug, Default)]
pub struct ProcessLocalLock {
    held: Arc<DashMap<String, Uuid>>,
}

impl ProcessLocalLock {
    /// Creates a fresh lock domain with no keys held
    pub fn new() -> Self {
        Self::default()
    }
}

impl DistributedLock for ProcessLocalLock {
    fn lock_for(&self, task: &Task) -> Arc<dyn LockHandle> {
        Arc::new(ProcessLocalLockHandle {
            held: self.held.clone(),
            key: task.scheduler_key(),
            owner: Uuid::new_v4(),
            locked: AtomicBool::new(false),
        })
    }
}

struct ProcessLocalLockHandle {
    held: Arc<DashMap<String, Uuid>>,
    key: String,
    owner: Uuid,
    locked: AtomicBool,
}

#[async_trait]
impl LockHandle for ProcessLocalLockHandle {
    async fn try_lock(&self) -> Result<(), CronmeshErrors> {
        match self.held.entry(self.key.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(self.owner);
                self.locked.store(true, Ordering::Release);
                Ok(())
            }
            Entry::Occupied(_) => Err(CronmeshErrors::LockContended(self.key.clone())),
        }
    }

    async fn unlock(&self) {
        if self.locked.swap(false, Ordering::AcqRel) {
            self.held.remove_if(&self.key, |_, owner| *owner == self.owner);
        }
    }
}
