use crate::task::{TaskExecutingInfo, TaskSchedulePlan};
use dashmap::DashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// [`PlanTable`] is the concurrent mapping from scheduler-key to [`TaskSchedulePlan`].
/// Structural writes happen exclusively on the agent loop thread (the event handler),
/// reads may come from anywhere, which is why the table stays concurrent-safe even
/// though the loop alone would not need it
///
/// # Iteration Semantics
/// [`PlanTable::range`] walks a point-in-time snapshot per shard, it may miss entries
/// inserted concurrently and may observe concurrent deletes, but it never yields an
/// entry twice and never yields a torn entry
#[derive(Default)]
pub struct PlanTable {
    inner: DashMap<String, Arc<TaskSchedulePlan>>,
}

impl Debug for PlanTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanTable").field("plans", &self.inner.len()).finish()
    }
}

impl PlanTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Gets the plan stored under ``key``
    pub fn load(&self, key: &str) -> Option<Arc<TaskSchedulePlan>> {
        self.inner.get(key).map(|entry| entry.value().clone())
    }

    /// Inserts or overwrites ``plan``. The key is always derived from the plan itself,
    /// which keeps key and stored identity in lockstep
    pub fn store(&self, plan: Arc<TaskSchedulePlan>) {
        self.inner.insert(plan.scheduler_key(), plan);
    }

    /// Removes ``key``, returning the evicted plan if one was present
    pub fn delete(&self, key: &str) -> Option<Arc<TaskSchedulePlan>> {
        self.inner.remove(key).map(|(_, plan)| plan)
    }

    /// Iterates a snapshot of the table, invoking ``f`` per entry until it returns
    /// ``false``
    pub fn range<F>(&self, mut f: F)
    where
        F: FnMut(&str, &Arc<TaskSchedulePlan>) -> bool,
    {
        for entry in self.inner.iter() {
            if !f(entry.key(), entry.value()) {
                break;
            }
        }
    }

    /// Gets the number of plans currently stored, approximate under concurrent
    /// mutation, callers only rely on the zero / non-zero distinction
    pub fn count(&self) -> usize {
        self.inner.len()
    }
}

/// [`ExecutingTable`] is the concurrent mapping from scheduler-key to the live
/// [`TaskExecutingInfo`] of the one in-flight execution for that key. Insertion happens
/// on the loop thread (the worker prelude's in-flight check keys off it), removal
/// happens on the worker task right before the result is pushed, so the table must be
/// concurrent-safe
#[derive(Default)]
pub struct ExecutingTable {
    inner: DashMap<String, Arc<TaskExecutingInfo>>,
}

impl Debug for ExecutingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutingTable")
            .field("executing", &self.inner.len())
            .finish()
    }
}

impl ExecutingTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Gets the live execution stored under ``key``
    pub fn load(&self, key: &str) -> Option<Arc<TaskExecutingInfo>> {
        self.inner.get(key).map(|entry| entry.value().clone())
    }

    /// Whether ``key`` currently has an in-flight execution
    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    /// Registers ``info`` under ``key``
    pub(crate) fn store(&self, key: String, info: Arc<TaskExecutingInfo>) {
        self.inner.insert(key, info);
    }

    /// Deregisters ``key``, returning the evicted info if one was present
    pub(crate) fn delete(&self, key: &str) -> Option<Arc<TaskExecutingInfo>> {
        self.inner.remove(key).map(|(_, info)| info)
    }

    /// Iterates a snapshot of the table, invoking ``f`` per entry until it returns
    /// ``false``
    pub fn range<F>(&self, mut f: F)
    where
        F: FnMut(&str, &Arc<TaskExecutingInfo>) -> bool,
    {
        for entry in self.inner.iter() {
            if !f(entry.key(), entry.value()) {
                break;
            }
        }
    }

    /// Gets the number of live executions, approximate under concurrent mutation
    pub fn count(&self) -> usize {
        self.inner.len()
    }
}
