pub mod cron; // skipcq: RS-D1001

pub mod interval; // skipcq: RS-D1001

pub use crate::schedule::cron::TaskScheduleCron;
pub use crate::schedule::interval::TaskScheduleInterval;

use crate::errors::CronmeshErrors;
use chrono::{DateTime, Local};
use std::sync::Arc;

#[allow(unused_imports)]
use crate::task::Task;

/// The [`TaskSchedule`] trait is used to calculate the next point of time given a time instance
/// where the task will be scheduled to execute. This system is used closely by the agent's
/// ticker and by [`TaskSchedulePlan`]
///
/// # Required Method(s)
/// If one wants to implement this trait, they must provide an implementation for the
/// [`TaskSchedule::next_after`] method used to calculate the next available time
///
/// # Trait Implementation(s)
/// The noteworthy trait implementations of this trait include:
/// - [`TaskScheduleCron`] fires a task according to a classic cron expression
/// - [`TaskScheduleInterval`] fires a task on a fixed-interval basis, this backs
///   the ``@every <duration>`` expression family
///
/// This trait is also forwarded through ``Arc``, shared schedules slot in wherever an
/// owned implementation is expected
///
/// # Object Safety
/// This trait is object safe to use, as seen in the source code of [`TaskSchedulePlan`]
///
/// # See Also
/// - [`TaskScheduleCron`]
/// - [`TaskScheduleInterval`]
/// - [`TaskSchedulePlan`]
///
/// [`TaskSchedulePlan`]: crate::task::TaskSchedulePlan
pub trait TaskSchedule: Send + Sync {
    /// Calculates the next point in time to fire a [`Task`] from a specific point in time.
    /// The contract is strict, the returned instant is always **after** ``time``, never equal
    /// to it, the ticker's monotonic-advance invariant rests on this
    ///
    /// # Arguments
    /// It accepts a ``time`` reference which is a local time used as a basis for calculating
    /// the future time to execute at
    ///
    /// # Returns
    /// A ``Result<DateTime<Local>, CronmeshErrors>`` which when successful, returns the
    /// calculated local time, otherwise the expression could not be evaluated
    fn next_after(&self, time: &DateTime<Local>) -> Result<DateTime<Local>, CronmeshErrors>;
}

impl<S: TaskSchedule + ?Sized> TaskSchedule for Arc<S> {
    fn next_after(&self, time: &DateTime<Local>) -> Result<DateTime<Local>, CronmeshErrors> {
        self.as_ref().next_after(time)
    }
}

/// Builds the concrete [`TaskSchedule`] for a task's schedule expression. Expressions of the
/// form ``@every <duration>`` (e.g. ``@every 1s``, ``@every 90s``, ``@every 5m``) produce a
/// [`TaskScheduleInterval`], everything else is treated as a cron expression and produces a
/// [`TaskScheduleCron`]. Validation is eager, a malformed expression fails here rather than
/// at the first tick
///
/// # Arguments
/// - **spec** The raw schedule expression as stored on the [`Task`]
/// - **now** The instant used to probe cron expressions for validity
///
/// # Returns
/// The parsed schedule behind an ``Arc<dyn TaskSchedule>``, or
/// [`CronmeshErrors::InvalidScheduleExpr`]
pub fn build_task_schedule(
    spec: &str,
    now: &DateTime<Local>,
) -> Result<Arc<dyn TaskSchedule>, CronmeshErrors> {
    if let Some(every) = spec.strip_prefix("@every ") {
        return Ok(Arc::new(TaskScheduleInterval::parse(every)?));
    }
    Ok(Arc::new(TaskScheduleCron::parse(spec, now)?))
}
