use crate::errors::CronmeshErrors;
use crate::schedule::TaskSchedule;
use chrono::{DateTime, Local};

/// [`TaskScheduleCron`] is an implementation of the [`TaskSchedule`] trait that fires tasks
/// according to a cron expression. Learn more about cron expressions in
/// [Wikipedia](https://en.wikipedia.org/wiki/Cron)
///
/// # Implementation Detail(s)
/// Under the hood, this uses the crate ``cron_parser`` to calculate the new time to execute.
/// The expression is kept as the original string and re-evaluated on every
/// [`TaskScheduleCron::next_after`] call
///
/// # Usage Note(s)
/// Cron expressions provide a powerful way to define recurring schedules with fine-grained
/// control (e.g., "every minute", "at 2:30 AM every day", "every Monday at 9 AM"). Their
/// drawback compared to [`TaskScheduleInterval`] is the inability to have sub-minute
/// precision
///
/// # Construction
/// When constructing [`TaskScheduleCron`], the only way to do so is via
/// [`TaskScheduleCron::parse`] which validates the expression eagerly against a probe
/// instant, a malformed expression never makes it into a plan
///
/// # Trait Implementation(s)
/// Apart from implementing [`TaskSchedule`], [`TaskScheduleCron`] also implements the
/// [`Debug`] trait, the [`Clone`] trait, the [`Eq`] trait and subsequently the
/// [`PartialEq`] trait
///
/// # See also
/// - [`TaskSchedule`]
/// - [`TaskScheduleInterval`]
///
/// [`TaskScheduleInterval`]: crate::schedule::TaskScheduleInterval
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TaskScheduleCron(String);

impl TaskScheduleCron {
    /// Constructs / Creates a [`TaskScheduleCron`] from a provided cron expression,
    /// validating it in the process
    ///
    /// # Argument(s)
    /// This method accepts two arguments, the cron expression ``expr`` and a ``now``
    /// instant the expression is probed against
    ///
    /// # Returns
    /// A fully constructed [`TaskScheduleCron`], or [`CronmeshErrors::InvalidScheduleExpr`]
    /// when ``expr`` does not parse
    pub fn parse(expr: &str, now: &DateTime<Local>) -> Result<Self, CronmeshErrors> {
        cron_parser::parse(expr, now)
            .map_err(|e| CronmeshErrors::InvalidScheduleExpr(expr.to_string(), e.to_string()))?;
        Ok(Self(expr.to_string()))
    }

    /// Gets the underlying cron expression string
    pub fn expression(&self) -> &str {
        &self.0
    }
}

impl TaskSchedule for TaskScheduleCron {
    fn next_after(&self, time: &DateTime<Local>) -> Result<DateTime<Local>, CronmeshErrors> {
        cron_parser::parse(&self.0, time)
            .map_err(|e| CronmeshErrors::InvalidScheduleExpr(self.0.clone(), e.to_string()))
    }
}
