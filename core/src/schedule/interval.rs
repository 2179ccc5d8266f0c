use crate::errors::CronmeshErrors;
use crate::schedule::TaskSchedule;
use chrono::{DateTime, Local, TimeDelta};
use std::ops::Add;
use std::time::Duration;

#[allow(unused_imports)]
use crate::task::Task;

/// [`TaskScheduleInterval`] is a straightforward implementation of the [`TaskSchedule`] trait
/// that fires [`Task`] instances at a fixed interval. It backs the ``@every <duration>``
/// family of schedule expressions and is well-suited for recurring jobs such as periodic
/// cleanup tasks, heartbeat signals, polling operations... etc.
///
/// # Constructor(s)
/// When one wants to create a new [`TaskScheduleInterval`] instance, they can use a variety
/// of constructors, those being:
/// - [`TaskScheduleInterval::new`] Creates a [`TaskScheduleInterval`] with a [`TimeDelta`]
/// - [`TaskScheduleInterval::duration`] Creates a [`TaskScheduleInterval`] with a [`Duration`]
/// - [`TaskScheduleInterval::from_secs`] Creates a [`TaskScheduleInterval`] from whole seconds
/// - [`TaskScheduleInterval::parse`] Parses the duration half of an ``@every`` expression
///
/// # Trait Implementation(s)
/// [`TaskScheduleInterval`] implements obviously the [`TaskSchedule`] trait but also
/// [`Debug`], [`Clone`], [`Copy`], [`Eq`], [`PartialEq`], [`PartialOrd`] and [`Ord`]
///
/// # See also
/// - [`Task`]
/// - [`TaskSchedule`]
#[derive(Debug, Clone, Eq, PartialEq, PartialOrd, Ord, Copy)]
pub struct TaskScheduleInterval(pub(crate) TimeDelta);

impl TaskScheduleInterval {
    /// Constructs / Creates a new [`TaskScheduleInterval`] instance from a chrono
    /// [`TimeDelta`]. Non-positive intervals are rejected, a schedule that never moves
    /// forward would wedge the ticker's progress guarantee
    pub fn new(interval: TimeDelta) -> Result<Self, CronmeshErrors> {
        if interval <= TimeDelta::zero() {
            return Err(CronmeshErrors::InvalidScheduleExpr(
                interval.to_string(),
                "interval must be strictly positive".to_string(),
            ));
        }
        Ok(Self(interval))
    }

    /// Constructs / Creates a new [`TaskScheduleInterval`] instance from a [`Duration`]
    pub fn duration(interval: Duration) -> Result<Self, CronmeshErrors> {
        let delta = TimeDelta::from_std(interval).map_err(|e| {
            CronmeshErrors::InvalidScheduleExpr(format!("{interval:?}"), e.to_string())
        })?;
        Self::new(delta)
    }

    /// Constructs / Creates a new [`TaskScheduleInterval`] instance from whole seconds
    pub fn from_secs(interval: u32) -> Result<Self, CronmeshErrors> {
        Self::new(TimeDelta::seconds(interval as i64))
    }

    /// Parses the duration half of an ``@every <duration>`` schedule expression. Accepted
    /// units are ``ms``, ``s``, ``m``, ``h`` and ``d`` with an integer magnitude, e.g.
    /// ``500ms``, ``1s``, ``90s``, ``5m``, ``2h``, ``1d``
    ///
    /// # Returns
    /// The parsed interval, or [`CronmeshErrors::InvalidScheduleExpr`] when the magnitude
    /// or unit does not parse or the interval is non-positive
    pub fn parse(every: &str) -> Result<Self, CronmeshErrors> {
        let every = every.trim();
        let invalid = || {
            CronmeshErrors::InvalidScheduleExpr(
                format!("@every {every}"),
                "expected an integer magnitude with one of the units ms/s/m/h/d".to_string(),
            )
        };

        let split = every
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(invalid)?;
        let (magnitude, unit) = every.split_at(split);
        let magnitude: i64 = magnitude.parse().map_err(|_| invalid())?;

        let delta = match unit {
            "ms" => TimeDelta::milliseconds(magnitude),
            "s" => TimeDelta::seconds(magnitude),
            "m" => TimeDelta::minutes(magnitude),
            "h" => TimeDelta::hours(magnitude),
            "d" => TimeDelta::days(magnitude),
            _ => return Err(invalid()),
        };
        Self::new(delta).map_err(|_| invalid())
    }
}

impl TaskSchedule for TaskScheduleInterval {
    fn next_after(&self, time: &DateTime<Local>) -> Result<DateTime<Local>, CronmeshErrors> {
        Ok(time.add(self.0))
    }
}
