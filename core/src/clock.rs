pub mod system_clock;
pub mod virtual_clock;

pub use system_clock::SystemClock;
pub use virtual_clock::VirtualClock;

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// [`SchedulerClock`] is the seam the agent loop tells time through, both when stamping
/// instants (due-time math, result timestamps) and when going to sleep between ticks.
///
/// # Required Methods
/// Implementors supply [`SchedulerClock::now`] and [`SchedulerClock::idle`]. The loop
/// never sleeps towards an absolute deadline, it recomputes a relative duration from the
/// plan table on every iteration and idles for exactly that long, so the wait primitive
/// here is a duration too. An ``idle`` of zero must return immediately, that is how an
/// overdue plan turns into an immediate re-tick
///
/// # Trait Implementation(s)
/// - [`SystemClock`] the default, wall-clock time and real sleeps
/// - [`VirtualClock`] simulated time for unit tests and clock-skew experiments, it only
///   moves when explicitly advanced and releases idlers as the advance crosses them
///
/// The trait is also forwarded through ``Arc`` so shared clock handles can be supplied
/// wherever an owned implementation is expected
///
/// # See Also
/// - [`SystemClock`]
/// - [`VirtualClock`]
#[async_trait]
pub trait SchedulerClock: Debug + Send + Sync {
    /// Gets the current time of the clock, represented as [`SystemTime`] (to avoid any
    /// timezone issues and let the caller convert to the calendar representation of
    /// their choice)
    async fn now(&self) -> SystemTime;

    /// Parks the caller for ``duration`` of *this clock's* time. A zero duration
    /// returns immediately
    async fn idle(&self, duration: Duration);
}

#[async_trait]
impl<C: SchedulerClock + ?Sized> SchedulerClock for Arc<C> {
    async fn now(&self) -> SystemTime {
        self.as_ref().now().await
    }

    async fn idle(&self, duration: Duration) {
        self.as_ref().idle(duration).await
    }
}
