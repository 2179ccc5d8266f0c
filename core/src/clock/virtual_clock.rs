use crate::clock::SchedulerClock;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Notify;

/// [`VirtualClock`] is an implementation of the [`SchedulerClock`] trait, it acts as a mock
/// object, allowing to simulate time without the waiting around. This can especially be useful
/// for unit tests, simulations of clock skew between agents and so on
///
/// Unlike [`SystemClock`], this clock doesn't move forward on its own. Time is a plain
/// millisecond counter that only the inherent [`VirtualClock::advance`] and
/// [`VirtualClock::advance_to`] methods move, which makes it predictable at any point
/// throughout the program. Anything parked inside [`SchedulerClock::idle`] is released as
/// soon as an advance carries the counter across its wake-up point, so a test drives the
/// agent loop by advancing instead of sleeping
///
/// # Constructor(s)
/// When constructing a [`VirtualClock`], one can use a variety of constructor methods,
/// those being:
/// - [`VirtualClock::new`] For creating one from an initial [`SystemTime`]
/// - [`VirtualClock::from_value`] For creating one from a supplied ``u64`` (as milliseconds)
/// - [`VirtualClock::from_current_time`] For creating one set to the current time
/// - [`VirtualClock::from_epoch`] For creating one set to the UNIX epoch
///
/// # See Also
/// - [`SystemClock`]
/// - [`SchedulerClock`]
///
/// [`SystemClock`]: crate::clock::SystemClock
pub struct VirtualClock {
    current_time: AtomicU64,
    notify: Notify,
}

impl Debug for VirtualClock {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualClock")
            .field(
                "current_time",
                &DateTime::<Local>::from(
                    UNIX_EPOCH + Duration::from_millis(self.current_time.load(Ordering::Relaxed)),
                ),
            )
            .finish()
    }
}

impl VirtualClock {
    /// Creates / Constructs a new [`VirtualClock`] instance
    ///
    /// # Argument(s)
    /// This method requests an ``initial_time`` as argument, with type [`SystemTime`]
    ///
    /// # Returns
    /// The newly created [`VirtualClock`] instance with the time set to the ``initial_time``
    pub fn new(initial_time: SystemTime) -> Self {
        VirtualClock::from_value(
            initial_time
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
        )
    }

    /// Creates / Constructs a new [`VirtualClock`] instance
    ///
    /// # Argument(s)
    /// This method requires one argument, this being a ``initial_value`` with type ``u64``,
    /// this value is represented in **total milliseconds** since the UNIX epoch
    ///
    /// # Returns
    /// The newly created [`VirtualClock`] instance with the time set to the ``initial_value``
    pub fn from_value(initial_value: u64) -> Self {
        Self {
            current_time: AtomicU64::new(initial_value),
            notify: Notify::new(),
        }
    }

    /// Creates / Constructs a new [`VirtualClock`] instance set to the present wall-clock time
    pub fn from_current_time() -> Self {
        VirtualClock::new(SystemTime::now())
    }

    /// Creates / Constructs a new [`VirtualClock`] instance set to the UNIX epoch
    pub fn from_epoch() -> Self {
        VirtualClock::from_value(0)
    }

    /// Moves the clock forward by ``duration``, releasing every idler whose wake-up
    /// point the advance crosses
    pub fn advance(&self, duration: Duration) {
        let target = self
            .millis()
            .saturating_add(duration.as_millis() as u64);
        self.advance_millis(target);
    }

    /// Moves the clock forward to the absolute instant ``to``. Advancing backwards is a
    /// no-op, the counter never regresses
    pub fn advance_to(&self, to: SystemTime) {
        let target = to
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        self.advance_millis(target);
    }

    fn advance_millis(&self, target: u64) {
        self.current_time.fetch_max(target, Ordering::Release);
        self.notify.notify_waiters();
    }

    fn millis(&self) -> u64 {
        self.current_time.load(Ordering::Acquire)
    }
}

#[async_trait]
impl SchedulerClock for VirtualClock {
    async fn now(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.millis())
    }

    async fn idle(&self, duration: Duration) {
        let target = self.millis().saturating_add(duration.as_millis() as u64);

        let mut notified = std::pin::pin!(self.notify.notified());
        loop {
            // Register interest before re-checking, otherwise an advance
            // between the check and the await is lost.
            notified.as_mut().enable();
            if self.millis() >= target {
                return;
            }
            notified.as_mut().await;
            notified.set(self.notify.notified());
        }
    }
}
