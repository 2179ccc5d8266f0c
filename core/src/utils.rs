use chrono::{DateTime, Local, TimeZone};
use std::net::{IpAddr, UdpSocket};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Delay applied between two attempts of [`retry_times`]
const RETRY_ATTEMPT_DELAY: Duration = Duration::from_millis(100);

/// Invokes ``op`` up to ``attempts`` times until it succeeds, idling for a constant
/// delay between attempts. The last error is returned when every attempt fails.
/// The delay is deliberately flat, callers of this helper retry local or
/// near-local operations where exponential growth buys nothing
///
/// # Arguments
/// - **attempts** How many times ``op`` may run in total (never zero-clamped,
///   an ``attempts`` of 0 returns the result of a single run)
/// - **op** The fallible operation, re-invoked fresh on each attempt
///
/// # Returns
/// ``Ok`` with the first successful value, otherwise the error of the final attempt
pub async fn retry_times<F, Fut, T, E>(attempts: u32, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut last;
    let rounds = attempts.max(1);
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => last = err,
        }
        attempt += 1;
        if attempt >= rounds {
            return Err(last);
        }
        tokio::time::sleep(RETRY_ATTEMPT_DELAY).await;
    }
}

/// Discovers the IP address this agent is reachable under by opening a UDP socket
/// towards a public anycast address, no packet is ever sent. Returns ``None`` on
/// hosts with no usable route
pub fn local_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}

/// Brings a [`SchedulerClock`] reading into the local calendar time that schedule math
/// runs in. chrono's own conversion does the heavy lifting
///
/// [`SchedulerClock`]: crate::clock::SchedulerClock
pub(crate) fn to_local_time(t: SystemTime) -> DateTime<Local> {
    DateTime::from(t)
}

/// Converts the plan table's compact epoch-millisecond form back into a
/// ``DateTime<Local>``. A stored instant chrono cannot place (it never produces one
/// itself) collapses to the epoch instead of panicking inside the ticker
pub(crate) fn millis_to_date_time(millis: i64) -> DateTime<Local> {
    Local
        .timestamp_millis_opt(millis)
        .single()
        .unwrap_or_else(|| DateTime::from(UNIX_EPOCH))
}
