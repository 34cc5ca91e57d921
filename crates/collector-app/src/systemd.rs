//! Service manager integration: readiness, status line and watchdog pings.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

const MIN_WATCHDOG_PING: Duration = Duration::from_millis(100);

/// Ping period for a watchdog of `WATCHDOG_USEC`, or `None` when the watchdog
/// is off or addressed to another process.
pub fn watchdog_period(usec: Option<&str>, pid: Option<&str>, own_pid: u32) -> Option<Duration> {
    let usec: u64 = usec?.trim().parse().ok()?;
    if usec == 0 {
        return None;
    }
    let target_pid = pid.and_then(|value| value.trim().parse::<u32>().ok());
    if target_pid.is_some_and(|target| target != own_pid) {
        return None;
    }
    Some((Duration::from_micros(usec) / 2).max(MIN_WATCHDOG_PING))
}

#[cfg(target_os = "linux")]
mod imp {
    use std::env;

    use sd_notify::NotifyState;
    use tokio::time::{interval, MissedTickBehavior};
    use tracing::{debug, warn};

    use super::*;

    fn notify(states: &[NotifyState<'_>]) {
        if let Err(err) = sd_notify::notify(false, states) {
            warn!(error = %err, "systemd notify failed");
        }
    }

    pub fn notify_ready(devices: usize) {
        let status = format!("polling {devices} inverter(s)");
        notify(&[NotifyState::Ready, NotifyState::Status(&status)]);
    }

    pub fn notify_stopping() {
        notify(&[NotifyState::Stopping]);
    }

    pub fn spawn_watchdog(mut shutdown: watch::Receiver<bool>) -> Option<JoinHandle<()>> {
        let period = watchdog_period(
            env::var("WATCHDOG_USEC").ok().as_deref(),
            env::var("WATCHDOG_PID").ok().as_deref(),
            std::process::id(),
        )?;
        debug!(period_ms = period.as_millis(), "systemd watchdog enabled");
        Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => notify(&[NotifyState::Watchdog]),
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        }))
    }
}

#[cfg(not(target_os = "linux"))]
mod imp {
    use super::*;

    pub fn notify_ready(_devices: usize) {}

    pub fn notify_stopping() {}

    pub fn spawn_watchdog(_shutdown: watch::Receiver<bool>) -> Option<JoinHandle<()>> {
        None
    }
}

pub use imp::{notify_ready, notify_stopping, spawn_watchdog};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pings_at_half_the_watchdog_period() {
        assert_eq!(
            watchdog_period(Some("30000000"), None, 42),
            Some(Duration::from_secs(15))
        );
        assert_eq!(
            watchdog_period(Some("30000000"), Some("42"), 42),
            Some(Duration::from_secs(15))
        );
    }

    #[test]
    fn ignores_watchdog_for_other_process() {
        assert_eq!(watchdog_period(Some("30000000"), Some("7"), 42), None);
    }

    #[test]
    fn disabled_or_garbled_watchdog() {
        assert_eq!(watchdog_period(None, None, 42), None);
        assert_eq!(watchdog_period(Some("0"), None, 42), None);
        assert_eq!(watchdog_period(Some("soon"), None, 42), None);
    }

    #[test]
    fn short_periods_are_clamped() {
        assert_eq!(
            watchdog_period(Some("50000"), None, 42),
            Some(MIN_WATCHDOG_PING)
        );
    }
}
