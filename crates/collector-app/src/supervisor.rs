use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

use poller_actor::DevicePoller;

type PanicPayload = Box<dyn Any + Send>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollerExit {
    /// The poller returned after shutdown was requested.
    Stopped(String),
    /// The poller panicked and was started again.
    Respawned(String),
}

/// Runs one task per poller and restarts any that panics.
pub struct PollerSet {
    tasks: JoinSet<(Arc<DevicePoller>, Result<(), PanicPayload>)>,
    shutdown: watch::Receiver<bool>,
    respawn_delay: Duration,
}

impl PollerSet {
    pub fn new(shutdown: watch::Receiver<bool>, respawn_delay: Duration) -> Self {
        Self {
            tasks: JoinSet::new(),
            shutdown,
            respawn_delay,
        }
    }

    pub fn spawn(&mut self, poller: Arc<DevicePoller>, delay: Duration) {
        let shutdown = self.shutdown.clone();
        self.tasks.spawn(async move {
            if delay > Duration::ZERO {
                sleep(delay).await;
            }
            let outcome = AssertUnwindSafe(poller.start(shutdown))
                .catch_unwind()
                .await;
            (poller, outcome)
        });
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Waits for the next poller task to end. `None` once no task is left.
    pub async fn join_next(&mut self) -> Option<PollerExit> {
        loop {
            match self.tasks.join_next().await? {
                Ok((poller, Ok(()))) => {
                    let address = poller.identity().address.clone();
                    info!(device = %address, "poller stopped");
                    return Some(PollerExit::Stopped(address));
                }
                Ok((poller, Err(payload))) => {
                    let address = poller.identity().address.clone();
                    warn!(
                        device = %address,
                        panic = panic_message(payload.as_ref()),
                        respawn_ms = self.respawn_delay.as_millis(),
                        "poller panicked, respawning"
                    );
                    self.spawn(poller, self.respawn_delay);
                    return Some(PollerExit::Respawned(address));
                }
                Err(err) if err.is_cancelled() => continue,
                Err(err) => warn!(error = %err, "poller task join failed"),
            }
        }
    }

    /// Gives running cycles `grace` to finish after shutdown, then aborts the rest.
    pub async fn drain(mut self, grace: Duration) {
        let finished = timeout(grace, async {
            while let Some(result) = self.tasks.join_next().await {
                if let Err(err) = result {
                    warn!(error = %err, "poller task join failed");
                }
            }
        })
        .await;
        if finished.is_err() {
            warn!(
                grace_ms = grace.as_millis(),
                remaining = self.tasks.len(),
                "pollers still busy, aborting"
            );
            self.tasks.shutdown().await;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
