use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::error::Result;
use crate::recovery::{RecoverySweep, SweepReport};
use crate::traits::{ActiveWork, RecoveryTarget};

pub const DEFAULT_WATCHDOG_INTERVAL: Duration = Duration::from_secs(300);

/// Outcome of one watchdog cycle across all targets.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub swept: Vec<(RecoveryTarget, SweepReport)>,
    pub failed: Vec<(RecoveryTarget, String)>,
}

impl CycleReport {
    pub fn total_recovered(&self) -> usize {
        self.swept.iter().map(|(_, report)| report.total()).sum()
    }
}

struct RunningLoop {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Drives crash recovery on a fixed interval, independently of the dispatcher.
///
/// The target list is re-fetched every cycle so archived or deleted projects
/// stop being patrolled immediately. A failing project is logged and skipped.
pub struct Watchdog {
    recovery: Arc<dyn RecoverySweep>,
    activity: Arc<dyn ActiveWork>,
    interval: Duration,
    running: Mutex<Option<RunningLoop>>,
}

impl Watchdog {
    pub fn new(recovery: Arc<dyn RecoverySweep>, activity: Arc<dyn ActiveWork>) -> Self {
        Self {
            recovery,
            activity,
            interval: DEFAULT_WATCHDOG_INTERVAL,
            running: Mutex::new(None),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start patrolling. The first cycle runs one interval from now.
    ///
    /// Calling `start` again replaces the running loop.
    pub fn start<F>(&self, get_targets: F)
    where
        F: Fn() -> BoxFuture<'static, Result<Vec<RecoveryTarget>>> + Send + Sync + 'static,
    {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let recovery = self.recovery.clone();
        let activity = self.activity.clone();
        let period = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match get_targets().await {
                            Ok(targets) => {
                                run_cycle(recovery.as_ref(), activity.as_ref(), &targets).await;
                            }
                            Err(e) => error!(error = %e, "Failed to list watchdog targets"),
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            debug!("Watchdog loop shutdown");
                            break;
                        }
                    }
                }
            }
        });

        let previous = self.running.lock().unwrap().replace(RunningLoop { shutdown, handle });
        if let Some(previous) = previous {
            debug!("Replacing running watchdog loop");
            let _ = previous.shutdown.send(true);
        }
        info!(interval_secs = period.as_secs(), "Watchdog started");
    }

    /// Stop patrolling. Returns whether a loop was running.
    pub fn stop(&self) -> bool {
        match self.running.lock().unwrap().take() {
            Some(running) => {
                let _ = running.shutdown.send(true);
                info!("Watchdog stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Run one cycle over `targets` now.
    pub async fn run_cycle(&self, targets: &[RecoveryTarget]) -> CycleReport {
        run_cycle(self.recovery.as_ref(), self.activity.as_ref(), targets).await
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        if let Ok(mut running) = self.running.lock() {
            if let Some(running) = running.take() {
                let _ = running.shutdown.send(true);
            }
        }
    }
}

async fn run_cycle(
    recovery: &dyn RecoverySweep,
    activity: &dyn ActiveWork,
    targets: &[RecoveryTarget],
) -> CycleReport {
    let mut report = CycleReport::default();

    for target in targets {
        match recovery.sweep(target, activity).await {
            Ok(sweep) => {
                if sweep.is_empty() {
                    debug!(project_id = %target.project_id, "Recovery sweep found nothing");
                } else {
                    info!(
                        project_id = %target.project_id,
                        stale = sweep.stale_recovered.len(),
                        orphans = sweep.orphans_recovered.len(),
                        "Recovery sweep requeued tasks"
                    );
                }
                report.swept.push((target.clone(), sweep));
            }
            Err(e) => {
                error!(project_id = %target.project_id, error = %e, "Recovery sweep failed");
                report.failed.push((target.clone(), e.to_string()));
            }
        }
    }

    report
}
