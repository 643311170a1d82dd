//! Background tick driver.
//!
//! Hosts without their own frame loop can hand the manager to a [`Ticker`],
//! which calls [`RequestManager::tick`] on a Tokio interval until shut down.

use crate::manager::RequestManager;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Periodic caller of [`RequestManager::tick`].
#[derive(Debug)]
pub struct Ticker {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Ticker {
    /// Start ticking `manager` every `interval`.
    ///
    /// The tick runs on a blocking-capable thread because callbacks and
    /// synchronous requests may block. Must be called inside a Tokio runtime.
    #[must_use]
    pub fn spawn(manager: Arc<RequestManager>, interval: Duration) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last = Instant::now();
            tracing::info!(interval_ms = interval.as_millis(), "Ticker started");

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        let now = Instant::now();
                        let delta = now.duration_since(last);
                        last = now;

                        let manager = Arc::clone(&manager);
                        let result = tokio::task::spawn_blocking(move || manager.tick(delta)).await;
                        match result {
                            Ok(report) if !report.reaped.is_empty() => {
                                tracing::debug!(reaped = report.reaped.len(), "Tick reaped requests");
                            }
                            Ok(_) => {}
                            Err(e) => {
                                tracing::error!(error = %e, "Tick task failed");
                            }
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::info!("Ticker stopped");
        });

        Self { shutdown, task }
    }

    /// Stop ticking and wait for the current tick to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Ticker task ended abnormally");
        }
    }
}
