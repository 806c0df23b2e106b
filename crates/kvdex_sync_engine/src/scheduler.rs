//! Periodic execution of sync runs on a Tokio runtime.

use crate::engine::SyncEngine;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{info, warn};

/// Drives a [`SyncEngine`] on fixed periods.
///
/// Three tasks are spawned: incremental sync (first tick immediately),
/// full sync (first tick after the configured initial delay) and, when
/// enabled, the deletion-marker sweep. Each run executes on the blocking
/// pool so store and source I/O never stalls the runtime.
pub struct SyncScheduler {
    engine: Arc<SyncEngine>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncScheduler {
    /// Spawns the periodic tasks. Must be called from within a Tokio
    /// runtime.
    pub fn start(engine: Arc<SyncEngine>) -> Self {
        let (shutdown, _) = watch::channel(false);
        let config = engine.config().clone();
        let mut tasks = Vec::with_capacity(3);

        tasks.push(spawn_periodic(
            "incremental",
            time::interval(config.incremental_interval),
            shutdown.subscribe(),
            Arc::clone(&engine),
            |engine| {
                let summary = engine.run_incremental();
                if !summary.failures.is_empty() {
                    warn!(failed = summary.failures.len(), "incremental sync finished with failures");
                }
            },
        ));

        tasks.push(spawn_periodic(
            "full",
            time::interval_at(
                Instant::now() + config.full_initial_delay,
                config.full_interval,
            ),
            shutdown.subscribe(),
            Arc::clone(&engine),
            |engine| {
                let summary = engine.run_full();
                if !summary.failures.is_empty() {
                    warn!(failed = summary.failures.len(), "full sync finished with failures");
                }
            },
        ));

        if let Some(period) = config.cleanup_interval {
            tasks.push(spawn_periodic(
                "cleanup",
                time::interval_at(Instant::now() + period, period),
                shutdown.subscribe(),
                Arc::clone(&engine),
                |engine| {
                    if let Err(e) = engine.run_cleanup() {
                        warn!(error = %e, "marker cleanup failed");
                    }
                },
            ));
        }

        info!(
            incremental = ?config.incremental_interval,
            full = ?config.full_interval,
            cleanup = ?config.cleanup_interval,
            "sync scheduler started"
        );
        Self {
            engine,
            shutdown,
            tasks,
        }
    }

    /// The engine being driven.
    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// Stops the periodic tasks, cancelling any run in progress, and waits
    /// for them to finish.
    pub async fn shutdown(self) {
        self.engine.cancel();
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "sync task ended abnormally");
            }
        }
        self.engine.reset_cancel();
        info!("sync scheduler stopped");
    }
}

fn spawn_periodic(
    name: &'static str,
    mut ticker: Interval,
    mut shutdown: watch::Receiver<bool>,
    engine: Arc<SyncEngine>,
    job: fn(&SyncEngine),
) -> JoinHandle<()> {
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let engine = Arc::clone(&engine);
                    if let Err(e) = tokio::task::spawn_blocking(move || job(&engine)).await {
                        warn!(task = name, error = %e, "sync job panicked");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    })
}
