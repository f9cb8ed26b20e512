//! Periodic polling loop.
//!
//! Cycles never overlap: each tick awaits the full cycle and the sink publish
//! before the next tick is taken. Ticks missed while a slow cycle runs are
//! delayed, not bunched.

use std::time::Duration;

use supla_core::{CycleRunner, DeviceRecord, DeviceTarget, Extractor, Fetcher, RecordSink};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::ExporterResult;

/// Compile the extraction layout and build the cycle runner for `config`.
pub fn build_runner(config: &Config) -> ExporterResult<CycleRunner> {
    let extractor = Extractor::new(config.extraction.clone())?;
    let fetcher = Fetcher::new(config.global.timeout(), extractor)?;
    Ok(CycleRunner::new(fetcher, config.global.workers))
}

pub struct Scheduler<S> {
    runner: CycleRunner,
    targets: Vec<DeviceTarget>,
    sink: S,
    interval: Duration,
}

impl<S: RecordSink> Scheduler<S> {
    pub fn new(runner: CycleRunner, targets: Vec<DeviceTarget>, sink: S, interval: Duration) -> Self {
        Self {
            runner,
            targets,
            sink,
            interval,
        }
    }

    pub fn runner(&self) -> &CycleRunner {
        &self.runner
    }

    /// Run one cycle and hand the batch to the sink.
    pub async fn run_once(&self) -> Vec<DeviceRecord> {
        let batch = self.runner.run_cycle(&self.targets).await;
        let attempts = self.runner.counter().read();
        self.sink.publish(&batch, attempts);

        let up = batch.iter().filter(|r| r.up).count();
        debug!(
            devices_processed = attempts,
            up,
            down = batch.len() - up,
            "metrics update completed"
        );
        batch
    }

    /// Poll immediately, then every interval, until `shutdown` flips to true.
    ///
    /// A cycle in progress always runs to completion.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            devices = self.targets.len(),
            interval_secs = self.interval.as_secs(),
            "starting poll loop"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("poll loop stopped");
    }
}
