//! Cycle orchestration over a bounded worker pool.
//!
//! A cycle pushes every target into a pre-sized job queue, closes it, and
//! lets a fixed number of worker tasks drain it. Each worker runs
//! fetch-then-extract for one target at a time and reports exactly one record.
//! Result order follows completion order, not input order.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::counter::AttemptCounter;
use crate::error::PollFailure;
use crate::fetch::Fetcher;
use crate::types::{DeviceRecord, DeviceTarget};

type JobQueue = Arc<Mutex<mpsc::Receiver<DeviceTarget>>>;

/// Runs polling cycles. At most one cycle should be in flight at a time.
#[derive(Debug)]
pub struct CycleRunner {
    fetcher: Fetcher,
    counter: Arc<AttemptCounter>,
    workers: usize,
}

impl CycleRunner {
    /// Create a runner with `workers` concurrent workers (at least one).
    pub fn new(fetcher: Fetcher, workers: usize) -> Self {
        Self {
            fetcher,
            counter: Arc::new(AttemptCounter::new()),
            workers: workers.max(1),
        }
    }

    /// The attempt counter, for reporting between cycles.
    pub fn counter(&self) -> Arc<AttemptCounter> {
        self.counter.clone()
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Poll every target once and return one record per target.
    ///
    /// Never fails: device-level failures are folded into down records.
    pub async fn run_cycle(&self, targets: &[DeviceTarget]) -> Vec<DeviceRecord> {
        let previous = self.counter.read_and_reset();
        let total = targets.len();
        debug!(
            devices = total,
            workers = self.workers,
            previous_attempts = previous,
            "starting poll cycle"
        );

        if total == 0 {
            return Vec::new();
        }

        let (job_tx, job_rx) = mpsc::channel::<DeviceTarget>(total);
        let (result_tx, mut result_rx) = mpsc::channel::<DeviceRecord>(total);
        let job_rx: JobQueue = Arc::new(Mutex::new(job_rx));

        let mut workers = JoinSet::new();
        for id in 0..self.workers.min(total) {
            workers.spawn(worker(
                id,
                job_rx.clone(),
                result_tx.clone(),
                self.fetcher.clone(),
                self.counter.clone(),
            ));
        }
        drop(result_tx);

        for target in targets {
            if job_tx.send(target.clone()).await.is_err() {
                error!("job queue closed before all targets were dispatched");
                break;
            }
        }
        drop(job_tx);

        let mut records = Vec::with_capacity(total);
        while records.len() < total {
            match result_rx.recv().await {
                Some(record) => records.push(record),
                None => break,
            }
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("poll worker terminated abnormally: {e}");
            }
        }

        if records.len() < total {
            fill_missing(targets, &mut records);
        }

        records
    }
}

async fn worker(
    id: usize,
    jobs: JobQueue,
    results: mpsc::Sender<DeviceRecord>,
    fetcher: Fetcher,
    counter: Arc<AttemptCounter>,
) {
    loop {
        let next = jobs.lock().await.recv().await;
        let Some(target) = next else {
            break;
        };

        let record = fetcher.fetch(&target, &counter).await;
        if results.send(record).await.is_err() {
            break;
        }
    }
    debug!(worker = id, "job queue drained, worker exiting");
}

/// Add a down record for every target that did not report.
fn fill_missing(targets: &[DeviceTarget], records: &mut Vec<DeviceRecord>) {
    let mut reported: HashMap<String, usize> = HashMap::new();
    for record in records.iter() {
        *reported.entry(record.url.clone()).or_default() += 1;
    }

    let lost = PollFailure::Transport("worker terminated before reporting".to_string());
    for target in targets {
        match reported.get_mut(&target.url) {
            Some(n) if *n > 0 => *n -= 1,
            _ => {
                error!(url = %target.url, "no record reported, marking device down");
                records.push(DeviceRecord::from_failure(&target.url, &lost));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_missing_restores_cardinality() {
        let targets = vec![
            DeviceTarget::new("http://a", "u", "p"),
            DeviceTarget::new("http://b", "u", "p"),
            DeviceTarget::new("http://c", "u", "p"),
        ];
        let mut records = vec![DeviceRecord {
            url: "http://b".into(),
            up: true,
            ..DeviceRecord::default()
        }];

        fill_missing(&targets, &mut records);

        assert_eq!(records.len(), 3);
        let by_url: HashMap<_, _> = records.iter().map(|r| (r.url.as_str(), r)).collect();
        assert!(by_url["http://b"].up);
        assert!(!by_url["http://a"].up);
        assert!(!by_url["http://c"].up);
    }

    #[tokio::test]
    async fn test_empty_cycle() {
        let fetcher = Fetcher::new(std::time::Duration::from_secs(1), Default::default()).unwrap();
        let runner = CycleRunner::new(fetcher, 4);
        runner.counter().increment();

        let records = runner.run_cycle(&[]).await;

        assert!(records.is_empty());
        assert_eq!(runner.counter().read(), 0);
    }

    #[test]
    fn test_zero_workers_is_one() {
        let fetcher = Fetcher::new(std::time::Duration::from_secs(1), Default::default()).unwrap();
        assert_eq!(CycleRunner::new(fetcher, 0).workers(), 1);
    }
}
