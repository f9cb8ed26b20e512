//! The seam between a finished cycle and the reporting backend.

use std::sync::Arc;

use crate::types::DeviceRecord;

/// Receives the full batch of records once per cycle.
///
/// The batch holds exactly one record per configured target, down devices
/// included. Implementations own any stale-data cleanup keyed by url.
pub trait RecordSink: Send + Sync {
    /// Publish a batch. `attempts` is the attempt counter read after the cycle.
    fn publish(&self, batch: &[DeviceRecord], attempts: u64);
}

impl<S: RecordSink + ?Sized> RecordSink for Arc<S> {
    fn publish(&self, batch: &[DeviceRecord], attempts: u64) {
        (**self).publish(batch, attempts)
    }
}
