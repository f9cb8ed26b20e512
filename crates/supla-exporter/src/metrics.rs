//! Prometheus sink for device records.
//!
//! ## Stale label cleanup
//!
//! Identity gauges (`info`, `state`, `network`, `firmware`, `memory`) carry
//! device values as labels, so a changed firmware or state would otherwise
//! leave the old series behind. For every url the sink remembers the label
//! values it wrote last and removes exactly those series before writing fresh
//! ones. Down devices only update `supla_device_up` and keep their last
//! known identity series.

use std::collections::HashMap;
use std::sync::Mutex;

use prometheus::{Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};
use supla_core::{DeviceRecord, RecordSink};
use tracing::debug;

use crate::error::ExporterResult;

/// Label value used when a device reported an empty string.
pub const UNKNOWN_VALUE: &str = "UNKNOWN";

/// Label values written for one device in its last up cycle.
#[derive(Debug, Clone, Default)]
struct WrittenLabels {
    name: String,
    state: String,
    mac: String,
    firmware: String,
}

impl WrittenLabels {
    fn from_record(record: &DeviceRecord) -> Self {
        Self {
            name: or_unknown(&record.name).to_string(),
            state: or_unknown(&record.state).to_string(),
            mac: or_unknown(&record.mac).to_string(),
            firmware: or_unknown(&record.firmware).to_string(),
        }
    }
}

/// Summary of the most recently published batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub devices: usize,
    pub up: usize,
    pub attempts: u64,
}

/// Metrics sink backed by a private Prometheus registry.
pub struct PrometheusSink {
    registry: Registry,
    info: GaugeVec,
    state: GaugeVec,
    network: GaugeVec,
    firmware: GaugeVec,
    memory: GaugeVec,
    up: GaugeVec,
    count: Gauge,
    written: Mutex<HashMap<String, WrittenLabels>>,
    last_batch: Mutex<BatchSummary>,
}

impl PrometheusSink {
    pub fn new() -> ExporterResult<Self> {
        let registry = Registry::new();

        let info = gauge_vec(
            &registry,
            "supla_device_info",
            "Base device information indicating device presence",
            &["url", "name"],
        )?;
        let state = gauge_vec(
            &registry,
            "supla_device_state",
            "Device operational state",
            &["url", "state"],
        )?;
        let network = gauge_vec(
            &registry,
            "supla_device_network",
            "Device network information",
            &["url", "mac"],
        )?;
        let firmware = gauge_vec(
            &registry,
            "supla_device_firmware",
            "Device firmware version",
            &["url", "firmware", "name"],
        )?;
        let memory = gauge_vec(
            &registry,
            "supla_device_memory_free_bytes",
            "Free memory in bytes",
            &["url", "name"],
        )?;
        let up = gauge_vec(
            &registry,
            "supla_device_up",
            "Device availability status (1=up, 0=down)",
            &["url"],
        )?;

        let count = Gauge::with_opts(Opts::new(
            "supla_device_count",
            "Number of device fetch attempts in the last cycle",
        ))?;
        registry.register(Box::new(count.clone()))?;

        Ok(Self {
            registry,
            info,
            state,
            network,
            firmware,
            memory,
            up,
            count,
            written: Mutex::new(HashMap::new()),
            last_batch: Mutex::new(BatchSummary::default()),
        })
    }

    /// Encode all series in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn last_batch(&self) -> BatchSummary {
        *self.last_batch.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update(&self, record: &DeviceRecord, written: &mut HashMap<String, WrittenLabels>) {
        let url = record.url.as_str();
        let up_value = if record.up { 1.0 } else { 0.0 };
        self.up.with_label_values(&[url]).set(up_value);

        if !record.up {
            debug!(url, "device not present");
            return;
        }

        if let Some(prev) = written.get(url) {
            self.info.remove_label_values(&[url, prev.name.as_str()]).ok();
            self.state.remove_label_values(&[url, prev.state.as_str()]).ok();
            self.network.remove_label_values(&[url, prev.mac.as_str()]).ok();
            self.firmware
                .remove_label_values(&[url, prev.firmware.as_str(), prev.name.as_str()])
                .ok();
            self.memory.remove_label_values(&[url, prev.name.as_str()]).ok();
        }

        let labels = WrittenLabels::from_record(record);
        self.info.with_label_values(&[url, labels.name.as_str()]).set(1.0);
        self.state.with_label_values(&[url, labels.state.as_str()]).set(1.0);
        self.network.with_label_values(&[url, labels.mac.as_str()]).set(1.0);
        self.firmware
            .with_label_values(&[url, labels.firmware.as_str(), labels.name.as_str()])
            .set(1.0);
        if record.free_mem_kb > 0.0 {
            self.memory
                .with_label_values(&[url, labels.name.as_str()])
                .set(record.free_mem_kb * 1024.0);
        }

        written.insert(url.to_string(), labels);
    }
}

impl RecordSink for PrometheusSink {
    fn publish(&self, batch: &[DeviceRecord], attempts: u64) {
        let mut written = self.written.lock().unwrap_or_else(|e| e.into_inner());
        for record in batch {
            self.update(record, &mut written);
        }
        self.count.set(attempts as f64);

        let summary = BatchSummary {
            devices: batch.len(),
            up: batch.iter().filter(|r| r.up).count(),
            attempts,
        };
        *self.last_batch.lock().unwrap_or_else(|e| e.into_inner()) = summary;
    }
}

impl std::fmt::Debug for PrometheusSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusSink")
            .field("last_batch", &self.last_batch())
            .finish_non_exhaustive()
    }
}

fn gauge_vec(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<GaugeVec, prometheus::Error> {
    let vec = GaugeVec::new(Opts::new(name, help), labels)?;
    registry.register(Box::new(vec.clone()))?;
    Ok(vec)
}

fn or_unknown(value: &str) -> &str {
    if value.is_empty() {
        UNKNOWN_VALUE
    } else {
        value
    }
}
