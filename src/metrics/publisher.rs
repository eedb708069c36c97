use crate::identity::InstanceIdentity;
use crate::metrics::collector::DeviceMetricSample;
use crate::metrics::sink::MetricSink;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

pub const TOTAL_MEMORY: &str = "Total Memory";
pub const USED_MEMORY: &str = "Used Memory";
pub const FREE_MEMORY: &str = "Free Memory";
pub const MEMORY_USAGE: &str = "Memory Usage";
pub const POWER_USAGE: &str = "Power Usage (Watts)";
pub const TEMPERATURE: &str = "Temperature (C)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Unit {
    Bytes,
    Percent,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

impl Dimension {
    fn new(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricDatum {
    pub metric_name: String,
    pub dimensions: Vec<Dimension>,
    pub unit: Unit,
    pub storage_resolution: i32,
    pub value: f64,
}

/// One submission: the six metrics of one device for one tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricBatch {
    pub namespace: String,
    pub timestamp: DateTime<Utc>,
    pub metric_data: Vec<MetricDatum>,
}

impl MetricBatch {
    pub fn datum(&self, metric_name: &str) -> Option<&MetricDatum> {
        self.metric_data.iter().find(|d| d.metric_name == metric_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Submitted,
    /// Sample had an unavailable reading; nothing was sent.
    Suppressed,
    /// Submission was attempted and failed; not retried.
    Failed,
}

pub struct MetricPublisher<S> {
    sink: S,
    namespace: String,
    storage_resolution: i32,
}

impl<S: MetricSink> MetricPublisher<S> {
    pub fn new(sink: S, namespace: impl Into<String>, storage_resolution: i32) -> Self {
        Self {
            sink,
            namespace: namespace.into(),
            storage_resolution,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Build the submission for a sample, or `None` if the sample is not valid.
    pub fn build_batch(
        &self,
        sample: &DeviceMetricSample,
        identity: &InstanceIdentity,
        timestamp: DateTime<Utc>,
    ) -> Option<MetricBatch> {
        if !sample.valid {
            return None;
        }
        let memory = sample.memory?;
        let power = sample.power_watts?;
        let temperature = sample.temperature_celsius?;

        let dimensions = vec![
            Dimension::new("InstanceId", identity.instance_id.as_str()),
            Dimension::new("ImageId", identity.image_id.as_str()),
            Dimension::new("InstanceType", identity.instance_type.as_str()),
            Dimension::new("GPUNumber", sample.device_index.to_string()),
        ];

        let datum = |metric_name: &str, unit: Unit, value: f64| MetricDatum {
            metric_name: metric_name.to_string(),
            dimensions: dimensions.clone(),
            unit,
            storage_resolution: self.storage_resolution,
            value,
        };

        let metric_data = vec![
            datum(TOTAL_MEMORY, Unit::Bytes, memory.total as f64),
            datum(USED_MEMORY, Unit::Bytes, memory.used as f64),
            datum(FREE_MEMORY, Unit::Bytes, memory.free as f64),
            datum(MEMORY_USAGE, Unit::Percent, memory.used_percent),
            datum(POWER_USAGE, Unit::None, power),
            datum(TEMPERATURE, Unit::None, f64::from(temperature)),
        ];

        Some(MetricBatch {
            namespace: self.namespace.clone(),
            timestamp,
            metric_data,
        })
    }

    /// Submit one device's sample. Invalid samples are dropped whole and
    /// transport failures are logged and not resubmitted.
    pub async fn publish(
        &self,
        sample: &DeviceMetricSample,
        identity: &InstanceIdentity,
        timestamp: DateTime<Utc>,
    ) -> PublishOutcome {
        let Some(batch) = self.build_batch(sample, identity, timestamp) else {
            debug!(
                "GPU {}: skipping submission, sample incomplete",
                sample.device_index
            );
            return PublishOutcome::Suppressed;
        };

        match self.sink.submit(&batch).await {
            Ok(()) => {
                debug!(
                    "GPU {}: submitted {} metrics to {}",
                    sample.device_index,
                    batch.metric_data.len(),
                    batch.namespace
                );
                PublishOutcome::Submitted
            }
            Err(e) => {
                warn!("GPU {}: submission failed: {}", sample.device_index, e);
                PublishOutcome::Failed
            }
        }
    }
}
