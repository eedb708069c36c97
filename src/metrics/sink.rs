//! Destinations for metric batches

use crate::metrics::publisher::{MetricBatch, MetricDatum, Unit};
use crate::{GpumonError, Result};
use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::BehaviorVersion;
use aws_sdk_cloudwatch::config::Region;
use aws_sdk_cloudwatch::error::DisplayErrorContext;
use aws_sdk_cloudwatch::primitives::DateTime;
use aws_sdk_cloudwatch::types::{self as cw, StandardUnit};
use tracing::info;

#[async_trait]
pub trait MetricSink: Send + Sync {
    async fn submit(&self, batch: &MetricBatch) -> Result<()>;
}

/// Submits batches with CloudWatch `PutMetricData`.
pub struct CloudWatchSink {
    client: aws_sdk_cloudwatch::Client,
}

impl CloudWatchSink {
    /// Build a client from the default credential chain for `region`. The SDK's
    /// own retries are disabled; a failed submission is dropped.
    pub async fn new(region: impl Into<String>) -> Self {
        let region = region.into();
        info!("Publishing to CloudWatch in {}", region);

        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region))
            .retry_config(RetryConfig::disabled())
            .load()
            .await;

        Self {
            client: aws_sdk_cloudwatch::Client::new(&shared_config),
        }
    }
}

fn standard_unit(unit: Unit) -> StandardUnit {
    match unit {
        Unit::Bytes => StandardUnit::Bytes,
        Unit::Percent => StandardUnit::Percent,
        Unit::None => StandardUnit::None,
    }
}

fn to_cloudwatch_datum(datum: &MetricDatum, timestamp: DateTime) -> cw::MetricDatum {
    let dimensions = datum
        .dimensions
        .iter()
        .map(|d| cw::Dimension::builder().name(&d.name).value(&d.value).build())
        .collect::<Vec<_>>();

    cw::MetricDatum::builder()
        .metric_name(&datum.metric_name)
        .set_dimensions(Some(dimensions))
        .unit(standard_unit(datum.unit))
        .storage_resolution(datum.storage_resolution)
        .value(datum.value)
        .timestamp(timestamp)
        .build()
}

#[async_trait]
impl MetricSink for CloudWatchSink {
    async fn submit(&self, batch: &MetricBatch) -> Result<()> {
        let timestamp = DateTime::from_millis(batch.timestamp.timestamp_millis());
        let metric_data = batch
            .metric_data
            .iter()
            .map(|datum| to_cloudwatch_datum(datum, timestamp))
            .collect::<Vec<_>>();

        self.client
            .put_metric_data()
            .namespace(&batch.namespace)
            .set_metric_data(Some(metric_data))
            .send()
            .await
            .map_err(|e| {
                GpumonError::Transport(format!("PutMetricData failed: {}", DisplayErrorContext(&e)))
            })?;

        Ok(())
    }
}

/// Prints each batch as pretty JSON instead of submitting it.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

#[async_trait]
impl MetricSink for StdoutSink {
    async fn submit(&self, batch: &MetricBatch) -> Result<()> {
        let json = serde_json::to_string_pretty(batch)?;
        println!("{}", json);
        Ok(())
    }
}

#[cfg(any(feature = "mock", test))]
pub use recording::RecordingSink;

#[cfg(any(feature = "mock", test))]
mod recording {
    use super::MetricSink;
    use crate::metrics::publisher::MetricBatch;
    use crate::{GpumonError, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Keeps every batch it is given, with the instant it arrived.
    #[derive(Default)]
    pub struct RecordingSink {
        fail: bool,
        attempts: Mutex<usize>,
        batches: Mutex<Vec<(Instant, MetricBatch)>>,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        /// A sink whose every submission fails with a transport error.
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn attempts(&self) -> usize {
            *self.attempts.lock().unwrap()
        }

        pub fn batches(&self) -> Vec<MetricBatch> {
            self.batches
                .lock()
                .unwrap()
                .iter()
                .map(|(_, batch)| batch.clone())
                .collect()
        }

        pub fn arrivals(&self) -> Vec<Instant> {
            self.batches.lock().unwrap().iter().map(|(at, _)| *at).collect()
        }
    }

    #[async_trait]
    impl MetricSink for RecordingSink {
        async fn submit(&self, batch: &MetricBatch) -> Result<()> {
            *self.attempts.lock().unwrap() += 1;
            if self.fail {
                return Err(GpumonError::Transport("connection refused".to_string()));
            }
            self.batches
                .lock()
                .unwrap()
                .push((Instant::now(), batch.clone()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::publisher::Dimension;
    use chrono::{TimeZone, Utc};

    fn datum() -> MetricDatum {
        MetricDatum {
            metric_name: "Memory Usage".to_string(),
            dimensions: vec![
                Dimension {
                    name: "InstanceId".to_string(),
                    value: "i-0123456789abcdef0".to_string(),
                },
                Dimension {
                    name: "GPUNumber".to_string(),
                    value: "0".to_string(),
                },
            ],
            unit: Unit::Percent,
            storage_resolution: 60,
            value: 75.0,
        }
    }

    #[test]
    fn test_cloudwatch_datum_conversion() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let converted = to_cloudwatch_datum(&datum(), DateTime::from_millis(at.timestamp_millis()));

        let debug = format!("{:?}", converted);
        assert!(debug.contains("Memory Usage"));
        assert!(debug.contains("GPUNumber"));
        assert_eq!(converted.unit(), Some(&StandardUnit::Percent));
        assert_eq!(converted.storage_resolution(), Some(60));
        assert_eq!(converted.value(), Some(75.0));
        assert_eq!(converted.dimensions().len(), 2);
        assert_eq!(
            converted.timestamp().map(|t| t.to_millis().unwrap()),
            Some(at.timestamp_millis())
        );
    }

    #[tokio::test]
    async fn test_cloudwatch_client_does_not_retry() {
        let sink = CloudWatchSink::new("us-west-2").await;
        let config = sink.client.config();

        assert_eq!(config.region().map(|r| r.as_ref()), Some("us-west-2"));
        assert_eq!(config.retry_config().map(|r| r.max_attempts()), Some(1));
    }

    #[tokio::test]
    async fn test_stdout_sink_accepts_batch() {
        let batch = MetricBatch {
            namespace: "OmnisciGPU".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            metric_data: vec![datum()],
        };

        assert!(StdoutSink.submit(&batch).await.is_ok());
    }

    #[test]
    fn test_unit_mapping() {
        assert_eq!(standard_unit(Unit::Bytes), StandardUnit::Bytes);
        assert_eq!(standard_unit(Unit::Percent), StandardUnit::Percent);
        assert_eq!(standard_unit(Unit::None), StandardUnit::None);
    }
}
