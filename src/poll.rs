//! Collector lifecycle: initialize once, then collect and publish on a
//! fixed interval until shut down.

use crate::config::Config;
use crate::device::{self, DeviceHandle, MonitoringSession};
use crate::identity::InstanceIdentity;
use crate::metrics::{MetricPublisher, MetricSink, PublishOutcome, SampleCollector};
use crate::Result;
use chrono::Utc;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-tick publish counts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    pub submitted: usize,
    pub suppressed: usize,
    pub failed: usize,
}

pub struct PollLoop<S> {
    collector: SampleCollector,
    publisher: MetricPublisher<S>,
    interval: Duration,
    max_ticks: Option<u64>,
}

impl<S: MetricSink> PollLoop<S> {
    pub fn new(config: &Config, sink: S) -> Self {
        Self {
            collector: SampleCollector::new(),
            publisher: MetricPublisher::new(
                sink,
                config.namespace.clone(),
                config.storage_resolution,
            ),
            interval: config.interval,
            max_ticks: config.max_ticks,
        }
    }

    pub fn publisher(&self) -> &MetricPublisher<S> {
        &self.publisher
    }

    /// Run the collector against an open session.
    ///
    /// Enumerates devices, then ticks until `shutdown` completes or the tick
    /// limit is reached. The session is shut down on every path out of this
    /// function, including a failed enumeration. Returns the number of ticks
    /// run.
    pub async fn run<M, F>(
        &self,
        session: M,
        identity: &InstanceIdentity,
        shutdown: F,
    ) -> Result<u64>
    where
        M: MonitoringSession,
        F: Future<Output = ()>,
    {
        let outcome = self.start(&session, identity, shutdown).await;

        let closed = session.shutdown();
        if let Err(e) = &closed {
            warn!("{}", e);
        }

        let ticks = outcome?;
        closed?;
        info!("Collector stopped after {} ticks", ticks);
        Ok(ticks)
    }

    async fn start<M, F>(
        &self,
        session: &M,
        identity: &InstanceIdentity,
        shutdown: F,
    ) -> Result<u64>
    where
        M: MonitoringSession,
        F: Future<Output = ()>,
    {
        let handles = device::enumerate(session)?;
        info!("Found {} GPU devices", handles.len());

        Ok(self.run_ticks(&handles, identity, shutdown).await)
    }

    /// Tick until `shutdown` completes. Shutdown is observed before the first
    /// tick and while sleeping; an in-flight tick always finishes first.
    pub async fn run_ticks<H, F>(
        &self,
        handles: &[H],
        identity: &InstanceIdentity,
        shutdown: F,
    ) -> u64
    where
        H: DeviceHandle,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("Shutdown signal received before first tick");
                return 0;
            }
            _ = std::future::ready(()) => {}
        }

        info!(
            "Polling {} devices every {}s",
            handles.len(),
            self.interval.as_secs()
        );

        let mut ticks = 0;
        loop {
            let summary = self.tick(handles, identity).await;
            ticks += 1;
            debug!(
                "Tick {}: {} submitted, {} suppressed, {} failed",
                ticks, summary.submitted, summary.suppressed, summary.failed
            );

            if self.max_ticks.is_some_and(|max| ticks >= max) {
                break;
            }

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        ticks
    }

    /// Collect every device, then publish each sample in device order.
    pub async fn tick<H: DeviceHandle>(
        &self,
        handles: &[H],
        identity: &InstanceIdentity,
    ) -> TickSummary {
        let timestamp = Utc::now();
        let samples = self.collector.collect(handles);

        let mut summary = TickSummary::default();
        for sample in &samples {
            match self.publisher.publish(sample, identity, timestamp).await {
                PublishOutcome::Submitted => summary.submitted += 1,
                PublishOutcome::Suppressed => summary.suppressed += 1,
                PublishOutcome::Failed => summary.failed += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::{MockDevice, MockSession};
    use crate::metrics::sink::RecordingSink;
    use std::sync::atomic::Ordering;

    fn identity() -> InstanceIdentity {
        InstanceIdentity {
            instance_id: "i-0123456789abcdef0".to_string(),
            image_id: "ami-0abcdef1234567890".to_string(),
            instance_type: "p3.8xlarge".to_string(),
            region: "us-west-2".to_string(),
        }
    }

    fn config() -> Config {
        Config::default().validate().unwrap()
    }

    fn gpu_numbers(sink: &RecordingSink) -> Vec<String> {
        sink.batches()
            .iter()
            .map(|b| b.metric_data[0].dimensions[3].value.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_tick_two_healthy_devices() {
        let poll = PollLoop::new(&config(), RecordingSink::new());
        let devices = vec![MockDevice::healthy(), MockDevice::healthy()];

        let summary = poll.tick(&devices, &identity()).await;
        assert_eq!(summary.submitted, 2);

        let sink = poll.publisher().sink();
        assert_eq!(gpu_numbers(sink), vec!["0", "1"]);
        for batch in sink.batches() {
            assert_eq!(batch.datum("Memory Usage").unwrap().value, 75.0);
        }
    }

    #[tokio::test]
    async fn test_tick_suppresses_failed_device() {
        let poll = PollLoop::new(&config(), RecordingSink::new());
        let devices = vec![
            MockDevice::healthy(),
            MockDevice::healthy().failing_temperature("Not supported"),
        ];

        let summary = poll.tick(&devices, &identity()).await;
        assert_eq!(
            summary,
            TickSummary {
                submitted: 1,
                suppressed: 1,
                failed: 0
            }
        );
        assert_eq!(poll.publisher().sink().attempts(), 1);
        assert_eq!(gpu_numbers(poll.publisher().sink()), vec!["0"]);
    }

    #[tokio::test]
    async fn test_tick_survives_transport_failure() {
        let poll = PollLoop::new(&config(), RecordingSink::failing());
        let devices = vec![MockDevice::healthy(), MockDevice::healthy()];

        let summary = poll.tick(&devices, &identity()).await;
        assert_eq!(summary.failed, 2);
        assert_eq!(poll.publisher().sink().attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_are_one_interval_apart() {
        let config = Config {
            interval: Duration::from_secs(10),
            storage_resolution: 60,
            ..config()
        };
        let poll = PollLoop::new(&config, RecordingSink::new());
        let devices = vec![MockDevice::healthy()];

        let ticks = poll
            .run_ticks(&devices, &identity(), tokio::time::sleep(Duration::from_secs(35)))
            .await;
        assert_eq!(ticks, 4);

        let arrivals = poll.publisher().sink().arrivals();
        assert_eq!(arrivals.len(), 4);
        for pair in arrivals.windows(2) {
            assert_eq!(pair[1] - pair[0], Duration::from_secs(10));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_limit_stops_loop() {
        let config = Config {
            max_ticks: Some(1),
            ..config()
        };
        let poll = PollLoop::new(&config, RecordingSink::new());
        let devices = vec![MockDevice::healthy()];

        let ticks = poll
            .run_ticks(&devices, &identity(), std::future::pending())
            .await;
        assert_eq!(ticks, 1);
    }

    #[tokio::test]
    async fn test_signal_during_startup_skips_first_tick() {
        let poll = PollLoop::new(&config(), RecordingSink::new());
        let devices = vec![MockDevice::healthy(), MockDevice::healthy()];

        let ticks = poll
            .run_ticks(&devices, &identity(), std::future::ready(()))
            .await;

        assert_eq!(ticks, 0);
        assert_eq!(poll.publisher().sink().attempts(), 0);
    }

    #[tokio::test]
    async fn test_run_closes_session_when_signalled_before_first_tick() {
        let poll = PollLoop::new(&config(), RecordingSink::new());
        let session = MockSession::new(vec![MockDevice::healthy()]);
        let closed = session.closed_flag();

        let ticks = poll
            .run(session, &identity(), std::future::ready(()))
            .await
            .unwrap();

        assert_eq!(ticks, 0);
        assert!(closed.load(Ordering::SeqCst));
        assert!(poll.publisher().sink().batches().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_shuts_down_session_after_ticks() {
        let config = Config {
            max_ticks: Some(2),
            interval: Duration::from_secs(1),
            ..config()
        };
        let poll = PollLoop::new(&config, RecordingSink::new());
        let session = MockSession::new(vec![MockDevice::healthy(), MockDevice::healthy()]);
        let closed = session.closed_flag();

        let ticks = poll
            .run(session, &identity(), std::future::pending())
            .await
            .unwrap();

        assert_eq!(ticks, 2);
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(gpu_numbers(poll.publisher().sink()), vec!["0", "1", "0", "1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_shuts_down_session_on_signal() {
        let poll = PollLoop::new(&config(), RecordingSink::new());
        let session = MockSession::new(vec![MockDevice::healthy()]);
        let closed = session.closed_flag();

        let ticks = poll
            .run(session, &identity(), tokio::time::sleep(Duration::from_secs(15)))
            .await
            .unwrap();

        assert_eq!(ticks, 2);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_no_devices_is_fatal() {
        let poll = PollLoop::new(&config(), RecordingSink::new());
        let session = MockSession::new(Vec::new());
        let closed = session.closed_flag();

        let result = poll.run(session, &identity(), std::future::pending()).await;

        assert!(matches!(result, Err(crate::GpumonError::NoDevices)));
        assert_eq!(poll.publisher().sink().attempts(), 0);
        assert!(closed.load(Ordering::SeqCst));
    }
}
