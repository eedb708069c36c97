pub mod collector;
pub mod publisher;
pub mod sink;

pub use collector::{DeviceMetricSample, SampleCollector};
pub use publisher::{MetricBatch, MetricPublisher, PublishOutcome};
pub use sink::{CloudWatchSink, MetricSink, StdoutSink};
