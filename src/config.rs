use crate::{GpumonError, Result};
use std::time::Duration;

pub const DEFAULT_NAMESPACE: &str = "OmnisciGPU";
pub const DEFAULT_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_STORAGE_RESOLUTION: i32 = 60;
pub const DEFAULT_METADATA_URL: &str = "http://169.254.169.254/latest/meta-data/";

/// Valid CloudWatch storage resolutions, in seconds.
pub const STORAGE_RESOLUTION_RANGE: std::ops::RangeInclusive<i32> = 1..=60;

/// Runtime settings for one collector process.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub namespace: String,
    pub interval: Duration,
    pub storage_resolution: i32,
    pub metadata_url: String,
    /// Overrides the region derived from the availability zone.
    pub region: Option<String>,
    pub dry_run: bool,
    /// Stop after this many ticks; `None` runs until a shutdown signal.
    pub max_ticks: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            storage_resolution: DEFAULT_STORAGE_RESOLUTION,
            metadata_url: DEFAULT_METADATA_URL.to_string(),
            region: None,
            dry_run: false,
            max_ticks: None,
        }
    }
}

impl Config {
    pub fn validate(mut self) -> Result<Self> {
        if self.namespace.trim().is_empty() {
            return Err(GpumonError::Config("namespace must not be empty".to_string()));
        }

        if self.interval.is_zero() {
            return Err(GpumonError::Config(
                "poll interval must be at least one second".to_string(),
            ));
        }

        if !STORAGE_RESOLUTION_RANGE.contains(&self.storage_resolution) {
            return Err(GpumonError::Config(format!(
                "storage resolution {} is outside {}..={}",
                self.storage_resolution,
                STORAGE_RESOLUTION_RANGE.start(),
                STORAGE_RESOLUTION_RANGE.end()
            )));
        }

        if self.metadata_url.trim().is_empty() {
            return Err(GpumonError::Config("metadata URL must not be empty".to_string()));
        }
        if !self.metadata_url.ends_with('/') {
            self.metadata_url.push('/');
        }

        if let Some(region) = &self.region {
            if region.trim().is_empty() {
                return Err(GpumonError::Config("region must not be empty".to_string()));
            }
        }

        if self.max_ticks == Some(0) {
            return Err(GpumonError::Config("tick limit must be positive".to_string()));
        }

        Ok(self)
    }
}
