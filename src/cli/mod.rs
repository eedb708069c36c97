pub mod commands;

use crate::config::{
    Config, DEFAULT_INTERVAL_SECS, DEFAULT_METADATA_URL, DEFAULT_NAMESPACE,
    DEFAULT_STORAGE_RESOLUTION,
};
use crate::Result;
use clap::Parser;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "gpumon")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Publish NVIDIA GPU power, temperature and memory metrics to CloudWatch", long_about = None)]
pub struct Cli {
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, default_value = DEFAULT_NAMESPACE, help = "CloudWatch namespace")]
    pub namespace: String,

    #[arg(short, long, default_value_t = DEFAULT_INTERVAL_SECS, help = "Seconds between polls")]
    pub interval: u64,

    #[arg(
        short,
        long,
        default_value_t = DEFAULT_STORAGE_RESOLUTION,
        help = "CloudWatch storage resolution in seconds (1-60)"
    )]
    pub storage_resolution: i32,

    #[arg(long, default_value = DEFAULT_METADATA_URL, help = "Instance metadata base URL")]
    pub metadata_url: String,

    #[arg(long, help = "CloudWatch region (defaults to the instance's region)")]
    pub region: Option<String>,

    #[arg(long, help = "Print metric batches as JSON instead of submitting them")]
    pub dry_run: bool,

    #[arg(long, help = "Collect and publish once, then exit")]
    pub once: bool,
}

impl Cli {
    pub fn into_config(self) -> Result<Config> {
        Config {
            namespace: self.namespace,
            interval: Duration::from_secs(self.interval),
            storage_resolution: self.storage_resolution,
            metadata_url: self.metadata_url,
            region: self.region,
            dry_run: self.dry_run,
            max_ticks: self.once.then_some(1),
        }
        .validate()
    }
}
