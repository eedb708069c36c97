pub mod cli;
pub mod config;
pub mod device;
pub mod error;
pub mod identity;
pub mod metrics;
pub mod poll;

pub use config::Config;
pub use error::{GpumonError, Result};
pub use identity::InstanceIdentity;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
