use std::fmt;
use thiserror::Error;

/// A single reading taken from a device each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Power,
    Temperature,
    Memory,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Power => "power",
            Metric::Temperature => "temperature",
            Metric::Memory => "memory",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum GpumonError {
    #[error("{metric} unavailable: {reason}")]
    Unavailable { metric: Metric, reason: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Metadata lookup failed for {path}: {reason}")]
    Metadata { path: String, reason: String },

    #[error("Device monitoring session error: {0}")]
    Session(String),

    #[error("No GPU devices found")]
    NoDevices,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl GpumonError {
    pub fn unavailable(metric: Metric, reason: impl fmt::Display) -> Self {
        GpumonError::Unavailable {
            metric,
            reason: reason.to_string(),
        }
    }

    /// True for failures that only affect a single reading.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, GpumonError::Unavailable { .. })
    }
}

pub type Result<T> = std::result::Result<T, GpumonError>;
