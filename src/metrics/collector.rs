use crate::device::{self, DeviceHandle, MemoryUsage};
use crate::Result;
use std::fmt;
use tracing::{error, info, warn};

/// Readings for one device in one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceMetricSample {
    pub device_index: u32,
    pub power_watts: Option<f64>,
    pub temperature_celsius: Option<u32>,
    pub memory: Option<MemoryUsage>,
    /// False when any of the three reads failed.
    pub valid: bool,
}

impl DeviceMetricSample {
    pub fn new(
        device_index: u32,
        power: Result<f64>,
        temperature: Result<u32>,
        memory: Result<MemoryUsage>,
    ) -> Self {
        let power_watts = keep_reading(device_index, power);
        let temperature_celsius = keep_reading(device_index, temperature);
        let memory = keep_reading(device_index, memory);
        let valid = power_watts.is_some() && temperature_celsius.is_some() && memory.is_some();

        Self {
            device_index,
            power_watts,
            temperature_celsius,
            memory,
            valid,
        }
    }
}

fn keep_reading<T>(device_index: u32, reading: Result<T>) -> Option<T> {
    match reading {
        Ok(value) => Some(value),
        Err(e) if e.is_unavailable() => {
            warn!("GPU {}: {}", device_index, e);
            None
        }
        Err(e) => {
            error!("GPU {}: {}", device_index, e);
            None
        }
    }
}

impl fmt::Display for DeviceMetricSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GPU {}:", self.device_index)?;
        match self.power_watts {
            Some(watts) => write!(f, " power={:.2}W", watts)?,
            None => write!(f, " power=n/a")?,
        }
        match self.temperature_celsius {
            Some(celsius) => write!(f, " temp={}C", celsius)?,
            None => write!(f, " temp=n/a")?,
        }
        match &self.memory {
            Some(m) => write!(
                f,
                " free={} total={} used={} usage={:.2}%",
                m.free, m.total, m.used, m.used_percent
            ),
            None => write!(f, " memory=n/a"),
        }
    }
}

/// Reads every device once per tick.
#[derive(Debug, Default, Clone, Copy)]
pub struct SampleCollector;

impl SampleCollector {
    pub fn new() -> Self {
        Self
    }

    /// One sample per handle, in handle order. Handle `i` is device `i`.
    pub fn collect<H: DeviceHandle>(&self, handles: &[H]) -> Vec<DeviceMetricSample> {
        handles
            .iter()
            .enumerate()
            .map(|(index, handle)| {
                let sample = DeviceMetricSample::new(
                    index as u32,
                    device::read_power(handle),
                    device::read_temperature(handle),
                    device::read_memory(handle),
                );
                info!("{}", sample);
                sample
            })
            .collect()
    }
}
