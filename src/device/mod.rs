//! Native device monitoring seam and per-metric readers.
//!
//! A [`MonitoringSession`] is opened once and hands out one handle per
//! device. The `read_*` functions turn any native failure into
//! [`GpumonError::Unavailable`] for that metric only.

pub mod nvml;

#[cfg(any(feature = "mock", test))]
pub mod mock;

use crate::error::Metric;
use crate::{GpumonError, Result};
use std::fmt;

pub use nvml::NvmlSession;

/// Memory counters as reported by the driver, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawMemoryInfo {
    pub free: u64,
    pub total: u64,
    pub used: u64,
}

/// Per-device queries exposed by the native library.
pub trait DeviceHandle {
    type Error: fmt::Display;

    /// Instantaneous board power draw in milliwatts.
    fn power_milliwatts(&self) -> std::result::Result<u32, Self::Error>;

    /// GPU die temperature in degrees Celsius.
    fn gpu_temperature(&self) -> std::result::Result<u32, Self::Error>;

    fn memory(&self) -> std::result::Result<RawMemoryInfo, Self::Error>;
}

impl<T: DeviceHandle + ?Sized> DeviceHandle for &T {
    type Error = T::Error;

    fn power_milliwatts(&self) -> std::result::Result<u32, Self::Error> {
        (**self).power_milliwatts()
    }

    fn gpu_temperature(&self) -> std::result::Result<u32, Self::Error> {
        (**self).gpu_temperature()
    }

    fn memory(&self) -> std::result::Result<RawMemoryInfo, Self::Error> {
        (**self).memory()
    }
}

/// An open connection to the native monitoring library.
///
/// Handles borrow the session, so every handle must be dropped before
/// [`MonitoringSession::shutdown`] consumes it.
pub trait MonitoringSession {
    type Handle<'s>: DeviceHandle
    where
        Self: 's;

    fn device_count(&self) -> Result<u32>;

    fn handle_by_index(&self, index: u32) -> Result<Self::Handle<'_>>;

    fn shutdown(self) -> Result<()>;
}

/// Obtain one handle per device, in index order.
///
/// Fails if the count cannot be read, no devices are present, or any
/// handle lookup fails.
pub fn enumerate<M: MonitoringSession>(session: &M) -> Result<Vec<M::Handle<'_>>> {
    let count = session.device_count()?;
    if count == 0 {
        return Err(GpumonError::NoDevices);
    }

    (0..count)
        .map(|index| session.handle_by_index(index))
        .collect()
}

/// Derived memory usage for one device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryUsage {
    pub free: u64,
    pub total: u64,
    pub used: u64,
    pub used_percent: f64,
}

pub fn read_power<H: DeviceHandle>(handle: &H) -> Result<f64> {
    handle
        .power_milliwatts()
        .map(|milliwatts| f64::from(milliwatts) / 1000.0)
        .map_err(|e| GpumonError::unavailable(Metric::Power, e))
}

pub fn read_temperature<H: DeviceHandle>(handle: &H) -> Result<u32> {
    handle
        .gpu_temperature()
        .map_err(|e| GpumonError::unavailable(Metric::Temperature, e))
}

pub fn read_memory<H: DeviceHandle>(handle: &H) -> Result<MemoryUsage> {
    let info = handle
        .memory()
        .map_err(|e| GpumonError::unavailable(Metric::Memory, e))?;

    if info.total == 0 {
        return Err(GpumonError::unavailable(
            Metric::Memory,
            "driver reported zero total memory",
        ));
    }

    Ok(MemoryUsage {
        free: info.free,
        total: info.total,
        used: info.used,
        used_percent: info.used as f64 / info.total as f64 * 100.0,
    })
}
