//! In-memory monitoring session with scripted readings

use super::{DeviceHandle, MonitoringSession, RawMemoryInfo};
use crate::{GpumonError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Scripted device: every read returns the same value or error each tick.
#[derive(Debug, Clone)]
pub struct MockDevice {
    index: u32,
    power: std::result::Result<u32, String>,
    temperature: std::result::Result<u32, String>,
    memory: std::result::Result<RawMemoryInfo, String>,
}

impl MockDevice {
    /// 45.32 W, 63 °C, 6 MB of 8 MB used.
    pub fn healthy() -> Self {
        Self {
            index: 0,
            power: Ok(45_320),
            temperature: Ok(63),
            memory: Ok(RawMemoryInfo {
                free: 2_000_000,
                total: 8_000_000,
                used: 6_000_000,
            }),
        }
    }

    pub fn with_power(mut self, milliwatts: u32) -> Self {
        self.power = Ok(milliwatts);
        self
    }

    pub fn with_temperature(mut self, celsius: u32) -> Self {
        self.temperature = Ok(celsius);
        self
    }

    pub fn with_memory(mut self, free: u64, total: u64, used: u64) -> Self {
        self.memory = Ok(RawMemoryInfo { free, total, used });
        self
    }

    pub fn failing_power(mut self, reason: &str) -> Self {
        self.power = Err(reason.to_string());
        self
    }

    pub fn failing_temperature(mut self, reason: &str) -> Self {
        self.temperature = Err(reason.to_string());
        self
    }

    pub fn failing_memory(mut self, reason: &str) -> Self {
        self.memory = Err(reason.to_string());
        self
    }

    pub fn index(&self) -> u32 {
        self.index
    }
}

impl DeviceHandle for MockDevice {
    type Error = String;

    fn power_milliwatts(&self) -> std::result::Result<u32, String> {
        self.power.clone()
    }

    fn gpu_temperature(&self) -> std::result::Result<u32, String> {
        self.temperature.clone()
    }

    fn memory(&self) -> std::result::Result<RawMemoryInfo, String> {
        self.memory.clone()
    }
}

pub struct MockSession {
    devices: Vec<MockDevice>,
    count_error: Option<String>,
    closed: Arc<AtomicBool>,
}

impl MockSession {
    pub fn new(devices: Vec<MockDevice>) -> Self {
        let devices = devices
            .into_iter()
            .enumerate()
            .map(|(index, mut device)| {
                device.index = index as u32;
                device
            })
            .collect();

        Self {
            devices,
            count_error: None,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn failing_count(mut self, reason: &str) -> Self {
        self.count_error = Some(reason.to_string());
        self
    }

    /// Flag that flips once [`MonitoringSession::shutdown`] has run.
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        self.closed.clone()
    }
}

impl MonitoringSession for MockSession {
    type Handle<'s> = &'s MockDevice;

    fn device_count(&self) -> Result<u32> {
        match &self.count_error {
            Some(reason) => Err(GpumonError::Session(reason.clone())),
            None => Ok(self.devices.len() as u32),
        }
    }

    fn handle_by_index(&self, index: u32) -> Result<Self::Handle<'_>> {
        self.devices
            .get(index as usize)
            .ok_or_else(|| GpumonError::Session(format!("No device at index {}", index)))
    }

    fn shutdown(self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
