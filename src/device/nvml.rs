//! NVML (NVIDIA Management Library) backend

use super::{DeviceHandle, MonitoringSession, RawMemoryInfo};
use crate::{GpumonError, Result};
use nvml_wrapper::enum_wrappers::device::TemperatureSensor;
use nvml_wrapper::error::NvmlError;
use nvml_wrapper::{Device, Nvml};
use tracing::{debug, info};

pub struct NvmlSession {
    nvml: Nvml,
}

impl NvmlSession {
    /// Load the NVML library and initialize it.
    pub fn init() -> Result<Self> {
        debug!("Initializing NVML");

        let nvml = Nvml::init()
            .map_err(|e| GpumonError::Session(format!("Failed to initialize NVML: {}", e)))?;

        match nvml.sys_driver_version() {
            Ok(version) => info!("NVML initialized, driver version {}", version),
            Err(e) => info!("NVML initialized, driver version unknown: {}", e),
        }

        Ok(Self { nvml })
    }
}

impl MonitoringSession for NvmlSession {
    type Handle<'s> = Device<'s>;

    fn device_count(&self) -> Result<u32> {
        self.nvml
            .device_count()
            .map_err(|e| GpumonError::Session(format!("Failed to count devices: {}", e)))
    }

    fn handle_by_index(&self, index: u32) -> Result<Self::Handle<'_>> {
        self.nvml.device_by_index(index).map_err(|e| {
            GpumonError::Session(format!("Failed to get handle for device {}: {}", index, e))
        })
    }

    fn shutdown(self) -> Result<()> {
        debug!("Shutting down NVML");
        self.nvml
            .shutdown()
            .map_err(|e| GpumonError::Session(format!("Failed to shut down NVML: {}", e)))
    }
}

impl DeviceHandle for Device<'_> {
    type Error = NvmlError;

    fn power_milliwatts(&self) -> std::result::Result<u32, NvmlError> {
        self.power_usage()
    }

    fn gpu_temperature(&self) -> std::result::Result<u32, NvmlError> {
        self.temperature(TemperatureSensor::Gpu)
    }

    fn memory(&self) -> std::result::Result<RawMemoryInfo, NvmlError> {
        let info = self.memory_info()?;
        Ok(RawMemoryInfo {
            free: info.free,
            total: info.total,
            used: info.used,
        })
    }
}
