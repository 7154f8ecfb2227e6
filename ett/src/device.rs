//! GPU status querying and compute device selection.
//!
//! Counters come from NVML; selection is a pure function over the queried
//! status so it can be exercised without hardware.

use candle_core::Device;
use nvml_wrapper::error::NvmlError;
use nvml_wrapper::Nvml;
use std::fmt;

use crate::error::DeviceQueryError;

/// Devices with less free memory than this (in MB) are not worth using.
pub const DEFAULT_MIN_MEMORY_MB: u64 = 1024;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Counters for a single GPU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuStatus {
    pub index: usize,
    pub name: String,
    /// Percent of time a kernel was running over the last sample period.
    pub utilization_gpu: u32,
    /// Percent of time device memory was being read or written.
    pub utilization_memory: u32,
    pub memory_total: u64,
    pub memory_free: u64,
    pub memory_used: u64,
}

/// Snapshot of every GPU on the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuStat {
    pub device_count: usize,
    pub gpus: Vec<GpuStatus>,
    /// Set when NVML could not be queried. `gpus` is empty in that case.
    pub error: Option<DeviceQueryError>,
}

impl GpuStat {
    fn failed(device_count: usize, err: NvmlError) -> Self {
        Self {
            device_count,
            gpus: Vec::new(),
            error: Some(DeviceQueryError(err.to_string())),
        }
    }

    /// The device with the most free memory, first one on ties.
    pub fn most_idle(&self) -> Option<&GpuStatus> {
        self.gpus.iter().fold(None, |best, gpu| match best {
            Some(b) if b.memory_free >= gpu.memory_free => Some(b),
            _ => Some(gpu),
        })
    }

    pub fn log(&self) {
        if let Some(err) = &self.error {
            log::warn!("{} ({} CUDA device(s) found)", err, self.device_count);
            return;
        }

        log::info!("Found {} GPU(s)", self.device_count);
        for gpu in &self.gpus {
            log::info!(
                "[{}] {} | {:>3}% util, {:>3}% mem util | {} / {} MB used, {} MB free",
                gpu.index,
                gpu.name,
                gpu.utilization_gpu,
                gpu.utilization_memory,
                gpu.memory_used / BYTES_PER_MB,
                gpu.memory_total / BYTES_PER_MB,
                gpu.memory_free / BYTES_PER_MB,
            );
        }
    }
}

/// Returns the status of every GPU, or `None` if no CUDA device is usable.
///
/// The device count comes from the CUDA driver, so it stays valid when NVML
/// is missing. NVML failures are not returned as errors; they are reported
/// in [`GpuStat::error`].
pub fn gpustat() -> Option<GpuStat> {
    let device_count = cuda_device_count();
    if device_count < 1 {
        return None;
    }

    let nvml = match Nvml::init() {
        Ok(nvml) => nvml,
        Err(e) => return Some(GpuStat::failed(device_count, e)),
    };

    match query_devices(&nvml, device_count) {
        Ok(gpus) => Some(GpuStat {
            device_count,
            gpus,
            error: None,
        }),
        Err(e) => Some(GpuStat::failed(device_count, e)),
    }
}

#[cfg(feature = "cuda")]
fn cuda_device_count() -> usize {
    use candle_core::cuda_backend::cudarc::driver::result;

    match result::init().and_then(|_| result::device::get_count()) {
        Ok(count) => count.max(0) as usize,
        Err(e) => {
            log::debug!("CUDA driver unavailable: {:?}", e);
            0
        }
    }
}

#[cfg(not(feature = "cuda"))]
fn cuda_device_count() -> usize {
    0
}

fn query_devices(nvml: &Nvml, device_count: usize) -> Result<Vec<GpuStatus>, NvmlError> {
    (0..device_count)
        .map(|index| -> Result<GpuStatus, NvmlError> {
            let device = nvml.device_by_index(index as u32)?;
            let memory = device.memory_info()?;
            let utilization = device.utilization_rates()?;

            Ok(GpuStatus {
                index,
                name: device.name()?,
                utilization_gpu: utilization.gpu,
                utilization_memory: utilization.memory,
                memory_total: memory.total,
                memory_free: memory.free,
                memory_used: memory.used,
            })
        })
        .collect()
}

/// Where training should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Cpu,
    Cuda(usize),
    Metal(usize),
}

impl Selection {
    pub fn device(self) -> candle_core::Result<Device> {
        match self {
            Selection::Cpu => Ok(Device::Cpu),
            Selection::Cuda(ordinal) => Device::new_cuda(ordinal),
            Selection::Metal(ordinal) => Device::new_metal(ordinal),
        }
    }

    /// Like [`Selection::device`], but falls back to the CPU if the device
    /// cannot be created.
    pub fn device_or_cpu(self) -> Device {
        match self.device() {
            Ok(device) => device,
            Err(e) => {
                log::warn!("Could not create {} device, using cpu: {}", self, e);
                Device::Cpu
            }
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::Cpu => write!(f, "cpu"),
            Selection::Cuda(ordinal) => write!(f, "cuda:{}", ordinal),
            Selection::Metal(ordinal) => write!(f, "metal:{}", ordinal),
        }
    }
}

/// Picks a device from a queried status.
///
/// A valid `prefer` ordinal always wins. Otherwise the GPU with the most
/// free memory is used, unless it has less than `min_memory_mb` free.
/// Without CUDA devices, a Metal build picks the first Metal device.
pub fn select(stat: Option<&GpuStat>, prefer: Option<usize>, min_memory_mb: u64) -> Selection {
    let metal = candle_core::utils::metal_is_available();
    select_for(stat, metal, prefer, min_memory_mb)
}

fn select_for(
    stat: Option<&GpuStat>,
    metal: bool,
    prefer: Option<usize>,
    min_memory_mb: u64,
) -> Selection {
    let Some(stat) = stat.filter(|s| s.device_count >= 1) else {
        return if metal {
            Selection::Metal(0)
        } else {
            Selection::Cpu
        };
    };

    if let Some(ordinal) = prefer.filter(|&p| p < stat.device_count) {
        return Selection::Cuda(ordinal);
    }

    let Some(gpu) = stat.most_idle() else {
        return Selection::Cuda(0);
    };

    if gpu.memory_free < min_memory_mb.saturating_mul(BYTES_PER_MB) {
        return Selection::Cpu;
    }

    Selection::Cuda(gpu.index)
}

/// Returns the best compute device: the preferred CUDA ordinal if valid,
/// otherwise the most idle GPU, falling back to CPU.
pub fn auto_selection(prefer: Option<usize>, min_memory_mb: u64) -> Device {
    let stat = gpustat();
    let selection = select(stat.as_ref(), prefer, min_memory_mb);

    let device = selection.device_or_cpu();
    if device.is_cpu() {
        log::info!("Using CPU device");
    } else {
        log::info!("Using {} device", selection);
    }
    device
}
