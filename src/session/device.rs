use crate::config::{USEGPU_COREML, USEGPU_CPU, USEGPU_CUDA, USEGPU_DML, USEGPU_TENSORRT};
use std::fmt;
use std::str::FromStr;

/// Execution device selected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Device {
    Cpu,
    Cuda,
    TensorRt,
    DirectMl,
    CoreMl,
}

impl Device {
    pub fn name(self) -> &'static str {
        match self {
            Device::Cpu => USEGPU_CPU,
            Device::Cuda => USEGPU_CUDA,
            Device::TensorRt => USEGPU_TENSORRT,
            Device::DirectMl => USEGPU_DML,
            Device::CoreMl => USEGPU_COREML,
        }
    }

    pub fn is_accelerator(self) -> bool {
        self != Device::Cpu
    }

    /// Devices offered on the current platform, CPU first.
    pub fn available() -> Vec<Device> {
        let mut devices = vec![Device::Cpu];
        if cfg!(all(target_os = "linux", target_arch = "x86_64")) {
            devices.push(Device::TensorRt);
            devices.push(Device::Cuda);
        }
        if cfg!(target_os = "windows") {
            devices.push(Device::DirectMl);
        }
        if cfg!(target_os = "macos") {
            devices.push(Device::CoreMl);
        }
        devices
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            USEGPU_CPU => Ok(Device::Cpu),
            USEGPU_CUDA => Ok(Device::Cuda),
            USEGPU_TENSORRT => Ok(Device::TensorRt),
            USEGPU_DML | "directml" => Ok(Device::DirectMl),
            USEGPU_COREML => Ok(Device::CoreMl),
            other => Err(format!("unknown inference device {other:?}")),
        }
    }
}

/// Session builder options derived from the device and thread count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendOptions {
    pub device: Device,
    pub inter_threads: Option<usize>,
    pub intra_threads: Option<usize>,
    pub memory_pattern: bool,
    pub sequential: bool,
}

impl BackendOptions {
    /// CPU gets explicit thread counts. Accelerators get memory-pattern
    /// optimisation disabled and strictly sequential execution.
    pub fn for_device(device: Device, threads: u32) -> Self {
        if device.is_accelerator() {
            Self {
                device,
                inter_threads: None,
                intra_threads: None,
                memory_pattern: false,
                sequential: true,
            }
        } else {
            Self {
                device,
                inter_threads: Some(threads as usize),
                intra_threads: Some(threads as usize),
                memory_pattern: true,
                sequential: false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_devices() {
        assert_eq!("cpu".parse::<Device>(), Ok(Device::Cpu));
        assert_eq!("TensorRT".parse::<Device>(), Ok(Device::TensorRt));
        assert_eq!("directml".parse::<Device>(), Ok(Device::DirectMl));
        assert!("npu".parse::<Device>().is_err());
        assert_eq!(Device::available()[0], Device::Cpu);
    }

    #[test]
    fn cpu_options_set_threads() {
        let opts = BackendOptions::for_device(Device::Cpu, 4);
        assert_eq!(opts.inter_threads, Some(4));
        assert_eq!(opts.intra_threads, Some(4));
        assert!(opts.memory_pattern);
        assert!(!opts.sequential);
    }

    #[test]
    fn accelerator_options_are_sequential() {
        let opts = BackendOptions::for_device(Device::Cuda, 4);
        assert_eq!(opts.inter_threads, None);
        assert!(!opts.memory_pattern);
        assert!(opts.sequential);
    }
}
