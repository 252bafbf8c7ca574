use std::fmt;

use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, ExecutionProvider, ExecutionProviderDispatch,
};

/// Compute device the classifier is pinned to. Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda { device_id: i32 },
}

impl Device {
    /// Prefers the first CUDA device when ONNX Runtime reports the CUDA
    /// execution provider as usable, otherwise falls back to the CPU.
    pub fn select() -> Self {
        match CUDAExecutionProvider::default().is_available() {
            Ok(true) => Device::Cuda { device_id: 0 },
            Ok(false) => Device::Cpu,
            Err(e) => {
                tracing::warn!("could not query CUDA availability, using CPU: {e}");
                Device::Cpu
            }
        }
    }

    pub fn is_accelerator(&self) -> bool {
        matches!(self, Device::Cuda { .. })
    }

    pub(crate) fn execution_provider(&self) -> ExecutionProviderDispatch {
        match *self {
            Device::Cuda { device_id } => CUDAExecutionProvider::default()
                .with_device_id(device_id)
                .build()
                .error_on_failure(),
            Device::Cpu => CPUExecutionProvider::default().build(),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda { device_id } => write!(f, "cuda:{device_id}"),
        }
    }
}
