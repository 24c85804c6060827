use anyhow::{bail, Result};
use shared::{ComputeDevice, DevicePreference};

/// True when whisper.cpp was built with a GPU backend.
pub const ACCELERATED_BUILD: bool = cfg!(any(feature = "cuda", feature = "hipblas", feature = "metal"));

/// Decides which compute device the model is loaded on.
pub trait ComputeProbe: Send + 'static {
    fn probe(&self) -> Result<ComputeDevice>;
}

impl<F> ComputeProbe for F
where
    F: Fn() -> Result<ComputeDevice> + Send + 'static,
{
    fn probe(&self) -> Result<ComputeDevice> {
        self()
    }
}

/// Resolves the configured preference against the backends compiled in.
pub struct BuildProbe {
    preference: DevicePreference,
    accelerated: bool,
}

impl BuildProbe {
    pub fn new(preference: DevicePreference) -> Self {
        Self {
            preference,
            accelerated: ACCELERATED_BUILD,
        }
    }
}

impl ComputeProbe for BuildProbe {
    fn probe(&self) -> Result<ComputeDevice> {
        match self.preference {
            DevicePreference::Cpu => Ok(ComputeDevice::Cpu),
            DevicePreference::Auto if self.accelerated => Ok(ComputeDevice::Gpu),
            DevicePreference::Auto => Ok(ComputeDevice::Cpu),
            DevicePreference::Gpu if self.accelerated => Ok(ComputeDevice::Gpu),
            DevicePreference::Gpu => bail!("GPU requested but no accelerated backend is built in"),
        }
    }
}
