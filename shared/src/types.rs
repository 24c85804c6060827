use serde::{Deserialize, Serialize};
use std::fmt;

/// Rate every buffer leaving a capture backend is delivered at.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// 0.1 s at the target rate.
pub const MIN_UTTERANCE_SAMPLES: usize = 1_600;

/// Mono float32 samples in [-1.0, 1.0].
pub type SampleBuffer = Vec<f32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordingStatus {
    Idle,
    Recording,
    Transcribing,
}

impl RecordingStatus {
    pub fn label(&self) -> &'static str {
        match self {
            RecordingStatus::Idle => "Ready",
            RecordingStatus::Recording => "Recording",
            RecordingStatus::Transcribing => "Transcribing",
        }
    }
}

/// Compute backend the recognizer runs inference on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeDevice {
    Gpu,
    Cpu,
}

impl ComputeDevice {
    pub fn id(&self) -> &'static str {
        match self {
            ComputeDevice::Gpu => "gpu",
            ComputeDevice::Cpu => "cpu",
        }
    }

    pub fn is_accelerated(&self) -> bool {
        matches!(self, ComputeDevice::Gpu)
    }
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Seconds of audio represented by `samples` at the target rate.
pub fn duration_secs(samples: usize) -> f32 {
    samples as f32 / TARGET_SAMPLE_RATE as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_utterance_is_a_tenth_of_a_second() {
        assert!((duration_secs(MIN_UTTERANCE_SAMPLES) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn device_ids() {
        assert_eq!(ComputeDevice::Gpu.id(), "gpu");
        assert_eq!(ComputeDevice::Cpu.to_string(), "cpu");
        assert!(!ComputeDevice::Cpu.is_accelerated());
    }
}
