//! Audio capture backends.
//!
//! Both backends hand back the same thing: one mono `f32` buffer at
//! [`TARGET_SAMPLE_RATE`], whatever the source delivered.

use shared::SampleBuffer;
use thiserror::Error;

pub use shared::TARGET_SAMPLE_RATE;

mod bridge_capture;
mod microphone;
pub mod pcm;
pub mod resample;

pub use bridge_capture::BridgeCapture;
pub use microphone::MicCapture;
pub use resample::{merge_chunks, resample};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("input device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("input device not initialized")]
    NotInitialized,
    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),
    #[error("audio stream error: {0}")]
    Stream(String),
}

/// The capture source chosen at startup.
pub enum CaptureBackend {
    Bridge(BridgeCapture),
    Microphone(MicCapture),
}

impl CaptureBackend {
    pub fn name(&self) -> &'static str {
        match self {
            CaptureBackend::Bridge(_) => "device bridge",
            CaptureBackend::Microphone(_) => "microphone",
        }
    }

    pub fn is_recording(&self) -> bool {
        match self {
            CaptureBackend::Bridge(capture) => capture.is_recording(),
            CaptureBackend::Microphone(capture) => capture.is_recording(),
        }
    }

    pub fn start(&mut self) -> Result<(), CaptureError> {
        match self {
            CaptureBackend::Bridge(capture) => {
                capture.start();
                Ok(())
            }
            CaptureBackend::Microphone(capture) => capture.start(),
        }
    }

    pub async fn get_audio(&self) -> Result<SampleBuffer, CaptureError> {
        match self {
            CaptureBackend::Bridge(capture) => Ok(capture.get_audio()),
            CaptureBackend::Microphone(capture) => capture.get_audio().await,
        }
    }

    pub async fn stop(&mut self) -> Result<SampleBuffer, CaptureError> {
        match self {
            CaptureBackend::Bridge(capture) => Ok(capture.stop()),
            CaptureBackend::Microphone(capture) => capture.stop().await,
        }
    }

    pub fn dispose(&mut self) {
        match self {
            CaptureBackend::Bridge(capture) => {
                capture.stop();
            }
            CaptureBackend::Microphone(capture) => capture.dispose(),
        }
    }
}
