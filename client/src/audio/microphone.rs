use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleFormat, Stream, StreamConfig};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use shared::{AudioConfig, SampleBuffer, TARGET_SAMPLE_RATE};
use std::sync::Arc;

use super::pcm::append_downmixed;
use super::resample::{merge_chunks, resample};
use super::CaptureError;

type Chunks = Arc<Mutex<Vec<Vec<f32>>>>;

/// Records from a local input device at whatever rate it runs natively and
/// resamples to the target rate when audio is collected.
pub struct MicCapture {
    config: AudioConfig,
    device: Option<Device>,
    stream: Option<Stream>,
    native_rate: u32,
    chunks: Chunks,
}

impl MicCapture {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            config: config.clone(),
            device: None,
            stream: None,
            native_rate: TARGET_SAMPLE_RATE,
            chunks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Acquires the configured input device, or the system default.
    pub fn init(&mut self) -> Result<(), CaptureError> {
        let host = cpal::default_host();

        let device = if let Some(device_name) = &self.config.device {
            host.input_devices()
                .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?
                .find(|d| d.name().map(|n| n == *device_name).unwrap_or(false))
                .ok_or_else(|| {
                    CaptureError::DeviceUnavailable(format!("audio device '{}' not found", device_name))
                })?
        } else {
            host.default_input_device().ok_or_else(|| {
                CaptureError::DeviceUnavailable("no default input device available".to_string())
            })?
        };

        // Querying the config is where a denied or busy device surfaces
        let supported = device
            .default_input_config()
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

        info!(
            "Using audio device: {} ({} Hz, {} channels)",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            supported.sample_rate().0,
            supported.channels()
        );
        debug!("Echo cancellation requested; not available through this host, capturing raw input");

        self.device = Some(device);
        Ok(())
    }

    pub fn is_recording(&self) -> bool {
        self.stream.is_some()
    }

    pub fn start(&mut self) -> Result<(), CaptureError> {
        self.teardown_stream();
        self.chunks.lock().clear();

        let device = self.device.as_ref().ok_or(CaptureError::NotInitialized)?;
        let supported = device
            .default_input_config()
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;
        let native_rate = supported.sample_rate().0;
        let format = supported.sample_format();

        let config = StreamConfig {
            channels: supported.channels(),
            sample_rate: supported.sample_rate(),
            buffer_size: BufferSize::Fixed(self.config.block_size),
        };
        info!("Audio config: {:?} ({:?})", config, format);

        let stream = match build_stream(device, &config, format, &self.chunks) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(
                    "Block size {} rejected ({}), using host default",
                    self.config.block_size, e
                );
                let config = StreamConfig {
                    buffer_size: BufferSize::Default,
                    ..config
                };
                build_stream(device, &config, format, &self.chunks)?
            }
        };
        stream
            .play()
            .map_err(|e| CaptureError::Stream(e.to_string()))?;

        self.native_rate = native_rate;
        self.stream = Some(stream);
        info!("Microphone capture started at {} Hz", native_rate);
        Ok(())
    }

    /// Everything captured so far at the target rate; recording continues.
    pub async fn get_audio(&self) -> Result<SampleBuffer, CaptureError> {
        let chunks = self.chunks.lock().clone();
        finish(chunks, self.native_rate).await
    }

    pub async fn stop(&mut self) -> Result<SampleBuffer, CaptureError> {
        self.teardown_stream();
        let chunks = std::mem::take(&mut *self.chunks.lock());
        debug!("Microphone capture stopped with {} blocks", chunks.len());
        finish(chunks, self.native_rate).await
    }

    /// Releases the stream and the device. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        self.teardown_stream();
        self.chunks.lock().clear();
        if self.device.take().is_some() {
            info!("Audio device released");
        }
    }

    fn teardown_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                debug!("Failed to pause input stream: {}", e);
            }
        }
    }

    pub fn list_input_devices() -> anyhow::Result<Vec<String>> {
        let host = cpal::default_host();
        let devices: Result<Vec<String>, _> = host
            .input_devices()?
            .map(|device| device.name().map_err(|e| e.into()))
            .collect();
        devices
    }
}

impl Drop for MicCapture {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn finish(chunks: Vec<Vec<f32>>, native_rate: u32) -> Result<SampleBuffer, CaptureError> {
    tokio::task::spawn_blocking(move || {
        resample(&merge_chunks(&chunks), native_rate, TARGET_SAMPLE_RATE)
    })
    .await
    .map_err(|e| CaptureError::Stream(format!("resample task failed: {}", e)))
}

fn build_stream(
    device: &Device,
    config: &StreamConfig,
    format: SampleFormat,
    chunks: &Chunks,
) -> Result<Stream, CaptureError> {
    match format {
        SampleFormat::I8 => create_stream::<i8>(device, config, chunks),
        SampleFormat::I16 => create_stream::<i16>(device, config, chunks),
        SampleFormat::I32 => create_stream::<i32>(device, config, chunks),
        SampleFormat::U8 => create_stream::<u8>(device, config, chunks),
        SampleFormat::U16 => create_stream::<u16>(device, config, chunks),
        SampleFormat::U32 => create_stream::<u32>(device, config, chunks),
        SampleFormat::F32 => create_stream::<f32>(device, config, chunks),
        SampleFormat::F64 => create_stream::<f64>(device, config, chunks),
        other => Err(CaptureError::UnsupportedFormat(format!("{:?}", other))),
    }
}

fn create_stream<T>(device: &Device, config: &StreamConfig, chunks: &Chunks) -> Result<Stream, CaptureError>
where
    T: cpal::Sample + cpal::SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    let channels = usize::from(config.channels);
    let chunks = Arc::clone(chunks);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                // The host reuses `data` after we return
                let mut block = Vec::with_capacity(data.len() / channels.max(1));
                append_downmixed(&mut block, data, channels, |sample| {
                    cpal::Sample::to_sample::<f32>(sample)
                });
                chunks.lock().push(block);
            },
            move |err| {
                error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| CaptureError::Stream(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mic() -> MicCapture {
        MicCapture::new(&AudioConfig::default())
    }

    #[test]
    fn start_requires_init() {
        let mut capture = mic();
        assert!(matches!(capture.start(), Err(CaptureError::NotInitialized)));
        assert!(!capture.is_recording());
    }

    #[tokio::test]
    async fn stop_without_start_is_empty() {
        let mut capture = mic();
        assert!(capture.stop().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn collected_blocks_are_resampled_to_target() {
        let mut capture = mic();
        capture.native_rate = 48_000;
        capture.chunks.lock().push(vec![0.25; 2_400]);
        capture.chunks.lock().push(vec![-0.25; 2_400]);

        let peek = capture.get_audio().await.unwrap();
        assert_eq!(peek.len(), 1_600);

        let audio = capture.stop().await.unwrap();
        assert_eq!(audio.len(), 1_600);
        assert_eq!(audio[0], 0.25);
        assert_eq!(audio[1_599], -0.25);
        assert!(capture.chunks.lock().is_empty());
    }

    #[test]
    fn dispose_is_idempotent() {
        let mut capture = mic();
        capture.chunks.lock().push(vec![0.0; 10]);
        capture.dispose();
        capture.dispose();
        assert!(capture.chunks.lock().is_empty());
        assert!(matches!(capture.start(), Err(CaptureError::NotInitialized)));
    }
}
