use log::{debug, info, warn};
use parking_lot::Mutex;
use shared::{BridgeEvent, SampleBuffer, TARGET_SAMPLE_RATE};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::pcm::pcm16le_to_f32;
use super::resample::{merge_chunks, resample};
use crate::bridge::{DeviceBridge, ListenerId};

#[derive(Default)]
struct FrameSession {
    recording: AtomicBool,
    chunks: Mutex<Vec<Vec<f32>>>,
}

impl FrameSession {
    fn push_frame(&self, pcm: &[u8]) {
        if !self.recording.load(Ordering::Acquire) {
            return;
        }
        let samples = pcm16le_to_f32(pcm);
        self.chunks.lock().push(samples);
    }
}

/// Records the PCM frames the device bridge pushes while recording is on.
///
/// `stop()` without a prior `start()` returns an empty buffer and sends
/// nothing to the bridge.
pub struct BridgeCapture {
    bridge: Arc<dyn DeviceBridge>,
    frame_rate: u32,
    session: Arc<FrameSession>,
    subscription: Option<ListenerId>,
}

impl BridgeCapture {
    pub fn new(bridge: Arc<dyn DeviceBridge>, frame_rate: u32) -> Self {
        Self {
            bridge,
            frame_rate,
            session: Arc::new(FrameSession::default()),
            subscription: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.session.recording.load(Ordering::Acquire)
    }

    pub fn start(&mut self) {
        self.unsubscribe();
        self.session.chunks.lock().clear();
        self.session.recording.store(true, Ordering::Release);

        let session = Arc::clone(&self.session);
        let id = self.bridge.on_event(Arc::new(move |event| {
            if let BridgeEvent::Audio(pcm) = event {
                session.push_frame(pcm);
            }
        }));
        self.subscription = Some(id);

        if let Err(e) = self.bridge.audio_control(true) {
            warn!("Device bridge rejected audio start: {:#}", e);
        }
        info!("Bridge capture started");
    }

    /// Everything captured so far; recording continues.
    pub fn get_audio(&self) -> SampleBuffer {
        let merged = merge_chunks(self.session.chunks.lock().as_slice());
        resample(&merged, self.frame_rate, TARGET_SAMPLE_RATE)
    }

    pub fn stop(&mut self) -> SampleBuffer {
        self.session.recording.store(false, Ordering::Release);

        if self.subscription.is_some() {
            if let Err(e) = self.bridge.audio_control(false) {
                warn!("Device bridge rejected audio stop: {:#}", e);
            }
        }
        self.unsubscribe();

        let chunks = std::mem::take(&mut *self.session.chunks.lock());
        let merged = merge_chunks(&chunks);
        debug!("Bridge capture stopped with {} frames", chunks.len());
        resample(&merged, self.frame_rate, TARGET_SAMPLE_RATE)
    }

    fn unsubscribe(&mut self) {
        if let Some(id) = self.subscription.take() {
            self.bridge.remove_listener(id);
        }
    }
}

impl Drop for BridgeCapture {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
