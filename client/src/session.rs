//! Recording state machine.
//!
//! Ties one capture backend to the recognition worker: a trigger starts and
//! stops capture, a finished utterance is sent off as a `transcribe` request,
//! and worker responses bring the session back to `Idle`. Every failure path
//! ends in `Idle` with a status line, so the next trigger can retry.

use log::{debug, error, info, warn};
use shared::{duration_secs, RecordingStatus, SampleBuffer, WorkerRequest, WorkerResponse};
use std::time::Instant;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::audio::{CaptureBackend, CaptureError};
use crate::display::DisplaySink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    Unloaded,
    Loading,
    Ready,
}

struct Utterance {
    id: Uuid,
    started: Instant,
}

pub struct RecordingSession {
    backend: CaptureBackend,
    worker: mpsc::UnboundedSender<WorkerRequest>,
    display: Box<dyn DisplaySink>,
    status: RecordingStatus,
    model: ModelState,
    min_samples: usize,
    utterance: Option<Utterance>,
}

impl RecordingSession {
    pub fn new(
        backend: CaptureBackend,
        worker: mpsc::UnboundedSender<WorkerRequest>,
        display: Box<dyn DisplaySink>,
        min_samples: usize,
    ) -> Self {
        Self {
            backend,
            worker,
            display,
            status: RecordingStatus::Idle,
            model: ModelState::Unloaded,
            min_samples,
            utterance: None,
        }
    }

    pub fn status(&self) -> RecordingStatus {
        self.status
    }

    pub fn model_state(&self) -> ModelState {
        self.model
    }

    pub fn backend(&self) -> &CaptureBackend {
        &self.backend
    }

    /// Asks the worker for the model unless it is loading or loaded.
    pub fn load_model(&mut self) {
        if self.model != ModelState::Unloaded {
            debug!("Model is {:?}, not requesting a load", self.model);
            return;
        }
        match self.worker.send(WorkerRequest::Load) {
            Ok(()) => {
                self.model = ModelState::Loading;
                self.display.status("Loading model...");
            }
            Err(_) => {
                error!("Recognition worker is gone, cannot load model");
                self.display.status("Recognizer unavailable");
            }
        }
    }

    /// Starts or stops recording. Does nothing until the model is ready.
    pub async fn toggle(&mut self) {
        if self.model != ModelState::Ready {
            debug!("Toggle ignored, model is {:?}", self.model);
            return;
        }
        match self.status {
            RecordingStatus::Idle => self.start_recording(),
            RecordingStatus::Recording => self.stop_recording().await,
            RecordingStatus::Transcribing => debug!("Toggle ignored while transcribing"),
        }
    }

    pub fn start_recording(&mut self) {
        if self.status != RecordingStatus::Idle || self.model != ModelState::Ready {
            warn!(
                "Cannot start recording: status {:?}, model {:?}",
                self.status, self.model
            );
            return;
        }

        if let Err(e) = self.backend.start() {
            self.fail("Could not start recording", &e);
            return;
        }

        let utterance = Utterance {
            id: Uuid::new_v4(),
            started: Instant::now(),
        };
        info!("Recording utterance {} from {}", utterance.id, self.backend.name());
        self.utterance = Some(utterance);
        self.status = RecordingStatus::Recording;
        self.display.status("Recording... trigger again to stop");
    }

    /// Audio captured so far in the current recording.
    pub async fn peek_audio(&self) -> Result<SampleBuffer, CaptureError> {
        self.backend.get_audio().await
    }

    pub async fn stop_recording(&mut self) {
        if self.status != RecordingStatus::Recording {
            warn!("Cannot stop recording: status {:?}", self.status);
            return;
        }

        let utterance = self.utterance.take();
        let audio = match self.backend.stop().await {
            Ok(audio) => audio,
            Err(e) => {
                self.fail("Recording failed", &e);
                return;
            }
        };

        if let Some(utterance) = &utterance {
            info!(
                "Utterance {} captured {:.2}s of audio in {:.2}s",
                utterance.id,
                duration_secs(audio.len()),
                utterance.started.elapsed().as_secs_f32()
            );
        }

        if audio.len() < self.min_samples {
            info!(
                "Rejecting utterance: {} samples is below the {} sample minimum",
                audio.len(),
                self.min_samples
            );
            self.status = RecordingStatus::Idle;
            self.display.status("Recording too short, try again");
            return;
        }

        if self.worker.send(WorkerRequest::Transcribe { audio }).is_err() {
            error!("Recognition worker is gone, dropping utterance");
            self.status = RecordingStatus::Idle;
            self.display.status("Recognizer unavailable");
            return;
        }
        self.status = RecordingStatus::Transcribing;
        self.display.status("Transcribing...");
    }

    pub fn handle_response(&mut self, response: WorkerResponse) {
        match response {
            WorkerResponse::Progress {
                status,
                file,
                progress,
            } => {
                debug!("Model progress: {} {:?} {:?}", status, file, progress);
                self.display
                    .status(&describe_progress(&status, file.as_deref(), progress));
            }
            WorkerResponse::Ready { device } => {
                info!("Model ready on {}", device);
                self.model = ModelState::Ready;
                self.display
                    .status(&format!("Ready ({}), trigger to record", device));
            }
            WorkerResponse::Result { text } => {
                self.finish_transcription();
                if text.is_empty() {
                    self.display.status("No speech detected");
                } else {
                    self.display.transcript(&text);
                    self.display.status(RecordingStatus::Idle.label());
                }
            }
            WorkerResponse::Error { error } => {
                if self.model == ModelState::Loading {
                    error!("Model failed to load: {}", error);
                    self.model = ModelState::Unloaded;
                    self.display
                        .status(&format!("Model failed to load: {}. Trigger to retry", error));
                } else {
                    error!("Recognizer error: {}", error);
                    self.finish_transcription();
                    self.display.status(&format!("Error: {}", error));
                }
            }
        }
    }

    /// Stops any capture in progress and releases the backend.
    pub async fn shutdown(&mut self) {
        if self.status == RecordingStatus::Recording {
            if let Err(e) = self.backend.stop().await {
                warn!("Failed to stop capture during shutdown: {}", e);
            }
            self.status = RecordingStatus::Idle;
        }
        self.backend.dispose();
    }

    fn finish_transcription(&mut self) {
        if self.status == RecordingStatus::Transcribing {
            self.status = RecordingStatus::Idle;
        }
    }

    fn fail(&mut self, context: &str, e: &CaptureError) {
        error!("{}: {}", context, e);
        self.utterance = None;
        self.status = RecordingStatus::Idle;
        self.display.status(&format!("{}: {}", context, e));
    }
}

fn describe_progress(status: &str, file: Option<&str>, progress: Option<f32>) -> String {
    match (file, progress) {
        (Some(file), Some(percent)) => format!("{} {} {:.0}%", status, file, percent),
        (Some(file), None) => format!("{} {}", status, file),
        (None, Some(percent)) => format!("{} {:.0}%", status, percent),
        (None, None) => status.to_string(),
    }
}
