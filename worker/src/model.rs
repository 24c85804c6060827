use anyhow::Result;
use shared::{ComputeDevice, WorkerResponse};
use std::sync::Arc;

/// One observation from a model source while it acquires a model.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadProgress {
    pub status: String,
    pub file: Option<String>,
    /// Percent complete, 0..=100.
    pub progress: Option<f32>,
}

impl LoadProgress {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            file: None,
            progress: None,
        }
    }

    pub fn file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn percent(mut self, percent: f32) -> Self {
        self.progress = Some(percent);
        self
    }
}

impl From<LoadProgress> for WorkerResponse {
    fn from(p: LoadProgress) -> Self {
        WorkerResponse::Progress {
            status: p.status,
            file: p.file,
            progress: p.progress,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Candidate {
    pub text: String,
}

/// Models answer with either one result or a ranked list of candidates.
#[derive(Debug, Clone, PartialEq)]
pub enum Transcription {
    Single(Candidate),
    Candidates(Vec<Candidate>),
}

impl Transcription {
    pub fn text(text: impl Into<String>) -> Self {
        Transcription::Single(Candidate { text: text.into() })
    }

    /// Text of the first candidate, empty when there are none.
    pub fn into_text(self) -> String {
        match self {
            Transcription::Single(candidate) => candidate.text,
            Transcription::Candidates(candidates) => candidates
                .into_iter()
                .next()
                .map(|candidate| candidate.text)
                .unwrap_or_default(),
        }
    }
}

/// A loaded recognizer. Invoked from the blocking pool, one call at a time.
pub trait SpeechModel: Send + Sync + 'static {
    fn transcribe(&self, audio: &[f32]) -> Result<Transcription>;
}

/// Acquires a recognizer for a compute device, reporting progress as it goes.
pub trait ModelSource: Send + Sync + 'static {
    fn load(
        &self,
        device: ComputeDevice,
        progress: &mut dyn FnMut(LoadProgress),
    ) -> Result<Arc<dyn SpeechModel>>;
}
