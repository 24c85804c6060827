//! Recognition worker: an isolated task that owns the speech model and speaks
//! the `load` / `transcribe` request protocol from [`shared::ipc`].

pub mod download;
pub mod model;
pub mod probe;
pub mod whisper;
pub mod worker;

pub use model::{Candidate, LoadProgress, ModelSource, SpeechModel, Transcription};
pub use probe::{BuildProbe, ComputeProbe};
pub use whisper::WhisperSource;
pub use worker::{spawn, RecognitionWorker, WorkerHandle};
