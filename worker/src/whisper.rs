use anyhow::Result;
use log::{error, info};
use shared::{ComputeDevice, RecognizerConfig, TARGET_SAMPLE_RATE};
use std::sync::Arc;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::download::{self, ModelError};
use crate::model::{LoadProgress, ModelSource, SpeechModel, Transcription};

/// whisper.cpp skips inputs shorter than one second.
const MIN_WHISPER_SAMPLES: usize = TARGET_SAMPLE_RATE as usize;

/// Loads ggml whisper models from disk, downloading them first when missing.
pub struct WhisperSource {
    config: RecognizerConfig,
}

impl WhisperSource {
    pub fn new(config: &RecognizerConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    fn ensure_present(&self, progress: &mut dyn FnMut(LoadProgress)) -> Result<(), ModelError> {
        let path = &self.config.model_path;
        if path.exists() {
            return Ok(());
        }
        match &self.config.model_url {
            Some(url) => download::fetch(url, path, progress),
            None => Err(ModelError::NotFound(path.clone())),
        }
    }
}

impl ModelSource for WhisperSource {
    fn load(
        &self,
        device: ComputeDevice,
        progress: &mut dyn FnMut(LoadProgress),
    ) -> Result<Arc<dyn SpeechModel>> {
        self.ensure_present(progress)?;

        let model_path = &self.config.model_path;
        let file_name = model_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!("Loading Whisper model from {:?} on {}", model_path, device);
        progress(LoadProgress::new("loading").file(&file_name));

        let mut params = WhisperContextParameters::default();
        params.use_gpu(device.is_accelerated());
        let ctx = WhisperContext::new_with_params(&model_path.to_string_lossy(), params)
            .map_err(|e| ModelError::Backend(format!("{:?}", e)))?;

        info!("Whisper model loaded successfully");
        progress(LoadProgress::new("loaded").file(file_name));

        Ok(Arc::new(WhisperModel {
            ctx,
            language: self.config.language.clone(),
            threads: self.config.threads,
        }))
    }
}

pub struct WhisperModel {
    ctx: WhisperContext,
    language: Option<String>,
    threads: Option<u16>,
}

impl SpeechModel for WhisperModel {
    fn transcribe(&self, audio: &[f32]) -> Result<Transcription> {
        let mut state = self.ctx.create_state()?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        if let Some(ref lang) = self.language {
            params.set_language(Some(lang));
        }
        if let Some(threads) = self.threads {
            params.set_n_threads(i32::from(threads));
        }
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        let padded;
        let input = if audio.len() < MIN_WHISPER_SAMPLES {
            let mut buffer = Vec::with_capacity(MIN_WHISPER_SAMPLES);
            buffer.extend_from_slice(audio);
            buffer.resize(MIN_WHISPER_SAMPLES, 0.0);
            padded = buffer;
            &padded[..]
        } else {
            audio
        };

        state.full(params, input).map_err(|e| {
            error!("Whisper inference failed: {:?}", e);
            anyhow::anyhow!("Whisper inference failed: {:?}", e)
        })?;

        let num_segments = state.full_n_segments()?;
        let mut transcription = String::new();
        for i in 0..num_segments {
            let segment_text = state.full_get_segment_text(i)?;
            transcription.push_str(&segment_text);
        }

        Ok(Transcription::text(transcription))
    }
}
