use anyhow::{anyhow, Result};
use log::{debug, error, info, warn};
use shared::{ComputeDevice, WorkerRequest, WorkerResponse};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::model::{LoadProgress, ModelSource, SpeechModel};
use crate::probe::ComputeProbe;

struct LoadedModel {
    model: Arc<dyn SpeechModel>,
    device: ComputeDevice,
}

/// Owns the recognition model and answers requests strictly in arrival order.
///
/// Loading and inference run on the blocking pool, so the controller's context
/// never waits on the model directly; it only sees responses on its channel.
pub struct RecognitionWorker {
    source: Arc<dyn ModelSource>,
    probe: Box<dyn ComputeProbe>,
    model: Option<LoadedModel>,
    responses: mpsc::UnboundedSender<WorkerResponse>,
}

/// Mailbox of a running worker. Dropping every sender stops the worker.
pub struct WorkerHandle {
    requests: mpsc::UnboundedSender<WorkerRequest>,
    task: JoinHandle<()>,
}

/// Starts a worker task and returns its mailbox and response stream.
pub fn spawn<S, P>(source: S, probe: P) -> (WorkerHandle, mpsc::UnboundedReceiver<WorkerResponse>)
where
    S: ModelSource,
    P: ComputeProbe,
{
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (response_tx, response_rx) = mpsc::unbounded_channel();

    let worker = RecognitionWorker {
        source: Arc::new(source),
        probe: Box::new(probe),
        model: None,
        responses: response_tx,
    };
    let task = tokio::spawn(worker.run(request_rx));

    (
        WorkerHandle {
            requests: request_tx,
            task,
        },
        response_rx,
    )
}

impl WorkerHandle {
    pub fn sender(&self) -> mpsc::UnboundedSender<WorkerRequest> {
        self.requests.clone()
    }

    pub fn send(&self, request: WorkerRequest) -> Result<()> {
        self.requests
            .send(request)
            .map_err(|_| anyhow!("Recognition worker has stopped"))
    }

    /// Closes this mailbox and waits for queued requests to drain. Other
    /// senders handed out by [`WorkerHandle::sender`] keep the worker alive.
    pub async fn shutdown(self) {
        drop(self.requests);
        if let Err(e) = self.task.await {
            error!("Recognition worker task failed: {}", e);
        }
    }
}

impl RecognitionWorker {
    async fn run(mut self, mut requests: mpsc::UnboundedReceiver<WorkerRequest>) {
        info!("Recognition worker started");
        while let Some(request) = requests.recv().await {
            self.handle_request(request).await;
        }
        info!("Recognition worker stopped");
    }

    async fn handle_request(&mut self, request: WorkerRequest) {
        match request {
            WorkerRequest::Load => {
                debug!("Handling load request");
                self.load().await
            }
            WorkerRequest::Transcribe { audio } => {
                debug!("Handling transcribe request ({} samples)", audio.len());
                self.transcribe(audio).await
            }
        }
    }

    fn emit(&self, response: WorkerResponse) {
        if self.responses.send(response).is_err() {
            debug!("Response receiver dropped");
        }
    }

    async fn load(&mut self) {
        if let Some(loaded) = &self.model {
            info!("Model already loaded on {}, skipping reload", loaded.device);
            self.emit(WorkerResponse::Ready {
                device: loaded.device.id().to_string(),
            });
            return;
        }

        let device = match self.probe.probe() {
            Ok(device) => device,
            Err(e) => {
                warn!("Compute probe failed, falling back to cpu: {:#}", e);
                ComputeDevice::Cpu
            }
        };
        info!("Loading recognition model on {}", device);
        self.emit(WorkerResponse::status(format!("Using {} backend", device)));

        let source = Arc::clone(&self.source);
        let progress_tx = self.responses.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut forward = |progress: LoadProgress| {
                let _ = progress_tx.send(progress.into());
            };
            source.load(device, &mut forward)
        })
        .await;

        match result {
            Ok(Ok(model)) => {
                info!("Recognition model ready on {}", device);
                self.model = Some(LoadedModel { model, device });
                self.emit(WorkerResponse::Ready {
                    device: device.id().to_string(),
                });
            }
            Ok(Err(e)) => {
                error!("Failed to load recognition model: {:#}", e);
                self.emit(WorkerResponse::error(format!("Failed to load model: {:#}", e)));
            }
            Err(e) => {
                error!("Model loading task failed: {}", e);
                self.emit(WorkerResponse::error(format!("Model loading task failed: {}", e)));
            }
        }
    }

    async fn transcribe(&mut self, audio: Vec<f32>) {
        let model = match &self.model {
            Some(loaded) => Arc::clone(&loaded.model),
            None => {
                warn!("Transcribe requested before the model was loaded");
                self.emit(WorkerResponse::error("Model not loaded"));
                return;
            }
        };

        let samples = audio.len();
        let result = tokio::task::spawn_blocking(move || model.transcribe(&audio)).await;

        match result {
            Ok(Ok(transcription)) => {
                let text = transcription.into_text().trim().to_string();
                info!("Transcribed {} samples into {} chars", samples, text.len());
                self.emit(WorkerResponse::Result { text });
            }
            Ok(Err(e)) => {
                error!("Transcription failed: {:#}", e);
                self.emit(WorkerResponse::error(format!("Transcription failed: {:#}", e)));
            }
            Err(e) => {
                error!("Transcription task failed: {}", e);
                self.emit(WorkerResponse::error(format!("Transcription task failed: {}", e)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Transcription;
    use anyhow::bail;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedModel {
        calls: Arc<AtomicUsize>,
    }

    impl SpeechModel for ScriptedModel {
        fn transcribe(&self, audio: &[f32]) -> Result<Transcription> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if audio.is_empty() {
                bail!("empty audio");
            }
            Ok(Transcription::text(format!("  utterance {} ({} samples) ", call, audio.len())))
        }
    }

    struct ScriptedSource {
        fail_loads: AtomicUsize,
        loads: Arc<AtomicUsize>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        fn new(fail_loads: usize) -> Self {
            Self {
                fail_loads: AtomicUsize::new(fail_loads),
                loads: Arc::new(AtomicUsize::new(0)),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl ModelSource for ScriptedSource {
        fn load(
            &self,
            _device: ComputeDevice,
            progress: &mut dyn FnMut(LoadProgress),
        ) -> Result<Arc<dyn SpeechModel>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            progress(LoadProgress::new("progress").file("model.bin").percent(50.0));
            if self.fail_loads.load(Ordering::SeqCst) > 0 {
                self.fail_loads.fetch_sub(1, Ordering::SeqCst);
                bail!("disk on fire");
            }
            progress(LoadProgress::new("progress").file("model.bin").percent(100.0));
            Ok(Arc::new(ScriptedModel {
                calls: Arc::clone(&self.calls),
            }))
        }
    }

    fn cpu() -> Result<ComputeDevice> {
        Ok(ComputeDevice::Cpu)
    }

    async fn next_terminal(rx: &mut mpsc::UnboundedReceiver<WorkerResponse>) -> WorkerResponse {
        loop {
            let response = rx.recv().await.expect("worker closed");
            if response.is_terminal() {
                return response;
            }
        }
    }

    #[tokio::test]
    async fn transcribe_before_load_is_one_error() {
        let source = ScriptedSource::new(0);
        let calls = Arc::clone(&source.calls);
        let (handle, mut rx) = spawn(source, cpu);

        handle
            .send(WorkerRequest::Transcribe { audio: vec![0.1; 10] })
            .unwrap();
        handle.shutdown().await;

        let mut responses = Vec::new();
        while let Some(response) = rx.recv().await {
            responses.push(response);
        }
        assert_eq!(responses, vec![WorkerResponse::error("Model not loaded")]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn load_announces_device_forwards_progress_then_ready() {
        let (handle, mut rx) = spawn(ScriptedSource::new(0), cpu);
        handle.send(WorkerRequest::Load).unwrap();
        handle.shutdown().await;

        let mut responses = Vec::new();
        while let Some(response) = rx.recv().await {
            responses.push(response);
        }
        assert_eq!(responses.len(), 4);
        assert_eq!(responses[0], WorkerResponse::status("Using cpu backend"));
        assert!(matches!(
            &responses[1],
            WorkerResponse::Progress { progress: Some(p), .. } if *p == 50.0
        ));
        assert_eq!(
            responses[3],
            WorkerResponse::Ready {
                device: "cpu".into()
            }
        );
    }

    #[tokio::test]
    async fn two_transcriptions_answer_in_order() {
        let (handle, mut rx) = spawn(ScriptedSource::new(0), cpu);
        handle.send(WorkerRequest::Load).unwrap();
        handle
            .send(WorkerRequest::Transcribe { audio: vec![0.0; 3] })
            .unwrap();
        handle
            .send(WorkerRequest::Transcribe { audio: vec![0.0; 7] })
            .unwrap();

        assert!(matches!(next_terminal(&mut rx).await, WorkerResponse::Ready { .. }));
        assert_eq!(
            next_terminal(&mut rx).await,
            WorkerResponse::Result {
                text: "utterance 0 (3 samples)".into()
            }
        );
        assert_eq!(
            next_terminal(&mut rx).await,
            WorkerResponse::Result {
                text: "utterance 1 (7 samples)".into()
            }
        );
    }

    #[tokio::test]
    async fn inference_error_keeps_model_loaded() {
        let (handle, mut rx) = spawn(ScriptedSource::new(0), cpu);
        handle.send(WorkerRequest::Load).unwrap();
        handle
            .send(WorkerRequest::Transcribe { audio: Vec::new() })
            .unwrap();
        handle
            .send(WorkerRequest::Transcribe { audio: vec![0.0; 2] })
            .unwrap();

        assert!(matches!(next_terminal(&mut rx).await, WorkerResponse::Ready { .. }));
        assert!(matches!(next_terminal(&mut rx).await, WorkerResponse::Error { .. }));
        assert!(matches!(next_terminal(&mut rx).await, WorkerResponse::Result { .. }));
    }

    #[tokio::test]
    async fn failed_load_can_be_retried() {
        let source = ScriptedSource::new(1);
        let loads = Arc::clone(&source.loads);
        let (handle, mut rx) = spawn(source, cpu);

        handle.send(WorkerRequest::Load).unwrap();
        match next_terminal(&mut rx).await {
            WorkerResponse::Error { error } => assert!(error.contains("disk on fire")),
            other => panic!("expected error, got {:?}", other),
        }

        handle
            .send(WorkerRequest::Transcribe { audio: vec![0.0; 2] })
            .unwrap();
        assert_eq!(next_terminal(&mut rx).await, WorkerResponse::error("Model not loaded"));

        handle.send(WorkerRequest::Load).unwrap();
        assert!(matches!(next_terminal(&mut rx).await, WorkerResponse::Ready { .. }));
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn redundant_load_does_not_reload() {
        let source = ScriptedSource::new(0);
        let loads = Arc::clone(&source.loads);
        let (handle, mut rx) = spawn(source, cpu);

        handle.send(WorkerRequest::Load).unwrap();
        handle.send(WorkerRequest::Load).unwrap();

        assert!(matches!(next_terminal(&mut rx).await, WorkerResponse::Ready { .. }));
        assert_eq!(
            next_terminal(&mut rx).await,
            WorkerResponse::Ready {
                device: "cpu".into()
            }
        );
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn probe_failure_falls_back_to_cpu() {
        let failing = || -> Result<ComputeDevice> { bail!("no adapter") };
        let (handle, mut rx) = spawn(ScriptedSource::new(0), failing);
        handle.send(WorkerRequest::Load).unwrap();

        assert_eq!(
            next_terminal(&mut rx).await,
            WorkerResponse::Ready {
                device: "cpu".into()
            }
        );
    }
}
