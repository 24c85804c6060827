use anyhow::Result;
use clap::{Parser, ValueEnum};
use dictation_client::{
    BridgeCapture, BridgeDisplay, CaptureBackend, ConsoleDisplay, DeviceBridge, DisplaySink,
    MicCapture, ModelState, RecordingSession, SocketBridge,
};
use dictation_worker::{BuildProbe, WhisperSource};
use log::{debug, info};
use shared::{BridgeEvent, Config};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "dictation")]
#[command(about = "Offline dictation from a wearable or the local microphone")]
struct Args {
    /// Config file (defaults to the XDG config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value_t = BackendChoice::Auto)]
    backend: BackendChoice,

    /// Print input device names and exit
    #[arg(long)]
    list_devices: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendChoice {
    /// Device bridge when reachable, otherwise the microphone
    Auto,
    Bridge,
    Mic,
}

#[derive(Debug)]
enum Trigger {
    Toggle,
    Quit,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if args.list_devices {
        for name in MicCapture::list_input_devices()? {
            println!("{}", name);
        }
        return Ok(());
    }

    let config = Config::load(args.config.as_deref())?;
    info!("Starting dictation");

    let (trigger_tx, mut triggers) = mpsc::unbounded_channel();
    let (backend, display) = select_backend(args.backend, &config, trigger_tx.clone()).await?;
    info!("Capturing from {}", backend.name());

    let (worker, mut responses) = dictation_worker::spawn(
        WhisperSource::new(&config.recognizer),
        BuildProbe::new(config.recognizer.device),
    );
    let mut session = RecordingSession::new(
        backend,
        worker.sender(),
        display,
        config.session.min_utterance_samples,
    );

    spawn_stdin_reader(trigger_tx);
    session.load_model();

    loop {
        tokio::select! {
            Some(response) = responses.recv() => session.handle_response(response),
            Some(trigger) = triggers.recv() => match trigger {
                Trigger::Toggle if session.model_state() == ModelState::Unloaded => session.load_model(),
                Trigger::Toggle => session.toggle().await,
                Trigger::Quit => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            else => break,
        }
    }

    session.shutdown().await;
    drop(session);
    info!("Waiting for recognition worker");
    worker.shutdown().await;
    Ok(())
}

/// Probes the device bridge and falls back to the local microphone.
async fn select_backend(
    choice: BackendChoice,
    config: &Config,
    triggers: mpsc::UnboundedSender<Trigger>,
) -> Result<(CaptureBackend, Box<dyn DisplaySink>)> {
    if choice != BackendChoice::Mic {
        match SocketBridge::connect(&config.bridge).await {
            Ok(bridge) => {
                let bridge: Arc<dyn DeviceBridge> = Arc::new(bridge);
                bridge.on_event(Arc::new(move |event| match event {
                    BridgeEvent::Tap => {
                        let _ = triggers.send(Trigger::Toggle);
                    }
                    BridgeEvent::Device { connected } => {
                        info!("Wearable {}", if *connected { "connected" } else { "disconnected" });
                    }
                    BridgeEvent::Audio(_) => {}
                }));

                let capture = BridgeCapture::new(Arc::clone(&bridge), config.bridge.sample_rate);
                return Ok((CaptureBackend::Bridge(capture), Box::new(BridgeDisplay::new(bridge))));
            }
            Err(e) if choice == BackendChoice::Bridge => return Err(e),
            Err(e) => info!("Device bridge unavailable ({:#}), using local microphone", e),
        }
    }

    let mut mic = MicCapture::new(&config.audio);
    mic.init()?;
    Ok((CaptureBackend::Microphone(mic), Box::new(ConsoleDisplay)))
}

/// Enter toggles recording, `q` quits.
fn spawn_stdin_reader(triggers: mpsc::UnboundedSender<Trigger>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let trigger = match line.trim() {
                "q" | "quit" => Trigger::Quit,
                _ => Trigger::Toggle,
            };
            debug!("Stdin trigger: {:?}", trigger);
            if triggers.send(trigger).is_err() {
                break;
            }
        }
        debug!("Stdin closed");
    });
}
