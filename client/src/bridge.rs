//! Connection to the wearable's device bridge.
//!
//! The bridge pushes [`BridgeEvent`]s (PCM audio frames, taps, connection
//! changes) and accepts [`BridgeCommand`]s (microphone on/off, display text).
//! Listeners are invoked synchronously for every event and must only copy or
//! forward what they need.

use anyhow::{anyhow, Context, Result};
use log::{debug, error, info};
use parking_lot::Mutex;
use shared::ipc::protocol;
use shared::{BridgeCommand, BridgeConfig, BridgeEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub type ListenerId = u64;
pub type EventListener = Arc<dyn Fn(&BridgeEvent) + Send + Sync>;

pub trait DeviceBridge: Send + Sync {
    fn on_event(&self, listener: EventListener) -> ListenerId;
    /// Removing an unknown or already removed id is a no-op.
    fn remove_listener(&self, id: ListenerId);
    fn audio_control(&self, enabled: bool) -> Result<()>;
    fn display_text(&self, text: &str) -> Result<()>;
}

#[derive(Default)]
struct ListenerTable {
    next_id: ListenerId,
    entries: Vec<(ListenerId, EventListener)>,
}

/// Registry of event listeners shared between a bridge and its reader task.
#[derive(Clone, Default)]
pub struct Listeners {
    inner: Arc<Mutex<ListenerTable>>,
}

impl Listeners {
    pub fn add(&self, listener: EventListener) -> ListenerId {
        let mut table = self.inner.lock();
        table.next_id += 1;
        let id = table.next_id;
        table.entries.push((id, listener));
        id
    }

    pub fn remove(&self, id: ListenerId) {
        self.inner.lock().entries.retain(|(entry_id, _)| *entry_id != id);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Listeners may add or remove listeners while being dispatched to.
    pub fn dispatch(&self, event: &BridgeEvent) {
        let snapshot: Vec<EventListener> = self
            .inner
            .lock()
            .entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }
}

/// Bridge reached over a Unix socket carrying length-prefixed MessagePack.
pub struct SocketBridge {
    listeners: Listeners,
    commands: mpsc::UnboundedSender<BridgeCommand>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl SocketBridge {
    /// Fails when nothing answers at the configured socket within the timeout.
    pub async fn connect(config: &BridgeConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.connect_timeout_ms);
        let stream = tokio::time::timeout(timeout, UnixStream::connect(&config.socket_path))
            .await
            .map_err(|_| anyhow!("Timed out connecting to device bridge"))?
            .with_context(|| format!("No device bridge at {:?}", config.socket_path))?;

        info!("Connected to device bridge at {:?}", config.socket_path);
        Ok(Self::from_stream(stream))
    }

    pub fn from_stream(stream: UnixStream) -> Self {
        let (mut read_half, mut write_half) = stream.into_split();
        let listeners = Listeners::default();

        let dispatch_to = listeners.clone();
        let reader = tokio::spawn(async move {
            loop {
                match protocol::receive_message::<_, BridgeEvent>(&mut read_half).await {
                    Ok(event) => dispatch_to.dispatch(&event),
                    Err(e) => {
                        info!("Device bridge connection closed: {}", e);
                        dispatch_to.dispatch(&BridgeEvent::Device { connected: false });
                        break;
                    }
                }
            }
        });

        let (commands, mut command_rx) = mpsc::unbounded_channel::<BridgeCommand>();
        let writer = tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                debug!("Sending bridge command: {:?}", command);
                if let Err(e) = protocol::send_message(&mut write_half, &command).await {
                    error!("Failed to send bridge command: {}", e);
                    break;
                }
            }
        });

        Self {
            listeners,
            commands,
            reader,
            writer,
        }
    }

    fn send(&self, command: BridgeCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| anyhow!("Device bridge connection is closed"))
    }
}

impl DeviceBridge for SocketBridge {
    fn on_event(&self, listener: EventListener) -> ListenerId {
        self.listeners.add(listener)
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.remove(id);
    }

    fn audio_control(&self, enabled: bool) -> Result<()> {
        self.send(BridgeCommand::AudioControl(enabled))
    }

    fn display_text(&self, text: &str) -> Result<()> {
        self.send(BridgeCommand::DisplayText(text.to_string()))
    }
}

impl Drop for SocketBridge {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

/// In-process bridge that records commands and lets tests push events.
#[cfg(test)]
#[derive(Default)]
pub struct LoopbackBridge {
    listeners: Listeners,
    pub controls: Mutex<Vec<bool>>,
    pub texts: Mutex<Vec<String>>,
}

#[cfg(test)]
impl LoopbackBridge {
    pub fn emit(&self, event: BridgeEvent) {
        self.listeners.dispatch(&event);
    }

    /// Pushes `samples` as 16-bit PCM frames of `frame_len` samples each.
    pub fn emit_samples(&self, samples: usize, frame_len: usize) {
        let mut remaining = samples;
        while remaining > 0 {
            let n = remaining.min(frame_len);
            let pcm: Vec<u8> = (0..n).flat_map(|_| 1000i16.to_le_bytes()).collect();
            self.emit(BridgeEvent::Audio(pcm));
            remaining -= n;
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

#[cfg(test)]
impl DeviceBridge for LoopbackBridge {
    fn on_event(&self, listener: EventListener) -> ListenerId {
        self.listeners.add(listener)
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.remove(id);
    }

    fn audio_control(&self, enabled: bool) -> Result<()> {
        self.controls.lock().push(enabled);
        Ok(())
    }

    fn display_text(&self, text: &str) -> Result<()> {
        self.texts.lock().push(text.to_string());
        Ok(())
    }
}
