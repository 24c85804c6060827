pub mod audio;
pub mod bridge;
pub mod display;
pub mod session;

pub use audio::{BridgeCapture, CaptureBackend, CaptureError, MicCapture};
pub use bridge::{DeviceBridge, SocketBridge};
pub use display::{BridgeDisplay, ConsoleDisplay, DisplaySink};
pub use session::{ModelState, RecordingSession};
