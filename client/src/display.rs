use log::{info, warn};
use std::sync::Arc;

use crate::bridge::DeviceBridge;

/// Where status lines and finished transcripts are shown.
pub trait DisplaySink {
    fn status(&self, text: &str);
    fn transcript(&self, text: &str);
}

/// Prints to the terminal.
pub struct ConsoleDisplay;

impl DisplaySink for ConsoleDisplay {
    fn status(&self, text: &str) {
        info!("Status: {}", text);
        eprintln!("[{}]", text);
    }

    fn transcript(&self, text: &str) {
        info!("Transcript: '{}'", text);
        println!("{}", text);
    }
}

/// Mirrors everything to the wearable's display as well as the terminal.
pub struct BridgeDisplay {
    bridge: Arc<dyn DeviceBridge>,
}

impl BridgeDisplay {
    pub fn new(bridge: Arc<dyn DeviceBridge>) -> Self {
        Self { bridge }
    }

    fn show(&self, text: &str) {
        if let Err(e) = self.bridge.display_text(text) {
            warn!("Failed to update device display: {:#}", e);
        }
    }
}

impl DisplaySink for BridgeDisplay {
    fn status(&self, text: &str) {
        ConsoleDisplay.status(text);
        self.show(text);
    }

    fn transcript(&self, text: &str) {
        ConsoleDisplay.transcript(text);
        self.show(text);
    }
}
