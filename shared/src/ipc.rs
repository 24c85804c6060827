use serde::{Deserialize, Serialize};

use crate::types::SampleBuffer;

/// Messages the controller sends to the recognition worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerRequest {
    Load,
    Transcribe { audio: SampleBuffer },
}

/// Messages the recognition worker sends back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerResponse {
    Progress {
        status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress: Option<f32>,
    },
    Ready { device: String },
    Result { text: String },
    Error { error: String },
}

impl WorkerResponse {
    pub fn status(status: impl Into<String>) -> Self {
        WorkerResponse::Progress {
            status: status.into(),
            file: None,
            progress: None,
        }
    }

    pub fn error(error: impl std::fmt::Display) -> Self {
        WorkerResponse::Error {
            error: error.to_string(),
        }
    }

    /// `result` and `error` close out a request; `progress` never does.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkerResponse::Progress { .. })
    }
}

/// Events pushed by the wearable device bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BridgeEvent {
    /// Signed 16-bit little-endian PCM.
    Audio(Vec<u8>),
    Tap,
    Device { connected: bool },
}

/// Commands sent to the wearable device bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BridgeCommand {
    AudioControl(bool),
    DisplayText(String),
}

pub mod protocol {
    use super::*;
    use anyhow::{bail, Result};
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

    /// Upper bound on a single frame; an audio event is a few hundred bytes.
    pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

    pub async fn send_message<W, T>(stream: &mut W, message: &T) -> Result<()>
    where
        W: AsyncWrite + Unpin,
        T: Serialize,
    {
        let serialized = rmp_serde::to_vec(message)?;
        let len = serialized.len() as u32;

        stream.write_all(&len.to_le_bytes()).await?;
        stream.write_all(&serialized).await?;
        stream.flush().await?;

        Ok(())
    }

    pub async fn receive_message<R, T>(stream: &mut R) -> Result<T>
    where
        R: AsyncRead + Unpin,
        T: for<'de> Deserialize<'de>,
    {
        let mut len_bytes = [0u8; 4];
        stream.read_exact(&mut len_bytes).await?;
        let len = u32::from_le_bytes(len_bytes) as usize;
        if len > MAX_FRAME_LEN {
            bail!("Frame of {} bytes exceeds limit", len);
        }

        let mut buffer = vec![0u8; len];
        stream.read_exact(&mut buffer).await?;

        let message = rmp_serde::from_slice(&buffer)?;
        Ok(message)
    }
}
