//! Voice-note capture.
//!
//! A [`Recorder`] pulls chunks from an [`AudioInput`] into memory while
//! recording and hands back one [`AudioClip`] when stopped.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ClientError, ClientResult};

pub const AUDIO_MIME: &str = "audio/webm";

/// A finished recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub file_name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

impl AudioClip {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            file_name: format!("{}.webm", Uuid::new_v4()),
            mime: AUDIO_MIME,
            bytes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Source of encoded audio chunks
pub trait AudioInput: Send {
    /// Begin capture; chunks arrive on the returned channel until it closes
    fn open(&mut self) -> ClientResult<mpsc::UnboundedReceiver<Vec<u8>>>;
}

/// Input fed by hand through a [`ChunkFeed`]
pub struct ChunkInput {
    rx: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
}

/// Sending half of a [`ChunkInput`]; dropping it ends the stream
#[derive(Clone)]
pub struct ChunkFeed {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl ChunkFeed {
    pub fn push(&self, chunk: Vec<u8>) -> ClientResult<()> {
        self.tx
            .send(chunk)
            .map_err(|_| ClientError::validation("Recording input closed"))
    }
}

impl ChunkInput {
    pub fn channel() -> (ChunkFeed, ChunkInput) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChunkFeed { tx }, ChunkInput { rx: Some(rx) })
    }
}

impl AudioInput for ChunkInput {
    fn open(&mut self) -> ClientResult<mpsc::UnboundedReceiver<Vec<u8>>> {
        self.rx
            .take()
            .ok_or_else(|| ClientError::validation("Audio input already in use"))
    }
}

enum RecorderState {
    Idle,
    Recording {
        stop_tx: oneshot::Sender<()>,
        task: JoinHandle<Vec<Vec<u8>>>,
    },
}

pub struct Recorder<I: AudioInput> {
    input: I,
    state: RecorderState,
}

impl<I: AudioInput> Recorder<I> {
    pub fn new(input: I) -> Self {
        Self {
            input,
            state: RecorderState::Idle,
        }
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, RecorderState::Recording { .. })
    }

    /// Start buffering chunks. Only one recording runs at a time.
    pub fn start(&mut self) -> ClientResult<()> {
        if self.is_recording() {
            return Err(ClientError::validation("A recording is already in progress"));
        }

        let mut chunks = self.input.open()?;
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut buffers = Vec::new();
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    chunk = chunks.recv() => match chunk {
                        Some(chunk) => buffers.push(chunk),
                        None => break,
                    },
                }
            }
            // Chunks already delivered before the stop still belong to the clip
            while let Ok(chunk) = chunks.try_recv() {
                buffers.push(chunk);
            }
            buffers
        });

        self.state = RecorderState::Recording { stop_tx, task };
        info!("Recording started");
        Ok(())
    }

    /// Stop and concatenate everything captured into one clip
    pub async fn stop(&mut self) -> ClientResult<AudioClip> {
        let RecorderState::Recording { stop_tx, task } =
            std::mem::replace(&mut self.state, RecorderState::Idle)
        else {
            return Err(ClientError::validation("Not recording"));
        };

        let _ = stop_tx.send(());
        let buffers = task
            .await
            .map_err(|e| ClientError::validation(format!("Recording task failed: {}", e)))?;

        debug!(chunks = buffers.len(), "Recording stopped");
        let clip = AudioClip::new(buffers.concat());
        info!(bytes = clip.bytes.len(), "Recording finished");
        Ok(clip)
    }
}
