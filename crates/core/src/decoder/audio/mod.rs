//! Audio decoders and their shared PCM output.

mod aac;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

pub use aac::AacLatmDecoder;

use crate::error::{PlayerError, Result};
use crate::platform::{AudioSink, AudioSinkConfig, MediaBackend};

/// PCM output shared between an audio decoder and its worker.
///
/// The sink is sized from the backend's minimum buffer for the stream
/// layout times a margin, and starts playing as soon as it is opened.
/// While muted, writes are dropped but the sink keeps running, so
/// unmuting does not recreate it.
#[derive(Clone, Default)]
pub struct AudioOutput {
    sink: Arc<Mutex<Option<Box<dyn AudioSink>>>>,
    muted: Arc<AtomicBool>,
}

impl AudioOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(
        &self,
        backend: &dyn MediaBackend,
        sample_rate: u32,
        channels: u16,
        margin: usize,
    ) -> Result<AudioSinkConfig> {
        let min = backend.min_audio_buffer_size(sample_rate, channels);
        let config = AudioSinkConfig {
            sample_rate,
            channels,
            buffer_size: min * margin.max(1),
        };
        let mut sink = backend
            .open_audio_sink(&config)
            .map_err(|e| match e {
                PlayerError::AudioSink(_) => e,
                other => PlayerError::AudioSink(other.to_string()),
            })?;
        if let Err(e) = sink.play() {
            if let Err(release_err) = sink.release() {
                tracing::warn!(error = %release_err, "audio sink release failed");
            }
            return Err(PlayerError::AudioSink(e.to_string()));
        }
        tracing::debug!(sample_rate, channels, buffer_size = config.buffer_size, "audio sink playing");
        *self.sink.lock() = Some(sink);
        Ok(config)
    }

    pub fn is_open(&self) -> bool {
        self.sink.lock().is_some()
    }

    /// Write decoded PCM. Returns the bytes accepted; 0 when muted or closed.
    pub fn write(&self, pcm: &[u8]) -> Result<usize> {
        if self.is_mute() {
            return Ok(0);
        }
        match self.sink.lock().as_mut() {
            Some(sink) => sink.write(pcm),
            None => Ok(0),
        }
    }

    pub fn set_mute(&self, mute: bool) {
        self.muted.store(mute, Ordering::SeqCst);
    }

    pub fn is_mute(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    /// Stop and release the sink if it was opened. Never fails.
    pub fn release(&self) {
        let Some(mut sink) = self.sink.lock().take() else {
            return;
        };
        if let Err(e) = sink.stop() {
            tracing::warn!(error = %e, "audio sink stop failed");
        }
        if let Err(e) = sink.release() {
            tracing::warn!(error = %e, "audio sink release failed");
        }
    }
}
