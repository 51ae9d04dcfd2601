//! Take-once ownership of a hardware codec shared with a decode worker.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{PlayerError, Result};
use crate::platform::HardwareCodec;

/// Holds the codec of one decoder.
///
/// The worker and the control thread both reach the codec through
/// [`with`](Self::with). [`shutdown`](Self::shutdown) takes it out exactly
/// once; later calls to `with` return `None`, which a worker treats as the
/// end of its loop.
#[derive(Clone, Default)]
pub(crate) struct CodecSlot {
    inner: Arc<Mutex<Option<Box<dyn HardwareCodec>>>>,
}

impl CodecSlot {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn install(&self, codec: Box<dyn HardwareCodec>) {
        *self.inner.lock() = Some(codec);
    }

    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut dyn HardwareCodec) -> Result<R>) -> Option<Result<R>> {
        let mut guard = self.inner.lock();
        guard.as_mut().map(|codec| f(codec.as_mut()))
    }

    /// Stop and release the codec if still installed. Each step is
    /// attempted; failures are logged.
    pub(crate) fn shutdown(&self, codec_name: &str) {
        let Some(mut codec) = self.inner.lock().take() else {
            return;
        };
        if let Err(e) = codec.stop() {
            tracing::warn!(codec = codec_name, error = %e, "codec stop failed");
        }
        if let Err(e) = codec.release() {
            tracing::warn!(codec = codec_name, error = %e, "codec release failed");
        }
        tracing::debug!(codec = codec_name, "codec released");
    }
}

/// Classify a backend failure while setting up a codec.
pub(crate) fn as_codec_error(error: PlayerError) -> PlayerError {
    match error {
        PlayerError::Codec(_) => error,
        other => PlayerError::Codec(other.to_string()),
    }
}

/// Classify a failure that ended a running decode loop.
pub(crate) fn as_decode_error(error: PlayerError) -> PlayerError {
    match error {
        PlayerError::Decode(_) => error,
        other => PlayerError::Decode(other.to_string()),
    }
}
