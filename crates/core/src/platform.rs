//! Platform collaborators: hardware codecs, audio output and render targets.
//!
//! The player never talks to a real device. Everything it needs from the
//! platform goes through the traits in this module, created by one
//! [`MediaBackend`] handed to [`RtspPlayer`](crate::RtspPlayer).
//!
//! [`HardwareCodec`] follows the buffer-queue protocol of platform decoders
//! such as Android's `MediaCodec`:
//!
//! ```text
//! configure ─► start ─► ┌─ dequeue_input_buffer ─► queue_input_buffer ──┐
//!                       └─ dequeue_output_buffer ─► release_output_buffer┘
//!                                 (repeat)        ─► stop ─► release
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::media::BufferFlags;

/// Destination surface for decoded video.
pub trait RenderTarget: Send + Sync {
    /// Whether frames can currently be rendered to this target.
    fn is_valid(&self) -> bool {
        true
    }
}

/// Shared handle to a [`RenderTarget`].
#[derive(Clone)]
pub struct Surface(Arc<dyn RenderTarget>);

impl Surface {
    pub fn new(target: impl RenderTarget + 'static) -> Self {
        Self(Arc::new(target))
    }

    pub fn from_arc(target: Arc<dyn RenderTarget>) -> Self {
        Self(target)
    }

    pub fn target(&self) -> &Arc<dyn RenderTarget> {
        &self.0
    }

    pub fn is_valid(&self) -> bool {
        self.0.is_valid()
    }

    /// Whether both handles point at the same target.
    pub fn same_target(&self, other: &Surface) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Surface")
            .field(&Arc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

/// Decoder input format, the equivalent of a `MediaFormat`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaFormat {
    /// e.g. `audio/mp4a-latm`, `video/avc`, `video/hevc`.
    pub mime: String,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Codec-specific data buffers (`csd-0`, `csd-1`, ...).
    pub csd: Vec<Vec<u8>>,
}

impl MediaFormat {
    pub fn audio(mime: &str, sample_rate: u32, channels: u16) -> Self {
        Self {
            mime: mime.to_string(),
            sample_rate: Some(sample_rate),
            channels: Some(channels),
            ..Default::default()
        }
    }

    pub fn video(mime: &str, width: Option<u32>, height: Option<u32>) -> Self {
        Self {
            mime: mime.to_string(),
            width,
            height,
            ..Default::default()
        }
    }
}

/// Result of polling a codec for output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputBuffer {
    /// A decoded buffer. Must be handed back with
    /// [`HardwareCodec::release_output_buffer`].
    Buffer {
        index: usize,
        data: Vec<u8>,
        presentation_time_us: u64,
        flags: BufferFlags,
    },
    /// No output within the timeout.
    TryAgainLater,
    /// The output format changed; video codecs report the new dimensions.
    FormatChanged { width: u32, height: u32 },
    /// The set of output buffers was replaced.
    BuffersChanged,
}

/// A platform hardware decoder.
pub trait HardwareCodec: Send {
    fn configure(&mut self, format: &MediaFormat, surface: Option<&Surface>) -> Result<()>;
    fn start(&mut self) -> Result<()>;

    /// Index of a free input buffer, or `None` if none freed up within `timeout`.
    fn dequeue_input_buffer(&mut self, timeout: Duration) -> Result<Option<usize>>;
    fn queue_input_buffer(
        &mut self,
        index: usize,
        data: &[u8],
        presentation_time_us: u64,
        flags: BufferFlags,
    ) -> Result<()>;

    fn dequeue_output_buffer(&mut self, timeout: Duration) -> Result<OutputBuffer>;
    /// Return an output buffer; `render` sends it to the configured surface.
    fn release_output_buffer(&mut self, index: usize, render: bool) -> Result<()>;

    /// Switch the output surface of a running video codec.
    fn set_output_surface(&mut self, surface: Option<&Surface>) -> Result<()>;

    fn stop(&mut self) -> Result<()>;
    fn release(&mut self) -> Result<()>;
}

/// Parameters of an audio output sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSinkConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Sink buffer size in bytes.
    pub buffer_size: usize,
}

/// A 16-bit PCM audio output.
pub trait AudioSink: Send {
    fn play(&mut self) -> Result<()>;
    /// Write PCM bytes; returns how many were accepted.
    fn write(&mut self, pcm: &[u8]) -> Result<usize>;
    fn stop(&mut self) -> Result<()>;
    fn release(&mut self) -> Result<()>;
}

/// Factory for all platform resources the player uses.
pub trait MediaBackend: Send + Sync {
    /// Create an unconfigured decoder for `format.mime`.
    fn create_decoder(&self, format: &MediaFormat) -> Result<Box<dyn HardwareCodec>>;

    fn open_audio_sink(&self, config: &AudioSinkConfig) -> Result<Box<dyn AudioSink>>;

    /// Smallest sink buffer the device accepts for this layout, in bytes.
    ///
    /// Defaults to 20 ms of 16-bit PCM.
    fn min_audio_buffer_size(&self, sample_rate: u32, channels: u16) -> usize {
        (sample_rate as usize / 50) * usize::from(channels.max(1)) * 2
    }
}
