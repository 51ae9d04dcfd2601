//! Per-track decoders.
//!
//! A decoder is bound to one negotiated track for the lifetime of one
//! session. The player drives it through the [`Decoder`] capabilities:
//!
//! ```text
//! factory(ctx) ─► configure (mute / surface / callbacks) ─► on_init(track)
//!              ─► on_rtp_received / on_rtcp_received ... ─► on_release
//! ```
//!
//! `on_release` is called exactly once, even if `on_init` failed.
//! Implementations own their hardware codec, output sink and worker thread
//! and must leave nothing running after it returns (a worker that does not
//! finish within the join timeout is abandoned).
//!
//! Built-in decoders:
//!
//! | Name (rtpmap) | Kind | Type |
//! |---------------|------|------|
//! | `mpeg4-generic` | audio | [`AacLatmDecoder`] |
//! | `H264` | video | [`H264Decoder`] |
//! | `H265` | video | [`H265Decoder`] |

pub mod audio;
pub(crate) mod codec;
pub mod registry;
pub mod video;
pub(crate) mod worker;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub use audio::{AacLatmDecoder, AudioOutput};
pub use registry::{AudioDecoderFactory, DecoderRegistry, VideoDecoderFactory};
pub use video::{H264Decoder, H265Decoder, H264Profile, H265Profile, HardwareVideoDecoder, VideoProfile};

use crate::error::PlayerError;
use crate::platform::{MediaBackend, Surface};
use crate::session::MediaDescription;

/// Receives asynchronous decoder failures.
pub type ErrorCallback = Arc<dyn Fn(PlayerError) + Send + Sync>;

/// Receives new video output dimensions `(width, height)`.
pub type SizeCallback = Arc<dyn Fn(u32, u32) + Send + Sync>;

/// Receives decoded pictures that were not rendered to a surface.
pub type FrameCallback = Arc<dyn Fn(DecodedFrame) + Send + Sync>;

/// Raw decoder output in the codec's native color format.
#[derive(Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub data: Arc<[u8]>,
    pub presentation_time_us: u64,
}

impl fmt::Debug for DecodedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedFrame")
            .field("len", &self.data.len())
            .field("presentation_time_us", &self.presentation_time_us)
            .finish()
    }
}

/// What a factory gets to build a decoder.
#[derive(Clone)]
pub struct DecoderContext {
    pub backend: Arc<dyn MediaBackend>,
    /// Bounded wait for codec input/output buffers.
    pub codec_timeout: Duration,
    /// Bounded join of the decode worker on release.
    pub join_timeout: Duration,
    /// Frames buffered between the network thread and the worker.
    pub queue_capacity: usize,
    /// Audio sink size as a multiple of the device minimum.
    pub audio_buffer_margin: usize,
}

impl DecoderContext {
    pub fn new(backend: Arc<dyn MediaBackend>) -> Self {
        Self {
            backend,
            codec_timeout: Duration::from_millis(10),
            join_timeout: Duration::from_millis(500),
            queue_capacity: 64,
            audio_buffer_margin: 2,
        }
    }
}

impl fmt::Debug for DecoderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderContext")
            .field("codec_timeout", &self.codec_timeout)
            .field("join_timeout", &self.join_timeout)
            .field("queue_capacity", &self.queue_capacity)
            .field("audio_buffer_margin", &self.audio_buffer_margin)
            .finish_non_exhaustive()
    }
}

/// Capabilities shared by audio and video decoders.
pub trait Decoder: Send {
    /// Prepare for `track`. Failures go to the error callback; the decoder
    /// then ignores payloads until released.
    fn on_init(&mut self, track: &Arc<MediaDescription>);

    /// One RTP packet (header included) for the bound track.
    fn on_rtp_received(&mut self, track: &MediaDescription, packet: &[u8]);

    /// One RTCP packet for the bound track. Ignored by default.
    fn on_rtcp_received(&mut self, track: &MediaDescription, packet: &[u8]) {
        tracing::trace!(track = %track.id, len = packet.len(), "RTCP ignored");
    }

    /// Tear down everything `on_init` created.
    fn on_release(&mut self);

    fn set_error_callback(&mut self, callback: ErrorCallback);
}

/// A decoder that plays PCM through an [`AudioSink`](crate::platform::AudioSink).
pub trait AudioDecoder: Decoder {
    /// Mute or unmute playback without interrupting decoding.
    fn set_mute(&mut self, mute: bool);
    fn is_mute(&self) -> bool;
    fn sampling_rate(&self) -> u32;
    fn set_sampling_rate(&mut self, rate: u32);
    fn channel_count(&self) -> u16;
    fn set_channel_count(&mut self, channels: u16);
}

/// A decoder that renders to a [`Surface`].
pub trait VideoDecoder: Decoder {
    /// Bind or unbind the render target; takes effect on a running codec.
    fn set_surface(&mut self, surface: Option<Surface>);
    fn set_size_callback(&mut self, callback: SizeCallback);
    /// Off-screen output: called with every decoded picture while no
    /// render target is bound.
    fn set_frame_callback(&mut self, callback: FrameCallback);
}

/// A decoder bound to a track, by capability.
pub enum BoundDecoder {
    Audio(Box<dyn AudioDecoder>),
    Video(Box<dyn VideoDecoder>),
}

impl BoundDecoder {
    pub fn as_decoder_mut(&mut self) -> &mut dyn Decoder {
        match self {
            BoundDecoder::Audio(d) => d.as_mut(),
            BoundDecoder::Video(d) => d.as_mut(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BoundDecoder::Audio(_) => "audio",
            BoundDecoder::Video(_) => "video",
        }
    }
}

impl fmt::Debug for BoundDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BoundDecoder::{}", self.kind())
    }
}
