pub mod decoder;
pub mod error;
pub mod media;
pub mod platform;
pub mod player;
pub mod session;

pub use decoder::{
    AacLatmDecoder, AudioDecoder, AudioOutput, BoundDecoder, DecodedFrame, Decoder, DecoderContext,
    DecoderRegistry, ErrorCallback, FrameCallback, H264Decoder, H265Decoder, SizeCallback, VideoDecoder,
};
pub use error::{PlayerError, Result, RtspStatus};
pub use media::{BufferFlags, Depacketizer, Frame};
pub use platform::{
    AudioSink, AudioSinkConfig, HardwareCodec, MediaBackend, MediaFormat, OutputBuffer, RenderTarget,
    Surface,
};
pub use player::{PlayerConfig, PlayerEvent, PlayerState, RetryPolicy, RtspPlayer};
pub use session::{
    MediaDescription, MediaKind, RtpMap, SessionDescription, TrackId, Transport, TransportConnector,
    TransportEvents,
};
