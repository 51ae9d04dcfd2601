//! RTP depacketization.
//!
//! This module provides the [`Depacketizer`] trait and codec-specific
//! implementations that reassemble RTP payloads into access units
//! ([`Frame`]s) ready for a hardware decoder.
//!
//! ## RTP overview (RFC 3550)
//!
//! Every RTP packet carries a 12-byte fixed header ([`rtp::RtpPacket`])
//! containing:
//!
//! - **Sequence number** (16-bit, wrapping): used for reordering and loss detection.
//! - **Timestamp** (32-bit): media clock, 90 kHz for video, the sampling
//!   rate for audio. Converted to microseconds by [`rtp::Timeline`].
//! - **SSRC** (32-bit): identifies the sender.
//! - **Marker bit**: set on the last packet of an access unit (frame).
//!
//! ## Supported payload formats
//!
//! | Codec | Module | RFC | Output |
//! |-------|--------|-----|--------|
//! | AAC (`mpeg4-generic`, AAC-hbr) | [`aac`] | [RFC 3640](https://tools.ietf.org/html/rfc3640) | raw AAC access units |
//! | H.264 | [`h264`] | [RFC 6184](https://tools.ietf.org/html/rfc6184) | Annex B access units |
//! | H.265 | [`h265`] | [RFC 7798](https://tools.ietf.org/html/rfc7798) | Annex B access units |

pub mod aac;
pub mod h264;
pub mod h265;
mod nal;
pub mod rtp;

use std::ops::BitOr;

use crate::error::DepacketizeErrorKind;

/// Annex B start code prepended to every NAL unit handed to video decoders.
pub const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// Per-buffer flags passed alongside a frame to the hardware decoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BufferFlags(u32);

impl BufferFlags {
    pub const NONE: BufferFlags = BufferFlags(0);
    /// Frame is independently decodable (IDR / IRAP).
    pub const KEY_FRAME: BufferFlags = BufferFlags(1);
    /// Frame carries codec configuration (parameter sets) rather than media.
    pub const CODEC_CONFIG: BufferFlags = BufferFlags(2);
    /// Last buffer of the stream.
    pub const END_OF_STREAM: BufferFlags = BufferFlags(4);

    pub fn contains(self, other: BufferFlags) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for BufferFlags {
    type Output = BufferFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        BufferFlags(self.0 | rhs.0)
    }
}

/// One access unit produced by a [`Depacketizer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub data: Vec<u8>,
    /// Presentation time in microseconds, relative to the first packet of the track.
    pub presentation_time_us: u64,
    pub flags: BufferFlags,
}

impl Frame {
    pub fn new(data: Vec<u8>, presentation_time_us: u64) -> Self {
        Self {
            data,
            presentation_time_us,
            flags: BufferFlags::NONE,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Codec-specific RTP depacketizer.
///
/// Each payload format implements this trait. A depacketizer is fed one
/// complete RTP packet (header included) at a time, in arrival order, and
/// hands every access unit it completes to `emit`. It keeps whatever
/// partial state a fragmented access unit needs between calls.
///
/// On error the packet is dropped and any in-progress fragment is
/// discarded; the depacketizer stays usable for the next packet.
pub trait Depacketizer: Send {
    fn write(
        &mut self,
        packet: &[u8],
        emit: &mut dyn FnMut(Frame),
    ) -> Result<(), DepacketizeErrorKind>;

    /// RTP clock rate used to derive presentation timestamps.
    fn clock_rate(&self) -> u32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_combine() {
        let f = BufferFlags::KEY_FRAME | BufferFlags::CODEC_CONFIG;
        assert!(f.contains(BufferFlags::KEY_FRAME));
        assert!(f.contains(BufferFlags::CODEC_CONFIG));
        assert!(!f.contains(BufferFlags::END_OF_STREAM));
        assert!(!BufferFlags::NONE.contains(BufferFlags::NONE));
    }
}
