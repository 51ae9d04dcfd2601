//! AAC depacketization for the `mpeg4-generic` payload format (RFC 3640).
//!
//! Only the AAC-hbr mode (§3.3.6) is used by RTSP cameras in practice:
//!
//! ```text
//! +---------+-----------+-----------+---------------+
//! | AU-headers-length (16 bits, in bits)            |
//! +---------+-----------+-----------+---------------+
//! | AU-header 1 | AU-header 2 | ... | AU-header n   |  size:13 | index:3
//! +---------+-----------+-----------+---------------+
//! | AU 1 data | AU 2 data | ... | AU n data         |
//! +---------+-----------+-----------+---------------+
//! ```
//!
//! A packet carries either one or more complete access units, or one
//! fragment of a single access unit that is larger than the MTU. Fragments
//! share one RTP timestamp and the marker bit is set on the last one.
//!
//! Interleaving (non-zero AU-index / AU-index-delta) is not supported.

use std::collections::HashMap;

use super::rtp::{RtpPacket, Timeline};
use super::{Depacketizer, Frame};
use crate::error::DepacketizeErrorKind;

/// Samples per AAC-LC access unit; used to timestamp aggregated AUs.
const SAMPLES_PER_AU: u32 = 1024;

/// AU-header layout announced in the SDP `a=fmtp` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuHeaderLayout {
    pub size_length: u32,
    pub index_length: u32,
    pub index_delta_length: u32,
}

impl Default for AuHeaderLayout {
    /// AAC-hbr: `sizelength=13; indexlength=3; indexdeltalength=3`.
    fn default() -> Self {
        Self {
            size_length: 13,
            index_length: 3,
            index_delta_length: 3,
        }
    }
}

impl AuHeaderLayout {
    /// Read the layout from fmtp parameters (keys lower-cased).
    ///
    /// Missing or unparsable values fall back to the AAC-hbr defaults. An
    /// AU size field must be at least one bit wide.
    pub fn from_fmtp(params: &HashMap<String, String>) -> Self {
        let default = Self::default();
        let get = |key: &str, min: u32, fallback: u32| {
            params
                .get(key)
                .and_then(|v| v.trim().parse::<u32>().ok())
                .filter(|v| (min..=16).contains(v))
                .unwrap_or(fallback)
        };
        Self {
            size_length: get("sizelength", 1, default.size_length),
            index_length: get("indexlength", 0, default.index_length),
            index_delta_length: get("indexdeltalength", 0, default.index_delta_length),
        }
    }

    /// Whether every AU-header has a non-empty size field.
    pub fn is_usable(&self) -> bool {
        (1..=16).contains(&self.size_length) && self.index_length <= 16 && self.index_delta_length <= 16
    }
}

/// Fields of an AudioSpecificConfig (ISO/IEC 14496-3 §1.6.2.1) needed to
/// size the audio output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSpecificConfig {
    pub audio_object_type: u8,
    pub sampling_frequency: u32,
    pub channels: u16,
    /// Raw bytes, passed to the hardware decoder as codec-specific data.
    pub raw: Vec<u8>,
}

const SAMPLING_FREQUENCIES: [u32; 13] = [
    96_000, 88_200, 64_000, 48_000, 44_100, 32_000, 24_000, 22_050, 16_000, 12_000, 11_025, 8_000,
    7_350,
];

impl AudioSpecificConfig {
    /// Parse the hex string of the fmtp `config=` parameter.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let raw = decode_hex(hex.trim())?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &[u8]) -> Option<Self> {
        let mut r = BitCursor::new(raw);
        let mut audio_object_type = r.read(5)? as u8;
        if audio_object_type == 31 {
            audio_object_type = 32 + r.read(6)? as u8;
        }
        let sampling_frequency = match r.read(4)? {
            0xf => r.read(24)?,
            i if (i as usize) < SAMPLING_FREQUENCIES.len() => SAMPLING_FREQUENCIES[i as usize],
            _ => return None,
        };
        let channels = match r.read(4)? {
            0 => return None,
            7 => 8,
            c @ 1..=6 => c as u16,
            _ => return None,
        };
        Some(Self {
            audio_object_type,
            sampling_frequency,
            channels,
            raw: raw.to_vec(),
        })
    }
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.is_empty() || hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}

/// MSB-first bit reader over a byte slice.
struct BitCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitCursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read(&mut self, bits: u32) -> Option<u32> {
        let mut value = 0u32;
        for _ in 0..bits {
            let byte = *self.data.get(self.pos / 8)?;
            let bit = (byte >> (7 - (self.pos % 8))) & 1;
            value = (value << 1) | u32::from(bit);
            self.pos += 1;
        }
        Some(value)
    }
}

/// In-progress access unit spread across several packets.
#[derive(Debug)]
struct Fragment {
    rtp_timestamp: u32,
    size: usize,
    buf: Vec<u8>,
}

/// RFC 3640 AAC-hbr depacketizer.
#[derive(Debug)]
pub struct AacDepacketizer {
    layout: AuHeaderLayout,
    timeline: Timeline,
    fragment: Option<Fragment>,
}

impl AacDepacketizer {
    pub fn new(clock_rate: u32, layout: AuHeaderLayout) -> Self {
        Self {
            layout,
            timeline: Timeline::new(clock_rate),
            fragment: None,
        }
    }

    /// Parse the AU-header section. Returns `(sizes, data_offset)`.
    fn read_au_headers(&self, payload: &[u8]) -> Result<(Vec<usize>, usize), DepacketizeErrorKind> {
        if payload.len() < 2 {
            return Err(DepacketizeErrorKind::BadAuHeaders);
        }
        let headers_bits = usize::from(u16::from_be_bytes([payload[0], payload[1]]));
        let headers_bytes = headers_bits.div_ceil(8);
        let data_off = 2 + headers_bytes;
        if payload.len() < data_off {
            return Err(DepacketizeErrorKind::BadAuHeaders);
        }

        if !self.layout.is_usable() {
            return Err(DepacketizeErrorKind::BadAuHeaders);
        }
        let first_len = (self.layout.size_length + self.layout.index_length) as usize;
        let next_len = (self.layout.size_length + self.layout.index_delta_length) as usize;
        if headers_bits < first_len {
            return Err(DepacketizeErrorKind::BadAuHeaders);
        }

        let mut reader = BitCursor::new(&payload[2..data_off]);
        let mut sizes = Vec::with_capacity(1 + (headers_bits - first_len) / next_len);
        let mut consumed = 0usize;
        while consumed < headers_bits {
            let index_bits = if sizes.is_empty() {
                self.layout.index_length
            } else {
                self.layout.index_delta_length
            };
            let header_len = if sizes.is_empty() { first_len } else { next_len };
            if consumed + header_len > headers_bits {
                return Err(DepacketizeErrorKind::BadAuHeaders);
            }
            let size = reader
                .read(self.layout.size_length)
                .ok_or(DepacketizeErrorKind::BadAuHeaders)?;
            let index = reader
                .read(index_bits)
                .ok_or(DepacketizeErrorKind::BadAuHeaders)?;
            if index != 0 {
                // Interleaved streams are out of scope.
                return Err(DepacketizeErrorKind::BadAuHeaders);
            }
            sizes.push(size as usize);
            consumed += header_len;
        }
        Ok((sizes, data_off))
    }
}

impl Depacketizer for AacDepacketizer {
    fn write(
        &mut self,
        packet: &[u8],
        emit: &mut dyn FnMut(Frame),
    ) -> Result<(), DepacketizeErrorKind> {
        let pkt = RtpPacket::parse(packet)?;
        let payload = pkt.payload();
        let (sizes, data_off) = match self.read_au_headers(payload) {
            Ok(v) => v,
            Err(e) => {
                self.fragment = None;
                return Err(e);
            }
        };
        let data = &payload[data_off..];

        if let Some(mut frag) = self.fragment.take() {
            if sizes.len() != 1 || pkt.timestamp != frag.rtp_timestamp || sizes[0] != frag.size {
                tracing::debug!(
                    ts = pkt.timestamp,
                    "discarding incomplete AAC fragment"
                );
                return Err(DepacketizeErrorKind::UnexpectedFragment);
            }
            frag.buf.extend_from_slice(data);
            if frag.buf.len() > frag.size {
                return Err(DepacketizeErrorKind::TruncatedAccessUnit);
            }
            if frag.buf.len() == frag.size {
                if !pkt.marker {
                    return Err(DepacketizeErrorKind::UnexpectedFragment);
                }
                let pts = self.timeline.presentation_time_us(frag.rtp_timestamp);
                emit(Frame::new(frag.buf, pts));
            } else if pkt.marker {
                return Err(DepacketizeErrorKind::TruncatedAccessUnit);
            } else {
                self.fragment = Some(frag);
            }
            return Ok(());
        }

        // A single AU larger than the remaining payload starts a fragment.
        if sizes.len() == 1 && sizes[0] > data.len() {
            if pkt.marker {
                return Err(DepacketizeErrorKind::TruncatedAccessUnit);
            }
            let mut buf = Vec::with_capacity(sizes[0]);
            buf.extend_from_slice(data);
            self.fragment = Some(Fragment {
                rtp_timestamp: pkt.timestamp,
                size: sizes[0],
                buf,
            });
            return Ok(());
        }

        let total: usize = sizes.iter().sum();
        if total > data.len() {
            return Err(DepacketizeErrorKind::TruncatedAccessUnit);
        }

        if sizes.contains(&0) {
            return Err(DepacketizeErrorKind::BadAuHeaders);
        }

        let mut offset = 0usize;
        for (i, size) in sizes.iter().enumerate() {
            let ts = pkt
                .timestamp
                .wrapping_add(SAMPLES_PER_AU.wrapping_mul(i as u32));
            let pts = self.timeline.presentation_time_us(ts);
            emit(Frame::new(data[offset..offset + size].to_vec(), pts));
            offset += size;
        }

        tracing::trace!(
            aus = sizes.len(),
            seq = pkt.sequence,
            ts = pkt.timestamp,
            "AAC packet depacketized"
        );
        Ok(())
    }

    fn clock_rate(&self) -> u32 {
        self.timeline.clock_rate()
    }
}
