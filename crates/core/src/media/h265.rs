//! H.265 (HEVC) RTP depacketizer (RFC 7798).
//!
//! Key differences from H.264 (RFC 6184):
//!
//! - **2-byte NAL unit header** (vs 1-byte in H.264).
//!   The NAL type is in bits 1..6 of the first byte.
//!
//! - **Aggregation Packet** (type 48, §4.4.2) replaces STAP-A.
//!
//! - **Fragmentation Unit** (type 49, §4.4.3): payload header (2 bytes)
//!   followed by a 1-byte FU header `[S|E|FuType(6)]`.
//!
//! - **SDP attributes** (RFC 7798 §7.1):
//!   ```text
//!   a=rtpmap:96 H265/90000
//!   a=fmtp:96 sprop-vps=...; sprop-sps=...; sprop-pps=...
//!   ```
//!
//! DONL fields (`sprop-max-don-diff > 0`) and PACI packets are not supported.

use super::nal::NalAssembler;
use super::rtp::RtpPacket;
use super::{BufferFlags, Depacketizer, Frame};
use crate::error::DepacketizeErrorKind;

const NAL_BLA_W_LP: u8 = 16;
const NAL_CRA: u8 = 21;
const NAL_VPS: u8 = 32;
const NAL_SPS: u8 = 33;
const NAL_PPS: u8 = 34;
const NAL_AP: u8 = 48;
const NAL_FU: u8 = 49;

fn nal_type(header: u8) -> u8 {
    (header >> 1) & 0x3f
}

#[derive(Debug)]
pub struct H265Depacketizer {
    assembler: NalAssembler,
}

impl H265Depacketizer {
    pub fn new(clock_rate: u32) -> Self {
        Self {
            assembler: NalAssembler::new(clock_rate, frame_flags),
        }
    }

    fn handle_payload(&mut self, payload: &[u8]) -> Result<(), DepacketizeErrorKind> {
        if payload.len() < 2 {
            return Err(DepacketizeErrorKind::EmptyPayload);
        }
        let au = &mut self.assembler;

        match nal_type(payload[0]) {
            0..=47 => {
                au.fragment = None;
                au.push_nal(payload);
            }
            NAL_AP => {
                au.fragment = None;
                let mut rest = &payload[2..];
                while rest.len() >= 2 {
                    let size = usize::from(u16::from_be_bytes([rest[0], rest[1]]));
                    rest = &rest[2..];
                    if size > rest.len() {
                        return Err(DepacketizeErrorKind::TruncatedAccessUnit);
                    }
                    let (nal, tail) = rest.split_at(size);
                    au.push_nal(nal);
                    rest = tail;
                }
            }
            NAL_FU => {
                if payload.len() < 3 {
                    return Err(DepacketizeErrorKind::TruncatedAccessUnit);
                }
                let fu_header = payload[2];
                let start = fu_header & 0x80 != 0;
                let end = fu_header & 0x40 != 0;
                let fu_type = fu_header & 0x3f;
                let data = &payload[3..];

                if start {
                    let mut nal = Vec::with_capacity(data.len() + 2);
                    nal.push((payload[0] & 0x81) | (fu_type << 1));
                    nal.push(payload[1]);
                    nal.extend_from_slice(data);
                    au.fragment = Some(nal);
                } else {
                    au.fragment
                        .as_mut()
                        .ok_or(DepacketizeErrorKind::UnexpectedFragment)?
                        .extend_from_slice(data);
                }

                if end && let Some(nal) = au.fragment.take() {
                    au.push_nal(&nal);
                }
            }
            other => return Err(DepacketizeErrorKind::UnsupportedNalType(other)),
        }
        Ok(())
    }
}

impl Depacketizer for H265Depacketizer {
    fn write(
        &mut self,
        packet: &[u8],
        emit: &mut dyn FnMut(Frame),
    ) -> Result<(), DepacketizeErrorKind> {
        let pkt = RtpPacket::parse(packet)?;
        self.assembler.begin_packet(&pkt, emit);
        let result = self.handle_payload(pkt.payload());
        self.assembler.end_packet(&pkt, emit);
        result
    }

    fn clock_rate(&self) -> u32 {
        self.assembler.clock_rate()
    }
}

/// Decoder input flags for an Annex B H.265 access unit.
///
/// IRAP pictures (BLA/IDR/CRA, types 16–21) are key frames; an access unit
/// of only VPS/SPS/PPS is codec configuration.
pub fn frame_flags(data: &[u8]) -> BufferFlags {
    let types: Vec<u8> = super::h264::extract_nal_units(data)
        .iter()
        .map(|n| nal_type(n[0]))
        .collect();
    if types.iter().any(|t| (NAL_BLA_W_LP..=NAL_CRA).contains(t)) {
        BufferFlags::KEY_FRAME
    } else if !types.is_empty() && types.iter().all(|t| matches!(*t, NAL_VPS | NAL_SPS | NAL_PPS)) {
        BufferFlags::CODEC_CONFIG
    } else {
        BufferFlags::NONE
    }
}
