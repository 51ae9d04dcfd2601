use base64::prelude::{BASE64_STANDARD, Engine as _};

use super::nal::NalAssembler;
use super::rtp::RtpPacket;
use super::{BufferFlags, Depacketizer, Frame};
use crate::error::DepacketizeErrorKind;

const NAL_IDR: u8 = 5;
const NAL_SPS: u8 = 7;
const NAL_PPS: u8 = 8;
const NAL_STAP_A: u8 = 24;
const NAL_FU_A: u8 = 28;

/// H.264 RTP depacketizer (RFC 6184).
///
/// Reassembles RTP payloads into Annex B access units. Supports the
/// packetization modes used by RTSP servers:
///
/// - **Single NAL Unit** (§5.6): payload types 1–23 are a complete NAL.
///
/// - **STAP-A** (§5.7.1): several NALs aggregated in one packet, each
///   preceded by a 16-bit size.
///
/// - **FU-A Fragmentation** (§5.8): a NAL split across packets. Each
///   fragment carries a 2-byte FU header before the NAL payload:
///
///   ```text
///   FU indicator:  [F|NRI|Type=28]     (1 byte)
///   FU header:     [S|E|R|NAL_Type]    (1 byte)
///   Fragment data: [...]
///   ```
///
///   The original NAL header is rebuilt as `F|NRI` from the indicator and
///   `NAL_Type` from the FU header.
///
/// ## Access unit boundaries
///
/// Per RFC 6184 §5.1 the marker bit is set on the last packet of an access
/// unit. NALs are buffered until the marker, or until the RTP timestamp
/// changes (marker lost), and then emitted as one [`Frame`] with each NAL
/// prefixed by a 4-byte start code.
///
/// Interleaved mode (STAP-B, MTAP, FU-B) is rejected.
#[derive(Debug)]
pub struct H264Depacketizer {
    assembler: NalAssembler,
}

impl H264Depacketizer {
    pub fn new(clock_rate: u32) -> Self {
        Self {
            assembler: NalAssembler::new(clock_rate, frame_flags),
        }
    }

    fn handle_payload(&mut self, payload: &[u8]) -> Result<(), DepacketizeErrorKind> {
        let nal_header = *payload.first().ok_or(DepacketizeErrorKind::EmptyPayload)?;
        let nal_type = nal_header & 0x1f;
        let au = &mut self.assembler;

        match nal_type {
            1..=23 => {
                au.fragment = None;
                au.push_nal(payload);
            }
            NAL_STAP_A => {
                au.fragment = None;
                let mut rest = &payload[1..];
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
            NAL_FU_A => {
                if payload.len() < 2 {
                    return Err(DepacketizeErrorKind::TruncatedAccessUnit);
                }
                let fu_header = payload[1];
                let start = fu_header & 0x80 != 0;
                let end = fu_header & 0x40 != 0;
                let data = &payload[2..];

                if start {
                    if au.fragment.is_some() {
                        tracing::debug!("FU-A start while previous fragment incomplete");
                    }
                    let mut nal = Vec::with_capacity(data.len() + 1);
                    nal.push((nal_header & 0xe0) | (fu_header & 0x1f));
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

impl Depacketizer for H264Depacketizer {
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

    /// 90 kHz clock rate per RFC 6184 §8.1.
    fn clock_rate(&self) -> u32 {
        self.assembler.clock_rate()
    }
}

/// Split an Annex B bitstream into NAL units (without start codes).
///
/// Scans for start codes (both 4-byte `00 00 00 01` and 3-byte
/// `00 00 01`). The start code length is tracked per NAL so boundaries
/// between adjacent NALs are computed correctly when mixed 3-byte and
/// 4-byte start codes appear.
pub fn extract_nal_units(data: &[u8]) -> Vec<&[u8]> {
    let mut i = 0usize;

    // (nal_data_start_index, start_code_length)
    let mut start_entries: Vec<(usize, usize)> = Vec::new();

    while i < data.len() {
        if i + 3 < data.len() && data[i..i + 4] == [0, 0, 0, 1] {
            start_entries.push((i + 4, 4));
            i += 4;
        } else if i + 2 < data.len() && data[i..i + 3] == [0, 0, 1] {
            start_entries.push((i + 3, 3));
            i += 3;
        } else {
            i += 1;
        }
    }

    let mut nal_units = Vec::with_capacity(start_entries.len());
    for (idx, &(start, _)) in start_entries.iter().enumerate() {
        let end = match start_entries.get(idx + 1) {
            Some(&(next_start, next_sc_len)) => next_start - next_sc_len,
            None => data.len(),
        };
        if start < end {
            nal_units.push(&data[start..end]);
        }
    }
    nal_units
}

/// Decoder input flags for an Annex B H.264 access unit.
///
/// IDR slices mark a key frame; an access unit made only of SPS/PPS is
/// codec configuration.
pub fn frame_flags(data: &[u8]) -> BufferFlags {
    let nals = extract_nal_units(data);
    let types: Vec<u8> = nals.iter().map(|n| n[0] & 0x1f).collect();
    if types.contains(&NAL_IDR) {
        BufferFlags::KEY_FRAME
    } else if !types.is_empty() && types.iter().all(|t| *t == NAL_SPS || *t == NAL_PPS) {
        BufferFlags::CODEC_CONFIG
    } else {
        BufferFlags::NONE
    }
}

/// Decode `sprop-parameter-sets` (RFC 6184 §8.1): comma-separated base64 NALs.
///
/// Entries that fail to decode are skipped.
pub fn parse_sprop_parameter_sets(value: &str) -> Vec<Vec<u8>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match BASE64_STANDARD.decode(s) {
            Ok(nal) => Some(nal),
            Err(e) => {
                tracing::debug!(error = %e, "invalid sprop-parameter-sets entry");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::rtp::build_packet;

    fn collect(d: &mut H264Depacketizer, packet: &[u8]) -> Vec<Frame> {
        let mut out = Vec::new();
        d.write(packet, &mut |f| out.push(f)).unwrap();
        out
    }

    // --- NAL extraction ---

    #[test]
    fn extract_single_nal_4byte_sc() {
        let data = [0, 0, 0, 1, 0x65, 0xAA, 0xBB];
        let nals = extract_nal_units(&data);
        assert_eq!(nals, vec![&[0x65u8, 0xAA, 0xBB][..]]);
    }

    #[test]
    fn extract_mixed_start_codes() {
        let mut data = vec![0, 0, 0, 1, 0x67, 0x42];
        data.extend_from_slice(&[0, 0, 1, 0x68, 0xCE]);
        let nals = extract_nal_units(&data);
        assert_eq!(nals.len(), 2);
        assert_eq!(nals[0], &[0x67, 0x42]);
        assert_eq!(nals[1], &[0x68, 0xCE]);
    }

    #[test]
    fn extract_no_start_code() {
        assert!(extract_nal_units(&[0xFF, 0xFE]).is_empty());
    }

    // --- Depacketization ---

    #[test]
    fn single_nal_with_marker_emits_frame() {
        let mut d = H264Depacketizer::new(90000);
        let frames = collect(&mut d, &build_packet(true, 96, 1, 3000, &[0x65, 0xAA, 0xBB]));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, vec![0, 0, 0, 1, 0x65, 0xAA, 0xBB]);
        assert_eq!(frames[0].flags, BufferFlags::KEY_FRAME);
    }

    #[test]
    fn nals_accumulate_until_marker() {
        let mut d = H264Depacketizer::new(90000);
        assert!(collect(&mut d, &build_packet(false, 96, 1, 0, &[0x41, 1])).is_empty());
        let frames = collect(&mut d, &build_packet(true, 96, 2, 0, &[0x41, 2]));
        assert_eq!(frames[0].data, vec![0, 0, 0, 1, 0x41, 1, 0, 0, 0, 1, 0x41, 2]);
        assert_eq!(frames[0].flags, BufferFlags::NONE);
    }

    #[test]
    fn timestamp_change_flushes_without_marker() {
        let mut d = H264Depacketizer::new(90000);
        collect(&mut d, &build_packet(false, 96, 1, 0, &[0x41, 1]));
        let frames = collect(&mut d, &build_packet(false, 96, 2, 3000, &[0x41, 2]));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].presentation_time_us, 0);
    }

    #[test]
    fn stap_a_parameter_sets() {
        let mut d = H264Depacketizer::new(90000);
        let mut payload = vec![NAL_STAP_A];
        payload.extend_from_slice(&[0, 2, 0x67, 0x42]);
        payload.extend_from_slice(&[0, 2, 0x68, 0xCE]);
        let frames = collect(&mut d, &build_packet(true, 96, 1, 0, &payload));
        assert_eq!(
            frames[0].data,
            vec![0, 0, 0, 1, 0x67, 0x42, 0, 0, 0, 1, 0x68, 0xCE]
        );
        assert_eq!(frames[0].flags, BufferFlags::CODEC_CONFIG);
    }

    #[test]
    fn fu_a_reassembly() {
        let mut d = H264Depacketizer::new(90000);
        let indicator = 0x60 | NAL_FU_A;
        collect(&mut d, &build_packet(false, 96, 1, 0, &[indicator, 0x80 | 5, 1, 2]));
        collect(&mut d, &build_packet(false, 96, 2, 0, &[indicator, 5, 3]));
        let frames = collect(&mut d, &build_packet(true, 96, 3, 0, &[indicator, 0x40 | 5, 4]));
        assert_eq!(frames[0].data, vec![0, 0, 0, 1, 0x65, 1, 2, 3, 4]);
        assert_eq!(frames[0].flags, BufferFlags::KEY_FRAME);
    }

    #[test]
    fn fu_a_continuation_without_start_is_rejected() {
        let mut d = H264Depacketizer::new(90000);
        let err = d
            .write(&build_packet(true, 96, 1, 0, &[NAL_FU_A, 0x40 | 5, 4]), &mut |_| {})
            .unwrap_err();
        assert_eq!(err, DepacketizeErrorKind::UnexpectedFragment);
    }

    #[test]
    fn fu_a_dropped_after_loss() {
        let mut d = H264Depacketizer::new(90000);
        collect(&mut d, &build_packet(false, 96, 1, 0, &[NAL_FU_A, 0x80 | 1, 1]));
        let err = d
            .write(&build_packet(true, 96, 3, 0, &[NAL_FU_A, 0x40 | 1, 2]), &mut |_| {})
            .unwrap_err();
        assert_eq!(err, DepacketizeErrorKind::UnexpectedFragment);
    }

    #[test]
    fn interleaved_modes_rejected() {
        let mut d = H264Depacketizer::new(90000);
        let err = d
            .write(&build_packet(true, 96, 1, 0, &[25, 0]), &mut |_| {})
            .unwrap_err();
        assert_eq!(err, DepacketizeErrorKind::UnsupportedNalType(25));
    }

    #[test]
    fn sprop_parameter_sets_decode() {
        let sets = parse_sprop_parameter_sets("Z0IAHg==,aM48gA==");
        assert_eq!(sets, vec![vec![0x67, 0x42, 0x00, 0x1e], vec![0x68, 0xce, 0x3c, 0x80]]);
    }

    #[test]
    fn sprop_parameter_sets_skip_invalid() {
        assert_eq!(parse_sprop_parameter_sets("!!!,aM48gA==").len(), 1);
    }
}
