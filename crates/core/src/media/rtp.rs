use crate::error::DepacketizeErrorKind;

/// Parsed view of an RTP packet (RFC 3550 §5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// |            CSRC list (CC entries, 4 bytes each)               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// The CSRC list and the header extension (X bit, RFC 3550 §5.3.1) are
/// skipped; trailing padding (P bit) is removed from the payload.
#[derive(Debug, Clone, Copy)]
pub struct RtpPacket<'a> {
    /// Set on the last packet of an access unit for most video formats.
    pub marker: bool,
    /// RTP payload type (7-bit, RFC 3551).
    pub payload_type: u8,
    pub sequence: u16,
    /// Media clock timestamp (wraps at 2^32).
    pub timestamp: u32,
    pub ssrc: u32,
    payload: &'a [u8],
}

impl<'a> RtpPacket<'a> {
    /// Minimum size of the fixed header.
    pub const HEADER_LEN: usize = 12;

    pub fn parse(data: &'a [u8]) -> Result<Self, DepacketizeErrorKind> {
        if data.len() < Self::HEADER_LEN {
            return Err(DepacketizeErrorKind::TruncatedHeader);
        }

        let version = data[0] >> 6;
        if version != 2 {
            return Err(DepacketizeErrorKind::BadVersion(version));
        }
        let padding = data[0] & 0x20 != 0;
        let extension = data[0] & 0x10 != 0;
        let csrc_count = usize::from(data[0] & 0x0f);

        let mut offset = Self::HEADER_LEN + csrc_count * 4;
        if data.len() < offset {
            return Err(DepacketizeErrorKind::TruncatedHeader);
        }

        if extension {
            if data.len() < offset + 4 {
                return Err(DepacketizeErrorKind::TruncatedHeader);
            }
            let words = usize::from(u16::from_be_bytes([data[offset + 2], data[offset + 3]]));
            offset += 4 + words * 4;
            if data.len() < offset {
                return Err(DepacketizeErrorKind::TruncatedHeader);
            }
        }

        let mut end = data.len();
        if padding {
            let pad = usize::from(data[end - 1]);
            if pad == 0 || offset + pad > end {
                return Err(DepacketizeErrorKind::BadPadding);
            }
            end -= pad;
        }

        Ok(Self {
            marker: data[1] & 0x80 != 0,
            payload_type: data[1] & 0x7f,
            sequence: u16::from_be_bytes([data[2], data[3]]),
            timestamp: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            ssrc: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
            payload: &data[offset..end],
        })
    }

    /// Codec payload following the header, without padding.
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }
}

/// Converts 32-bit RTP timestamps into a monotonic presentation time.
///
/// The first timestamp seen maps to zero. Later timestamps are extended to
/// 64 bits across wraparound (forward steps under 2^31 count as progress),
/// then scaled to microseconds using the track's clock rate.
#[derive(Debug)]
pub struct Timeline {
    clock_rate: u32,
    first: Option<u32>,
    last: u32,
    extended: u64,
}

impl Timeline {
    pub fn new(clock_rate: u32) -> Self {
        Self {
            clock_rate: clock_rate.max(1),
            first: None,
            last: 0,
            extended: 0,
        }
    }

    pub fn clock_rate(&self) -> u32 {
        self.clock_rate
    }

    /// Presentation time in microseconds for an RTP timestamp.
    pub fn presentation_time_us(&mut self, timestamp: u32) -> u64 {
        if self.first.is_none() {
            self.first = Some(timestamp);
            self.last = timestamp;
            self.extended = 0;
            return 0;
        }

        let delta = timestamp.wrapping_sub(self.last);
        if delta < 0x8000_0000 {
            self.extended += u64::from(delta);
            self.last = timestamp;
        } else {
            // Reordered packet from slightly in the past; do not move the timeline back.
            let behind = u64::from(self.last.wrapping_sub(timestamp));
            return self.ticks_to_us(self.extended.saturating_sub(behind));
        }
        self.ticks_to_us(self.extended)
    }

    fn ticks_to_us(&self, ticks: u64) -> u64 {
        ticks * 1_000_000 / u64::from(self.clock_rate)
    }
}

#[cfg(test)]
pub(crate) fn build_packet(marker: bool, pt: u8, seq: u16, ts: u32, payload: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(RtpPacket::HEADER_LEN + payload.len());
    packet.push(2 << 6);
    packet.push(((marker as u8) << 7) | pt);
    packet.extend_from_slice(&seq.to_be_bytes());
    packet.extend_from_slice(&ts.to_be_bytes());
    packet.extend_from_slice(&0xAABBCCDDu32.to_be_bytes());
    packet.extend_from_slice(payload);
    packet
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fixed_header() {
        let data = build_packet(true, 96, 7, 90000, &[1, 2, 3]);
        let pkt = RtpPacket::parse(&data).unwrap();
        assert!(pkt.marker);
        assert_eq!(pkt.payload_type, 96);
        assert_eq!(pkt.sequence, 7);
        assert_eq!(pkt.timestamp, 90000);
        assert_eq!(pkt.ssrc, 0xAABBCCDD);
        assert_eq!(pkt.payload(), &[1, 2, 3]);
    }

    #[test]
    fn rejects_short_packet() {
        assert_eq!(
            RtpPacket::parse(&[0x80, 96, 0]).unwrap_err(),
            DepacketizeErrorKind::TruncatedHeader
        );
    }

    #[test]
    fn rejects_wrong_version() {
        let mut data = build_packet(false, 96, 0, 0, &[1]);
        data[0] = 1 << 6;
        assert_eq!(
            RtpPacket::parse(&data).unwrap_err(),
            DepacketizeErrorKind::BadVersion(1)
        );
    }

    #[test]
    fn skips_csrc_and_extension() {
        let mut data = build_packet(false, 97, 1, 2, &[]);
        data[0] |= 0x10 | 0x01; // X=1, CC=1
        data.extend_from_slice(&[0, 0, 0, 9]); // CSRC
        data.extend_from_slice(&[0xBE, 0xDE, 0, 1]); // extension header, 1 word
        data.extend_from_slice(&[0xFF; 4]);
        data.extend_from_slice(&[0x42, 0x43]);
        let pkt = RtpPacket::parse(&data).unwrap();
        assert_eq!(pkt.payload(), &[0x42, 0x43]);
    }

    #[test]
    fn strips_padding() {
        let mut data = build_packet(false, 96, 1, 2, &[9, 9, 0, 0, 3]);
        data[0] |= 0x20;
        let pkt = RtpPacket::parse(&data).unwrap();
        assert_eq!(pkt.payload(), &[9, 9]);
    }

    #[test]
    fn bad_padding_length() {
        let mut data = build_packet(false, 96, 1, 2, &[200]);
        data[0] |= 0x20;
        assert_eq!(
            RtpPacket::parse(&data).unwrap_err(),
            DepacketizeErrorKind::BadPadding
        );
    }

    #[test]
    fn timeline_starts_at_zero_and_scales() {
        let mut t = Timeline::new(16000);
        assert_eq!(t.presentation_time_us(5000), 0);
        assert_eq!(t.presentation_time_us(5000 + 1024), 64_000);
        assert_eq!(t.presentation_time_us(5000 + 2048), 128_000);
    }

    #[test]
    fn timeline_survives_wraparound() {
        let mut t = Timeline::new(90000);
        assert_eq!(t.presentation_time_us(u32::MAX - 2999), 0);
        assert_eq!(t.presentation_time_us(3000), 6000 * 1_000_000 / 90000);
    }

    #[test]
    fn timeline_does_not_go_backwards_on_reorder() {
        let mut t = Timeline::new(1000);
        t.presentation_time_us(0);
        let later = t.presentation_time_us(2000);
        let earlier = t.presentation_time_us(1000);
        assert_eq!(later, 2_000_000);
        assert_eq!(earlier, 1_000_000);
        assert_eq!(t.presentation_time_us(3000), 3_000_000);
    }
}
