//! Access-unit assembly shared by the NAL-based video payload formats.

use super::rtp::{RtpPacket, Timeline};
use super::{BufferFlags, Frame, START_CODE};

/// Collects NAL units of one access unit and emits them as an Annex B frame.
///
/// An access unit ends on the RTP marker bit or when the RTP timestamp
/// changes. A fragmented NAL in progress is dropped when a sequence gap is
/// detected, since its middle is missing.
#[derive(Debug)]
pub(crate) struct NalAssembler {
    timeline: Timeline,
    access_unit: Vec<u8>,
    access_unit_ts: Option<u32>,
    pub(crate) fragment: Option<Vec<u8>>,
    last_sequence: Option<u16>,
    flags: fn(&[u8]) -> BufferFlags,
}

impl NalAssembler {
    pub(crate) fn new(clock_rate: u32, flags: fn(&[u8]) -> BufferFlags) -> Self {
        Self {
            timeline: Timeline::new(clock_rate),
            access_unit: Vec::new(),
            access_unit_ts: None,
            fragment: None,
            last_sequence: None,
            flags,
        }
    }

    pub(crate) fn clock_rate(&self) -> u32 {
        self.timeline.clock_rate()
    }

    /// Account for a new packet before its payload is handled.
    pub(crate) fn begin_packet(&mut self, pkt: &RtpPacket<'_>, emit: &mut dyn FnMut(Frame)) {
        if let Some(last) = self.last_sequence {
            let expected = last.wrapping_add(1);
            if pkt.sequence != expected && self.fragment.take().is_some() {
                tracing::debug!(
                    expected,
                    got = pkt.sequence,
                    "discarding fragmented NAL after packet loss"
                );
            }
        }
        self.last_sequence = Some(pkt.sequence);

        if self.access_unit_ts.is_some_and(|ts| ts != pkt.timestamp) {
            self.flush(emit);
        }
        self.access_unit_ts = Some(pkt.timestamp);
    }

    /// Complete the packet; the marker bit closes the access unit.
    pub(crate) fn end_packet(&mut self, pkt: &RtpPacket<'_>, emit: &mut dyn FnMut(Frame)) {
        if pkt.marker {
            self.flush(emit);
        }
    }

    pub(crate) fn push_nal(&mut self, nal: &[u8]) {
        if nal.is_empty() {
            return;
        }
        self.access_unit.extend_from_slice(&START_CODE);
        self.access_unit.extend_from_slice(nal);
    }

    fn flush(&mut self, emit: &mut dyn FnMut(Frame)) {
        let Some(ts) = self.access_unit_ts.take() else {
            return;
        };
        if self.access_unit.is_empty() {
            return;
        }
        let data = std::mem::take(&mut self.access_unit);
        let flags = (self.flags)(&data);
        let pts = self.timeline.presentation_time_us(ts);
        emit(Frame {
            data,
            presentation_time_us: pts,
            flags,
        });
    }
}
