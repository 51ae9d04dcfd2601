//! Negotiated session model.
//!
//! A playback session is described by the server's SDP (RFC 4566) answer to
//! DESCRIBE. The transport parses it (or builds it directly) into a
//! [`SessionDescription`]: one [`MediaDescription`] per `m=` section, in
//! order. Each track is identified by its position, its [`TrackId`], which
//! the transport uses again when it delivers that track's RTP and RTCP
//! payloads.
//!
//! ```text
//! m=audio 0 RTP/AVP 97                           ← media kind + payload type
//! a=rtpmap:97 mpeg4-generic/16000/1              ← encoding/clock/channels
//! a=fmtp:97 streamtype=5; mode=AAC-hbr; config=1408; sizelength=13
//! a=control:trackID=1                            ← track control URL
//! ```

mod sdp;
pub mod transport;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub use transport::{Transport, TransportConnector, TransportEvents};

/// Position of a track within its session description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(pub usize);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "track{}", self.0)
    }
}

/// Media kind from the `m=` line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
    /// Any other kind (`application`, `text`, ...); never bound to a decoder.
    Other(String),
}

impl MediaKind {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "audio" => MediaKind::Audio,
            "video" => MediaKind::Video,
            other => MediaKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Video => write!(f, "video"),
            MediaKind::Other(s) => write!(f, "{s}"),
        }
    }
}

/// `a=rtpmap:<pt> <encoding>/<clock>[/<channels>]` (RFC 4566 §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpMap {
    pub payload_type: u8,
    pub encoding_name: String,
    pub clock_rate: u32,
    /// Raw encoding parameters (channel count for audio), if present.
    pub encoding_params: Option<String>,
}

impl RtpMap {
    /// Parse the value after `a=rtpmap:`.
    pub fn parse(value: &str) -> Option<Self> {
        let (pt, rest) = value.trim().split_once(char::is_whitespace)?;
        let payload_type = pt.parse().ok()?;
        let mut parts = rest.trim().split('/');
        let encoding_name = parts.next().filter(|s| !s.is_empty())?.to_string();
        let clock_rate = parts.next()?.trim().parse().ok()?;
        let encoding_params = parts.next().map(|s| s.trim().to_string());
        Some(Self {
            payload_type,
            encoding_name,
            clock_rate,
            encoding_params,
        })
    }

    /// Channel count from the encoding parameters; `None` if absent or malformed.
    pub fn channels(&self) -> Option<u16> {
        self.encoding_params
            .as_deref()
            .and_then(|p| p.parse::<u16>().ok())
            .filter(|c| *c > 0)
    }
}

/// One negotiated track. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescription {
    pub id: TrackId,
    pub kind: MediaKind,
    pub rtpmap: Option<RtpMap>,
    /// `a=fmtp` parameters with lower-cased keys.
    pub fmtp: HashMap<String, String>,
    pub control: Option<String>,
    /// Remaining `a=` attributes, name → value (empty for flags).
    pub attributes: Vec<(String, String)>,
}

impl MediaDescription {
    pub fn new(id: TrackId, kind: MediaKind) -> Self {
        Self {
            id,
            kind,
            rtpmap: None,
            fmtp: HashMap::new(),
            control: None,
            attributes: Vec::new(),
        }
    }

    pub fn with_rtpmap(mut self, value: &str) -> Self {
        self.rtpmap = RtpMap::parse(value);
        self
    }

    /// Set format parameters from the value of an `a=fmtp:<pt> ...` line
    /// (without the payload type).
    pub fn with_fmtp(mut self, params: &str) -> Self {
        self.fmtp = parse_fmtp_params(params);
        self
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.push((name.to_string(), value.to_string()));
        self
    }

    /// Encoding name declared by the rtpmap attribute.
    pub fn encoding_name(&self) -> Option<&str> {
        self.rtpmap.as_ref().map(|m| m.encoding_name.as_str())
    }

    /// Format parameter by name (case-insensitive).
    pub fn fmtp_param(&self, name: &str) -> Option<&str> {
        self.fmtp.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// First value of a free-form attribute (case-insensitive name).
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Ordered tracks of one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionDescription {
    pub media: Vec<Arc<MediaDescription>>,
}

impl SessionDescription {
    pub fn new(media: Vec<MediaDescription>) -> Self {
        Self {
            media: media.into_iter().map(Arc::new).collect(),
        }
    }

    /// Read the media sections of an SDP body.
    ///
    /// Only what track binding needs is interpreted; session-level lines and
    /// unknown lines are ignored. Never fails: a malformed attribute is
    /// dropped and the track kept.
    pub fn parse(sdp: &str) -> Self {
        sdp::parse(sdp)
    }

    pub fn track(&self, id: TrackId) -> Option<&Arc<MediaDescription>> {
        self.media.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.media.len()
    }

    pub fn is_empty(&self) -> bool {
        self.media.is_empty()
    }
}

/// Split `key=value; key=value` fmtp parameters, lower-casing keys.
pub(crate) fn parse_fmtp_params(params: &str) -> HashMap<String, String> {
    params
        .split(';')
        .filter_map(|kv| {
            let kv = kv.trim();
            if kv.is_empty() {
                return None;
            }
            match kv.split_once('=') {
                Some((k, v)) => Some((k.trim().to_ascii_lowercase(), v.trim().to_string())),
                None => Some((kv.to_ascii_lowercase(), String::new())),
            }
        })
        .collect()
}
