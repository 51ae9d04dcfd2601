//! Error types for the RTSP playback pipeline.

use std::fmt;

/// RTSP response status code (RFC 2326 §7.1.1) carried by transport errors.
///
/// Transports that fail before any response is parsed (socket errors,
/// timeouts) report [`RtspStatus::UNKNOWN`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RtspStatus(pub u16);

impl RtspStatus {
    /// No status line was received.
    pub const UNKNOWN: RtspStatus = RtspStatus(0);
    pub const OK: RtspStatus = RtspStatus(200);
    pub const BAD_REQUEST: RtspStatus = RtspStatus(400);
    pub const UNAUTHORIZED: RtspStatus = RtspStatus(401);
    pub const NOT_FOUND: RtspStatus = RtspStatus(404);
    pub const SESSION_NOT_FOUND: RtspStatus = RtspStatus(454);
    pub const UNSUPPORTED_TRANSPORT: RtspStatus = RtspStatus(461);
    pub const INTERNAL_SERVER_ERROR: RtspStatus = RtspStatus(500);
    pub const NOT_IMPLEMENTED: RtspStatus = RtspStatus(501);
    pub const SERVICE_UNAVAILABLE: RtspStatus = RtspStatus(503);

    pub fn code(self) -> u16 {
        self.0
    }

    /// Whether the status is in the 5xx server-error class.
    pub fn is_server_error(self) -> bool {
        (500..600).contains(&self.0)
    }
}

impl fmt::Display for RtspStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::UNKNOWN {
            write!(f, "unknown")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Errors surfaced by the player, its decoders and its transport.
///
/// Variants map to the failure classes of the pipeline:
///
/// - **Transport**: [`Transport`](Self::Transport), reported by the
///   session transport; retried only for configured server statuses.
/// - **Decoder setup**: [`AudioSink`](Self::AudioSink),
///   [`Codec`](Self::Codec), [`InvalidTrack`](Self::InvalidTrack),
///   [`Worker`](Self::Worker): fatal to one decoder only.
/// - **Decoding**: [`Decode`](Self::Decode) ends the decode loop of one
///   track. Malformed RTP payloads are only logged and never surface here.
///
/// Errors are `Clone` so they can be delivered through
/// [`PlayerEvent::Error`](crate::PlayerEvent::Error).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlayerError {
    /// The transport reported a failure, optionally with an RTSP status.
    #[error("RTSP transport error (status {status}): {message}")]
    Transport { status: RtspStatus, message: String },

    /// The audio output sink could not be created or started.
    #[error("audio sink unavailable: {0}")]
    AudioSink(String),

    /// The hardware codec could not be created, configured or driven.
    #[error("hardware codec error: {0}")]
    Codec(String),

    /// The decode loop of a track ended abnormally.
    #[error("decode loop aborted: {0}")]
    Decode(String),

    /// The track's SDP attributes could not be used to configure a decoder.
    #[error("invalid track parameters: {0}")]
    InvalidTrack(String),

    /// A decode worker thread could not be spawned.
    #[error("failed to spawn decode worker: {0}")]
    Worker(String),
}

impl PlayerError {
    pub fn transport(status: RtspStatus, message: impl Into<String>) -> Self {
        Self::Transport {
            status,
            message: message.into(),
        }
    }

    /// Status code carried by a transport error, if any.
    pub fn status(&self) -> Option<RtspStatus> {
        match self {
            Self::Transport { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Why an RTP packet could not be reassembled into an access unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepacketizeErrorKind {
    /// Shorter than the 12-byte RTP fixed header, or than its CSRC/extension.
    TruncatedHeader,
    /// RTP version field was not 2.
    BadVersion(u8),
    /// Padding length exceeded the payload.
    BadPadding,
    /// AU-headers-length or AU-header section is inconsistent (RFC 3640).
    BadAuHeaders,
    /// AU data shorter than the size announced by its header.
    TruncatedAccessUnit,
    /// Fragment continuation without a start, or with a changed timestamp.
    UnexpectedFragment,
    /// NAL unit type not handled by the payload format.
    UnsupportedNalType(u8),
    /// Empty payload.
    EmptyPayload,
}

impl fmt::Display for DepacketizeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TruncatedHeader => write!(f, "truncated RTP header"),
            Self::BadVersion(v) => write!(f, "unsupported RTP version {v}"),
            Self::BadPadding => write!(f, "invalid RTP padding"),
            Self::BadAuHeaders => write!(f, "invalid AU headers"),
            Self::TruncatedAccessUnit => write!(f, "truncated access unit"),
            Self::UnexpectedFragment => write!(f, "unexpected fragment"),
            Self::UnsupportedNalType(t) => write!(f, "unsupported NAL unit type {t}"),
            Self::EmptyPayload => write!(f, "empty payload"),
        }
    }
}

/// Convenience alias for `Result<T, PlayerError>`.
pub type Result<T> = std::result::Result<T, PlayerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display() {
        assert_eq!(RtspStatus::INTERNAL_SERVER_ERROR.to_string(), "500");
        assert_eq!(RtspStatus::UNKNOWN.to_string(), "unknown");
    }

    #[test]
    fn server_error_class() {
        assert!(RtspStatus::INTERNAL_SERVER_ERROR.is_server_error());
        assert!(RtspStatus::SERVICE_UNAVAILABLE.is_server_error());
        assert!(!RtspStatus::NOT_FOUND.is_server_error());
    }

    #[test]
    fn transport_error_carries_status() {
        let e = PlayerError::transport(RtspStatus::INTERNAL_SERVER_ERROR, "boom");
        assert_eq!(e.status(), Some(RtspStatus::INTERNAL_SERVER_ERROR));
        assert!(e.to_string().contains("500"));
        assert_eq!(PlayerError::Decode("x".into()).status(), None);
    }
}
