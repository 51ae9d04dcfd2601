//! Minimal SDP reader (RFC 4566 / RFC 8866).
//!
//! Each `m=<kind> <port> <proto> <fmt>...` line opens a track; attributes up
//! to the next `m=` belong to it. Of the attributes only `rtpmap`, `fmtp`
//! and `control` are interpreted. When a section declares several payload
//! types, the first `rtpmap` wins.

use super::{MediaDescription, MediaKind, SessionDescription, TrackId, parse_fmtp_params};

pub(super) fn parse(sdp: &str) -> SessionDescription {
    let mut media: Vec<MediaDescription> = Vec::new();

    for line in sdp.lines() {
        let line = line.trim_end_matches('\r');
        let Some((kind, value)) = line.split_once('=') else {
            continue;
        };
        match kind {
            "m" => {
                let kind = value.split_whitespace().next().unwrap_or_default();
                media.push(MediaDescription::new(
                    TrackId(media.len()),
                    MediaKind::parse(kind),
                ));
            }
            "a" => {
                // Session-level attributes precede the first m= line.
                let Some(md) = media.last_mut() else {
                    continue;
                };
                apply_attribute(md, value);
            }
            _ => {}
        }
    }

    tracing::debug!(tracks = media.len(), "parsed session description");
    SessionDescription::new(media)
}

fn apply_attribute(md: &mut MediaDescription, attr: &str) {
    let (name, value) = attr.split_once(':').unwrap_or((attr, ""));
    match name {
        "rtpmap" => {
            if md.rtpmap.is_none() {
                md.rtpmap = super::RtpMap::parse(value);
                if md.rtpmap.is_none() {
                    tracing::debug!(track = %md.id, value, "ignoring malformed rtpmap");
                }
            }
        }
        "fmtp" => {
            // `<pt> <params>`
            let params = value
                .split_once(char::is_whitespace)
                .map(|(_, p)| p)
                .unwrap_or_default();
            md.fmtp.extend(parse_fmtp_params(params));
        }
        "control" => md.control = Some(value.trim().to_string()),
        _ => md
            .attributes
            .push((name.to_string(), value.trim().to_string())),
    }
}
