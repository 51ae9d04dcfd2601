//! Seam between the player and the RTSP session client.
//!
//! The client (request/response handling, RTP reception over UDP or
//! interleaved TCP) lives outside this crate. It is created through a
//! [`TransportConnector`] and reports everything it learns through the
//! [`TransportEvents`] handle it was given:
//!
//! ```text
//! connect ──► connected ──► session_description ──► rtp / rtcp ... ──► disconnected
//!                   └──────────────► error(status) ◄─────────┘
//! ```
//!
//! Every handle is bound to one attachment of the player. After the player
//! stops or replaces the transport, calls on an old handle are ignored, so a
//! client thread that races with `stop()` cannot feed a torn-down session.

use std::sync::Weak;

use super::{SessionDescription, TrackId};
use crate::error::PlayerError;
use crate::player::PlayerInner;

/// A running session client.
///
/// `start` must not block: the client runs on its own thread(s) and reports
/// through its [`TransportEvents`]. `stop` tears the session down and must
/// not be called from a thread currently inside a `TransportEvents` call of
/// the same transport.
pub trait Transport: Send {
    fn start(&mut self);
    fn stop(&mut self);
}

/// Creates session clients for a URL.
pub trait TransportConnector: Send + Sync {
    fn connect(&self, url: &str, events: TransportEvents) -> Box<dyn Transport>;
}

/// Event delivered from a transport to the player.
#[derive(Debug)]
pub(crate) enum SessionEvent<'a> {
    Connected,
    Disconnected,
    Description(SessionDescription),
    Rtp(TrackId, &'a [u8]),
    Rtcp(TrackId, &'a [u8]),
    Error(PlayerError),
}

/// Handle a transport uses to report to its player.
#[derive(Debug, Clone)]
pub struct TransportEvents {
    player: Weak<PlayerInner>,
    generation: u64,
}

impl TransportEvents {
    pub(crate) fn new(player: Weak<PlayerInner>, generation: u64) -> Self {
        Self { player, generation }
    }

    /// Attachment this handle belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn connected(&self) {
        self.deliver(SessionEvent::Connected);
    }

    pub fn disconnected(&self) {
        self.deliver(SessionEvent::Disconnected);
    }

    /// The server's session description, once DESCRIBE/SETUP completed.
    pub fn session_description(&self, description: SessionDescription) {
        self.deliver(SessionEvent::Description(description));
    }

    /// One RTP packet (header included) received for `track`.
    pub fn rtp(&self, track: TrackId, packet: &[u8]) {
        self.deliver(SessionEvent::Rtp(track, packet));
    }

    /// One RTCP packet received for `track`.
    pub fn rtcp(&self, track: TrackId, packet: &[u8]) {
        self.deliver(SessionEvent::Rtcp(track, packet));
    }

    /// A session failure. Use [`PlayerError::Transport`] with the server's
    /// status code when one is known.
    pub fn error(&self, error: PlayerError) {
        self.deliver(SessionEvent::Error(error));
    }

    fn deliver(&self, event: SessionEvent<'_>) {
        match self.player.upgrade() {
            Some(player) => player.handle_session_event(self.generation, event),
            None => tracing::trace!(generation = self.generation, "player dropped, ignoring event"),
        }
    }
}
