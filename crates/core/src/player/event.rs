use std::fmt;
use std::sync::Arc;
use std::sync::mpsc::Sender;

use parking_lot::Mutex;

use crate::decoder::DecodedFrame;
use crate::error::PlayerError;
use crate::session::TrackId;

/// Notifications delivered to [`RtspPlayer::subscribe`](crate::RtspPlayer::subscribe) receivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    /// The transport connected to the server.
    Connected,
    /// The transport lost or closed its connection.
    Disconnected,
    /// The session description was processed and decoders are bound.
    Ready,
    /// A video decoder's output dimensions changed.
    SizeChanged { width: u32, height: u32 },
    /// A decoded picture with no render target bound. Only sent when
    /// [`PlayerConfig::frame_events`](crate::PlayerConfig::frame_events) is set.
    VideoFrame { track: TrackId, frame: DecodedFrame },
    /// A terminal transport error or a decoder failure.
    Error(PlayerError),
}

/// Player lifecycle.
///
/// ```text
/// Idle ──start──► Connecting ──SDP──► Ready ──first RTP──► Streaming
///   ▲                 │                 │                     │
///   │                 └───── transient server error ──────────┤
///   │                              ▼                          │
///   └──────stop────────────── Retrying ◄──────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Connecting,
    Ready,
    Streaming,
    Retrying,
}

impl PlayerState {
    /// States in which `start()` is a no-op.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Ready | Self::Streaming)
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Streaming => "streaming",
            Self::Retrying => "retrying",
        };
        f.write_str(s)
    }
}

/// Fan-out of player events to every live subscriber.
#[derive(Clone, Default)]
pub(crate) struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<PlayerEvent>>>>,
}

impl EventBus {
    pub(crate) fn subscribe(&self, tx: Sender<PlayerEvent>) {
        self.subscribers.lock().push(tx);
    }

    /// Send to every subscriber, dropping those whose receiver is gone.
    pub(crate) fn emit(&self, event: PlayerEvent) {
        tracing::trace!(?event, "player event");
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}
