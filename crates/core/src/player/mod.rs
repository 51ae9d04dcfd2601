//! Playback orchestration.
//!
//! [`RtspPlayer`] owns one session to one server. It creates the transport,
//! binds a decoder to every track of the session description whose
//! encoding name has a registered factory, routes each track's RTP/RTCP
//! payloads to its decoder, and reconnects after transient server errors.
//!
//! ## Locking
//!
//! Session state (transport, bound decoders, generation, retry count) lives
//! behind one mutex. The transport is stopped and decoders are released only
//! after that lock is dropped: a transport thread blocked delivering an
//! event can then always make progress while `stop()` joins it. Caller
//! notifications go through channels and are never sent under the lock.
//!
//! ## Generations
//!
//! Each transport attachment gets a generation number. `start`, `stop` and
//! retries bump it, and events carrying an older generation are dropped.
//!
//! ## Output settings
//!
//! Decoders are created and initialized without the session lock held. A
//! `set_mute`/`set_surface` landing in that window bumps a settings epoch;
//! the binder compares it under the lock before installing the new
//! decoders and re-applies the current settings on mismatch.

pub mod config;
pub mod event;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Weak};
use std::thread;

use arc_swap::ArcSwapOption;
use parking_lot::{Mutex, RwLock};

pub use config::{PlayerConfig, RetryPolicy};
pub use event::{PlayerEvent, PlayerState};

use crate::decoder::{
    AudioDecoder, AudioDecoderFactory, BoundDecoder, DecoderContext, DecoderRegistry, ErrorCallback,
    VideoDecoder, VideoDecoderFactory,
};
use crate::error::PlayerError;
use crate::platform::{MediaBackend, Surface};
use crate::session::transport::SessionEvent;
use crate::session::{
    MediaDescription, MediaKind, SessionDescription, TrackId, Transport, TransportConnector,
    TransportEvents,
};
use event::EventBus;

type SharedTransport = Arc<Mutex<Box<dyn Transport>>>;

struct BoundTrack {
    track: Arc<MediaDescription>,
    decoder: BoundDecoder,
}

struct SessionSlot {
    state: PlayerState,
    generation: u64,
    retries: u32,
    transport: Option<SharedTransport>,
    tracks: Vec<BoundTrack>,
}

impl SessionSlot {
    fn detach(&mut self) -> Detached {
        Detached {
            transport: self.transport.take(),
            tracks: std::mem::take(&mut self.tracks),
        }
    }
}

/// Resources taken out of the session, torn down after the lock is released.
struct Detached {
    transport: Option<SharedTransport>,
    tracks: Vec<BoundTrack>,
}

impl Detached {
    fn release(self) {
        if let Some(transport) = self.transport {
            transport.lock().stop();
        }
        release_tracks(self.tracks);
    }
}

fn release_tracks(tracks: Vec<BoundTrack>) {
    for mut bound in tracks {
        bound.decoder.as_decoder_mut().on_release();
        tracing::debug!(track = %bound.track.id, kind = bound.decoder.kind(), "decoder released");
    }
}

pub(crate) struct PlayerInner {
    url: String,
    connector: Arc<dyn TransportConnector>,
    config: PlayerConfig,
    decoder_ctx: DecoderContext,
    audio_factories: RwLock<DecoderRegistry<AudioDecoderFactory>>,
    video_factories: RwLock<DecoderRegistry<VideoDecoderFactory>>,
    surface: ArcSwapOption<Surface>,
    mute: AtomicBool,
    settings_epoch: AtomicU64,
    session: Mutex<SessionSlot>,
    events: EventBus,
    this: Weak<PlayerInner>,
}

impl PlayerInner {
    fn start(&self) {
        let (generation, stale) = {
            let mut slot = self.session.lock();
            if slot.state.is_active() {
                tracing::warn!(state = %slot.state, "start ignored, player already running");
                return;
            }
            slot.retries = 0;
            slot.generation += 1;
            slot.state = PlayerState::Connecting;
            (slot.generation, slot.detach())
        };
        stale.release();
        tracing::info!(url = %self.url, generation, "starting playback");
        self.attach(generation);
    }

    fn stop(&self) {
        let detached = {
            let mut slot = self.session.lock();
            if slot.state == PlayerState::Idle && slot.transport.is_none() && slot.tracks.is_empty() {
                return;
            }
            slot.generation += 1;
            slot.state = PlayerState::Idle;
            slot.detach()
        };
        detached.release();
        tracing::info!(url = %self.url, "playback stopped");
    }

    /// Connect and start a transport for `generation`, unless superseded.
    fn attach(&self, generation: u64) {
        let events = TransportEvents::new(self.this.clone(), generation);
        let transport: SharedTransport = Arc::new(Mutex::new(self.connector.connect(&self.url, events)));

        // Held across installation so a concurrent stop() waits until the
        // transport has started before stopping it.
        let mut guard = transport.lock();
        {
            let mut slot = self.session.lock();
            if slot.generation != generation {
                tracing::debug!(generation, "attach superseded, dropping transport");
                return;
            }
            slot.transport = Some(transport.clone());
        }
        guard.start();
    }

    fn is_current(&self, generation: u64) -> bool {
        self.session.lock().generation == generation
    }

    pub(crate) fn handle_session_event(&self, generation: u64, event: SessionEvent<'_>) {
        match event {
            SessionEvent::Connected => {
                if self.is_current(generation) {
                    tracing::debug!(url = %self.url, "transport connected");
                    self.events.emit(PlayerEvent::Connected);
                }
            }
            SessionEvent::Disconnected => {
                if self.is_current(generation) {
                    tracing::debug!(url = %self.url, "transport disconnected");
                    self.events.emit(PlayerEvent::Disconnected);
                }
            }
            SessionEvent::Description(description) => self.on_description(generation, description),
            SessionEvent::Rtp(track, packet) => self.dispatch(generation, track, packet, false),
            SessionEvent::Rtcp(track, packet) => self.dispatch(generation, track, packet, true),
            SessionEvent::Error(error) => self.on_transport_error(generation, error),
        }
    }

    fn on_description(&self, generation: u64, description: SessionDescription) {
        if !self.is_current(generation) {
            tracing::debug!(generation, "ignoring stale session description");
            return;
        }
        let epoch = self.settings_epoch.load(Ordering::SeqCst);
        let mut tracks = self.bind_tracks(&description);
        let bound = tracks.len();

        let replaced = {
            let mut slot = self.session.lock();
            if slot.generation != generation {
                drop(slot);
                release_tracks(tracks);
                return;
            }
            if self.settings_epoch.load(Ordering::SeqCst) != epoch {
                tracing::debug!("output settings changed while binding, re-applying");
                self.apply_settings(&mut tracks);
            }
            slot.state = PlayerState::Ready;
            std::mem::replace(&mut slot.tracks, tracks)
        };
        release_tracks(replaced);

        tracing::info!(tracks = description.len(), bound, "session ready");
        self.events.emit(PlayerEvent::Ready);
    }

    fn bind_tracks(&self, description: &SessionDescription) -> Vec<BoundTrack> {
        let mut bound = Vec::new();
        for track in &description.media {
            let Some(name) = track.encoding_name() else {
                tracing::debug!(track = %track.id, "track has no rtpmap, skipping");
                continue;
            };
            let decoder = match &track.kind {
                MediaKind::Audio => self.create_audio_decoder(name).map(BoundDecoder::Audio),
                MediaKind::Video => self.create_video_decoder(track.id, name).map(BoundDecoder::Video),
                MediaKind::Other(kind) => {
                    tracing::debug!(track = %track.id, kind = %kind, "unsupported media kind, skipping");
                    continue;
                }
            };
            let Some(mut decoder) = decoder else {
                tracing::warn!(track = %track.id, codec = name, kind = %track.kind, "no decoder registered, skipping track");
                continue;
            };
            decoder.as_decoder_mut().on_init(track);
            tracing::info!(track = %track.id, codec = name, kind = decoder.kind(), "decoder bound");
            bound.push(BoundTrack {
                track: track.clone(),
                decoder,
            });
        }
        bound
    }

    fn create_audio_decoder(&self, name: &str) -> Option<Box<dyn AudioDecoder>> {
        let factory = self.audio_factories.read().get(name)?;
        let mut decoder = factory(&self.decoder_ctx);
        decoder.set_mute(self.mute.load(Ordering::SeqCst));
        decoder.set_error_callback(self.error_callback());
        Some(decoder)
    }

    fn create_video_decoder(&self, track: TrackId, name: &str) -> Option<Box<dyn VideoDecoder>> {
        let factory = self.video_factories.read().get(name)?;
        let mut decoder = factory(&self.decoder_ctx);
        decoder.set_surface(self.surface());
        decoder.set_error_callback(self.error_callback());
        let events = self.events.clone();
        decoder.set_size_callback(Arc::new(move |width, height| {
            events.emit(PlayerEvent::SizeChanged { width, height });
        }));
        if self.config.frame_events {
            let events = self.events.clone();
            decoder.set_frame_callback(Arc::new(move |frame| {
                events.emit(PlayerEvent::VideoFrame { track, frame });
            }));
        }
        Some(decoder)
    }

    /// Push the current mute flag and render target to `tracks`.
    fn apply_settings(&self, tracks: &mut [BoundTrack]) {
        let mute = self.mute.load(Ordering::SeqCst);
        let surface = self.surface();
        for bound in tracks {
            match &mut bound.decoder {
                BoundDecoder::Audio(decoder) => decoder.set_mute(mute),
                BoundDecoder::Video(decoder) => decoder.set_surface(surface.clone()),
            }
        }
    }

    fn error_callback(&self) -> ErrorCallback {
        let events = self.events.clone();
        Arc::new(move |error| events.emit(PlayerEvent::Error(error)))
    }

    fn dispatch(&self, generation: u64, track: TrackId, packet: &[u8], rtcp: bool) {
        let mut guard = self.session.lock();
        let slot = &mut *guard;
        if slot.generation != generation {
            return;
        }
        let Some(bound) = slot.tracks.iter_mut().find(|b| b.track.id == track) else {
            tracing::trace!(track = %track, len = packet.len(), "no decoder for track, dropping packet");
            return;
        };
        let decoder = bound.decoder.as_decoder_mut();
        if rtcp {
            decoder.on_rtcp_received(&bound.track, packet);
            return;
        }
        decoder.on_rtp_received(&bound.track, packet);
        if slot.state == PlayerState::Ready {
            slot.state = PlayerState::Streaming;
            tracing::debug!(track = %track, "streaming");
        }
    }

    fn on_transport_error(&self, generation: u64, error: PlayerError) {
        let policy = &self.config.retry;
        let retry = {
            let mut slot = self.session.lock();
            if slot.generation != generation {
                tracing::debug!(generation, error = %error, "ignoring error from stale transport");
                return;
            }
            match error.status() {
                Some(status) if policy.is_retryable(status) && slot.retries < policy.max_retries => {
                    slot.retries += 1;
                    slot.generation += 1;
                    slot.state = PlayerState::Retrying;
                    Some((slot.generation, slot.retries, slot.transport.take()))
                }
                _ => None,
            }
        };

        match retry {
            Some((generation, attempt, transport)) => self.schedule_retry(generation, attempt, transport),
            None => {
                tracing::warn!(url = %self.url, error = %error, "transport error");
                self.events.emit(PlayerEvent::Error(error));
            }
        }
    }

    fn schedule_retry(&self, generation: u64, attempt: u32, transport: Option<SharedTransport>) {
        let backoff = self.config.retry.backoff;
        tracing::info!(
            url = %self.url,
            attempt,
            max_retries = self.config.retry.max_retries,
            ?backoff,
            "transient server error, reconnecting"
        );
        let player = self.this.clone();
        let spawned = thread::Builder::new()
            .name("rtsp-retry".to_string())
            .spawn(move || {
                if let Some(transport) = transport {
                    transport.lock().stop();
                }
                thread::sleep(backoff);
                if let Some(player) = player.upgrade() {
                    player.reconnect(generation);
                }
            });
        if let Err(e) = spawned {
            tracing::warn!(error = %e, "failed to spawn retry thread");
            self.events.emit(PlayerEvent::Error(PlayerError::Worker(e.to_string())));
        }
    }

    /// Second half of a retry: rebuild the session without resetting the
    /// retry count.
    fn reconnect(&self, generation: u64) {
        let stale = {
            let mut slot = self.session.lock();
            if slot.generation != generation || slot.state != PlayerState::Retrying {
                tracing::debug!(generation, "retry cancelled");
                return;
            }
            slot.state = PlayerState::Connecting;
            std::mem::take(&mut slot.tracks)
        };
        release_tracks(stale);
        tracing::info!(url = %self.url, generation, "reconnecting");
        self.attach(generation);
    }

    fn surface(&self) -> Option<Surface> {
        self.surface.load_full().map(|s| Surface::clone(&s))
    }
}

/// RTSP playback client for one URL.
///
/// ```no_run
/// # use std::sync::Arc;
/// # use rtsp_player::{RtspPlayer, PlayerEvent, TransportConnector, MediaBackend};
/// # fn demo(connector: Arc<dyn TransportConnector>, backend: Arc<dyn MediaBackend>) {
/// let player = RtspPlayer::new("rtsp://192.168.1.10/stream", connector, backend);
/// let events = player.subscribe();
/// player.start();
/// while let Ok(event) = events.recv() {
///     if let PlayerEvent::Error(e) = event {
///         eprintln!("playback failed: {e}");
///         break;
///     }
/// }
/// player.stop();
/// # }
/// ```
pub struct RtspPlayer {
    inner: Arc<PlayerInner>,
}

impl RtspPlayer {
    pub fn new(
        url: &str,
        connector: Arc<dyn TransportConnector>,
        backend: Arc<dyn MediaBackend>,
    ) -> Self {
        Self::with_config(url, connector, backend, PlayerConfig::default())
    }

    pub fn with_config(
        url: &str,
        connector: Arc<dyn TransportConnector>,
        backend: Arc<dyn MediaBackend>,
        config: PlayerConfig,
    ) -> Self {
        let decoder_ctx = DecoderContext {
            backend,
            codec_timeout: config.codec_timeout,
            join_timeout: config.worker_join_timeout,
            queue_capacity: config.frame_queue_capacity,
            audio_buffer_margin: config.audio_buffer_margin,
        };
        let inner = Arc::new_cyclic(|this| PlayerInner {
            url: url.to_string(),
            connector,
            config,
            decoder_ctx,
            audio_factories: RwLock::new(DecoderRegistry::with_builtin_audio()),
            video_factories: RwLock::new(DecoderRegistry::with_builtin_video()),
            surface: ArcSwapOption::empty(),
            mute: AtomicBool::new(false),
            settings_epoch: AtomicU64::new(0),
            session: Mutex::new(SessionSlot {
                state: PlayerState::Idle,
                generation: 0,
                retries: 0,
                transport: None,
                tracks: Vec::new(),
            }),
            events: EventBus::default(),
            this: this.clone(),
        });
        Self { inner }
    }

    /// Connect and start playback. Ignored while already running.
    pub fn start(&self) {
        self.inner.start();
    }

    /// Tear down the transport and release every decoder. Idempotent.
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn state(&self) -> PlayerState {
        self.inner.session.lock().state
    }

    /// Reconnects performed since the last `start()`. Kept across `stop()`.
    pub fn retry_count(&self) -> u32 {
        self.inner.session.lock().retries
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.inner.config
    }

    /// Receive player events from now on.
    pub fn subscribe(&self) -> Receiver<PlayerEvent> {
        let (tx, rx) = mpsc::channel();
        self.inner.events.subscribe(tx);
        rx
    }

    /// Bind or unbind the video render target, including on running decoders.
    pub fn set_surface(&self, surface: Option<Surface>) {
        self.inner.surface.store(surface.clone().map(Arc::new));
        self.inner.settings_epoch.fetch_add(1, Ordering::SeqCst);
        let mut slot = self.inner.session.lock();
        for bound in slot.tracks.iter_mut() {
            if let BoundDecoder::Video(decoder) = &mut bound.decoder {
                decoder.set_surface(surface.clone());
            }
        }
    }

    pub fn surface(&self) -> Option<Surface> {
        self.inner.surface()
    }

    /// Mute or unmute audio, including on running decoders.
    pub fn set_mute(&self, mute: bool) {
        self.inner.mute.store(mute, Ordering::SeqCst);
        self.inner.settings_epoch.fetch_add(1, Ordering::SeqCst);
        let mut slot = self.inner.session.lock();
        for bound in slot.tracks.iter_mut() {
            if let BoundDecoder::Audio(decoder) = &mut bound.decoder {
                decoder.set_mute(mute);
            }
        }
        tracing::debug!(mute, "audio mute changed");
    }

    pub fn is_mute(&self) -> bool {
        self.inner.mute.load(Ordering::SeqCst)
    }

    /// Register a video decoder for an rtpmap encoding name (case-insensitive),
    /// replacing any existing one. Applies from the next session description.
    pub fn add_video_factory<F>(&self, name: &str, factory: F)
    where
        F: Fn(&DecoderContext) -> Box<dyn VideoDecoder> + Send + Sync + 'static,
    {
        self.inner.video_factories.write().register(name, Arc::new(factory));
        tracing::debug!(codec = name, "video decoder factory registered");
    }

    /// Register an audio decoder for an rtpmap encoding name (case-insensitive),
    /// replacing any existing one. Applies from the next session description.
    pub fn add_audio_factory<F>(&self, name: &str, factory: F)
    where
        F: Fn(&DecoderContext) -> Box<dyn AudioDecoder> + Send + Sync + 'static,
    {
        self.inner.audio_factories.write().register(name, Arc::new(factory));
        tracing::debug!(codec = name, "audio decoder factory registered");
    }

    /// Tracks with a bound decoder, in session order.
    pub fn bound_tracks(&self) -> Vec<TrackId> {
        self.inner.session.lock().tracks.iter().map(|b| b.track.id).collect()
    }
}

impl Drop for RtspPlayer {
    fn drop(&mut self) {
        self.inner.stop();
    }
}
