//! In-memory transport and platform doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rtsp_player::{
    AudioDecoder, AudioSink, AudioSinkConfig, BufferFlags, Decoder, DecoderContext, ErrorCallback,
    FrameCallback, HardwareCodec, MediaBackend, MediaDescription, MediaFormat, OutputBuffer,
    PlayerError, RenderTarget, Result, SizeCallback, Surface, Transport, TransportConnector,
    TransportEvents, VideoDecoder,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Poll `cond` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

/// Build an RTP packet with a 12-byte header.
pub fn rtp_packet(marker: bool, pt: u8, seq: u16, ts: u32, payload: &[u8]) -> Vec<u8> {
    let mut pkt = Vec::with_capacity(12 + payload.len());
    pkt.push(0x80);
    pkt.push(if marker { 0x80 | pt } else { pt });
    pkt.extend_from_slice(&seq.to_be_bytes());
    pkt.extend_from_slice(&ts.to_be_bytes());
    pkt.extend_from_slice(&0x1234_5678u32.to_be_bytes());
    pkt.extend_from_slice(payload);
    pkt
}

/// RFC 3640 AAC-hbr payload carrying one access unit.
pub fn aac_payload(au: &[u8]) -> Vec<u8> {
    let mut payload = vec![0x00, 0x10];
    let header = (au.len() as u16) << 3;
    payload.extend_from_slice(&header.to_be_bytes());
    payload.extend_from_slice(au);
    payload
}

// ── Transport ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct TransportLog {
    pub started: bool,
    pub stopped: bool,
}

struct MockTransport {
    log: Arc<Mutex<TransportLog>>,
}

impl Transport for MockTransport {
    fn start(&mut self) {
        self.log.lock().started = true;
    }

    fn stop(&mut self) {
        self.log.lock().stopped = true;
    }
}

/// Connector recording every transport it creates. Tests drive events
/// through the recorded handles.
#[derive(Default)]
pub struct MockConnector {
    connections: Mutex<Vec<(TransportEvents, Arc<Mutex<TransportLog>>)>>,
}

impl MockConnector {
    pub fn connects(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn events(&self, index: usize) -> TransportEvents {
        self.connections.lock()[index].0.clone()
    }

    pub fn latest(&self) -> TransportEvents {
        let connections = self.connections.lock();
        connections[connections.len() - 1].0.clone()
    }

    pub fn started(&self, index: usize) -> bool {
        self.connections.lock()[index].1.lock().started
    }

    pub fn stopped(&self, index: usize) -> bool {
        self.connections.lock()[index].1.lock().stopped
    }
}

impl TransportConnector for MockConnector {
    fn connect(&self, _url: &str, events: TransportEvents) -> Box<dyn Transport> {
        let log = Arc::new(Mutex::new(TransportLog::default()));
        self.connections.lock().push((events, log.clone()));
        Box::new(MockTransport { log })
    }
}

// ── Platform ──────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct CodecLog {
    pub formats: Vec<MediaFormat>,
    pub configured_with_surface: Vec<bool>,
    pub inputs: Vec<(usize, u64, BufferFlags)>,
    pub rendered: usize,
    pub discarded: usize,
    pub surface_switches: Vec<bool>,
    pub stopped: usize,
    pub released: usize,
}

#[derive(Debug, Default)]
pub struct SinkLog {
    pub configs: Vec<AudioSinkConfig>,
    pub playing: usize,
    pub writes: usize,
    pub bytes: usize,
    pub stopped: usize,
    pub released: usize,
}

/// Backend whose codecs decode every input into one output buffer.
#[derive(Default)]
pub struct MockBackend {
    pub codec: Arc<Mutex<CodecLog>>,
    pub sink: Arc<Mutex<SinkLog>>,
    pub fail_sink: bool,
    pub fail_codec: bool,
    /// Format changes reported, one per output poll, before any buffer.
    pub format_changes: Vec<(u32, u32)>,
    /// PCM bytes produced per decoded audio access unit.
    pub pcm_per_frame: usize,
    /// Codecs created for this MIME type fail every output poll.
    pub failing_mime: Option<&'static str>,
    /// How long a failing output poll blocks before returning its error.
    pub failure_delay: Duration,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            pcm_per_frame: 2048,
            ..Default::default()
        }
    }
}

impl MediaBackend for MockBackend {
    fn create_decoder(&self, format: &MediaFormat) -> Result<Box<dyn HardwareCodec>> {
        if self.fail_codec {
            return Err(PlayerError::Codec(format!("no decoder for {}", format.mime)));
        }
        self.codec.lock().formats.push(format.clone());
        Ok(Box::new(MockCodec {
            log: self.codec.clone(),
            pending: VecDeque::new(),
            format_changes: self.format_changes.iter().copied().collect(),
            pcm_per_frame: self.pcm_per_frame,
            next_index: 0,
            failing: self.failing_mime == Some(format.mime.as_str()),
            failure_delay: self.failure_delay,
        }))
    }

    fn open_audio_sink(&self, config: &AudioSinkConfig) -> Result<Box<dyn AudioSink>> {
        if self.fail_sink {
            return Err(PlayerError::AudioSink("device busy".into()));
        }
        self.sink.lock().configs.push(*config);
        Ok(Box::new(MockSink {
            log: self.sink.clone(),
        }))
    }
}

struct MockCodec {
    log: Arc<Mutex<CodecLog>>,
    pending: VecDeque<(u64, BufferFlags)>,
    format_changes: VecDeque<(u32, u32)>,
    pcm_per_frame: usize,
    next_index: usize,
    failing: bool,
    failure_delay: Duration,
}

impl HardwareCodec for MockCodec {
    fn configure(&mut self, _format: &MediaFormat, surface: Option<&Surface>) -> Result<()> {
        self.log.lock().configured_with_surface.push(surface.is_some());
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn dequeue_input_buffer(&mut self, _timeout: Duration) -> Result<Option<usize>> {
        self.next_index += 1;
        Ok(Some(self.next_index))
    }

    fn queue_input_buffer(
        &mut self,
        _index: usize,
        data: &[u8],
        presentation_time_us: u64,
        flags: BufferFlags,
    ) -> Result<()> {
        self.log.lock().inputs.push((data.len(), presentation_time_us, flags));
        self.pending.push_back((presentation_time_us, flags));
        Ok(())
    }

    fn dequeue_output_buffer(&mut self, _timeout: Duration) -> Result<OutputBuffer> {
        if self.failing {
            thread::sleep(self.failure_delay);
            return Err(PlayerError::Codec("decoder fault".into()));
        }
        if let Some((width, height)) = self.format_changes.pop_front() {
            return Ok(OutputBuffer::FormatChanged { width, height });
        }
        match self.pending.pop_front() {
            Some((pts, _)) => Ok(OutputBuffer::Buffer {
                index: 0,
                data: vec![0u8; self.pcm_per_frame],
                presentation_time_us: pts,
                flags: BufferFlags::NONE,
            }),
            None => Ok(OutputBuffer::TryAgainLater),
        }
    }

    fn release_output_buffer(&mut self, _index: usize, render: bool) -> Result<()> {
        let mut log = self.log.lock();
        if render {
            log.rendered += 1;
        } else {
            log.discarded += 1;
        }
        Ok(())
    }

    fn set_output_surface(&mut self, surface: Option<&Surface>) -> Result<()> {
        self.log.lock().surface_switches.push(surface.is_some());
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.log.lock().stopped += 1;
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.log.lock().released += 1;
        Ok(())
    }
}

struct MockSink {
    log: Arc<Mutex<SinkLog>>,
}

impl AudioSink for MockSink {
    fn play(&mut self) -> Result<()> {
        self.log.lock().playing += 1;
        Ok(())
    }

    fn write(&mut self, pcm: &[u8]) -> Result<usize> {
        let mut log = self.log.lock();
        log.writes += 1;
        log.bytes += pcm.len();
        Ok(pcm.len())
    }

    fn stop(&mut self) -> Result<()> {
        self.log.lock().stopped += 1;
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.log.lock().released += 1;
        Ok(())
    }
}

pub struct Screen;

impl RenderTarget for Screen {}

// ── Decoder double ────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct DecoderLog {
    pub created: usize,
    pub inits: usize,
    pub rtp: usize,
    pub rtcp: usize,
    pub releases: usize,
    pub mute: Vec<bool>,
    /// Whether each pushed render target was `Some`.
    pub surfaces: Vec<bool>,
    /// Time spent inside `on_init`.
    pub init_delay: Duration,
}

/// Decoder that only records what the player asks of it.
pub struct RecordingDecoder {
    log: Arc<Mutex<DecoderLog>>,
    mute: bool,
}

impl RecordingDecoder {
    pub fn factory(
        log: Arc<Mutex<DecoderLog>>,
    ) -> impl Fn(&DecoderContext) -> Box<dyn AudioDecoder> + Send + Sync + 'static {
        move |_ctx: &DecoderContext| -> Box<dyn AudioDecoder> {
            log.lock().created += 1;
            Box::new(RecordingDecoder {
                log: log.clone(),
                mute: false,
            })
        }
    }

    pub fn video_factory(
        log: Arc<Mutex<DecoderLog>>,
    ) -> impl Fn(&DecoderContext) -> Box<dyn VideoDecoder> + Send + Sync + 'static {
        move |_ctx: &DecoderContext| -> Box<dyn VideoDecoder> {
            log.lock().created += 1;
            Box::new(RecordingDecoder {
                log: log.clone(),
                mute: false,
            })
        }
    }
}

impl Decoder for RecordingDecoder {
    fn on_init(&mut self, _track: &Arc<MediaDescription>) {
        let delay = {
            let mut log = self.log.lock();
            log.inits += 1;
            log.init_delay
        };
        thread::sleep(delay);
    }

    fn on_rtp_received(&mut self, _track: &MediaDescription, _packet: &[u8]) {
        self.log.lock().rtp += 1;
    }

    fn on_rtcp_received(&mut self, _track: &MediaDescription, _packet: &[u8]) {
        self.log.lock().rtcp += 1;
    }

    fn on_release(&mut self) {
        self.log.lock().releases += 1;
    }

    fn set_error_callback(&mut self, _callback: ErrorCallback) {}
}

impl AudioDecoder for RecordingDecoder {
    fn set_mute(&mut self, mute: bool) {
        self.mute = mute;
        self.log.lock().mute.push(mute);
    }

    fn is_mute(&self) -> bool {
        self.mute
    }

    fn sampling_rate(&self) -> u32 {
        8000
    }

    fn set_sampling_rate(&mut self, _rate: u32) {}

    fn channel_count(&self) -> u16 {
        1
    }

    fn set_channel_count(&mut self, _channels: u16) {}
}

impl VideoDecoder for RecordingDecoder {
    fn set_surface(&mut self, surface: Option<Surface>) {
        self.log.lock().surfaces.push(surface.is_some());
    }

    fn set_size_callback(&mut self, _callback: SizeCallback) {}

    fn set_frame_callback(&mut self, _callback: FrameCallback) {}
}
