//! Hardware video decoding for H.264 and H.265 tracks.
//!
//! Both codecs share one pipeline, [`HardwareVideoDecoder`], parameterized
//! by a [`VideoProfile`] that supplies the MIME type, the RTP depacketizer
//! and the codec-specific data read from the SDP.

use std::marker::PhantomData;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use arc_swap::ArcSwapOption;

use crate::decoder::codec::{CodecSlot, as_codec_error, as_decode_error};
use crate::decoder::worker::{DecodeWorker, WorkerContext};
use crate::decoder::{
    DecodedFrame, Decoder, DecoderContext, ErrorCallback, FrameCallback, SizeCallback, VideoDecoder,
};
use crate::error::{PlayerError, Result};
use crate::media::h264::{H264Depacketizer, parse_sprop_parameter_sets};
use crate::media::h265::H265Depacketizer;
use crate::media::{BufferFlags, Depacketizer, START_CODE};
use crate::platform::{MediaFormat, OutputBuffer, Surface};
use crate::session::MediaDescription;

/// RTP clock rate of every video payload format handled here.
pub const VIDEO_CLOCK_RATE: u32 = 90_000;

/// Codec-specific half of a video decoder.
pub trait VideoProfile: Send + 'static {
    /// Encoding name in `a=rtpmap`.
    const NAME: &'static str;
    const MIME: &'static str;

    fn depacketizer(clock_rate: u32) -> Box<dyn Depacketizer>;

    /// Parameter sets from the track's fmtp, in Annex B form.
    fn codec_specific_data(track: &MediaDescription) -> Vec<Vec<u8>>;
}

#[derive(Debug)]
pub struct H264Profile;

impl VideoProfile for H264Profile {
    const NAME: &'static str = "H264";
    const MIME: &'static str = "video/avc";

    fn depacketizer(clock_rate: u32) -> Box<dyn Depacketizer> {
        Box::new(H264Depacketizer::new(clock_rate))
    }

    /// `csd-0` = SPS, `csd-1` = PPS.
    fn codec_specific_data(track: &MediaDescription) -> Vec<Vec<u8>> {
        track
            .fmtp_param("sprop-parameter-sets")
            .map(parse_sprop_parameter_sets)
            .unwrap_or_default()
            .into_iter()
            .map(|nal| annex_b(&[nal]))
            .collect()
    }
}

#[derive(Debug)]
pub struct H265Profile;

impl VideoProfile for H265Profile {
    const NAME: &'static str = "H265";
    const MIME: &'static str = "video/hevc";

    fn depacketizer(clock_rate: u32) -> Box<dyn Depacketizer> {
        Box::new(H265Depacketizer::new(clock_rate))
    }

    /// `csd-0` = VPS + SPS + PPS.
    fn codec_specific_data(track: &MediaDescription) -> Vec<Vec<u8>> {
        let nals: Vec<Vec<u8>> = ["sprop-vps", "sprop-sps", "sprop-pps"]
            .iter()
            .filter_map(|key| track.fmtp_param(key))
            .flat_map(parse_sprop_parameter_sets)
            .collect();
        if nals.is_empty() {
            Vec::new()
        } else {
            vec![annex_b(&nals)]
        }
    }
}

fn annex_b(nals: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    for nal in nals {
        out.extend_from_slice(&START_CODE);
        out.extend_from_slice(nal);
    }
    out
}

/// Frame dimensions from `a=framesize:<pt> <w>-<h>` or `a=x-dimensions:<w>,<h>`.
fn declared_dimensions(track: &MediaDescription) -> Option<(u32, u32)> {
    if let Some(value) = track.attribute("framesize") {
        let size = value.split_whitespace().last()?;
        let (w, h) = size.split_once('-')?;
        return Some((w.parse().ok()?, h.parse().ok()?));
    }
    let (w, h) = track.attribute("x-dimensions")?.split_once(',')?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}

/// Video decoder rendering through a platform hardware codec.
pub struct HardwareVideoDecoder<P: VideoProfile> {
    ctx: DecoderContext,
    surface: Arc<ArcSwapOption<Surface>>,
    codec: CodecSlot,
    worker: Option<DecodeWorker>,
    depacketizer: Option<Box<dyn Depacketizer>>,
    on_error: Option<ErrorCallback>,
    on_size: Option<SizeCallback>,
    on_frame: Option<FrameCallback>,
    _profile: PhantomData<fn() -> P>,
}

pub type H264Decoder = HardwareVideoDecoder<H264Profile>;
pub type H265Decoder = HardwareVideoDecoder<H265Profile>;

impl<P: VideoProfile> HardwareVideoDecoder<P> {
    pub fn new(ctx: DecoderContext) -> Self {
        Self {
            ctx,
            surface: Arc::new(ArcSwapOption::empty()),
            codec: CodecSlot::new(),
            worker: None,
            depacketizer: None,
            on_error: None,
            on_size: None,
            on_frame: None,
            _profile: PhantomData,
        }
    }

    pub fn surface(&self) -> Option<Surface> {
        self.surface.load_full().map(|s| Surface::clone(&s))
    }

    /// Whether the decode worker thread is still running.
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(DecodeWorker::is_alive)
    }

    fn init(&mut self, track: &MediaDescription) -> Result<()> {
        let (width, height) = declared_dimensions(track).unzip();
        let mut format = MediaFormat::video(P::MIME, width, height);
        format.csd = P::codec_specific_data(track);

        let mut codec = self.ctx.backend.create_decoder(&format).map_err(as_codec_error)?;
        let surface = self.surface();
        let started = codec
            .configure(&format, surface.as_ref())
            .and_then(|()| codec.start());
        if let Err(e) = started {
            if let Err(release_err) = codec.release() {
                tracing::warn!(codec = P::MIME, error = %release_err, "codec release failed");
            }
            return Err(as_codec_error(e));
        }
        self.codec.install(codec);

        let codec = self.codec.clone();
        let surface = self.surface.clone();
        let on_error = self.on_error.clone();
        let callbacks = OutputCallbacks {
            size: self.on_size.clone(),
            frame: self.on_frame.clone(),
        };
        let timeout = self.ctx.codec_timeout;
        let worker = DecodeWorker::spawn(
            &format!("{}-decoder-{}", P::NAME.to_ascii_lowercase(), track.id.0),
            self.ctx.queue_capacity,
            move |ctx| {
                if let Err(e) = decode_loop::<P>(&ctx, &codec, &surface, &callbacks, timeout) {
                    tracing::warn!(codec = P::MIME, error = %e, "video decode loop ended");
                    if !ctx.is_stopped()
                        && let Some(cb) = on_error
                    {
                        cb(as_decode_error(e));
                    }
                }
            },
        );
        match worker {
            Ok(w) => self.worker = Some(w),
            Err(e) => {
                self.codec.shutdown(P::MIME);
                return Err(e);
            }
        }

        let clock_rate = track
            .rtpmap
            .as_ref()
            .map(|m| m.clock_rate)
            .filter(|rate| *rate > 0)
            .unwrap_or(VIDEO_CLOCK_RATE);
        self.depacketizer = Some(P::depacketizer(clock_rate));
        tracing::info!(
            track = %track.id,
            codec = P::NAME,
            width = ?width,
            height = ?height,
            csd = format.csd.len(),
            "video decoder initialized"
        );
        Ok(())
    }

    fn report(&self, error: PlayerError) {
        tracing::warn!(codec = P::MIME, error = %error, "video decoder error");
        if let Some(cb) = &self.on_error {
            cb(error);
        }
    }
}

struct OutputCallbacks {
    size: Option<SizeCallback>,
    frame: Option<FrameCallback>,
}

fn decode_loop<P: VideoProfile>(
    ctx: &WorkerContext,
    codec: &CodecSlot,
    surface: &ArcSwapOption<Surface>,
    callbacks: &OutputCallbacks,
    timeout: Duration,
) -> Result<()> {
    let mut last_size: Option<(u32, u32)> = None;

    while let Some(frame) = ctx.next_frame() {
        let polled = codec.with(|c| {
            if let Some(index) = c.dequeue_input_buffer(timeout)? {
                c.queue_input_buffer(index, &frame.data, frame.presentation_time_us, frame.flags)?;
            }
            c.dequeue_output_buffer(timeout)
        });
        let Some(polled) = polled else {
            return Ok(());
        };

        match polled? {
            OutputBuffer::Buffer {
                index,
                data,
                presentation_time_us,
                flags,
            } => {
                let render = surface.load().as_deref().is_some_and(Surface::is_valid);
                if !render && let Some(cb) = &callbacks.frame {
                    cb(DecodedFrame {
                        data: data.into(),
                        presentation_time_us,
                    });
                }
                if let Some(released) = codec.with(|c| c.release_output_buffer(index, render)) {
                    released?;
                }
                if flags.contains(BufferFlags::END_OF_STREAM) {
                    tracing::debug!(codec = P::MIME, "end of stream");
                    return Ok(());
                }
            }
            OutputBuffer::TryAgainLater => thread::sleep(Duration::from_millis(1)),
            OutputBuffer::FormatChanged { width, height } => {
                tracing::debug!(codec = P::MIME, width, height, "output format changed");
                if last_size != Some((width, height)) {
                    last_size = Some((width, height));
                    if let Some(cb) = &callbacks.size {
                        cb(width, height);
                    }
                }
            }
            OutputBuffer::BuffersChanged => tracing::debug!(codec = P::MIME, "output buffers changed"),
        }
    }
    Ok(())
}

impl<P: VideoProfile> Decoder for HardwareVideoDecoder<P> {
    fn on_init(&mut self, track: &Arc<MediaDescription>) {
        if let Err(e) = self.init(track) {
            self.report(e);
        }
    }

    fn on_rtp_received(&mut self, track: &MediaDescription, packet: &[u8]) {
        let (Some(depacketizer), Some(worker)) = (self.depacketizer.as_mut(), self.worker.as_ref()) else {
            return;
        };
        let result = depacketizer.write(packet, &mut |frame| {
            tracing::trace!(len = frame.len(), pts = frame.presentation_time_us, "video access unit");
            worker.push(frame);
        });
        if let Err(kind) = result {
            tracing::debug!(track = %track.id, codec = P::NAME, error = %kind, "dropping video packet");
        }
    }

    fn on_release(&mut self) {
        if let Some(worker) = &self.worker {
            worker.request_stop();
        }
        self.codec.shutdown(P::MIME);
        if let Some(mut worker) = self.worker.take() {
            worker.terminate(self.ctx.join_timeout);
        }
        self.depacketizer = None;
        tracing::debug!(codec = P::MIME, "video decoder released");
    }

    fn set_error_callback(&mut self, callback: ErrorCallback) {
        self.on_error = Some(callback);
    }
}

impl<P: VideoProfile> VideoDecoder for HardwareVideoDecoder<P> {
    fn set_surface(&mut self, surface: Option<Surface>) {
        self.surface.store(surface.clone().map(Arc::new));
        let switched = self.codec.with(|c| c.set_output_surface(surface.as_ref()));
        if let Some(Err(e)) = switched {
            tracing::warn!(codec = P::MIME, error = %e, "failed to switch output surface");
        }
    }

    fn set_size_callback(&mut self, callback: SizeCallback) {
        self.on_size = Some(callback);
    }

    fn set_frame_callback(&mut self, callback: FrameCallback) {
        self.on_frame = Some(callback);
    }
}
