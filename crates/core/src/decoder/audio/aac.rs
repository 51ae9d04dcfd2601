use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::AudioOutput;
use crate::decoder::codec::{CodecSlot, as_codec_error, as_decode_error};
use crate::decoder::worker::{DecodeWorker, WorkerContext};
use crate::decoder::{AudioDecoder, Decoder, DecoderContext, ErrorCallback};
use crate::error::{PlayerError, Result};
use crate::media::aac::{AacDepacketizer, AudioSpecificConfig, AuHeaderLayout};
use crate::media::{BufferFlags, Depacketizer};
use crate::platform::{MediaFormat, OutputBuffer};
use crate::session::MediaDescription;

const MIME: &str = "audio/mp4a-latm";
const DEFAULT_SAMPLING_RATE: u32 = 44_100;
const DEFAULT_CHANNELS: u16 = 1;

/// AAC decoder for `mpeg4-generic` tracks.
///
/// Depacketizes RFC 3640 AAC-hbr, decodes through an `audio/mp4a-latm`
/// hardware codec and plays the PCM through an [`AudioOutput`].
pub struct AacLatmDecoder {
    ctx: DecoderContext,
    sampling_rate: u32,
    channel_count: u16,
    output: AudioOutput,
    codec: CodecSlot,
    worker: Option<DecodeWorker>,
    depacketizer: Option<AacDepacketizer>,
    on_error: Option<ErrorCallback>,
}

impl AacLatmDecoder {
    pub fn new(ctx: DecoderContext) -> Self {
        Self {
            ctx,
            sampling_rate: DEFAULT_SAMPLING_RATE,
            channel_count: DEFAULT_CHANNELS,
            output: AudioOutput::new(),
            codec: CodecSlot::new(),
            worker: None,
            depacketizer: None,
            on_error: None,
        }
    }

    /// Whether the decode worker thread is still running.
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(DecodeWorker::is_alive)
    }

    fn report(&self, error: PlayerError) {
        tracing::warn!(codec = MIME, error = %error, "AAC decoder error");
        if let Some(cb) = &self.on_error {
            cb(error);
        }
    }

    fn start_codec(&self, config: Option<&AudioSpecificConfig>) -> Result<()> {
        let mut format = MediaFormat::audio(MIME, self.sampling_rate, self.channel_count);
        if let Some(asc) = config {
            format.csd.push(asc.raw.clone());
        }
        let mut codec = self.ctx.backend.create_decoder(&format).map_err(as_codec_error)?;
        let started = codec.configure(&format, None).and_then(|()| codec.start());
        if let Err(e) = started {
            if let Err(release_err) = codec.release() {
                tracing::warn!(codec = MIME, error = %release_err, "codec release failed");
            }
            return Err(as_codec_error(e));
        }
        self.codec.install(codec);
        Ok(())
    }

    fn init(&mut self, track: &MediaDescription) -> Result<()> {
        if let Some(rtpmap) = &track.rtpmap {
            self.sampling_rate = rtpmap.clock_rate;
            match rtpmap.channels() {
                Some(channels) => self.channel_count = channels,
                None if rtpmap.encoding_params.is_some() => {
                    tracing::debug!(track = %track.id, params = ?rtpmap.encoding_params, "ignoring bad channel count");
                }
                None => {}
            }
        }
        if self.sampling_rate == 0 || self.channel_count == 0 {
            return Err(PlayerError::InvalidTrack(format!(
                "{} Hz, {} channels",
                self.sampling_rate, self.channel_count
            )));
        }
        let config = track.fmtp_param("config").and_then(|hex| {
            let asc = AudioSpecificConfig::from_hex(hex);
            if asc.is_none() {
                tracing::debug!(track = %track.id, config = hex, "ignoring invalid AudioSpecificConfig");
            }
            asc
        });

        self.output.open(
            self.ctx.backend.as_ref(),
            self.sampling_rate,
            self.channel_count,
            self.ctx.audio_buffer_margin,
        )?;

        if let Err(e) = self.start_codec(config.as_ref()) {
            self.output.release();
            return Err(e);
        }

        let codec = self.codec.clone();
        let output = self.output.clone();
        let on_error = self.on_error.clone();
        let timeout = self.ctx.codec_timeout;
        let worker = DecodeWorker::spawn(
            &format!("aac-decoder-{}", track.id.0),
            self.ctx.queue_capacity,
            move |ctx| {
                if let Err(e) = decode_loop(&ctx, &codec, &output, timeout) {
                    tracing::warn!(codec = MIME, error = %e, "AAC decode loop ended");
                    if !ctx.is_stopped()
                        && let Some(cb) = on_error
                    {
                        cb(as_decode_error(e));
                    }
                }
            },
        );
        let worker = match worker {
            Ok(w) => w,
            Err(e) => {
                self.codec.shutdown(MIME);
                self.output.release();
                return Err(e);
            }
        };
        self.worker = Some(worker);

        let layout = AuHeaderLayout::from_fmtp(&track.fmtp);
        self.depacketizer = Some(AacDepacketizer::new(self.sampling_rate, layout));
        tracing::info!(
            track = %track.id,
            sample_rate = self.sampling_rate,
            channels = self.channel_count,
            "AAC decoder initialized"
        );
        Ok(())
    }
}

fn decode_loop(
    ctx: &WorkerContext,
    codec: &CodecSlot,
    output: &AudioOutput,
    timeout: Duration,
) -> Result<()> {
    while let Some(frame) = ctx.next_frame() {
        let polled = codec.with(|c| {
            if let Some(index) = c.dequeue_input_buffer(timeout)? {
                c.queue_input_buffer(index, &frame.data, frame.presentation_time_us, frame.flags)?;
            }
            c.dequeue_output_buffer(timeout)
        });
        // Codec released underneath us.
        let Some(polled) = polled else {
            return Ok(());
        };

        match polled? {
            OutputBuffer::Buffer {
                index, data, flags, ..
            } => {
                output.write(&data)?;
                if let Some(released) = codec.with(|c| c.release_output_buffer(index, false)) {
                    released?;
                }
                if flags.contains(BufferFlags::END_OF_STREAM) {
                    tracing::debug!(codec = MIME, "end of stream");
                    return Ok(());
                }
            }
            OutputBuffer::TryAgainLater => thread::sleep(Duration::from_millis(1)),
            OutputBuffer::FormatChanged { .. } => tracing::debug!(codec = MIME, "output format changed"),
            OutputBuffer::BuffersChanged => tracing::debug!(codec = MIME, "output buffers changed"),
        }
    }
    Ok(())
}

impl Decoder for AacLatmDecoder {
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
            worker.push(frame);
        });
        if let Err(kind) = result {
            tracing::debug!(track = %track.id, error = %kind, "dropping AAC packet");
        }
    }

    fn on_release(&mut self) {
        if let Some(worker) = &self.worker {
            worker.request_stop();
        }
        self.codec.shutdown(MIME);
        if let Some(mut worker) = self.worker.take() {
            worker.terminate(self.ctx.join_timeout);
        }
        self.output.release();
        self.depacketizer = None;
        tracing::debug!(codec = MIME, "AAC decoder released");
    }

    fn set_error_callback(&mut self, callback: ErrorCallback) {
        self.on_error = Some(callback);
    }
}

impl AudioDecoder for AacLatmDecoder {
    fn set_mute(&mut self, mute: bool) {
        self.output.set_mute(mute);
    }

    fn is_mute(&self) -> bool {
        self.output.is_mute()
    }

    fn sampling_rate(&self) -> u32 {
        self.sampling_rate
    }

    fn set_sampling_rate(&mut self, rate: u32) {
        self.sampling_rate = rate;
    }

    fn channel_count(&self) -> u16 {
        self.channel_count
    }

    fn set_channel_count(&mut self, channels: u16) {
        self.channel_count = channels;
    }
}
