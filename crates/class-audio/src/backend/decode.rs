//! Streaming decode stage.
//!
//! Probes a source with symphonia and decodes it on a background thread into a bounded
//! [`SampleQueue`]. The queue is closed at end of stream, or failed with a
//! [`MediaErrorCode`] if reading or decoding breaks partway through.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use anyhow::{Context, Result, anyhow};
use symphonia::core::audio::{SampleBuffer, SignalSpec};
use symphonia::core::codecs::{CODEC_TYPE_NULL, CodecParameters, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::queue::{SampleQueue, capacity_for};
use crate::platform::MediaErrorCode;

/// A source being decoded in the background.
pub(crate) struct DecodedStream {
    pub(crate) spec: SignalSpec,
    pub(crate) queue: Arc<SampleQueue>,
    pub(crate) duration_ms: Option<u64>,
    pub(crate) codec: Option<&'static str>,
}

/// Probe `source` and start decoding it on a new thread.
///
/// Setting `cancel` stops the thread at the next packet.
pub(crate) fn start_decode(
    source: Box<dyn MediaSource>,
    hint: Hint,
    buffer_seconds: f32,
    cancel: Arc<AtomicBool>,
) -> Result<DecodedStream> {
    let mss = MediaSourceStream::new(source, Default::default());
    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .context("probe source")?;
    let format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| anyhow!("no audio track"))?;
    let track_id = track.id;
    let params = track.codec_params.clone();
    let layout = params.channels.ok_or_else(|| anyhow!("unknown channel layout"))?;
    let rate = params.sample_rate.ok_or_else(|| anyhow!("unknown sample rate"))?;
    let spec = SignalSpec::new(rate, layout);
    let channels = layout.count();

    let queue = Arc::new(SampleQueue::new(
        channels,
        capacity_for(rate, channels, buffer_seconds),
    ));

    let decoded = DecodedStream {
        spec,
        queue: queue.clone(),
        duration_ms: duration_ms(&params),
        codec: codec_name(&params),
    };

    thread::Builder::new()
        .name("decode".to_string())
        .spawn(move || {
            match decode_loop(format, track_id, &params, &queue, &cancel) {
                Ok(()) => queue.close(),
                Err(e) => {
                    tracing::warn!(error = %format!("{e:#}"), "decoder stopped");
                    queue.fail(classify(&e), format!("{e:#}"));
                }
            }
        })
        .context("spawn decoder thread")?;

    Ok(decoded)
}

fn decode_loop(
    mut format: Box<dyn FormatReader>,
    track_id: u32,
    params: &CodecParameters,
    queue: &SampleQueue,
    cancel: &AtomicBool,
) -> Result<()> {
    let mut decoder = symphonia::default::get_codecs()
        .make(params, &DecoderOptions::default())
        .context("create decoder")?;
    let mut skipped = 0u32;

    loop {
        if cancel.load(Ordering::Relaxed) {
            return Ok(());
        }
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e).context("read packet"),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(reason)) => {
                skipped += 1;
                tracing::debug!(reason, "skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(e).context("decode packet"),
        };

        let mut buf = SampleBuffer::<f32>::new(decoded.frames() as u64, *decoded.spec());
        buf.copy_interleaved_ref(decoded);
        if !queue.push_blocking(buf.samples()) {
            // Consumer went away.
            return Ok(());
        }
    }

    if skipped > 0 {
        tracing::info!(skipped, "decode finished with skipped packets");
    }
    Ok(())
}

/// Map a load or decode failure onto the media error code a player would report.
pub(crate) fn classify(err: &anyhow::Error) -> MediaErrorCode {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<SymphoniaError>() {
            return match e {
                SymphoniaError::IoError(_) => MediaErrorCode::Network,
                SymphoniaError::Unsupported(_) => MediaErrorCode::SourceNotSupported,
                _ => MediaErrorCode::Decode,
            };
        }
        if let Some(e) = cause.downcast_ref::<io::Error>() {
            return match e.kind() {
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                    MediaErrorCode::SourceNotSupported
                }
                io::ErrorKind::Interrupted => MediaErrorCode::Aborted,
                _ => MediaErrorCode::Network,
            };
        }
    }
    MediaErrorCode::Decode
}

fn duration_ms(params: &CodecParameters) -> Option<u64> {
    let frames = params.n_frames?;
    let rate = u64::from(params.sample_rate?);
    if rate == 0 {
        return None;
    }
    Some(frames.saturating_mul(1000) / rate)
}

fn codec_name(params: &CodecParameters) -> Option<&'static str> {
    use symphonia::core::codecs::*;
    let name = match params.codec {
        CODEC_TYPE_FLAC => "flac",
        CODEC_TYPE_MP3 => "mp3",
        CODEC_TYPE_AAC => "aac",
        CODEC_TYPE_ALAC => "alac",
        CODEC_TYPE_VORBIS => "vorbis",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "pcm_s16",
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "pcm_s24",
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "pcm_f32",
        _ => return None,
    };
    Some(name)
}
