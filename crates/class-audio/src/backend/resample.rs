//! Streaming resample stage.
//!
//! Converts a decoded queue to the output device rate with rubato on a background
//! thread. Closing the output queue stops the thread; a source already at the device
//! rate bypasses this stage entirely.

use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result, anyhow};
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

use super::queue::{PopStrategy, SampleQueue, capacity_for};

/// Resampler input chunk size and output buffering.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ResampleConfig {
    pub(crate) chunk_frames: usize,
    pub(crate) buffer_seconds: f32,
}

/// Return a queue carrying `src` at `dst_rate`.
pub(crate) fn to_device_rate(
    src: Arc<SampleQueue>,
    src_rate: u32,
    dst_rate: u32,
    cfg: ResampleConfig,
) -> Result<Arc<SampleQueue>> {
    if src_rate == dst_rate {
        return Ok(src);
    }
    let channels = src.channels();
    let dst = Arc::new(SampleQueue::new(
        channels,
        capacity_for(dst_rate, channels, cfg.buffer_seconds),
    ));
    let ratio = f64::from(dst_rate) / f64::from(src_rate);
    let chunk = cfg.chunk_frames.max(1);

    let sinc_len = 128;
    let window = WindowFunction::BlackmanHarris2;
    let params = SincInterpolationParameters {
        sinc_len,
        f_cutoff: calculate_cutoff(sinc_len, window),
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 256,
        window,
    };
    let resampler = Async::<f32>::new_sinc(ratio, 1.1, &params, chunk, channels, FixedAsync::Input)
        .map_err(|e| anyhow!("create resampler: {e}"))?;

    let out = dst.clone();
    thread::Builder::new()
        .name("resample".to_string())
        .spawn(move || {
            if let Err(e) = resample_loop(resampler, &src, &out, chunk) {
                tracing::warn!(error = %format!("{e:#}"), "resampler stopped");
            }
            // Stop the decoder too if we quit early.
            src.close();
            match src.failure() {
                Some((code, message)) => out.fail(code, message),
                None => out.close(),
            }
        })
        .context("spawn resampler thread")?;

    tracing::debug!(src_rate, dst_rate, channels, "resampling");
    Ok(dst)
}

fn resample_loop(
    mut resampler: Async<f32>,
    src: &SampleQueue,
    dst: &SampleQueue,
    chunk: usize,
) -> Result<()> {
    let channels = src.channels();
    let mut out = vec![0.0f32; channels * chunk * 3];
    let mut indexing = Indexing {
        input_offset: 0,
        output_offset: 0,
        active_channels_mask: None,
        partial_len: None,
    };

    loop {
        let (block, partial) = match src.pop(PopStrategy::BlockingExact { frames: chunk }) {
            Some(block) => (block, None),
            // Fewer than `chunk` frames left: flush them as a partial block.
            None => match src.pop(PopStrategy::BlockingUpTo { max_frames: chunk }) {
                Some(tail) => {
                    let frames = tail.len() / channels;
                    (tail, Some(frames))
                }
                None => return Ok(()),
            },
        };
        let frames = block.len() / channels;
        let input = InterleavedSlice::new(&block, channels, frames)
            .map_err(|e| anyhow!("wrap input: {e}"))?;
        let capacity = out.len() / channels;
        let mut output = InterleavedSlice::new_mut(&mut out, channels, capacity)
            .map_err(|e| anyhow!("wrap output: {e}"))?;

        indexing.partial_len = partial;
        let (_, produced) = resampler
            .process_into_buffer(&input, &mut output, Some(&indexing))
            .map_err(|e| anyhow!("resample block: {e}"))?;

        if produced > 0 && !dst.push_blocking(&out[..produced * channels]) {
            return Ok(());
        }
        if partial.is_some() {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ResampleConfig {
        ResampleConfig {
            chunk_frames: 256,
            buffer_seconds: 1.0,
        }
    }

    #[test]
    fn matching_rate_passes_queue_through() {
        let src = Arc::new(SampleQueue::new(2, 64));
        let out = to_device_rate(src.clone(), 48_000, 48_000, cfg()).unwrap();
        assert!(Arc::ptr_eq(&src, &out));
    }

    #[test]
    fn upsampling_roughly_scales_frame_count() {
        let src = Arc::new(SampleQueue::new(1, 100_000));
        src.push_blocking(&vec![0.25f32; 22_050]);
        src.close();
        let out = to_device_rate(src, 22_050, 44_100, cfg()).unwrap();

        let mut frames = 0;
        while let Some(block) = out.pop(PopStrategy::BlockingUpTo { max_frames: 4096 }) {
            frames += block.len();
        }
        assert!(frames > 40_000 && frames < 48_000, "got {frames} frames");
        assert!(out.failure().is_none());
    }

    #[test]
    fn upstream_failure_is_forwarded() {
        let src = Arc::new(SampleQueue::new(1, 1024));
        src.fail(crate::platform::MediaErrorCode::Network, "reset");
        let out = to_device_rate(src, 22_050, 44_100, cfg()).unwrap();
        while out.pop(PopStrategy::BlockingUpTo { max_frames: 64 }).is_some() {}
        assert!(out.is_exhausted());
        assert_eq!(
            out.failure().map(|f| f.0),
            Some(crate::platform::MediaErrorCode::Network)
        );
    }
}
