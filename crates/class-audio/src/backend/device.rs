//! Output device discovery and stream config selection.

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// An output device as listed for the user.
#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub name: String,
    pub min_rate: u32,
    pub max_rate: u32,
    pub is_default: bool,
}

/// First output device whose name contains `needle` (case-insensitive), or the host default.
pub(crate) fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    let Some(needle) = needle else {
        return host
            .default_output_device()
            .ok_or_else(|| anyhow!("no default output device"));
    };
    host.output_devices()
        .context("enumerate output devices")?
        .find(|d| {
            d.description()
                .map(|desc| matches_device_name(&desc.name(), needle))
                .unwrap_or(false)
        })
        .ok_or_else(|| anyhow!("no output device matched {needle:?}"))
}

/// Best supported output config: f32 preferred, highest rate at or below `target_rate`.
pub(crate) fn pick_output_config(
    device: &cpal::Device,
    target_rate: Option<u32>,
) -> Result<cpal::SupportedStreamConfig> {
    let mut best: Option<(Candidate, cpal::SupportedStreamConfig)> = None;
    for range in device
        .supported_output_configs()
        .context("query output configs")?
    {
        let rate = rate_in_range(range.min_sample_rate(), range.max_sample_rate(), target_rate);
        let candidate = Candidate {
            at_or_below: target_rate.is_none_or(|t| rate <= t),
            rate,
            format_rank: format_rank(range.sample_format()),
        };
        if best.as_ref().is_none_or(|(b, _)| candidate.beats(b)) {
            best = Some((candidate, range.with_sample_rate(rate)));
        }
    }
    best.map(|(_, cfg)| cfg)
        .ok_or_else(|| anyhow!("device reports no output configs"))
}

/// Largest fixed buffer the device allows, capped to keep ramps responsive.
pub(crate) fn pick_buffer_size(config: &cpal::SupportedStreamConfig) -> cpal::BufferSize {
    const MAX_FRAMES: u32 = 2_048;
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            cpal::BufferSize::Fixed((*max).min(MAX_FRAMES).max(*min))
        }
        cpal::SupportedBufferSize::Unknown => cpal::BufferSize::Default,
    }
}

/// Output devices on the default host.
pub fn list_devices() -> Result<Vec<DeviceInfo>> {
    let host = cpal::default_host();
    let default_name = host
        .default_output_device()
        .and_then(|d| d.description().ok())
        .map(|d| d.name().to_string());
    let mut out = Vec::new();
    for d in host.output_devices().context("enumerate output devices")? {
        let Ok(desc) = d.description() else { continue };
        let name = desc.name().to_string();
        let (mut min_rate, mut max_rate) = (u32::MAX, 0);
        if let Ok(ranges) = d.supported_output_configs() {
            for r in ranges {
                min_rate = min_rate.min(r.min_sample_rate());
                max_rate = max_rate.max(r.max_sample_rate());
            }
        }
        if max_rate == 0 {
            tracing::debug!(device = %name, "skipping device without output configs");
            continue;
        }
        out.push(DeviceInfo {
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
            min_rate,
            max_rate,
        });
    }
    Ok(out)
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    at_or_below: bool,
    rate: u32,
    format_rank: u8,
}

impl Candidate {
    fn beats(&self, other: &Candidate) -> bool {
        if self.at_or_below != other.at_or_below {
            self.at_or_below
        } else if self.rate != other.rate {
            // Above the target the closest rate wins, below it the highest.
            if self.at_or_below {
                self.rate > other.rate
            } else {
                self.rate < other.rate
            }
        } else {
            self.format_rank < other.format_rank
        }
    }
}

fn rate_in_range(min: u32, max: u32, target: Option<u32>) -> u32 {
    match target {
        Some(t) => t.clamp(min, max.max(min)),
        None => max,
    }
}

fn format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    !needle.is_empty() && name.to_lowercase().contains(&needle.to_lowercase())
}
