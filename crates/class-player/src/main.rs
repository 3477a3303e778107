//! Class player: plays a music playlist with timed narration ducked over it.
//!
//! Drives a [`class_audio::PlaybackSession`] on the cpal backend. Narration is
//! scheduled with `--cue SECS=URL` or typed on stdin (`narrate URL`); stdin also
//! carries pause/play, visibility and focus signals and the manual unlock gesture.

mod cli;
mod config;
mod runtime;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::config::PlayerConfig;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,class_player=info,class_audio=info")
        }))
        .init();

    if args.list_devices {
        return runtime::list_devices();
    }

    let config = match &args.config {
        Some(path) => PlayerConfig::load(path)?,
        None => PlayerConfig::default(),
    }
    .with_device(args.device.clone());

    runtime::run(runtime::RunOptions {
        config,
        tracks: args.tracks,
        cues: args.cues,
        start_paused: args.start_paused,
    })
}
