use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "class-player", version = VERSION)]
pub struct Args {
    /// TOML config file with `device`, `[mixer]` and `[playback]` settings
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match (overrides the config file)
    #[arg(long)]
    pub device: Option<String>,

    /// Narration cue as SECS=URL, fired after SECS of unpaused play time (repeatable)
    #[arg(long = "cue", value_name = "SECS=URL", value_parser = parse_cue)]
    pub cues: Vec<Cue>,

    /// Start paused; type `play` to begin
    #[arg(long)]
    pub start_paused: bool,

    /// Music tracks (paths or http(s) URLs), played in order
    #[arg(required_unless_present = "list_devices")]
    pub tracks: Vec<String>,
}

/// A narration clip scheduled against unpaused play time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cue {
    pub at: Duration,
    pub url: String,
}

pub fn parse_cue(raw: &str) -> Result<Cue, String> {
    let (secs, url) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected SECS=URL, got {raw:?}"))?;
    let secs: f64 = secs
        .trim()
        .parse()
        .map_err(|e| format!("bad cue time {secs:?}: {e}"))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(format!("cue time must be a non-negative number, got {secs}"));
    }
    let url = url.trim();
    if url.is_empty() {
        return Err("cue URL is empty".to_string());
    }
    Ok(Cue {
        at: Duration::from_secs_f64(secs),
        url: url.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cue_accepts_fractional_seconds() {
        let cue = parse_cue("12.5=https://cdn.example/intro.mp3").unwrap();
        assert_eq!(cue.at, Duration::from_millis(12_500));
        assert_eq!(cue.url, "https://cdn.example/intro.mp3");
    }

    #[test]
    fn parse_cue_keeps_equals_in_url() {
        let cue = parse_cue("3=http://host/clip.mp3?sig=abc").unwrap();
        assert_eq!(cue.url, "http://host/clip.mp3?sig=abc");
    }

    #[test]
    fn parse_cue_rejects_malformed_input() {
        assert!(parse_cue("intro.mp3").is_err());
        assert!(parse_cue("soon=intro.mp3").is_err());
        assert!(parse_cue("-1=intro.mp3").is_err());
        assert!(parse_cue("inf=intro.mp3").is_err());
        assert!(parse_cue("4=  ").is_err());
    }

    #[test]
    fn args_collect_repeated_cues() {
        let args = Args::try_parse_from([
            "class-player",
            "--cue",
            "0=a.mp3",
            "--cue",
            "30=b.mp3",
            "music.flac",
        ])
        .unwrap();
        assert_eq!(args.cues.len(), 2);
        assert_eq!(args.tracks, vec!["music.flac".to_string()]);
    }

    #[test]
    fn tracks_are_required_unless_listing_devices() {
        assert!(Args::try_parse_from(["class-player"]).is_err());
        assert!(Args::try_parse_from(["class-player", "--list-devices"]).is_ok());
    }
}
