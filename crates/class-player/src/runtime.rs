//! Player runtime.
//!
//! One thread owns the session and multiplexes backend events, the music end
//! callback, narration cues, the health tick, stdin commands and Ctrl-C.

use std::collections::VecDeque;
use std::io::BufRead;
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use class_audio::backend::{self, BackendOptions, CpalPlatform};
use class_audio::{
    LifecycleSignal, PlatformEvent, PlaybackParams, PlaybackSession, UserGesture,
};
use class_audio_types::SessionSnapshot;
use crossbeam_channel::{Receiver, after, bounded, never, select, tick, unbounded};

use crate::cli::Cue;
use crate::config::PlayerConfig;

/// Print output devices to stdout; `*` marks the host default.
pub fn list_devices() -> Result<()> {
    let devices = backend::list_devices()?;
    if devices.is_empty() {
        println!("no output devices");
    }
    for d in devices {
        let marker = if d.is_default { '*' } else { ' ' };
        println!("{marker} {} ({}-{} Hz)", d.name, d.min_rate, d.max_rate);
    }
    Ok(())
}

pub struct RunOptions {
    pub config: PlayerConfig,
    pub tracks: Vec<String>,
    pub cues: Vec<Cue>,
    pub start_paused: bool,
}

/// Play until `quit`, Ctrl-C, or a closed backend.
pub fn run(opts: RunOptions) -> Result<()> {
    let RunOptions {
        config,
        tracks,
        cues,
        start_paused,
    } = opts;
    let mut player = Player::new(tracks, cues, start_paused, Instant::now())?;

    let (platform, events) = CpalPlatform::new(BackendOptions {
        device: config.device.clone(),
        target_rate: None,
        playback: config.playback.clone(),
    });
    let mut session = PlaybackSession::mount(platform, config.mixer.clone());

    let (ended_tx, ended_rx) = unbounded();
    session.on_ended(move || {
        let _ = ended_tx.send(());
    });

    let (quit_tx, quit_rx) = bounded(1);
    ctrlc::set_handler(move || {
        let _ = quit_tx.try_send(());
    })
    .context("install ctrl-c handler")?;

    let commands = spawn_stdin_reader()?;
    let mut stdin_open = true;
    let mut health = HealthTicker::default();

    tracing::info!(
        track = %player.current_track(),
        tracks = player.track_count(),
        paused = start_paused,
        "player started"
    );
    session.configure(player.params());

    loop {
        health.sync(session.health_tick_interval());
        let health_rx = health.receiver();
        let cue_rx = match player.next_cue_in(Instant::now()) {
            Some(wait) => after(wait),
            None => never(),
        };
        let command_rx = if stdin_open {
            commands.clone()
        } else {
            never()
        };

        select! {
            recv(events) -> event => match event {
                Ok(event) => session.handle_event(event),
                Err(_) => anyhow::bail!("audio backend event channel closed"),
            },
            recv(ended_rx) -> _ => {
                if player.advance() {
                    tracing::info!(track = %player.current_track(), "next track");
                    session.configure(player.params());
                } else {
                    tracing::info!("playlist finished");
                }
            },
            recv(cue_rx) -> _ => {
                while let Some(cue) = player.take_due_cue(Instant::now()) {
                    tracing::info!(url = %cue.url, at_secs = cue.at.as_secs_f32(), "narration cue");
                    start_section(&mut session, &mut player, cue.url);
                }
            },
            recv(health_rx) -> _ => {
                session.handle_event(PlatformEvent::Lifecycle(LifecycleSignal::HealthTick));
            },
            recv(command_rx) -> line => match line {
                Ok(Ok(cmd)) => {
                    if apply_command(&mut session, &mut player, cmd)? == Flow::Quit {
                        break;
                    }
                }
                Ok(Err(msg)) => eprintln!("{msg}"),
                Err(_) => {
                    tracing::debug!("stdin closed; commands disabled");
                    stdin_open = false;
                }
            },
            recv(quit_rx) -> _ => {
                tracing::info!("interrupted");
                break;
            },
        }
    }

    session.unmount();
    Ok(())
}

/// A line typed on stdin.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Pause,
    Play,
    Hide,
    Show,
    Focus,
    Unlock,
    Narrate(String),
    Clear,
    Status,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let cmd = match (word.to_ascii_lowercase().as_str(), rest) {
            ("pause", "") => Self::Pause,
            ("play", "") => Self::Play,
            ("hide", "") => Self::Hide,
            ("show", "") => Self::Show,
            ("focus", "") => Self::Focus,
            ("unlock", "") => Self::Unlock,
            ("narrate", "") => return Err("usage: narrate URL".to_string()),
            ("narrate", url) => Self::Narrate(url.to_string()),
            ("clear", "") => Self::Clear,
            ("status", "") => Self::Status,
            ("quit" | "exit", "") => Self::Quit,
            _ => {
                return Err(format!(
                    "unknown command {line:?} (pause, play, hide, show, focus, unlock, narrate URL, clear, status, quit)"
                ));
            }
        };
        Ok(cmd)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

fn apply_command(
    session: &mut PlaybackSession<CpalPlatform>,
    player: &mut Player,
    cmd: Command,
) -> Result<Flow> {
    match cmd {
        Command::Pause | Command::Play => {
            player.set_paused(cmd == Command::Pause, Instant::now());
            session.configure(player.params());
        }
        // Desktop output keeps running when a window hides; suspend it the way a
        // backgrounded host would.
        Command::Hide => {
            session.handle_event(PlatformEvent::Lifecycle(LifecycleSignal::Hidden));
            session.suspend();
        }
        Command::Show => session.handle_event(PlatformEvent::Lifecycle(
            LifecycleSignal::VisibilityRestored,
        )),
        Command::Focus => {
            session.handle_event(PlatformEvent::Lifecycle(LifecycleSignal::WindowFocus))
        }
        // A typed line is the user's input event.
        Command::Unlock => session.manual_unlock(UserGesture::from_input_handler()),
        Command::Narrate(url) => start_section(session, player, url),
        Command::Clear => {
            player.clear_narration();
            session.configure(player.params());
        }
        Command::Status => print_status(&session.snapshot())?,
        Command::Quit => return Ok(Flow::Quit),
    }
    Ok(Flow::Continue)
}

fn print_status(snapshot: &SessionSnapshot) -> Result<()> {
    let json = serde_json::to_string_pretty(snapshot).context("encode status")?;
    println!("{json}");
    Ok(())
}

/// Begin a narration section with `url`.
///
/// Repeating the current clip passes through an empty section first so the session
/// treats it as new.
fn start_section(session: &mut PlaybackSession<CpalPlatform>, player: &mut Player, url: String) {
    if player.narrate(url) {
        let mut cleared = player.params();
        cleared.narration_url = None;
        session.configure(cleared);
    }
    session.configure(player.params());
}

fn spawn_stdin_reader() -> Result<Receiver<Result<Command, String>>> {
    let (tx, rx) = unbounded();
    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                if tx.send(line.parse::<Command>()).is_err() {
                    break;
                }
            }
        })
        .context("spawn stdin reader")?;
    Ok(rx)
}

/// Health tick channel, rebuilt only when the wanted interval changes.
#[derive(Default)]
struct HealthTicker {
    interval: Option<Duration>,
    rx: Option<Receiver<Instant>>,
}

impl HealthTicker {
    fn sync(&mut self, interval: Option<Duration>) {
        if interval == self.interval {
            return;
        }
        match interval {
            Some(every) => tracing::debug!(every_ms = every.as_millis() as u64, "health tick on"),
            None => tracing::debug!("health tick off"),
        }
        self.interval = interval;
        self.rx = interval.map(tick);
    }

    fn receiver(&self) -> Receiver<Instant> {
        self.rx.clone().unwrap_or_else(never)
    }
}

/// Accumulated unpaused time.
#[derive(Debug, Default)]
struct PlayClock {
    banked: Duration,
    running_since: Option<Instant>,
}

impl PlayClock {
    fn start(&mut self, now: Instant) {
        self.running_since.get_or_insert(now);
    }

    fn stop(&mut self, now: Instant) {
        if let Some(since) = self.running_since.take() {
            self.banked += now.saturating_duration_since(since);
        }
    }

    fn elapsed(&self, now: Instant) -> Duration {
        self.banked
            + self
                .running_since
                .map_or(Duration::ZERO, |since| now.saturating_duration_since(since))
    }
}

/// Playlist, narration section and cue schedule; the state the player feeds the
/// session as [`PlaybackParams`].
pub struct Player {
    tracks: Vec<String>,
    index: usize,
    narration: Option<String>,
    paused: bool,
    cues: VecDeque<Cue>,
    clock: PlayClock,
}

impl Player {
    pub fn new(tracks: Vec<String>, mut cues: Vec<Cue>, paused: bool, now: Instant) -> Result<Self> {
        anyhow::ensure!(!tracks.is_empty(), "no tracks to play");
        cues.sort_by_key(|c| c.at);
        let mut clock = PlayClock::default();
        if !paused {
            clock.start(now);
        }
        Ok(Self {
            tracks,
            index: 0,
            narration: None,
            paused,
            cues: cues.into(),
            clock,
        })
    }

    pub fn current_track(&self) -> &str {
        &self.tracks[self.index]
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn params(&self) -> PlaybackParams {
        PlaybackParams {
            music_url: self.current_track().to_string(),
            narration_url: self.narration.clone(),
            paused: self.paused,
        }
    }

    /// Move to the next track, wrapping. A one-track playlist does not restart,
    /// since reloading an unchanged URL is a no-op.
    pub fn advance(&mut self) -> bool {
        if self.tracks.len() < 2 {
            return false;
        }
        self.index = (self.index + 1) % self.tracks.len();
        true
    }

    pub fn set_paused(&mut self, paused: bool, now: Instant) {
        self.paused = paused;
        if paused {
            self.clock.stop(now);
        } else {
            self.clock.start(now);
        }
    }

    /// Time until the next cue is due; `None` while paused or when none are left.
    pub fn next_cue_in(&self, now: Instant) -> Option<Duration> {
        if self.paused {
            return None;
        }
        let cue = self.cues.front()?;
        Some(cue.at.saturating_sub(self.clock.elapsed(now)))
    }

    pub fn take_due_cue(&mut self, now: Instant) -> Option<Cue> {
        if self.paused || self.cues.front()?.at > self.clock.elapsed(now) {
            return None;
        }
        self.cues.pop_front()
    }

    /// Set the narration clip for a new section. Returns `true` when it repeats the
    /// current clip.
    pub fn narrate(&mut self, url: String) -> bool {
        let repeat = self.narration.as_deref() == Some(url.as_str());
        self.narration = Some(url);
        repeat
    }

    pub fn clear_narration(&mut self) {
        self.narration = None;
    }
}
