use std::{
    process::Command,
    sync::{mpsc::Receiver, Mutex},
};

use anyhow::{anyhow, bail, Context, Result};

use crate::{
    model::{PlaybackState, TrackIdentity, TrackInfo},
    preferences::Subscribers,
};

/// Remote-control surface of the external player. The sync loop only reads
/// `current_state`; the commands are forwarded from the window as-is.
pub trait PlayerStateSource: Send + Sync {
    fn current_state(&self) -> Result<PlaybackState>;
    fn play(&self) -> Result<()>;
    fn pause(&self) -> Result<()>;
    fn next_track(&self) -> Result<()>;
    fn previous_track(&self) -> Result<()>;
    fn set_volume(&self, volume: u8) -> Result<()>;
    fn set_shuffling(&self, shuffling: bool) -> Result<()>;
    fn set_repeating(&self, repeating: bool) -> Result<()>;

    /// Push notification for "player state changed", when the player has one.
    fn subscribe(&self) -> Option<Receiver<()>> {
        None
    }
}

const STATE_SCRIPT: &str = r#"tell application "Spotify"
    if it is running then
        set t to current track
        return (id of t) & linefeed & (artist of t) & linefeed & (album of t) & linefeed & (name of t) & linefeed & (player state as string) & linefeed & (shuffling as string) & linefeed & (repeating as string) & linefeed & (sound volume as string)
    end if
end tell
return """#;

/// Drives the Spotify desktop app on macOS through `osascript`.
#[derive(Debug, Default)]
pub struct SpotifyScript;

impl SpotifyScript {
    pub fn new() -> Self {
        Self
    }

    fn run(&self, script: &str) -> Result<String> {
        let output = Command::new("osascript")
            .arg("-e")
            .arg(script)
            .output()
            .context("Failed to launch osascript")?;
        if !output.status.success() {
            bail!(
                "osascript exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn tell(&self, command: &str) -> Result<()> {
        self.run(&format!("tell application \"Spotify\" to {command}"))
            .map(|_| ())
    }
}

impl PlayerStateSource for SpotifyScript {
    fn current_state(&self) -> Result<PlaybackState> {
        parse_script_state(&self.run(STATE_SCRIPT)?)
    }

    fn play(&self) -> Result<()> {
        self.tell("play")
    }

    fn pause(&self) -> Result<()> {
        self.tell("pause")
    }

    fn next_track(&self) -> Result<()> {
        self.tell("next track")
    }

    fn previous_track(&self) -> Result<()> {
        self.tell("previous track")
    }

    fn set_volume(&self, volume: u8) -> Result<()> {
        self.tell(&format!("set sound volume to {}", volume.min(100)))
    }

    fn set_shuffling(&self, shuffling: bool) -> Result<()> {
        self.tell(&format!("set shuffling to {shuffling}"))
    }

    fn set_repeating(&self, repeating: bool) -> Result<()> {
        self.tell(&format!("set repeating to {repeating}"))
    }
}

/// Parses the line-per-field output of [`STATE_SCRIPT`]. Empty output means
/// the player is not running.
fn parse_script_state(output: &str) -> Result<PlaybackState> {
    let output = output.trim_end_matches(['\r', '\n']);
    if output.trim().is_empty() {
        return Ok(PlaybackState::default());
    }

    let fields: Vec<&str> = output.split('\n').map(|f| f.trim_end_matches('\r')).collect();
    let &[id, artist, album, name, state, shuffling, repeating, volume] = fields.as_slice() else {
        return Err(anyhow!(
            "Expected 8 fields from player script, got {}",
            fields.len()
        ));
    };

    let volume = volume
        .trim()
        .parse::<u8>()
        .with_context(|| format!("Invalid sound volume '{volume}'"))?;

    Ok(PlaybackState::new(
        TrackInfo {
            identity: TrackIdentity::new(id.trim()),
            artist: artist.to_owned(),
            album: album.to_owned(),
            name: name.to_owned(),
        },
        state.trim() == "playing",
        shuffling.trim() == "true",
        repeating.trim() == "true",
        volume,
    ))
}

struct MemoryState {
    playlist: Vec<TrackInfo>,
    position: usize,
    playback: PlaybackState,
}

/// In-process player with a fixed playlist. Every mutation notifies
/// subscribers, like a player with push notifications would.
pub struct MemoryPlayer {
    state: Mutex<MemoryState>,
    subscribers: Subscribers,
}

impl MemoryPlayer {
    pub fn new(playlist: Vec<TrackInfo>) -> Self {
        let track = playlist.first().cloned().unwrap_or_default();
        Self {
            state: Mutex::new(MemoryState {
                playlist,
                position: 0,
                playback: PlaybackState::new(track, false, false, false, 50),
            }),
            subscribers: Subscribers::default(),
        }
    }

    /// Replaces the whole playback state, as if the player changed on its own.
    pub fn set_state(&self, playback: PlaybackState) {
        if let Ok(mut state) = self.state.lock() {
            state.playback = playback;
        }
        self.subscribers.notify();
    }

    fn update(&self, apply: impl FnOnce(&mut MemoryState)) -> Result<()> {
        {
            let mut state = self
                .state
                .lock()
                .map_err(|_| anyhow!("Player state lock poisoned"))?;
            apply(&mut state);
        }
        self.subscribers.notify();
        Ok(())
    }

    fn step(&self, forward: bool) -> Result<()> {
        self.update(|state| {
            let len = state.playlist.len();
            if len == 0 {
                return;
            }
            state.position = if forward {
                (state.position + 1) % len
            } else {
                (state.position + len - 1) % len
            };
            let track = state.playlist[state.position].clone();
            state.playback = state.playback.clone().with_track(track);
        })
    }

    fn with_playback(&self, edit: impl FnOnce(PlaybackState) -> PlaybackState) -> Result<()> {
        self.update(|state| state.playback = edit(state.playback.clone()))
    }
}

impl PlayerStateSource for MemoryPlayer {
    fn current_state(&self) -> Result<PlaybackState> {
        self.state
            .lock()
            .map(|state| state.playback.clone())
            .map_err(|_| anyhow!("Player state lock poisoned"))
    }

    fn play(&self) -> Result<()> {
        self.with_playback(|p| p.with_playing(true))
    }

    fn pause(&self) -> Result<()> {
        self.with_playback(|p| p.with_playing(false))
    }

    fn next_track(&self) -> Result<()> {
        self.step(true)
    }

    fn previous_track(&self) -> Result<()> {
        self.step(false)
    }

    fn set_volume(&self, volume: u8) -> Result<()> {
        self.with_playback(|p| p.with_volume(volume))
    }

    fn set_shuffling(&self, shuffling: bool) -> Result<()> {
        self.with_playback(|p| p.with_shuffling(shuffling))
    }

    fn set_repeating(&self, repeating: bool) -> Result<()> {
        self.with_playback(|p| p.with_repeating(repeating))
    }

    fn subscribe(&self) -> Option<Receiver<()>> {
        self.subscribers.add()
    }
}
