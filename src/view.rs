use std::sync::Arc;

use crate::model::{CachedArtwork, PlaybackState};

/// Labels at or above this many characters render smaller.
pub const SMALL_TEXT_THRESHOLD: usize = 29;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TextSize {
    #[default]
    Regular,
    Small,
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Label {
    pub text: String,
    pub size: TextSize,
}

impl Label {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let size = if text.chars().count() >= SMALL_TEXT_THRESHOLD {
            TextSize::Small
        } else {
            TextSize::Regular
        };
        Self { text, size }
    }
}

/// What the play/pause button shows, i.e. the action it will perform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PlayPauseIcon {
    #[default]
    Play,
    Pause,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ToggleIcon {
    #[default]
    Released,
    Pressed,
}

impl From<bool> for ToggleIcon {
    fn from(on: bool) -> Self {
        if on {
            ToggleIcon::Pressed
        } else {
            ToggleIcon::Released
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ViewState {
    pub artist: Label,
    pub album: Label,
    pub name: Label,
    pub play_pause: PlayPauseIcon,
    pub shuffle: ToggleIcon,
    pub repeat: ToggleIcon,
    pub volume: u8,
    pub volume_label: String,
    pub artwork: Option<Arc<CachedArtwork>>,
}

pub fn project(state: &PlaybackState, artwork: Option<Arc<CachedArtwork>>) -> ViewState {
    let volume = state.volume();
    ViewState {
        artist: Label::new(state.track.artist.as_str()),
        album: Label::new(state.track.album.as_str()),
        name: Label::new(state.track.name.as_str()),
        play_pause: if state.is_playing {
            PlayPauseIcon::Pause
        } else {
            PlayPauseIcon::Play
        },
        shuffle: state.is_shuffling.into(),
        repeat: state.is_repeating.into(),
        volume,
        volume_label: format!("Volume: {volume} %"),
        artwork,
    }
}
