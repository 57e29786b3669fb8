//! Playback mirroring for a Spotify companion window: polls the player,
//! resolves cover artwork through the catalog and keeps one cached image.

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod model;
pub mod player;
pub mod preferences;
pub mod resolver;
pub mod sync;
pub mod view;

pub use crate::{
    cache::ArtworkCache,
    config::Config,
    error::{ArtworkError, HttpError},
    model::{ArtworkSizeIndex, CachedArtwork, PlaybackState, TrackIdentity, TrackInfo},
    player::PlayerStateSource,
    preferences::Preferences,
    resolver::ArtworkResolver,
    sync::{SyncHandle, SyncLoop, Trigger},
    view::ViewState,
};
