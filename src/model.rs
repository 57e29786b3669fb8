use std::fmt;

use crate::error::ArtworkError;

/// Stable key of a track as reported by the player, e.g. `spotify:track:abc123`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TrackIdentity(String);

impl TrackIdentity {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Sentinel for "no track observed yet".
    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The third `:`-delimited segment; later segments are ignored.
    pub fn canonical_id(&self) -> Result<&str, ArtworkError> {
        match self.0.split(':').nth(2) {
            Some(id) if !id.is_empty() => Ok(id),
            _ => Err(ArtworkError::MalformedIdentity(self.0.clone())),
        }
    }
}

impl fmt::Display for TrackIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrackInfo {
    pub identity: TrackIdentity,
    pub artist: String,
    pub album: String,
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlaybackState {
    pub track: TrackInfo,
    pub is_playing: bool,
    pub is_shuffling: bool,
    pub is_repeating: bool,
    volume: u8,
}

impl PlaybackState {
    pub fn new(
        track: TrackInfo,
        is_playing: bool,
        is_shuffling: bool,
        is_repeating: bool,
        volume: u8,
    ) -> Self {
        Self {
            track,
            is_playing,
            is_shuffling,
            is_repeating,
            volume: volume.min(100),
        }
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn with_track(self, track: TrackInfo) -> Self {
        Self { track, ..self }
    }

    pub fn with_playing(self, is_playing: bool) -> Self {
        Self { is_playing, ..self }
    }

    pub fn with_shuffling(self, is_shuffling: bool) -> Self {
        Self {
            is_shuffling,
            ..self
        }
    }

    pub fn with_repeating(self, is_repeating: bool) -> Self {
        Self {
            is_repeating,
            ..self
        }
    }

    pub fn with_volume(self, volume: u8) -> Self {
        Self {
            volume: volume.min(100),
            ..self
        }
    }
}

/// Position in the catalog's image list; 0 is the first entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ArtworkSizeIndex(pub usize);

impl ArtworkSizeIndex {
    pub const PREFERENCE_KEY: &'static str = "artwork.size_index";

    /// Negative preference values collapse to 0.
    pub fn from_preference(value: i64) -> Self {
        Self(usize::try_from(value).unwrap_or(0))
    }

    /// Picks a position inside a list of `len` entries, falling back to the
    /// first entry when out of range.
    pub fn pick(self, len: usize) -> Option<usize> {
        match len {
            0 => None,
            _ if self.0 < len => Some(self.0),
            _ => Some(0),
        }
    }
}

/// The last artwork confirmed to match its URL. Fields never change after
/// construction, so a reader always sees a matching pair.
#[derive(Clone, PartialEq, Eq)]
pub struct CachedArtwork {
    source_url: String,
    image_bytes: Vec<u8>,
}

impl CachedArtwork {
    pub fn new(source_url: impl Into<String>, image_bytes: Vec<u8>) -> Self {
        Self {
            source_url: source_url.into(),
            image_bytes,
        }
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn image_bytes(&self) -> &[u8] {
        &self.image_bytes
    }
}

impl fmt::Debug for CachedArtwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedArtwork")
            .field("source_url", &self.source_url)
            .field("image_bytes", &self.image_bytes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_id_is_third_segment() {
        let id = TrackIdentity::new("spotify:track:abc123");
        assert_eq!(id.canonical_id().unwrap(), "abc123");
    }

    #[test]
    fn canonical_id_ignores_trailing_segments() {
        let id = TrackIdentity::new("spotify:local:artist:album:name");
        assert_eq!(id.canonical_id().unwrap(), "artist");
    }

    #[test]
    fn canonical_id_rejects_short_identities() {
        for raw in ["", "spotify", "spotify:track", "spotify:track:", "spotify:track::x"] {
            let err = TrackIdentity::new(raw).canonical_id().unwrap_err();
            assert!(matches!(err, ArtworkError::MalformedIdentity(_)), "{raw}");
        }
    }

    #[test]
    fn size_index_falls_back_to_first_entry() {
        assert_eq!(ArtworkSizeIndex(1).pick(3), Some(1));
        assert_eq!(ArtworkSizeIndex(3).pick(3), Some(0));
        assert_eq!(ArtworkSizeIndex(0).pick(0), None);
        assert_eq!(ArtworkSizeIndex::from_preference(-4), ArtworkSizeIndex(0));
    }

    #[test]
    fn volume_is_clamped() {
        let state = PlaybackState::new(TrackInfo::default(), true, false, false, 180);
        assert_eq!(state.volume(), 100);
        assert_eq!(state.with_volume(101).volume(), 100);
    }
}
