use std::sync::Arc;

use serde::Deserialize;

use crate::{
    error::ArtworkError,
    http::HttpClient,
    model::{ArtworkSizeIndex, TrackIdentity},
};

pub const DEFAULT_METADATA_BASE_URL: &str = "https://api.spotify.com/v1";

#[derive(Debug, Deserialize)]
struct TrackResponse {
    album: Option<AlbumResponse>,
}

#[derive(Debug, Deserialize)]
struct AlbumResponse {
    images: Option<Vec<ImageEntry>>,
}

#[derive(Debug, Deserialize)]
struct ImageEntry {
    url: Option<String>,
}

/// Turns a track identity into an artwork URL with one metadata request.
#[derive(Clone)]
pub struct ArtworkResolver {
    client: Arc<dyn HttpClient>,
    base_url: String,
}

impl ArtworkResolver {
    pub fn new(client: Arc<dyn HttpClient>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { client, base_url }
    }

    pub fn metadata_url(&self, canonical_id: &str) -> String {
        format!("{}/tracks/{}", self.base_url, canonical_id)
    }

    pub fn resolve(
        &self,
        identity: &TrackIdentity,
        size: ArtworkSizeIndex,
    ) -> Result<String, ArtworkError> {
        let canonical_id = identity.canonical_id()?;
        let body = self.client.get(&self.metadata_url(canonical_id))?;
        extract_artwork_url(&body, size)
    }
}

fn extract_artwork_url(body: &[u8], size: ArtworkSizeIndex) -> Result<String, ArtworkError> {
    let response: TrackResponse =
        serde_json::from_slice(body).map_err(|e| ArtworkError::ParseFailed(e.to_string()))?;
    let images = response
        .album
        .ok_or_else(|| ArtworkError::ParseFailed("missing 'album'".into()))?
        .images
        .ok_or_else(|| ArtworkError::ParseFailed("missing 'album.images'".into()))?;

    let index = size
        .pick(images.len())
        .ok_or_else(|| ArtworkError::NotFound("album has no images".into()))?;

    images
        .into_iter()
        .nth(index)
        .and_then(|entry| entry.url)
        .filter(|url| !url.is_empty())
        .ok_or_else(|| ArtworkError::NotFound(format!("image {index} has no url")))
}
