use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::{error::ArtworkError, http::HttpClient, model::CachedArtwork};

/// Holds the single most recently committed artwork.
///
/// Fetching and committing are separate steps: background workers call
/// [`ArtworkCache::fetch`], and only the sync loop calls
/// [`ArtworkCache::commit`] once it has checked the result is still wanted.
/// Entries are compared by URL only, so a catalog that varies URLs for the
/// same image will cause a refetch.
pub struct ArtworkCache {
    client: Arc<dyn HttpClient>,
    current: ArcSwapOption<CachedArtwork>,
}

impl ArtworkCache {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self {
            client,
            current: ArcSwapOption::empty(),
        }
    }

    pub fn current(&self) -> Option<Arc<CachedArtwork>> {
        self.current.load_full()
    }

    pub fn current_url(&self) -> Option<String> {
        self.current
            .load()
            .as_ref()
            .map(|artwork| artwork.source_url().to_owned())
    }

    pub fn is_cached(&self, url: &str) -> bool {
        self.current
            .load()
            .as_ref()
            .is_some_and(|artwork| artwork.source_url() == url)
    }

    /// Downloads `url` unless it is already the committed entry, in which case
    /// `Ok(None)` is returned without touching the network.
    pub fn fetch(&self, url: &str) -> Result<Option<CachedArtwork>, ArtworkError> {
        if self.is_cached(url) {
            log::debug!("Artwork cache hit for {url}");
            return Ok(None);
        }

        let failed = |reason: String| ArtworkError::ImageFetchFailed {
            url: url.to_owned(),
            reason,
        };

        let bytes = self.client.get(url).map_err(|e| failed(e.to_string()))?;
        if bytes.is_empty() {
            return Err(failed("empty body".into()));
        }
        image::guess_format(&bytes).map_err(|e| failed(e.to_string()))?;

        Ok(Some(CachedArtwork::new(url, bytes)))
    }

    pub fn commit(&self, artwork: CachedArtwork) {
        self.current.store(Some(Arc::new(artwork)));
    }
}
