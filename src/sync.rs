use std::{
    sync::{
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use arc_swap::ArcSwap;

use crate::{
    cache::ArtworkCache,
    error::ArtworkError,
    model::{ArtworkSizeIndex, CachedArtwork, PlaybackState, TrackIdentity},
    player::PlayerStateSource,
    preferences::Preferences,
    resolver::ArtworkResolver,
    view::{self, ViewState},
};

/// Reasons for the driver thread to wake up besides its timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    PlayerChanged,
    PreferencesChanged,
    ArtworkReady,
    Shutdown,
}

struct Job {
    generation: u64,
    identity: TrackIdentity,
    size: ArtworkSizeIndex,
}

struct JobOutcome {
    generation: u64,
    identity: TrackIdentity,
    result: Result<Option<CachedArtwork>, ArtworkError>,
}

struct FailedAttempt {
    generation: u64,
    at: Instant,
}

struct SyncState {
    identity: TrackIdentity,
    size: ArtworkSizeIndex,
    // Bumped whenever the wanted artwork changes; job results from older
    // generations are discarded.
    generation: u64,
    inflight: Option<u64>,
    failure: Option<FailedAttempt>,
    last_error: Option<ArtworkError>,
    playback: PlaybackState,
    // Ticket of the newest player reading applied so far.
    applied_read: u64,
}

impl SyncState {
    /// Invalidates any running job; its result will be dropped on arrival.
    fn supersede(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.inflight = None;
        self.failure = None;
    }
}

/// Keeps the projected view in step with the player and owns the only
/// write path into the artwork cache.
pub struct SyncLoop {
    source: Arc<dyn PlayerStateSource>,
    resolver: ArtworkResolver,
    cache: Arc<ArtworkCache>,
    preferences: Arc<dyn Preferences>,
    retry_interval: Duration,
    reads: AtomicU64,
    state: Mutex<SyncState>,
    outcomes_tx: Mutex<Sender<JobOutcome>>,
    outcomes_rx: Mutex<Receiver<JobOutcome>>,
    waker: Mutex<Option<Sender<Trigger>>>,
    snapshot: ArcSwap<ViewState>,
}

impl SyncLoop {
    pub fn new(
        source: Arc<dyn PlayerStateSource>,
        resolver: ArtworkResolver,
        cache: Arc<ArtworkCache>,
        preferences: Arc<dyn Preferences>,
    ) -> Self {
        let size = ArtworkSizeIndex::from_preference(
            preferences.get_or_default(ArtworkSizeIndex::PREFERENCE_KEY, 0),
        );
        let (outcomes_tx, outcomes_rx) = mpsc::channel();
        Self {
            source,
            resolver,
            cache,
            preferences,
            retry_interval: Duration::from_secs(5),
            reads: AtomicU64::new(0),
            state: Mutex::new(SyncState {
                identity: TrackIdentity::empty(),
                size,
                generation: 0,
                inflight: None,
                failure: None,
                last_error: None,
                playback: PlaybackState::default(),
                applied_read: 0,
            }),
            outcomes_tx: Mutex::new(outcomes_tx),
            outcomes_rx: Mutex::new(outcomes_rx),
            waker: Mutex::new(None),
            snapshot: ArcSwap::from_pointee(ViewState::default()),
        }
    }

    /// Minimum wait before a failed lookup for the same track is tried again.
    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    pub fn cache(&self) -> &Arc<ArtworkCache> {
        &self.cache
    }

    /// Latest projected view. Never blocks on the network.
    pub fn snapshot(&self) -> Arc<ViewState> {
        self.snapshot.load_full()
    }

    pub fn current_identity(&self) -> TrackIdentity {
        self.lock_state().identity.clone()
    }

    pub fn size_index(&self) -> ArtworkSizeIndex {
        self.lock_state().size
    }

    pub fn is_fetching(&self) -> bool {
        self.lock_state().inflight.is_some()
    }

    pub fn last_error(&self) -> Option<ArtworkError> {
        self.lock_state().last_error.clone()
    }

    /// Pulls the player state and starts an artwork lookup when the track
    /// changed. Safe to call from several threads at once: a reading that
    /// started before one already applied is discarded.
    pub fn refresh(&self) {
        self.drain_results();

        let ticket = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
        let playback = match self.source.current_state() {
            Ok(playback) => playback,
            Err(err) => {
                log::warn!("Failed to read player state: {err:#}");
                return;
            }
        };

        let job = {
            let mut state = self.lock_state();
            if ticket < state.applied_read {
                log::debug!(
                    "Discarding player reading {ticket}, {} already applied",
                    state.applied_read
                );
                return;
            }
            state.applied_read = ticket;
            let changed = playback.track.identity != state.identity;
            if changed {
                if !playback.track.identity.is_empty() {
                    log::info!(
                        "Now playing {} by {} ({})",
                        playback.track.name,
                        playback.track.artist,
                        playback.track.identity
                    );
                }
                state.identity = playback.track.identity.clone();
                state.supersede();
            }
            state.playback = playback;
            let job = self.next_job(&mut state, changed);
            self.publish(&state);
            job
        };

        if let Some(job) = job {
            self.spawn_job(job);
        }
    }

    /// Re-reads the artwork size preference; a different size re-resolves the
    /// current track.
    pub fn preferences_changed(&self) {
        self.drain_results();

        let job = {
            // Read under the lock so readings apply in order.
            let mut state = self.lock_state();
            let size = ArtworkSizeIndex::from_preference(
                self.preferences
                    .get_or_default(ArtworkSizeIndex::PREFERENCE_KEY, 0),
            );
            if state.size == size {
                return;
            }
            log::info!("Artwork size index changed to {}", size.0);
            state.size = size;
            state.supersede();
            self.next_job(&mut state, true)
        };

        if let Some(job) = job {
            self.spawn_job(job);
        }
    }

    /// Applies finished lookups on the calling thread. Returns how many were
    /// committed to the cache.
    pub fn drain_results(&self) -> usize {
        let outcomes: Vec<JobOutcome> = self
            .outcomes_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_iter()
            .collect();
        if outcomes.is_empty() {
            return 0;
        }

        let mut state = self.lock_state();
        let mut committed = 0;
        for outcome in outcomes {
            if outcome.generation != state.generation {
                log::debug!(
                    "Dropping stale artwork result for {} (generation {}, current {})",
                    outcome.identity,
                    outcome.generation,
                    state.generation
                );
                continue;
            }
            state.inflight = None;
            match outcome.result {
                Ok(Some(artwork)) => {
                    log::info!(
                        "Artwork for {} updated from {}",
                        outcome.identity,
                        artwork.source_url()
                    );
                    self.cache.commit(artwork);
                    state.failure = None;
                    state.last_error = None;
                    committed += 1;
                }
                Ok(None) => {
                    state.failure = None;
                    state.last_error = None;
                }
                Err(err) => {
                    log::warn!("Artwork lookup for {} failed: {err}", outcome.identity);
                    state.failure = Some(FailedAttempt {
                        generation: outcome.generation,
                        at: Instant::now(),
                    });
                    state.last_error = Some(err);
                }
            }
        }
        self.publish(&state);
        committed
    }

    /// Runs the loop on a background thread: a refresh every `poll_interval`
    /// and on every player notification, a size check on every preferences
    /// notification.
    pub fn spawn(self: Arc<Self>, poll_interval: Duration) -> SyncHandle {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut waker) = self.waker.lock() {
            *waker = Some(tx.clone());
        }
        if let Some(player_rx) = self.source.subscribe() {
            forward(player_rx, tx.clone(), Trigger::PlayerChanged);
        }
        if let Some(prefs_rx) = self.preferences.subscribe() {
            forward(prefs_rx, tx.clone(), Trigger::PreferencesChanged);
        }

        let thread = thread::spawn(move || {
            self.refresh();
            loop {
                match rx.recv_timeout(poll_interval) {
                    Ok(Trigger::PlayerChanged) | Err(RecvTimeoutError::Timeout) => self.refresh(),
                    Ok(Trigger::PreferencesChanged) => self.preferences_changed(),
                    Ok(Trigger::ArtworkReady) => {
                        self.drain_results();
                    }
                    Ok(Trigger::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            if let Ok(mut waker) = self.waker.lock() {
                *waker = None;
            }
            log::debug!("Sync loop stopped");
        });

        SyncHandle {
            tx,
            thread: Some(thread),
        }
    }

    // Every field of `SyncState` is valid on its own, so a panic elsewhere
    // never leaves it half-updated.
    fn lock_state(&self) -> MutexGuard<'_, SyncState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => {
                log::error!("Sync state lock was poisoned; continuing with its last contents");
                self.state.clear_poison();
                poisoned.into_inner()
            }
        }
    }

    fn next_job(&self, state: &mut SyncState, force: bool) -> Option<Job> {
        if state.identity.is_empty() || state.inflight == Some(state.generation) {
            return None;
        }
        let retry_due = state.failure.as_ref().is_some_and(|failure| {
            failure.generation == state.generation && failure.at.elapsed() >= self.retry_interval
        });
        if !force && !retry_due {
            return None;
        }

        state.inflight = Some(state.generation);
        Some(Job {
            generation: state.generation,
            identity: state.identity.clone(),
            size: state.size,
        })
    }

    fn spawn_job(&self, job: Job) {
        let tx = self
            .outcomes_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let waker = self
            .waker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let resolver = self.resolver.clone();
        let cache = Arc::clone(&self.cache);

        log::debug!(
            "Resolving artwork for {} (size {}, generation {})",
            job.identity,
            job.size.0,
            job.generation
        );
        thread::spawn(move || {
            let result = resolver
                .resolve(&job.identity, job.size)
                .and_then(|url| cache.fetch(&url));
            let _ = tx.send(JobOutcome {
                generation: job.generation,
                identity: job.identity,
                result,
            });
            if let Some(waker) = waker {
                let _ = waker.send(Trigger::ArtworkReady);
            }
        });
    }

    fn publish(&self, state: &SyncState) {
        let view = view::project(&state.playback, self.cache.current());
        self.snapshot.store(Arc::new(view));
    }
}

fn forward(rx: Receiver<()>, tx: Sender<Trigger>, trigger: Trigger) {
    thread::spawn(move || {
        while rx.recv().is_ok() {
            if tx.send(trigger).is_err() {
                break;
            }
        }
    });
}

/// Owns the driver thread started by [`SyncLoop::spawn`].
pub struct SyncHandle {
    tx: Sender<Trigger>,
    thread: Option<JoinHandle<()>>,
}

impl SyncHandle {
    /// Sender for wiring additional notification sources.
    pub fn trigger(&self) -> Sender<Trigger> {
        self.tx.clone()
    }

    /// Asks for an immediate refresh instead of waiting for the next tick.
    pub fn request_refresh(&self) {
        let _ = self.tx.send(Trigger::PlayerChanged);
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.tx.send(Trigger::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Sync loop thread panicked");
            }
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
