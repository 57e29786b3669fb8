use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use now_playing_ticker::{
    http::MemoryHttp, player::MemoryPlayer, preferences::MemoryPreferences, ArtworkCache,
    ArtworkError, ArtworkResolver, ArtworkSizeIndex, HttpError, PlaybackState,
    PlayerStateSource, SyncLoop, TrackIdentity, TrackInfo,
};

const CATALOG: &str = "https://api.test/v1";

fn png_for(url: &str) -> Vec<u8> {
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.extend_from_slice(url.as_bytes());
    bytes
}

fn track(identity: &str, name: &str) -> TrackInfo {
    TrackInfo {
        identity: TrackIdentity::new(identity),
        artist: "Artist".into(),
        album: "Album".into(),
        name: name.into(),
    }
}

fn build(player: &Arc<MemoryPlayer>, http: &Arc<MemoryHttp>) -> SyncLoop {
    SyncLoop::new(
        player.clone(),
        ArtworkResolver::new(http.clone(), CATALOG),
        Arc::new(ArtworkCache::new(http.clone())),
        Arc::new(MemoryPreferences::new()),
    )
}

fn settle(sync: &SyncLoop) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        sync.drain_results();
        if !sync.is_fetching() {
            return;
        }
        assert!(Instant::now() < deadline, "artwork job did not finish");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn resolves_and_caches_artwork_for_a_spotify_track() {
    let http = Arc::new(MemoryHttp::new());
    http.respond(
        format!("{CATALOG}/tracks/abc123"),
        r#"{"album":{"images":[{"url":"https://img/a.png"}]}}"#,
    );
    http.respond("https://img/a.png", png_for("https://img/a.png"));
    let player = Arc::new(MemoryPlayer::new(vec![track("spotify:track:abc123", "Song")]));
    let sync = build(&player, &http);

    sync.refresh();
    settle(&sync);

    let artwork = sync.cache().current().expect("artwork committed");
    assert_eq!(artwork.source_url(), "https://img/a.png");
    assert_eq!(artwork.image_bytes(), png_for("https://img/a.png").as_slice());
    assert_eq!(
        http.requests(),
        vec![format!("{CATALOG}/tracks/abc123"), "https://img/a.png".to_owned()]
    );
}

#[test]
fn resolving_twice_hits_the_cache() {
    let http = Arc::new(MemoryHttp::new());
    http.respond(
        format!("{CATALOG}/tracks/abc123"),
        r#"{"album":{"images":[{"url":"https://img/a.png"}]}}"#,
    );
    http.respond("https://img/a.png", png_for("https://img/a.png"));
    let resolver = ArtworkResolver::new(http.clone(), CATALOG);
    let cache = ArtworkCache::new(http.clone());
    let identity = TrackIdentity::new("spotify:track:abc123");

    let first = resolver.resolve(&identity, ArtworkSizeIndex(0)).unwrap();
    cache.commit(cache.fetch(&first).unwrap().unwrap());
    let second = resolver.resolve(&identity, ArtworkSizeIndex(0)).unwrap();

    assert_eq!(first, second);
    assert!(cache.fetch(&second).unwrap().is_none());
    assert_eq!(http.request_count("https://img/a.png"), 1);
}

#[test]
fn metadata_outage_keeps_previous_artwork() {
    let http = Arc::new(MemoryHttp::new());
    http.respond(
        format!("{CATALOG}/tracks/good"),
        r#"{"album":{"images":[{"url":"https://img/good.png"}]}}"#,
    );
    http.respond("https://img/good.png", png_for("https://img/good.png"));
    http.fail(format!("{CATALOG}/tracks/down"), HttpError::Status(500));
    let player = Arc::new(MemoryPlayer::new(vec![
        track("spotify:track:good", "Good"),
        track("spotify:track:down", "Down"),
    ]));
    let sync = build(&player, &http);

    sync.refresh();
    settle(&sync);
    player.next_track().unwrap();
    for _ in 0..5 {
        sync.refresh();
    }
    settle(&sync);
    for _ in 0..5 {
        sync.refresh();
    }

    assert!(matches!(
        sync.last_error(),
        Some(ArtworkError::LookupFailed(HttpError::Status(500)))
    ));
    assert_eq!(sync.current_identity().as_str(), "spotify:track:down");
    assert_eq!(http.request_count(&format!("{CATALOG}/tracks/down")), 1);
    let snapshot = sync.snapshot();
    assert_eq!(snapshot.name.text, "Down");
    assert_eq!(
        snapshot.artwork.as_ref().map(|a| a.source_url().to_owned()),
        Some("https://img/good.png".to_owned())
    );
}

#[test]
fn malformed_identity_is_reported_without_network() {
    let http = Arc::new(MemoryHttp::new());
    let player = Arc::new(MemoryPlayer::new(vec![track("local-file", "Demo")]));
    let sync = build(&player, &http);

    sync.refresh();
    settle(&sync);

    assert!(matches!(
        sync.last_error(),
        Some(ArtworkError::MalformedIdentity(_))
    ));
    assert!(http.requests().is_empty());
}

#[test]
fn concurrent_refreshes_never_expose_torn_artwork() {
    let http = Arc::new(MemoryHttp::new());
    let mut playlist = Vec::new();
    for n in 0..4 {
        let image = format!("https://img/{n}.png");
        http.respond(
            format!("{CATALOG}/tracks/t{n}"),
            format!(r#"{{"album":{{"images":[{{"url":"{image}"}}]}}}}"#),
        );
        http.respond(image.clone(), png_for(&image));
        playlist.push(track(&format!("spotify:track:t{n}"), &format!("Track {n}")));
    }
    let player = Arc::new(MemoryPlayer::new(playlist));
    let sync = Arc::new(build(&player, &http));
    let done = Arc::new(AtomicBool::new(false));

    let reader = {
        let sync = Arc::clone(&sync);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            while !done.load(Ordering::Relaxed) {
                if let Some(artwork) = sync.snapshot().artwork.clone() {
                    assert_eq!(artwork.image_bytes(), png_for(artwork.source_url()).as_slice());
                }
                if let Some(artwork) = sync.cache().current() {
                    assert_eq!(artwork.image_bytes(), png_for(artwork.source_url()).as_slice());
                }
            }
        })
    };

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let sync = Arc::clone(&sync);
            let player = Arc::clone(&player);
            thread::spawn(move || {
                for step in 0..25 {
                    if step % 5 == 0 {
                        player.next_track().unwrap();
                    }
                    sync.refresh();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    sync.refresh();
    settle(&sync);
    done.store(true, Ordering::Relaxed);
    reader.join().unwrap();

    let identity = player.current_state().unwrap().track.identity;
    let n = identity.canonical_id().unwrap().trim_start_matches('t').to_owned();
    assert_eq!(sync.current_identity(), identity);
    assert_eq!(
        sync.cache().current_url(),
        Some(format!("https://img/{n}.png"))
    );
}

#[test]
fn player_state_changes_reach_the_snapshot_without_refetching() {
    let http = Arc::new(MemoryHttp::new());
    http.respond(
        format!("{CATALOG}/tracks/abc123"),
        r#"{"album":{"images":[{"url":"https://img/a.png"}]}}"#,
    );
    http.respond("https://img/a.png", png_for("https://img/a.png"));
    let player = Arc::new(MemoryPlayer::new(Vec::new()));
    player.set_state(PlaybackState::new(
        track("spotify:track:abc123", "A very long song title that overflows"),
        false,
        false,
        false,
        20,
    ));
    let sync = build(&player, &http);
    sync.refresh();
    settle(&sync);

    player.set_shuffling(true).unwrap();
    player.set_repeating(true).unwrap();
    player.set_volume(90).unwrap();
    sync.refresh();

    let snapshot = sync.snapshot();
    assert_eq!(snapshot.volume, 90);
    assert_eq!(snapshot.volume_label, "Volume: 90 %");
    assert_eq!(snapshot.shuffle, now_playing_ticker::view::ToggleIcon::Pressed);
    assert_eq!(snapshot.repeat, now_playing_ticker::view::ToggleIcon::Pressed);
    assert_eq!(snapshot.name.size, now_playing_ticker::view::TextSize::Small);
    assert_eq!(http.request_count(&format!("{CATALOG}/tracks/abc123")), 1);
}
