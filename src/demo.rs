use std::{io::Cursor, sync::Arc};

use anyhow::Context;
use now_playing_ticker::{http::MemoryHttp, player::MemoryPlayer, TrackIdentity, TrackInfo};

pub const CATALOG_URL: &str = "demo://catalog";

const TRACKS: [(&str, &str, &str, &str, [u8; 3]); 3] = [
    (
        "4uLU6hMCjMI75M1A2tKUQC",
        "Rick Astley",
        "Whenever You Need Somebody",
        "Never Gonna Give You Up",
        [196, 64, 64],
    ),
    (
        "0VjIjW4GlUZAMYd2vXMi3b",
        "The Weeknd",
        "After Hours",
        "Blinding Lights",
        [220, 40, 40],
    ),
    (
        "3n3Ppam7vgaVa1iaRUc9Lp",
        "The Killers",
        "Hot Fuss (Deluxe Version, Remastered 2024)",
        "Mr. Brightside",
        [48, 96, 180],
    ),
];

/// A player with a short playlist and a catalog that serves it, so the
/// window can run without Spotify or network access.
pub fn setup() -> anyhow::Result<(Arc<MemoryPlayer>, Arc<MemoryHttp>)> {
    let http = Arc::new(MemoryHttp::new());
    let mut playlist = Vec::new();

    for (id, artist, album, name, rgb) in TRACKS {
        let large = format!("demo://img/{id}/640.png");
        let small = format!("demo://img/{id}/64.png");
        http.respond(
            format!("{CATALOG_URL}/tracks/{id}"),
            format!(r#"{{"album":{{"images":[{{"url":"{large}"}},{{"url":"{small}"}}]}}}}"#),
        );
        http.respond(large, solid_png(rgb, 640)?);
        http.respond(small, solid_png(rgb, 64)?);

        playlist.push(TrackInfo {
            identity: TrackIdentity::new(format!("spotify:track:{id}")),
            artist: artist.to_owned(),
            album: album.to_owned(),
            name: name.to_owned(),
        });
    }

    Ok((Arc::new(MemoryPlayer::new(playlist)), http))
}

fn solid_png(rgb: [u8; 3], side: u32) -> anyhow::Result<Vec<u8>> {
    let image = image::RgbImage::from_pixel(side, side, image::Rgb(rgb));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .context("Failed to encode demo artwork")?;
    Ok(bytes)
}
