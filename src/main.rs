mod demo;

use eframe::egui::{self, ColorImage, RichText, TextureHandle, TextureOptions, ViewportBuilder};
use now_playing_ticker::{
    http::{HttpClient, ReqwestClient},
    player::SpotifyScript,
    preferences::FilePreferences,
    view::{Label, PlayPauseIcon, TextSize, ToggleIcon},
    ArtworkCache, ArtworkResolver, CachedArtwork, Config, PlayerStateSource, SyncHandle,
    SyncLoop, ViewState,
};
use std::{sync::Arc, time::Duration};

const ARTWORK_MAX_SIDE: f32 = 220.0;
const REGULAR_TEXT_SIZE: f32 = 14.0;
const SMALL_TEXT_SIZE: f32 = 11.0;

fn decode_artwork(bytes: &[u8]) -> std::result::Result<ColorImage, String> {
    let image =
        image::load_from_memory(bytes).map_err(|e| format!("Failed to decode artwork: {e}"))?;
    let image = image.to_rgba8();
    let size = [image.width() as usize, image.height() as usize];
    let pixels = image.into_raw();
    Ok(ColorImage::from_rgba_unmultiplied(size, &pixels))
}

fn label_text(label: &Label) -> RichText {
    let size = match label.size {
        TextSize::Regular => REGULAR_TEXT_SIZE,
        TextSize::Small => SMALL_TEXT_SIZE,
    };
    RichText::new(label.text.as_str()).size(size)
}

struct App {
    player: Arc<dyn PlayerStateSource>,
    sync: Arc<SyncLoop>,
    handle: SyncHandle,
    repaint_interval: Duration,
    err: Option<String>,
    artwork_texture: Option<TextureHandle>,
    artwork_url: Option<String>,
    artwork_err: Option<String>,
    pending_volume: Option<u8>,
}

impl App {
    fn new(config: Config, demo: bool) -> anyhow::Result<Self> {
        let (player, metadata_client, image_client, base_url) = if demo {
            let (player, http) = demo::setup()?;
            let player: Arc<dyn PlayerStateSource> = player;
            let http: Arc<dyn HttpClient> = http;
            (player, Arc::clone(&http), http, demo::CATALOG_URL.to_owned())
        } else {
            let timeout = config.http.timeout();
            let player: Arc<dyn PlayerStateSource> = Arc::new(SpotifyScript::new());
            let metadata: Arc<dyn HttpClient> = Arc::new(ReqwestClient::new(
                timeout,
                config.http.access_token.clone(),
            )?);
            let images: Arc<dyn HttpClient> = Arc::new(ReqwestClient::new(timeout, None)?);
            (player, metadata, images, config.http.metadata_base_url.clone())
        };

        let mut preferences = FilePreferences::open(&config.preferences.path)?;
        if config.preferences.watch {
            if let Err(err) = preferences.enable_hot_reload() {
                log::warn!(
                    "Not watching {} for changes: {err:#}",
                    preferences.path().display()
                );
            }
        }

        let sync = Arc::new(
            SyncLoop::new(
                Arc::clone(&player),
                ArtworkResolver::new(metadata_client, base_url),
                Arc::new(ArtworkCache::new(image_client)),
                Arc::new(preferences),
            )
            .with_retry_interval(config.sync.retry_interval()),
        );
        let poll_interval = config.sync.poll_interval();
        let handle = Arc::clone(&sync).spawn(poll_interval);

        Ok(Self {
            player,
            sync,
            handle,
            repaint_interval: poll_interval.min(Duration::from_millis(250)),
            err: None,
            artwork_texture: None,
            artwork_url: None,
            artwork_err: None,
            pending_volume: None,
        })
    }

    fn update_artwork_texture(&mut self, ctx: &egui::Context, artwork: Option<&CachedArtwork>) {
        let Some(artwork) = artwork else {
            return;
        };
        if self.artwork_url.as_deref() == Some(artwork.source_url()) {
            return;
        }

        self.artwork_url = Some(artwork.source_url().to_owned());
        match decode_artwork(artwork.image_bytes()) {
            Ok(image) => {
                self.artwork_texture =
                    Some(ctx.load_texture("now_playing.artwork", image, TextureOptions::LINEAR));
                self.artwork_err = None;
            }
            Err(err) => {
                log::warn!("{err}");
                self.artwork_err = Some(err);
            }
        }
    }

    fn paint_artwork(&self, ui: &mut egui::Ui) {
        let Some(texture) = self.artwork_texture.as_ref() else {
            ui.allocate_space(egui::vec2(ARTWORK_MAX_SIDE, ARTWORK_MAX_SIDE));
            return;
        };
        let mut size = texture.size_vec2();
        if size.x > 0.0 && size.y > 0.0 {
            let max_side = ui.available_width().clamp(64.0, ARTWORK_MAX_SIDE);
            size *= (max_side / size.x).min(max_side / size.y);
        }
        ui.add(egui::Image::new((texture.id(), size)).fit_to_exact_size(size));
    }

    fn render_metadata(&self, ui: &mut egui::Ui, view: &ViewState) {
        ui.label(label_text(&view.name).strong());
        ui.label(label_text(&view.artist));
        ui.label(label_text(&view.album).weak());
    }

    fn render_controls(&mut self, ui: &mut egui::Ui, view: &ViewState) {
        ui.horizontal(|ui| {
            if ui.button("⏮").on_hover_text("Previous track").clicked() {
                self.playback_command("Previous", |player| player.previous_track());
            }

            let (glyph, hint) = match view.play_pause {
                PlayPauseIcon::Play => ("▶", "Play"),
                PlayPauseIcon::Pause => ("⏸", "Pause"),
            };
            if ui.button(glyph).on_hover_text(hint).clicked() {
                match view.play_pause {
                    PlayPauseIcon::Play => self.playback_command("Play", |player| player.play()),
                    PlayPauseIcon::Pause => {
                        self.playback_command("Pause", |player| player.pause())
                    }
                }
            }

            if ui.button("⏭").on_hover_text("Next track").clicked() {
                self.playback_command("Next", |player| player.next_track());
            }

            ui.separator();

            let shuffling = view.shuffle == ToggleIcon::Pressed;
            let shuffle = egui::Button::new("🔀").selected(shuffling);
            if ui.add(shuffle).on_hover_text("Shuffle").clicked() {
                self.playback_command("Shuffle", |player| player.set_shuffling(!shuffling));
            }

            let repeating = view.repeat == ToggleIcon::Pressed;
            let repeat = egui::Button::new("🔁").selected(repeating);
            if ui.add(repeat).on_hover_text("Repeat").clicked() {
                self.playback_command("Repeat", |player| player.set_repeating(!repeating));
            }
        });

        let mut volume = self.pending_volume.unwrap_or(view.volume);
        let response = ui.add(egui::Slider::new(&mut volume, 0..=100).show_value(false));
        if response.changed() {
            self.pending_volume = Some(volume);
            self.playback_command("Volume", |player| player.set_volume(volume));
        }
        if !response.dragged() {
            self.pending_volume = None;
        }
        let volume_label = match self.pending_volume {
            Some(pending) => format!("Volume: {pending} %"),
            None => view.volume_label.clone(),
        };
        ui.label(volume_label);
    }

    fn render_errors(&self, ui: &mut egui::Ui) {
        if let Some(err) = &self.err {
            ui.colored_label(egui::Color32::from_rgb(220, 80, 80), err);
        }
        if let Some(err) = self.sync.last_error() {
            ui.colored_label(
                egui::Color32::from_rgb(240, 200, 80),
                format!("Artwork error: {err}"),
            );
        }
        if let Some(err) = &self.artwork_err {
            ui.colored_label(egui::Color32::from_rgb(240, 200, 80), err);
        }
    }

    fn playback_command<F>(&mut self, action_name: &str, action: F)
    where
        F: FnOnce(&dyn PlayerStateSource) -> anyhow::Result<()>,
    {
        match action(self.player.as_ref()) {
            Ok(()) => {
                self.err = None;
                self.handle.request_refresh();
            }
            Err(e) => {
                log::warn!("{action_name} failed: {e:#}");
                self.err = Some(format!("{action_name} failed: {e:#}"));
            }
        }
    }
}

impl eframe::App for App {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let view = self.sync.snapshot();
        self.update_artwork_texture(ctx, view.artwork.as_deref());

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                self.paint_artwork(ui);
                ui.add_space(8.0);
                self.render_metadata(ui, &view);
                ui.add_space(8.0);
                self.render_controls(ui, &view);
                self.render_errors(ui);
            });
        });

        ctx.request_repaint_after(self.repaint_interval);
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let demo = std::env::args().skip(1).any(|arg| arg == "--demo");
    let config = Config::load().unwrap_or_else(|err| {
        log::warn!("Falling back to default config: {err:#}");
        Config::default()
    });
    if !demo && !cfg!(target_os = "macos") {
        log::warn!("Spotify scripting needs macOS; run with --demo elsewhere");
    }
    let app = App::new(config, demo)?;

    let native_options = eframe::NativeOptions {
        viewport: ViewportBuilder::default()
            .with_inner_size([280.0, 440.0])
            .with_window_level(egui::WindowLevel::AlwaysOnTop),
        ..Default::default()
    };
    eframe::run_native(
        "Now Playing",
        native_options,
        Box::new(
            move |_cc| -> std::result::Result<
                Box<dyn eframe::App>,
                Box<dyn std::error::Error + Send + Sync>,
            > { Ok(Box::new(app)) },
        ),
    )
    .map_err(|e| anyhow::anyhow!("Failed to run window: {e}"))
}
