//! Application shell: file loading, transport, color settings, and the
//! piano-roll view itself.
//!
//! The egui thread is the visual-owner thread — the only place the scene
//! is read or written. The playback bridge is drained once per frame
//! here, which is where engine-thread events cross onto this thread.

use std::path::PathBuf;
use std::time::Duration;

use egui::{Context, Key, Sense, Stroke};
use rollcore::color::{ColorMode, ColorRole, ColorSettings};
use rollcore::engine::SynthEngine;
use rollcore::midi::Timeline;
use rollcore::playback::PlaybackBridge;
use rollcore::scene::Scene;

/// Repaint interval while playback is highlighting notes (~30 fps).
const PLAYBACK_REPAINT: Duration = Duration::from_millis(33);

/// One role's in-progress selection in the settings panel, applied only
/// when the user confirms.
struct ColorRow {
    role: ColorRole,
    mode: ColorMode,
    hex: String,
}

impl ColorRow {
    fn label(&self) -> &'static str {
        match self.role {
            ColorRole::Background => "background",
            ColorRole::NormalNote => "notes",
            ColorRole::PlayingNote => "playing",
        }
    }
}

pub struct RollViewApp {
    timeline: Option<Timeline>,
    scene: Scene,
    settings: ColorSettings,
    bridge: PlaybackBridge<SynthEngine>,
    color_rows: [ColorRow; 3],
    status: String,
}

impl RollViewApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, initial_file: Option<PathBuf>) -> Self {
        let settings = load_settings().unwrap_or_default();

        let color_rows = [
            ColorRow {
                role: ColorRole::Background,
                mode: settings.background_choice.mode,
                hex: settings.background_choice.hex.clone(),
            },
            ColorRow {
                role: ColorRole::NormalNote,
                mode: settings.normal_note_choice.mode,
                hex: settings.normal_note_choice.hex.clone(),
            },
            ColorRow {
                role: ColorRole::PlayingNote,
                mode: settings.playing_note_choice.mode,
                hex: settings.playing_note_choice.hex.clone(),
            },
        ];

        let mut app = Self {
            timeline: None,
            scene: Scene::default(),
            settings,
            bridge: PlaybackBridge::new(SynthEngine::new()),
            color_rows,
            status: "drop a .mid file here, or pass one on the command line".into(),
        };

        if let Some(path) = initial_file {
            app.load_from_path(path);
        }
        app
    }

    fn load_from_path(&mut self, path: PathBuf) {
        // A new file supersedes whatever is playing
        self.bridge.stop(&mut self.scene, &self.settings);

        match Timeline::load(&path) {
            Ok(timeline) => {
                self.status = format!(
                    "{} — {} notes",
                    path.file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    timeline.notes.len()
                );
                self.timeline = Some(timeline);
                self.rebuild_scene();
            }
            Err(err) => {
                log::error!("failed to load {path:?}: {err}");
                self.status = format!("could not load file: {err}");
                self.timeline = None;
                self.rebuild_scene();
            }
        }
    }

    /// Full rebuild: the old scene is discarded wholesale.
    fn rebuild_scene(&mut self) {
        let notes = self.timeline.as_ref().map(|t| t.notes.as_slice()).unwrap_or(&[]);
        self.scene = Scene::build(notes, self.settings.background, self.settings.normal_note);
    }

    fn toggle_playback(&mut self) {
        if self.bridge.is_playing() {
            self.bridge.stop(&mut self.scene, &self.settings);
            self.status = "stopped".into();
        } else if let Some(timeline) = &self.timeline {
            match self.bridge.play(timeline) {
                Ok(()) => self.status = "playing".into(),
                Err(err) => self.status = format!("cannot play: {err}"),
            }
        }
    }

    fn apply_color_row(&mut self, row_index: usize) {
        let row = &self.color_rows[row_index];
        let role = row.role;
        self.settings.apply(role, row.mode, &row.hex);
        save_settings(&self.settings);

        // Playing-note changes only affect future highlight events; the
        // other two roles repaint the existing rectangles.
        if role != ColorRole::PlayingNote {
            self.rebuild_scene();
        }
    }

    fn handle_input(&mut self, ctx: &Context) {
        // Dropped MIDI files
        let dropped: Option<PathBuf> = ctx.input(|i| {
            i.raw
                .dropped_files
                .iter()
                .filter_map(|f| f.path.clone())
                .find(|p| {
                    let ext = p.extension().and_then(|e| e.to_str()).unwrap_or("");
                    ext.eq_ignore_ascii_case("mid") || ext.eq_ignore_ascii_case("midi")
                })
        });
        if let Some(path) = dropped {
            self.load_from_path(path);
        }

        if ctx.input(|i| i.key_pressed(Key::Space)) {
            self.toggle_playback();
        }
    }

    fn render_toolbar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let can_play = self.timeline.is_some() && !self.bridge.is_playing();
            if ui.add_enabled(can_play, egui::Button::new("play")).clicked() {
                self.toggle_playback();
            }
            if ui
                .add_enabled(self.bridge.is_playing(), egui::Button::new("stop"))
                .clicked()
            {
                self.toggle_playback();
            }

            ui.separator();

            let mut apply: Option<usize> = None;
            for (i, row) in self.color_rows.iter_mut().enumerate() {
                ui.label(row.label());
                ui.menu_button(row.mode.label(), |ui| {
                    for &mode in row.role.modes() {
                        if ui.button(mode.label()).clicked() {
                            row.mode = mode;
                            apply = Some(i);
                            ui.close_menu();
                        }
                    }
                });
                if row.mode == ColorMode::CustomHex {
                    let edit = egui::TextEdit::singleline(&mut row.hex)
                        .hint_text("#RRGGBB")
                        .desired_width(80.0);
                    if ui.add(edit).lost_focus() {
                        apply = Some(i);
                    }
                }
                ui.separator();
            }
            if let Some(i) = apply {
                self.apply_color_row(i);
            }
        });
    }

    fn render_piano_roll(&mut self, ui: &mut egui::Ui) {
        egui::ScrollArea::both()
            .auto_shrink([false, false])
            .show(ui, |ui| {
                // The canvas is at least the viewport, at most the extent
                let size = self.scene.extent().max(ui.available_size());
                let (response, painter) = ui.allocate_painter(size, Sense::hover());
                let origin = response.rect.min;

                painter.rect_filled(response.rect, 0.0, self.scene.background);

                let clip = painter.clip_rect();
                for note_rect in self.scene.rects() {
                    let rect = note_rect.rect_at(origin);
                    if rect.intersects(clip) {
                        painter.rect_filled(rect, 0.0, note_rect.fill);
                    }
                }
            });
    }

    fn render_status_bar(&self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label(&self.status);
            if self.scene.note_count() > 0 {
                ui.separator();
                ui.label(format!(
                    "canvas {:.0} × {:.0}",
                    self.scene.width, self.scene.height
                ));
            }
        });
    }
}

impl eframe::App for RollViewApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        self.handle_input(ctx);

        // Marshal engine-thread events onto this thread, in order
        if self.bridge.drain(&mut self.scene, &self.settings) {
            self.status = "playback finished".into();
        }

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            self.render_toolbar(ui);
        });

        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            self.render_status_bar(ui);
        });

        egui::CentralPanel::default()
            .frame(
                egui::Frame::none()
                    .fill(self.scene.background)
                    .stroke(Stroke::NONE),
            )
            .show(ctx, |ui| {
                self.render_piano_roll(ui);
            });

        // Keep frames coming while the engine is delivering events;
        // otherwise egui sleeps until the next input
        if self.bridge.is_playing() {
            ctx.request_repaint_after(PLAYBACK_REPAINT);
        }
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        // Ordered teardown: stop the session (thread joined) before the
        // engine's device handle goes away with the app
        self.bridge.stop(&mut self.scene, &self.settings);
    }
}

fn settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("rollview").join("colors.json"))
}

fn load_settings() -> Option<ColorSettings> {
    let path = settings_path()?;
    let text = std::fs::read_to_string(path).ok()?;
    let mut settings: ColorSettings = serde_json::from_str(&text).ok()?;
    settings.resolve_all();
    Some(settings)
}

fn save_settings(settings: &ColorSettings) {
    let Some(path) = settings_path() else { return };
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    match serde_json::to_string_pretty(settings) {
        Ok(json) => {
            if let Err(err) = std::fs::write(&path, json) {
                log::warn!("could not save color settings: {err}");
            }
        }
        Err(err) => log::warn!("could not serialize color settings: {err}"),
    }
}
