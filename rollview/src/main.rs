//! rollview — MIDI piano-roll viewer with playback highlighting.
//!
//! Pass a .mid file as the first argument, or drop one onto the window.

mod app;

use std::path::PathBuf;

use app::RollViewApp;
use eframe::NativeOptions;

fn main() -> eframe::Result<()> {
    env_logger::init();

    let initial_file = std::env::args().nth(1).map(PathBuf::from);

    let options = NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 720.0])
            .with_title("rollview"),
        ..Default::default()
    };

    eframe::run_native(
        "rollview",
        options,
        Box::new(move |cc| Box::new(RollViewApp::new(cc, initial_file))),
    )
}
