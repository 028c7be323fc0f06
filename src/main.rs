#![windows_subsystem = "windows"]
#![allow(clippy::too_many_arguments)]

use eframe::egui;
use sketchfe::app::SketchFEApp;
use sketchfe::{cli, logger};

fn main() -> Result<(), eframe::Error> {
    // -- CLI / headless mode ---------------------------------------------
    if cli::CliArgs::is_cli_mode() {
        use clap::Parser;
        let args = cli::CliArgs::parse();
        let code = cli::run(args);
        std::process::exit(if code == std::process::ExitCode::SUCCESS {
            0
        } else {
            1
        });
    }

    // -- GUI mode -----------------------------------------------------

    // Initialize session log (overwrites previous session log)
    logger::init();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 720.0])
            .with_maximized(true)
            .with_title("SketchFE"),
        ..Default::default()
    };

    eframe::run_native(
        "SketchFE",
        options,
        Box::new(|cc| Box::new(SketchFEApp::new(cc))),
    )
}
