// ============================================================================
// SketchFE CLI — headless sketch rendering via command-line arguments
// ============================================================================
//
// Usage examples:
//   sketchfe --input sketch.png --output render.png
//   sketchfe -i doodle.jpg --style honey
//   sketchfe -i sketch.png --endpoint https://render.example.com --api-key sk-...
//
// No GUI is opened in CLI mode. The sketch is uploaded synchronously on the
// current thread and the rendered result written as PNG.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::assets::AppSettings;
use crate::components::styles::StyleStore;
use crate::io;
use crate::ops::generate::GenerationClient;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// SketchFE headless renderer.
///
/// Send a sketch to the render service and save the result — no GUI required.
#[derive(Parser, Debug)]
#[command(
    name = "sketchfe",
    about = "SketchFE headless sketch renderer",
    long_about = "Upload a sketch image to the render service and write the generated\n\
                  result as PNG without opening the GUI.\n\n\
                  Example:\n  \
                  sketchfe --input sketch.png --style honey --output render.png"
)]
pub struct CliArgs {
    /// Input sketch image (PNG, JPEG, WEBP, BMP, or GIF).
    #[arg(short, long, required = true, value_name = "FILE")]
    pub input: PathBuf,

    /// Output file path. Defaults to a timestamped name next to the input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Render style key (e.g. material, honey, softbody, testMaterial) or a
    /// custom style key from the style library.
    #[arg(short, long, default_value = "material", value_name = "STYLE")]
    pub style: String,

    /// Render service base URL. Defaults to the configured endpoint.
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// API key override sent with the request.
    #[arg(long, value_name = "KEY")]
    pub api_key: Option<String>,

    /// Extra prompt text appended to the style prompt.
    #[arg(short, long, value_name = "TEXT")]
    pub prompt: Option<String>,

    /// Print timing information.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Returns `true` when any CLI-mode flag is present in the real process
    /// arguments. Used by `main()` to route before creating an eframe window.
    pub fn is_cli_mode() -> bool {
        std::env::args().any(|a| a == "--input" || a == "-i")
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run one headless render and return an OS exit code.
/// `0` = success, `1` = failure.
pub fn run(args: CliArgs) -> ExitCode {
    match run_one(&args) {
        Ok(path) => {
            println!("{}", path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_one(args: &CliArgs) -> Result<PathBuf, String> {
    if !io::is_image_path(&args.input) {
        return Err(format!(
            "'{}' is not a supported image file",
            args.input.display()
        ));
    }

    let settings = AppSettings::load();
    let endpoint = args
        .endpoint
        .clone()
        .unwrap_or_else(|| settings.api_base_url.clone());
    let api_key = args.api_key.clone().or_else(|| settings.api_key());

    let mut styles = StyleStore::new();
    styles.load_custom(crate::assets::load_custom_styles());
    let mut prompt = styles.prompt_for(&args.style);
    if styles.get(&args.style).is_none() {
        eprintln!(
            "warning: unknown style '{}', using the default style prompt.",
            args.style
        );
    }
    if let Some(extra) = &args.prompt {
        prompt.push(' ');
        prompt.push_str(extra);
    }

    // -- Step 1: Load and compress ---------------------------------------
    let start = Instant::now();
    let sketch = io::load_image(&args.input)?;
    let upload = io::compress_for_upload(&sketch)?;
    if args.verbose {
        println!(
            "loaded {} ({}x{}, {:.0}ms)",
            args.input.display(),
            sketch.width(),
            sketch.height(),
            start.elapsed().as_secs_f64() * 1000.0
        );
    }

    // -- Step 2: Generate -------------------------------------------------
    let request_start = Instant::now();
    let client = GenerationClient::new(&endpoint)?;
    let bytes = client
        .generate(&prompt, &upload, api_key.as_deref())
        .map_err(|e| e.to_string())?;
    let rendered = io::decode_image_bytes(&bytes)?;
    if args.verbose {
        println!(
            "rendered {}x{} ({:.0}ms)",
            rendered.width(),
            rendered.height(),
            request_start.elapsed().as_secs_f64() * 1000.0
        );
    }

    // -- Step 3: Save -----------------------------------------------------
    let style_name = styles
        .get(&args.style)
        .map(|s| s.name.clone())
        .unwrap_or_else(|| args.style.clone());
    let output = match &args.output {
        Some(path) => path.clone(),
        None => {
            let parent = args.input.parent().unwrap_or(std::path::Path::new("."));
            parent.join(io::default_output_name(&style_name))
        }
    };
    io::write_png(&rendered, &output)?;
    Ok(output)
}
