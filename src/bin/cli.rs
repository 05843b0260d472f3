//! CLI for preparing asset libraries and compositing single frames.
//!
//! Usage:
//!   facelock prepare assets/ -o library.bin.bz2      # Scan and cache a library
//!   facelock list library.bin.bz2                    # Human-readable listing
//!   facelock list library.bin.bz2 --category animals --json
//!   facelock compose library.bin.bz2 --asset animals_0 \
//!       --frame frame.png --landmarks frame.landmarks.json -o out.png
//!
//! Landmarks and segmentation for asset images are read from sidecar files
//! (`<stem>.landmarks.json`, `<stem>.segmentation.png`) produced by an
//! external detector.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};
use facelock::capability::read_landmarks_json;
use facelock::session::ProcessedFrame;
use facelock::{
    AssetLibrary, AssetSummary, AudioEvent, Config, Context, FixedLandmarks, FrameOutcome,
    Session, SidecarProvider,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "facelock")]
#[command(author, version, about = "Face-locked image compositing", long_about = None)]
struct Args {
    /// Configuration file (default: facelock.json or config/facelock.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Show verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan an asset directory and save the prepared library
    Prepare {
        /// Directory of category subdirectories
        assets: PathBuf,

        /// Output cache file; a `.bz2` extension enables compression
        #[arg(short, long, default_value = "library.bin.bz2")]
        output: PathBuf,
    },

    /// List categories, or the assets of one category
    List {
        /// Prepared library cache
        library: PathBuf,

        /// Category to list
        #[arg(long)]
        category: Option<String>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Composite an asset onto one frame
    Compose {
        /// Prepared library cache
        library: PathBuf,

        /// Asset id, e.g. `animals_0`
        #[arg(long)]
        asset: String,

        /// Input frame image
        #[arg(long)]
        frame: PathBuf,

        /// Live landmarks as a JSON array of [x, y] pairs
        #[arg(long)]
        landmarks: PathBuf,

        /// Asset opacity in [0, 1]
        #[arg(long, default_value = "1.0")]
        opacity: f32,

        /// Output image
        #[arg(short, long, default_value = "out.png")]
        output: PathBuf,

        /// Print the result as JSON
        #[arg(short, long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct CategoryOutput<'a> {
    name: &'a str,
    assets: usize,
}

#[derive(Serialize)]
struct ComposeOutput {
    output: String,
    width: u32,
    height: u32,
    face_found: bool,
    mouth_open: bool,
    audio: Option<AudioEvent>,
}

fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "facelock=debug" } else { "facelock=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> facelock::Result<Config> {
    match path {
        Some(path) => Config::from_file(path),
        None => Config::load(),
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(args.config.as_deref())?;

    match &args.command {
        Command::Prepare { assets, output } => {
            let library = AssetLibrary::scan(assets, &config, &SidecarProvider)?;
            library.save(output)?;
            println!(
                "Prepared {} assets in {} categories -> {}",
                library.len(),
                library.categories().len(),
                output.display()
            );
        }
        Command::List {
            library,
            category,
            json,
        } => {
            let library = AssetLibrary::load(library)?;
            let text = match category {
                Some(name) => {
                    let summaries = library.summaries(name)?;
                    if *json {
                        serde_json::to_string_pretty(&summaries)?
                    } else {
                        format_assets(name, &summaries)
                    }
                }
                None => {
                    let categories: Vec<CategoryOutput> = library
                        .categories()
                        .iter()
                        .map(|c| CategoryOutput {
                            name: c.name(),
                            assets: c.assets().len(),
                        })
                        .collect();
                    if *json {
                        serde_json::to_string_pretty(&categories)?
                    } else {
                        format_categories(&categories)
                    }
                }
            };
            println!("{}", text);
        }
        Command::Compose {
            library,
            asset,
            frame,
            landmarks,
            opacity,
            output,
            json,
        } => {
            let ctx = Context::new(config, AssetLibrary::load(library)?);
            let mut session = Session::new(&ctx);
            session.select_asset(&ctx, Some(asset.as_str()))?;
            session.set_opacity(*opacity);

            let image = image::open(frame)?.to_rgb8();
            let detector = FixedLandmarks::new(read_landmarks_json(landmarks)?);
            let processed = match session.process_frame(&ctx, image, Instant::now(), &detector)? {
                FrameOutcome::Processed(p) => p,
                FrameOutcome::Dropped => return Err("frame dropped: over budget".into()),
            };
            processed.frame.save(output)?;

            let result = compose_output(output, &processed);
            if *json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}", format_compose(&result));
            }
        }
    }
    Ok(())
}

fn compose_output(output: &Path, processed: &ProcessedFrame) -> ComposeOutput {
    ComposeOutput {
        output: output.display().to_string(),
        width: processed.frame.width(),
        height: processed.frame.height(),
        face_found: processed.face_found,
        mouth_open: processed.mouth_open,
        audio: processed.audio.clone(),
    }
}

fn format_categories(categories: &[CategoryOutput]) -> String {
    if categories.is_empty() {
        return "No categories.".to_string();
    }
    let mut s = String::new();
    for c in categories {
        s.push_str(&format!("{:<20} {} assets\n", c.name, c.assets));
    }
    s.trim_end().to_string()
}

fn format_assets(category: &str, assets: &[AssetSummary]) -> String {
    let mut s = format!("Category: {} ({} assets)\n", category, assets.len());
    for a in assets {
        let sound = a.sound_file.as_deref().unwrap_or("-");
        s.push_str(&format!("  {:<24} {:<24} sound: {}\n", a.id, a.name, sound));
    }
    s.trim_end().to_string()
}

fn format_compose(result: &ComposeOutput) -> String {
    let mut s = format!(
        "Output: {} ({}x{})\n",
        result.output, result.width, result.height
    );
    s.push_str(&format!("Face found: {}\n", result.face_found));
    s.push_str(&format!("Mouth open: {}", result.mouth_open));
    match &result.audio {
        Some(AudioEvent::Start(path)) => s.push_str(&format!("\nAudio: start {}", path.display())),
        Some(AudioEvent::Stop) => s.push_str("\nAudio: stop"),
        None => {}
    }
    s
}
