//! CLI application for batched facial landmark detection.
//!
//! Usage:
//!   percent-landmarks --model cascade.bin.bz2 a.jpg b.png       # Human-readable output
//!   percent-landmarks --model cascade.bin.bz2 a.jpg --json      # JSON output
//!   percent-landmarks --model cascade.bin.bz2 a.jpg -o out.json # Save to file

use clap::Parser;
use percent_landmark_net::{
    DetectorConfig, InputItem, LandmarkDetector, LandmarkSet, Point, RegressionCascade,
};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "percent-landmarks")]
#[command(author, version, about = "Batched 68-point facial landmark detection", long_about = None)]
struct Args {
    /// Input image files; all of them run as one batch
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Cascade weights (bincode, optionally .bz2)
    #[arg(short, long)]
    model: PathBuf,

    /// Detector config (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(short, long)]
    json: bool,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Show verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Serialize)]
struct ImageOutput {
    image: String,
    width: u32,
    height: u32,
    shift: Point,
    landmarks: Vec<Point>,
}

impl ImageOutput {
    fn new(path: &std::path::Path, set: &LandmarkSet) -> Self {
        Self {
            image: path.display().to_string(),
            width: set.image_width(),
            height: set.image_height(),
            shift: set.shift(),
            landmarks: set.positions().to_vec(),
        }
    }
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
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => DetectorConfig::from_json_file(path)?,
        None => DetectorConfig::default(),
    };

    info!(model = %args.model.display(), "loading cascade");
    let cascade = RegressionCascade::load(&args.model)?;
    let detector = LandmarkDetector::builder()
        .network(cascade)
        .config(config)
        .build()?;

    let mut items = Vec::with_capacity(args.images.len());
    for path in &args.images {
        debug!(image = %path.display(), "decoding");
        let img = image::open(path)?;
        items.push(InputItem::from(img));
    }

    info!(count = items.len(), "detecting landmarks");
    let sets = detector.detect_batch(&items)?;

    let outputs: Vec<ImageOutput> = args
        .images
        .iter()
        .zip(&sets)
        .map(|(path, set)| ImageOutput::new(path, set))
        .collect();

    let output_str = if args.json {
        serde_json::to_string_pretty(&outputs)?
    } else {
        format_human_readable(&outputs)
    };

    if let Some(ref path) = args.output {
        std::fs::write(path, &output_str)?;
        info!(path = %path.display(), "output written");
    } else {
        println!("{}", output_str);
    }

    Ok(())
}

fn format_human_readable(outputs: &[ImageOutput]) -> String {
    let mut s = String::new();

    for output in outputs {
        s.push_str(&format!(
            "Image: {} ({}x{})\n",
            output.image, output.width, output.height
        ));
        s.push_str(&format!(
            "Padding shift: ({:.1}, {:.1})\n",
            output.shift.x, output.shift.y
        ));
        s.push_str(&format!("Landmarks: {} points\n", output.landmarks.len()));
        for (i, p) in output.landmarks.iter().enumerate() {
            s.push_str(&format!("  {:>2}: ({:>7.1}, {:>7.1})\n", i, p.x, p.y));
        }
        s.push('\n');
    }

    s
}
