//! sumie-bench: CLI tool for conversion parameter experimentation.
//!
//! Runs the conversion pipeline on a given image file with configurable
//! settings, printing per-stage diagnostics. Useful for:
//!
//! - Tuning complexity / color simplification / smoothing values
//! - Checking how many layers, contours, and paths a setting produces
//! - Inspecting refined SVG output size
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin sumie-bench -- [OPTIONS] <IMAGE_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use sumie_pipeline::{ConversionSettings, Pipeline, PipelineContext};
use sumie_svg::refine::{DEFAULT_MERGE_THRESHOLD, DEFAULT_PRECISION};
use sumie_svg::{BorderStyle, RefineOptions, SvgMetadata, refine, to_svg};

/// Border stroke color used by `--border`.
const BORDER_STROKE: &str = "#333333";

/// Border stroke width used by `--border`.
const BORDER_WIDTH: f64 = 2.0;

/// Corner radius used by `--border rounded`.
const BORDER_RADIUS: f64 = 12.0;

/// Conversion parameter experimentation and diagnostics for sumie.
///
/// Runs the conversion pipeline on a given image with configurable
/// settings and prints per-stage diagnostics.
#[derive(Parser)]
#[command(name = "sumie-bench", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Detail retention in [0, 1]; higher keeps smaller features.
    #[arg(long, default_value_t = ConversionSettings::DEFAULT)]
    complexity: f64,

    /// Color clustering coarseness in [0, 1]; higher merges more colors.
    #[arg(long, default_value_t = ConversionSettings::DEFAULT)]
    color_simplification: f64,

    /// Path smoothing in [0, 1]; 0 is polygonal output.
    #[arg(long, default_value_t = ConversionSettings::DEFAULT)]
    path_smoothing: f64,

    /// Run the markup refinement passes on the serialized SVG.
    #[arg(long)]
    refine: bool,

    /// Euclidean RGB distance within which path fills merge.
    #[arg(long, default_value_t = DEFAULT_MERGE_THRESHOLD)]
    merge_threshold: f64,

    /// Decimal places kept when rounding path data.
    #[arg(long, default_value_t = DEFAULT_PRECISION)]
    precision: usize,

    /// Border overlay drawn by refinement.
    #[arg(long, value_enum, default_value_t = Border::None)]
    border: Border,

    /// Write SVG output to file.
    #[arg(long)]
    svg: Option<PathBuf>,

    /// Output diagnostics as JSON instead of a human-readable report.
    #[arg(long)]
    json: bool,
}

/// Border overlay selection.
#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Border {
    /// No border.
    None,
    /// Rounded-rectangle stroke around the padded view box.
    Rounded,
    /// Circular stroke inscribed in the padded view box.
    Circle,
}

impl Border {
    fn to_style(self) -> Option<BorderStyle> {
        match self {
            Self::None => None,
            Self::Rounded => Some(BorderStyle::Rounded {
                radius: BORDER_RADIUS,
                stroke: BORDER_STROKE.to_owned(),
                width: BORDER_WIDTH,
            }),
            Self::Circle => Some(BorderStyle::Circle {
                stroke: BORDER_STROKE.to_owned(),
                width: BORDER_WIDTH,
            }),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), String> {
    let image = image::open(&cli.image_path)
        .map_err(|e| format!("failed to open {}: {e}", cli.image_path.display()))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    eprintln!("loaded {} ({width}x{height})", cli.image_path.display());

    let settings = ConversionSettings::new(
        cli.complexity,
        cli.color_simplification,
        cli.path_smoothing,
    );
    let context = Pipeline::with_default_stages()
        .execute_with_progress(PipelineContext::new(image, settings), |name, index, total| {
            eprintln!("[{index}/{total}] {name}");
        })
        .map_err(|e| e.to_string())?;

    report(cli, &context)?;

    if let Some(output_path) = &cli.svg {
        let title = cli
            .image_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned());
        let description = format!(
            "complexity={} colors={} smoothing={}",
            settings.complexity, settings.color_simplification, settings.path_smoothing,
        );
        let metadata = SvgMetadata {
            title: title.as_deref(),
            description: Some(&description),
        };
        let paths = context.paths.as_deref().unwrap_or_default();
        let svg_text = to_svg(paths, width, height, &metadata);

        let output = if cli.refine {
            let options = RefineOptions {
                merge_threshold: cli.merge_threshold,
                precision: cli.precision,
                border: cli.border.to_style(),
            };
            let refined = refine(&svg_text, &options).map_err(|e| e.to_string())?;
            eprintln!("refined from {} to {} bytes", svg_text.len(), refined.len());
            refined
        } else {
            svg_text
        };

        std::fs::write(output_path, output)
            .map_err(|e| format!("failed to write {}: {e}", output_path.display()))?;
        eprintln!("wrote {}", output_path.display());
    }

    Ok(())
}

/// Print the context's diagnostics, human-readable or as JSON.
fn report(cli: &Cli, context: &PipelineContext) -> Result<(), String> {
    if cli.json {
        let rendered =
            serde_json::to_string_pretty(&context.metadata).map_err(|e| e.to_string())?;
        println!("{rendered}");
    } else {
        for (key, value) in &context.metadata {
            println!("{key}: {value}");
        }
        let path_count = context.paths.as_ref().map_or(0, Vec::len);
        println!("paths: {path_count}");
    }
    Ok(())
}
