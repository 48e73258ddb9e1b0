//! superseg: segment an image into superpixels and write the boundary
//! visualization.
//!
//! Runs the segmentation pipeline on a given image file with configurable
//! parameters, writes a copy of the image with superpixel boundaries drawn
//! in white, and prints the final superpixel count.
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin superseg -- [OPTIONS] <INPUT> <OUTPUT>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use superseg_pipeline::SegmentationConfig;
use superseg_pipeline::boundary::draw_boundaries;
use superseg_pipeline::diagnostics::{Clock, segment_with_diagnostics};

/// Superpixel segmentation by iterative statistical region merging.
///
/// Reads an image, over-segments it into superpixels, and writes a copy of
/// the image with the superpixel boundaries painted white.
#[derive(Parser)]
#[command(name = "superseg", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    input: PathBuf,

    /// Path for the boundary visualization image.
    output: PathBuf,

    /// Luminance similarity threshold for the texture codes (0-255).
    #[arg(long, default_value_t = SegmentationConfig::DEFAULT_LTP_THRESHOLD)]
    ltp_threshold: u8,

    /// Homogeneity run-length threshold (0-8).
    #[arg(long, default_value_t = SegmentationConfig::DEFAULT_LTP_UNIFORM_THRESHOLD)]
    ltp_uniform_threshold: u8,

    /// Homogeneous-pixel fraction at which a region counts as untextured.
    #[arg(long, default_value_t = SegmentationConfig::DEFAULT_UNTEXTURED_THRESHOLD)]
    untextured_threshold: f64,

    /// Merge acceptance threshold (0-1); 0 disables merging.
    #[arg(long, default_value_t = SegmentationConfig::DEFAULT_SIMILARITY_THRESHOLD)]
    similarity_threshold: f64,

    /// Multiplier on the mean region size gating merge eligibility.
    #[arg(long, default_value_t = SegmentationConfig::DEFAULT_REGULARITY)]
    regularity: f64,

    /// Target initial region size as a fraction of the image area.
    #[arg(long, default_value_t = SegmentationConfig::DEFAULT_PARTITION_SIZE_FACTOR)]
    partition_size_factor: f64,

    /// Floor on the target initial region size in pixels.
    #[arg(long, default_value_t = SegmentationConfig::DEFAULT_PARTITION_MIN_SIZE)]
    partition_min_size: f64,

    /// Spatial compactness of the initial partition.
    #[arg(long, default_value_t = SegmentationConfig::DEFAULT_PARTITION_COMPACTNESS)]
    partition_compactness: f64,

    /// Disable the texture descriptor and the texture merge rule.
    #[arg(long)]
    no_texture: bool,

    /// Full segmentation config as a JSON string.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    /// The JSON must be a valid `SegmentationConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,

    /// Output diagnostics as JSON instead of the human-readable report.
    #[arg(long)]
    json: bool,

    /// Print the per-stage diagnostics report to stderr.
    #[arg(long)]
    verbose: bool,

    /// Write the dense label map as JSON to this path.
    #[arg(long)]
    labels: Option<PathBuf>,
}

/// Build a [`SegmentationConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored. Otherwise, a config is assembled
/// from the individual flags.
fn config_from_cli(cli: &Cli) -> Result<SegmentationConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(SegmentationConfig {
        ltp_threshold: cli.ltp_threshold,
        ltp_uniform_threshold: cli.ltp_uniform_threshold,
        untextured_threshold: cli.untextured_threshold,
        similarity_threshold: cli.similarity_threshold,
        regularity: cli.regularity,
        partition_size_factor: cli.partition_size_factor,
        partition_min_size: cli.partition_min_size,
        partition_compactness: cli.partition_compactness,
        use_texture: !cli.no_texture,
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let image_bytes = match std::fs::read(&cli.input) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.input.display());
            return ExitCode::FAILURE;
        }
    };

    let image = match image::load_from_memory(&image_bytes) {
        Ok(decoded) => decoded.to_rgb8(),
        Err(e) => {
            eprintln!("Error decoding {}: {e}", cli.input.display());
            return ExitCode::FAILURE;
        }
    };

    let (result, diagnostics) = match segment_with_diagnostics(&image, &config, &StdClock) {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("Segmentation error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if cli.json {
        match serde_json::to_string_pretty(&diagnostics) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing diagnostics: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!("{} superpixels", result.region_count());
    }

    if cli.verbose {
        eprintln!("{}", diagnostics.report());
    }

    let rendered = draw_boundaries(&image, &result.label_map);
    if let Err(e) = rendered.save(&cli.output) {
        eprintln!("Error writing {}: {e}", cli.output.display());
        return ExitCode::FAILURE;
    }

    if let Some(ref labels_path) = cli.labels {
        let json = match serde_json::to_string(&result.label_map) {
            Ok(json) => json,
            Err(e) => {
                eprintln!("Error serializing label map: {e}");
                return ExitCode::FAILURE;
            }
        };
        if let Err(e) = std::fs::write(labels_path, json) {
            eprintln!("Error writing {}: {e}", labels_path.display());
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}
