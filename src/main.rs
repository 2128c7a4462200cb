use anyhow::{anyhow, Context};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use lightbox_trace::detection::preprocessing;
use lightbox_trace::{
    export, ErrorKind, PipelineStage, ProcessingParameters, SmoothingMode, StagedPipeline,
    TraceError,
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SmoothModeArg {
    Morphological,
    Curvature,
}

impl From<SmoothModeArg> for SmoothingMode {
    fn from(arg: SmoothModeArg) -> Self {
        match arg {
            SmoothModeArg::Morphological => SmoothingMode::Morphological,
            SmoothModeArg::Curvature => SmoothingMode::CurvatureBased,
        }
    }
}

#[derive(Parser)]
#[command(name = "lightbox-trace")]
#[command(about = "Trace an object photographed on a lightbox into a to-scale DXF outline")]
struct Cli {
    /// Path to input image file
    #[arg(value_name = "IMAGE", required_unless_present = "dump_params")]
    image_path: Option<PathBuf>,

    /// Output file (default: input with .dxf extension)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Load processing parameters from a JSON file
    #[arg(short, long, value_name = "JSON")]
    params: Option<PathBuf>,

    /// Grow the outline by this many millimetres
    #[arg(short, long, value_name = "MM")]
    tolerance: Option<f64>,

    /// Smooth the outline before dilation
    #[arg(short, long)]
    smooth: bool,

    /// Smoothing amount in millimetres
    #[arg(long, value_name = "MM")]
    smooth_amount: Option<f64>,

    /// Smoothing algorithm
    #[arg(long, value_enum)]
    smooth_mode: Option<SmoothModeArg>,

    /// Use adaptive thresholding for the object
    #[arg(long)]
    adaptive_threshold: bool,

    /// Fixed object threshold (0 = automatic)
    #[arg(long, value_name = "LEVEL")]
    manual_threshold: Option<i32>,

    /// Offset added to the automatic threshold
    #[arg(long, value_name = "OFFSET", allow_negative_numbers = true)]
    threshold_offset: Option<i32>,

    /// Skip morphological cleanup of the object mask
    #[arg(long)]
    disable_morphology: bool,

    /// Kernel size for object mask cleanup
    #[arg(long, value_name = "PX")]
    morph_kernel_size: Option<u32>,

    /// Keep only the best object region instead of merging nearby ones
    #[arg(long)]
    disable_contour_merging: bool,

    /// Maximum gap between merged regions in millimetres
    #[arg(long, value_name = "MM")]
    contour_merge_distance: Option<f64>,

    /// Replace the outline by its convex hull
    #[arg(long)]
    force_convex: bool,

    /// Stop at a stage (name or number) and write its image as PNG
    #[arg(long, value_name = "STAGE")]
    stage: Option<String>,

    /// Print the effective parameters as JSON and exit
    #[arg(long)]
    dump_params: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Save debug outputs to directory (must be empty)
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,
}

impl Cli {
    /// Parameter file (or defaults) overridden by command-line flags
    fn parameters(&self) -> anyhow::Result<ProcessingParameters> {
        let mut params = match &self.params {
            Some(path) => ProcessingParameters::load(path)?,
            None => ProcessingParameters::default(),
        };

        if let Some(tolerance) = self.tolerance {
            params.dilation_amount_mm = tolerance;
        }
        if self.smooth {
            params.enable_smoothing = true;
        }
        if let Some(amount) = self.smooth_amount {
            params.smoothing_amount_mm = amount;
        }
        if let Some(mode) = self.smooth_mode {
            params.smoothing_mode = mode.into();
        }
        if self.adaptive_threshold {
            params.use_adaptive_threshold = true;
        }
        if let Some(level) = self.manual_threshold {
            params.manual_threshold = level;
        }
        if let Some(offset) = self.threshold_offset {
            params.threshold_offset = offset;
        }
        if self.disable_morphology {
            params.disable_morphology = true;
        }
        if let Some(size) = self.morph_kernel_size {
            params.morph_kernel_size = size;
        }
        if self.disable_contour_merging {
            params.merge_nearby_contours = false;
        }
        if let Some(distance) = self.contour_merge_distance {
            params.contour_merge_distance_mm = distance;
        }
        if self.force_convex {
            params.force_convex = true;
        }
        if self.debug_out.is_some() {
            params.enable_debug_output = true;
        }

        params.validate()?;
        Ok(params)
    }
}

fn stage_output_path(input: &Path, stage: PipelineStage) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{}_stage{}.png", stem, stage.ordinal()))
}

fn run(args: Cli) -> anyhow::Result<()> {
    let params = args.parameters()?;

    if args.dump_params {
        println!("{}", params.to_json()?);
        return Ok(());
    }

    let target = match &args.stage {
        Some(name) => Some(
            PipelineStage::parse(name).ok_or_else(|| anyhow!("unknown stage '{}'", name))?,
        ),
        None => None,
    };

    let image_path = args
        .image_path
        .clone()
        .ok_or_else(|| anyhow!("an input image is required"))?;
    log::info!("Loading image: {}", image_path.display());
    let img = preprocessing::load_image(&image_path)?;
    log::info!(
        "Image loaded: {}x{} (estimated {:.1}s)",
        img.width(),
        img.height(),
        preprocessing::estimate_processing_time(img.width(), img.height())
    );

    let mut pipeline = StagedPipeline::new(params)?
        .with_verbose(args.verbose)
        .with_progress(|fraction: f64, label: &str| {
            log::debug!("[{:>3.0}%] {}", fraction * 100.0, label);
        });
    if let Some(debug_dir) = args.debug_out.clone() {
        pipeline = pipeline.with_debug_dir(debug_dir)?;
    }
    log::debug!("Pipeline steps: {}", pipeline.step_names().join(" -> "));

    if let Some(stage) = target {
        let output = pipeline.run_to_stage(&img, stage)?;
        let path = args
            .output
            .clone()
            .unwrap_or_else(|| stage_output_path(&image_path, stage));
        output
            .image
            .save(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!(
            "Stage '{}' ({}) written to {}",
            stage,
            stage.description(),
            path.display()
        );
        return Ok(());
    }

    let outcome = pipeline.run(&img)?;
    let path = args
        .output
        .clone()
        .unwrap_or_else(|| image_path.with_extension("dxf"));
    export::write_dxf(&path, &outcome.polygon, &outcome.scale, outcome.frame_height)?;

    let bounds = outcome
        .polygon
        .bounds()
        .ok_or_else(|| anyhow!("final outline has no extent"))?;
    println!("\n=== Trace Results ===");
    println!("Output: {}", path.display());
    println!("Vertices: {}", outcome.polygon.len());
    println!(
        "Size: {:.1} mm x {:.1} mm",
        bounds.width() / outcome.scale.x,
        bounds.height() / outcome.scale.y
    );
    println!(
        "Perimeter: {:.1} mm",
        outcome.report.perimeter / outcome.scale.average()
    );
    for warning in &outcome.report.warnings {
        println!("Warning: {}", warning);
    }

    Ok(())
}

fn main() -> ExitCode {
    let args = Cli::parse();

    let level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let kind = e
                .downcast_ref::<TraceError>()
                .map(TraceError::kind)
                .map(|k: ErrorKind| k.as_str())
                .unwrap_or("error");
            eprintln!("Error [{}]: {:#}", kind, e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_params_needs_no_image() {
        let cli = Cli::try_parse_from(["lightbox-trace", "--dump-params"]).unwrap();
        assert!(cli.image_path.is_none());
        assert!(Cli::try_parse_from(["lightbox-trace"]).is_err());
    }

    #[test]
    fn flags_override_parameters() {
        let cli = Cli::try_parse_from([
            "lightbox-trace",
            "photo.jpg",
            "-t",
            "1.5",
            "--threshold-offset",
            "-10",
            "--smooth-mode",
            "morphological",
        ])
        .unwrap();
        let params = cli.parameters().unwrap();
        assert_eq!(params.dilation_amount_mm, 1.5);
        assert_eq!(params.threshold_offset, -10);
        assert_eq!(params.smoothing_mode, SmoothingMode::Morphological);
    }

    #[test]
    fn stage_png_sits_next_to_the_input() {
        let path = stage_output_path(Path::new("/tmp/scan.jpg"), PipelineStage::Normalized);
        assert_eq!(path, PathBuf::from("/tmp/scan_stage2.png"));
    }
}
