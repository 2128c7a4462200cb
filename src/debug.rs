use crate::error::{Result, TraceError};
use crate::models::{Point2D, Polygon};
use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Intermediate image captured while diagnostics are enabled
#[derive(Debug, Clone, PartialEq)]
pub struct DebugArtifact {
    pub name: String,
    pub image: DynamicImage,
}

impl DebugArtifact {
    pub fn new(name: impl Into<String>, image: DynamicImage) -> Self {
        Self {
            name: name.into(),
            image,
        }
    }
}

/// Receives the artifacts of a run, once, in production order.
pub trait DebugSink: Send {
    fn flush(&mut self, artifacts: Vec<DebugArtifact>) -> Result<()>;
}

/// Writes artifacts as `NN_name.png` into a directory.
///
/// Sequence numbers continue across flushes, so a sink reused for several
/// runs never overwrites earlier output.
pub struct DirectorySink {
    output_dir: PathBuf,
    next_sequence: usize,
    verbose: bool,
}

impl DirectorySink {
    /// The directory must be empty or non-existent
    pub fn new(output_dir: PathBuf) -> Result<Self> {
        if output_dir.exists() {
            let mut entries = std::fs::read_dir(&output_dir)
                .map_err(|e| TraceError::DebugOutput(format!("{}: {e}", output_dir.display())))?;
            if entries.next().is_some() {
                return Err(TraceError::InvalidInput(format!(
                    "debug directory is not empty: {}",
                    output_dir.display()
                )));
            }
        } else {
            std::fs::create_dir_all(&output_dir)
                .map_err(|e| TraceError::DebugOutput(format!("{}: {e}", output_dir.display())))?;
        }

        Ok(Self {
            output_dir,
            next_sequence: 1,
            verbose: false,
        })
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn file_name(sequence: usize, name: &str) -> String {
        format!("{:02}_{}.png", sequence, name.to_lowercase().replace(' ', "_"))
    }
}

impl DebugSink for DirectorySink {
    fn flush(&mut self, artifacts: Vec<DebugArtifact>) -> Result<()> {
        for artifact in artifacts {
            let filename = Self::file_name(self.next_sequence, &artifact.name);
            let path = self.output_dir.join(&filename);
            artifact
                .image
                .save(&path)
                .map_err(|e| TraceError::DebugOutput(format!("{}: {e}", path.display())))?;
            self.next_sequence += 1;

            if self.verbose {
                log::info!("Debug: saved {}", filename);
            } else {
                log::debug!("Debug: saved {}", filename);
            }
        }
        Ok(())
    }
}

/// Collects flushed artifacts in memory. Clones share the same buffer, so a
/// caller can keep one handle and give the other to a pipeline.
#[derive(Default, Clone)]
pub struct MemorySink {
    artifacts: Arc<Mutex<Vec<DebugArtifact>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything flushed so far
    pub fn artifacts(&self) -> Vec<DebugArtifact> {
        self.artifacts
            .lock()
            .map(|stored| stored.clone())
            .unwrap_or_default()
    }
}

impl DebugSink for MemorySink {
    fn flush(&mut self, artifacts: Vec<DebugArtifact>) -> Result<()> {
        let mut stored = self
            .artifacts
            .lock()
            .map_err(|_| TraceError::DebugOutput("memory sink lock poisoned".to_string()))?;
        stored.extend(artifacts);
        Ok(())
    }
}

const OUTLINE_COLOR: Rgb<u8> = Rgb([0, 200, 0]);
const CORNER_COLOR: Rgb<u8> = Rgb([220, 0, 0]);

/// Draw a closed polygon over a grayscale background
pub fn overlay_polygon(background: &GrayImage, polygon: &Polygon) -> RgbImage {
    let mut canvas = DynamicImage::ImageLuma8(background.clone()).to_rgb8();
    draw_ring(&mut canvas, &polygon.points, OUTLINE_COLOR);
    canvas
}

/// Draw the lightbox quad with a dot on each corner
pub fn overlay_corners(background: &RgbImage, corners: &[Point2D]) -> RgbImage {
    let mut canvas = background.clone();
    let radius = (canvas.width().max(canvas.height()) / 200).max(3) as i32;
    draw_ring(&mut canvas, corners, OUTLINE_COLOR);
    for corner in corners {
        let p = corner.to_pixel();
        draw_filled_circle_mut(&mut canvas, (p.x, p.y), radius, CORNER_COLOR);
    }
    canvas
}

fn draw_ring(canvas: &mut RgbImage, points: &[Point2D], color: Rgb<u8>) {
    if points.len() < 2 {
        return;
    }
    for (i, a) in points.iter().enumerate() {
        let b = &points[(i + 1) % points.len()];
        draw_line_segment_mut(
            canvas,
            (a.x as f32, a.y as f32),
            (b.x as f32, b.y as f32),
            color,
        );
    }
}
