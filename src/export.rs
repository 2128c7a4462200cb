// DXF export of the final outline

use crate::models::{PixelScale, Point2D, Polygon};
use anyhow::{bail, Result};
use dxf::enums::AcadVersion;
use dxf::{entities::*, Color, Drawing, LwPolylineVertex};
use std::path::Path;

pub const OUTLINE_LAYER: &str = "OUTLINE";

/// Convert a rectified-pixel point to millimetres with the origin at the
/// bottom-left of the lightbox and y pointing up
pub fn to_millimetres(point: &Point2D, scale: &PixelScale, frame_height_px: u32) -> Point2D {
    Point2D::new(
        point.x / scale.x,
        (frame_height_px as f64 - point.y) / scale.y,
    )
}

/// Write `polygon` as one closed LWPOLYLINE in millimetres
pub fn write_dxf(path: &Path, polygon: &Polygon, scale: &PixelScale, frame_height_px: u32) -> Result<()> {
    if !polygon.is_valid() {
        bail!("cannot export an outline with {} vertices", polygon.len());
    }

    let mut drawing = Drawing::new();
    drawing.header.version = AcadVersion::R2010;

    let mut polyline = LwPolyline::default();
    for pt in &polygon.points {
        let mm = to_millimetres(pt, scale, frame_height_px);
        polyline.vertices.push(LwPolylineVertex {
            x: mm.x,
            y: mm.y,
            ..Default::default()
        });
    }
    polyline.set_is_closed(true);

    let mut common = EntityCommon::default();
    common.layer = OUTLINE_LAYER.to_string();
    common.color = Color::from_index(7);

    drawing.add_entity(Entity {
        common,
        specific: EntityType::LwPolyline(polyline),
    });
    drawing.save_file(path)?;

    log::info!(
        "Exported outline with {} vertices to {}",
        polygon.len(),
        path.display()
    );
    Ok(())
}
