//! Correspondence overlays: accepted points drawn over the source images.

use std::fs;
use std::path::{Path, PathBuf};

use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_hollow_circle_mut;
use scf_core::Correspondence;

use crate::{RunConfig, ScfError, ScfResult};

const MARKER_RADIUS: i32 = 6;
const MARKER_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);

/// Draw a hollow circle at each point; points outside the image are clipped
pub fn draw_points(image: &mut RgbaImage, points: impl IntoIterator<Item = (f64, f64)>) {
    for (x, y) in points {
        draw_hollow_circle_mut(image, (x.round() as i32, y.round() as i32), MARKER_RADIUS, MARKER_COLOR);
    }
}

/// Load `source`, mark `points` and save the result as `output`
pub fn render_overlay(source: &Path, points: impl IntoIterator<Item = (f64, f64)>, output: &Path) -> ScfResult<()> {
    let mut image = image::open(source)
        .map_err(|source_err| ScfError::Image { path: source.to_path_buf(), source: source_err })?
        .into_rgba8();
    draw_points(&mut image, points);
    image
        .save(output)
        .map_err(|source| ScfError::Image { path: output.to_path_buf(), source })
}

/// Write `overlay-a.png` and `overlay-b.png` into `dir`
pub fn write_overlays(config: &RunConfig, correspondences: &[Correspondence], dir: &Path) -> ScfResult<[PathBuf; 2]> {
    fs::create_dir_all(dir).map_err(|source| ScfError::Io { path: dir.to_path_buf(), source })?;
    let a = dir.join("overlay-a.png");
    let b = dir.join("overlay-b.png");
    render_overlay(&config.image_a.path, correspondences.iter().map(|c| (c.x1, c.y1)), &a)?;
    render_overlay(&config.image_b.path, correspondences.iter().map(|c| (c.x2, c.y2)), &b)?;
    Ok([a, b])
}
