//! Diagnostic RGBA dumps of heightfields and aux maps. Grayscale except the
//! erosion delta, which uses a two-sided ramp.

use image::ImageEncoder;
use image::codecs::png::PngEncoder;
use rayon::prelude::*;

use crate::grid::Grid;

const ERODED: [u8; 4] = [170, 60, 40, 255];
const NEUTRAL: [u8; 4] = [128, 128, 128, 255];
const DEPOSITED: [u8; 4] = [40, 90, 170, 255];

#[inline]
fn lerp_color(a: [u8; 4], b: [u8; 4], t: f32) -> [u8; 4] {
    let t = t.clamp(0.0, 1.0);
    [
        (a[0] as f32 + (b[0] as f32 - a[0] as f32) * t).round() as u8,
        (a[1] as f32 + (b[1] as f32 - a[1] as f32) * t).round() as u8,
        (a[2] as f32 + (b[2] as f32 - a[2] as f32) * t).round() as u8,
        255,
    ]
}

/// Map each value through `f` into [0, 1] and write it as gray.
fn render_gray<F>(grid: &Grid<f32>, f: F) -> Vec<u8>
where
    F: Fn(f32) -> f32 + Sync,
{
    let w = grid.w;
    let mut rgba = vec![0u8; grid.w * grid.h * 4];
    rgba.par_chunks_mut(w * 4).enumerate().for_each(|(y, row)| {
        for x in 0..w {
            let v = (f(grid.get(x, y)) * 255.0).clamp(0.0, 255.0) as u8;
            row[x * 4..x * 4 + 4].copy_from_slice(&[v, v, v, 255]);
        }
    });
    rgba
}

/// Min-max normalised grayscale.
pub fn render_heightmap(height: &Grid<f32>) -> Vec<u8> {
    let stats = height.stats();
    let range = (stats.max - stats.min).max(f32::EPSILON);
    render_gray(height, |v| (v - stats.min) / range)
}

/// Slope, scaled so the steepest cell is white.
pub fn render_slope(slope: &Grid<f32>) -> Vec<u8> {
    let max_s = slope.data.iter().cloned().fold(0.0f32, f32::max).max(f32::EPSILON);
    render_gray(slope, |s| s / max_s)
}

/// Flow accumulation on a log scale; single-cell flow is black.
pub fn render_flow(flow: &Grid<f32>) -> Vec<u8> {
    let max_flow = flow.data.iter().cloned().fold(1.0f32, f32::max);
    let log_max = max_flow.ln().max(f32::EPSILON);
    render_gray(flow, |f| f.max(1.0).ln() / log_max)
}

/// `after - before`: red where material was removed, blue where it was laid down.
pub fn render_delta(before: &Grid<f32>, after: &Grid<f32>) -> Vec<u8> {
    let w = after.w;
    let max_d = before
        .data
        .iter()
        .zip(&after.data)
        .map(|(b, a)| (a - b).abs())
        .fold(0.0f32, f32::max)
        .max(f32::EPSILON);

    let mut rgba = vec![0u8; after.w * after.h * 4];
    rgba.par_chunks_mut(w * 4).enumerate().for_each(|(y, row)| {
        for x in 0..w {
            let d = (after.get(x, y) - before.get(x, y)) / max_d;
            let color = if d < 0.0 {
                lerp_color(NEUTRAL, ERODED, -d)
            } else {
                lerp_color(NEUTRAL, DEPOSITED, d)
            };
            row[x * 4..x * 4 + 4].copy_from_slice(&color);
        }
    });
    rgba
}

/// Encode an RGBA buffer as PNG bytes.
pub fn encode_png(rgba: &[u8], w: usize, h: usize) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf).write_image(rgba, w as u32, h as u32, image::ExtendedColorType::Rgba8)?;
    Ok(buf)
}
