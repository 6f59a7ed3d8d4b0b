use rayon::prelude::*;

use crate::error::{Result, TerrainError};
use crate::grid::{Grid, Heightfield, neighbors8};

/// Auxiliary maps derived from one heightfield. Stale as soon as that
/// heightfield changes materially; recompute rather than patch.
#[derive(Clone, Debug)]
pub struct AuxMaps {
    pub slope: Grid<f32>,
    pub curvature: Grid<f32>,
    pub flow: Grid<f32>,
}

impl AuxMaps {
    pub fn compute(hf: &Heightfield, world_width: f32, world_height: f32) -> Result<Self> {
        Ok(Self {
            slope: slope_map(hf, world_width, world_height)?,
            curvature: curvature_map(hf, world_width, world_height)?,
            flow: flow_map(hf)?,
        })
    }
}

/// World-space spacing between adjacent vertices along x and y.
fn spacing(hf: &Heightfield, world_width: f32, world_height: f32) -> Result<(f32, f32)> {
    hf.check_dimensions()?;
    for (name, v) in [("world_width", world_width), ("world_height", world_height)] {
        if !(v.is_finite() && v > 0.0) {
            return Err(TerrainError::param(name, format!("must be positive, got {v}")));
        }
    }
    Ok((world_width / (hf.w - 1) as f32, world_height / (hf.h - 1) as f32))
}

/// Evaluate `f` on interior cells, then copy each border cell from its
/// nearest interior cell.
fn interior_map<F>(hf: &Heightfield, f: F) -> Grid<f32>
where
    F: Fn(usize, usize) -> f32 + Sync,
{
    let w = hf.w;
    let h = hf.h;
    let mut out = Grid::<f32>::new(w, h);
    out.data.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        let iy = y.clamp(1, h - 2);
        for (x, v) in row.iter_mut().enumerate() {
            *v = f(x.clamp(1, w - 2), iy);
        }
    });
    out
}

/// Central-difference gradient magnitude.
pub fn slope_map(hf: &Heightfield, world_width: f32, world_height: f32) -> Result<Grid<f32>> {
    let (dx, dy) = spacing(hf, world_width, world_height)?;
    Ok(interior_map(hf, |x, y| {
        let gx = (hf.get(x + 1, y) - hf.get(x - 1, y)) / (2.0 * dx);
        let gy = (hf.get(x, y + 1) - hf.get(x, y - 1)) / (2.0 * dy);
        (gx * gx + gy * gy).sqrt()
    }))
}

/// Discrete Laplacian. Positive in hollows, negative on crests.
pub fn curvature_map(hf: &Heightfield, world_width: f32, world_height: f32) -> Result<Grid<f32>> {
    let (dx, dy) = spacing(hf, world_width, world_height)?;
    Ok(interior_map(hf, |x, y| {
        let c = hf.get(x, y);
        let lx = (hf.get(x - 1, y) + hf.get(x + 1, y) - 2.0 * c) / (dx * dx);
        let ly = (hf.get(x, y - 1) + hf.get(x, y + 1) - 2.0 * c) / (dy * dy);
        lx + ly
    }))
}

/// Steepest-descent receiver of every cell: the lowest 8-neighbour if it is
/// strictly lower, otherwise the cell itself (a sink). Equal heights never
/// route to each other, so plateau cells are sinks. Ties between equally low
/// neighbours go to the first in `OFFSETS8` order.
pub fn downslope_targets(hf: &Heightfield) -> Result<Vec<u32>> {
    hf.check_dimensions()?;
    let w = hf.w;
    let h = hf.h;
    let mut targets = vec![0u32; w * h];

    targets.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        for x in 0..w {
            let mut best = y * w + x;
            let mut best_h = hf.data[best];
            for (nx, ny) in neighbors8(x, y, w, h) {
                let ni = ny * w + nx;
                if hf.data[ni] < best_h {
                    best = ni;
                    best_h = hf.data[ni];
                }
            }
            row[x] = best as u32;
        }
    });

    Ok(targets)
}

/// Cell indices, highest first. Equal heights keep ascending index order so
/// the result never depends on the sort implementation.
fn argsort_descending(hf: &Heightfield) -> Vec<u32> {
    let mut indices: Vec<u32> = (0..hf.data.len() as u32).collect();
    indices.par_sort_unstable_by(|&a, &b| {
        hf.data[b as usize]
            .total_cmp(&hf.data[a as usize])
            .then(a.cmp(&b))
    });
    indices
}

/// Flow accumulation: every cell contributes 1, passed downhill along
/// `downslope_targets`. Cells are visited highest to lowest, so a cell's
/// total is final before it forwards it. The sum over sinks is `w*h`.
pub fn flow_map(hf: &Heightfield) -> Result<Grid<f32>> {
    let targets = downslope_targets(hf)?;
    let sorted = argsort_descending(hf);

    let mut flow = Grid::from_vec(hf.w, hf.h, vec![1.0f32; hf.data.len()])?;
    for &idx in &sorted {
        let i = idx as usize;
        let t = targets[i] as usize;
        if t != i {
            flow.data[t] += flow.data[i];
        }
    }
    Ok(flow)
}
