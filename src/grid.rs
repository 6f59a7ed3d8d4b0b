use crate::error::{Result, TerrainError};

/// Row-major flat grid. No per-cell objects, f32 friendly.
/// Edges are hard boundaries: nothing wraps.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid<T> {
    pub data: Vec<T>,
    pub w: usize,
    pub h: usize,
}

/// Elevation samples, `w × h`, row-major.
pub type Heightfield = Grid<f32>;

/// 8-neighbour offsets in fixed scan order. Tie-breaking in flow routing
/// depends on this order, so it must not change.
pub const OFFSETS8: [(i32, i32); 8] = [
    (-1, -1), (0, -1), (1, -1),
    (-1, 0),           (1, 0),
    (-1, 1),  (0, 1),  (1, 1),
];

impl<T: Copy + Default> Grid<T> {
    pub fn new(w: usize, h: usize) -> Self {
        Self {
            data: vec![T::default(); w * h],
            w,
            h,
        }
    }

    /// Wrap an existing buffer. Fails if the length is not `w*h`.
    pub fn from_vec(w: usize, h: usize, data: Vec<T>) -> Result<Self> {
        if data.len() != w * h {
            return Err(TerrainError::SizeMismatch {
                expected: w * h,
                actual: data.len(),
            });
        }
        Ok(Self { data, w, h })
    }

    #[inline]
    pub fn idx(&self, x: usize, y: usize) -> usize {
        debug_assert!(x < self.w && y < self.h);
        y * self.w + x
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        self.data[self.idx(x, y)]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, v: T) {
        let i = self.idx(x, y);
        self.data[i] = v;
    }

    pub fn same_shape<U>(&self, other: &Grid<U>) -> bool {
        self.w == other.w && self.h == other.h
    }
}

impl Grid<f32> {
    /// Reject grids too small for central differences.
    pub fn check_dimensions(&self) -> Result<()> {
        check_dimensions(self.w, self.h)
    }

    /// Reject NaN / Infinity anywhere in the grid.
    pub fn check_finite(&self) -> Result<()> {
        match self.data.iter().position(|v| !v.is_finite()) {
            Some(index) => Err(TerrainError::NonFinite { index }),
            None => Ok(()),
        }
    }

    /// Bilinear height at a continuous grid position.
    /// Returns 0 outside `[0, w-1] × [0, h-1]`.
    #[inline]
    pub fn sample_bilinear(&self, x: f32, y: f32) -> f32 {
        if self.w < 2 || self.h < 2 {
            return 0.0;
        }
        if !(x >= 0.0 && y >= 0.0 && x <= (self.w - 1) as f32 && y <= (self.h - 1) as f32) {
            return 0.0;
        }
        let x0 = (x.floor() as usize).min(self.w - 2);
        let y0 = (y.floor() as usize).min(self.h - 2);
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;

        let v00 = self.get(x0, y0);
        let v10 = self.get(x0 + 1, y0);
        let v01 = self.get(x0, y0 + 1);
        let v11 = self.get(x0 + 1, y0 + 1);

        let top = v00 + (v10 - v00) * fx;
        let bot = v01 + (v11 - v01) * fx;
        top + (bot - top) * fy
    }

    /// Central-difference gradient of the bilinear surface at ±1 cell.
    /// (0, 0) when any probe falls outside the grid.
    #[inline]
    pub fn gradient(&self, x: f32, y: f32) -> (f32, f32) {
        if self.w < 3 || self.h < 3 {
            return (0.0, 0.0);
        }
        if x < 1.0 || y < 1.0 || x > (self.w - 2) as f32 || y > (self.h - 2) as f32 {
            return (0.0, 0.0);
        }
        let gx = (self.sample_bilinear(x + 1.0, y) - self.sample_bilinear(x - 1.0, y)) * 0.5;
        let gy = (self.sample_bilinear(x, y + 1.0) - self.sample_bilinear(x, y - 1.0)) * 0.5;
        (gx, gy)
    }

    /// Sum in f64 so mass checks are not swamped by f32 rounding.
    pub fn total(&self) -> f64 {
        self.data.iter().map(|&v| v as f64).sum()
    }

    pub fn stats(&self) -> GridStats {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for &v in &self.data {
            min = min.min(v);
            max = max.max(v);
        }
        let mean = if self.data.is_empty() {
            0.0
        } else {
            (self.total() / self.data.len() as f64) as f32
        };
        GridStats { min, max, mean }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct GridStats {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
}

pub fn check_dimensions(w: usize, h: usize) -> Result<()> {
    if w < 3 || h < 3 {
        return Err(TerrainError::InvalidDimensions {
            width: w,
            height: h,
        });
    }
    Ok(())
}

/// Bilinear weights of the 4 cells around a continuous position, as
/// `(index, weight)` pairs. Weights sum to 1. None outside the grid.
#[inline]
pub fn bilinear_cells(w: usize, h: usize, x: f32, y: f32) -> Option<[(usize, f32); 4]> {
    if w < 2 || h < 2 {
        return None;
    }
    if !(x >= 0.0 && y >= 0.0 && x <= (w - 1) as f32 && y <= (h - 1) as f32) {
        return None;
    }
    let x0 = (x.floor() as usize).min(w - 2);
    let y0 = (y.floor() as usize).min(h - 2);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;
    let i = y0 * w + x0;
    Some([
        (i, (1.0 - fx) * (1.0 - fy)),
        (i + 1, fx * (1.0 - fy)),
        (i + w, (1.0 - fx) * fy),
        (i + w + 1, fx * fy),
    ])
}

/// 8-connected neighbours clipped to the grid, in `OFFSETS8` order.
pub fn neighbors8(x: usize, y: usize, w: usize, h: usize) -> impl Iterator<Item = (usize, usize)> {
    let mut out = [(0usize, 0usize); 8];
    let mut n = 0;
    for (dx, dy) in OFFSETS8 {
        let nx = x as i32 + dx;
        let ny = y as i32 + dy;
        if nx >= 0 && ny >= 0 && nx < w as i32 && ny < h as i32 {
            out[n] = (nx as usize, ny as usize);
            n += 1;
        }
    }
    out.into_iter().take(n)
}
