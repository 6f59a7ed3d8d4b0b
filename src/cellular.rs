//! Cellular (Worley) noise over a seeded point set on the unit torus.
//!
//! Samples are the distance to the nearest point, normalised by the mean
//! point spacing, inverted and rescaled to [-1, 1] (1 on a point, -1 far
//! from every point).

use tracing::debug;

use crate::rng::Rng;

const SALT_POINTS: u64 = 0xCE11_0000_5EED_0001;
/// z of the slice sampled from a 3D point set.
const SLICE_Z: f32 = 0.5;

/// Wrapped per-axis delta on the unit torus.
#[inline]
fn torus_delta(a: f32, b: f32) -> f32 {
    let d = (a - b).abs();
    d.min(1.0 - d)
}

#[inline]
fn dist_sq(p: [f32; 3], q: [f32; 3]) -> f32 {
    let dx = torus_delta(p[0], q[0]);
    let dy = torus_delta(p[1], q[1]);
    let dz = p[2] - q[2];
    dx * dx + dy * dy + dz * dz
}

/// Uniform bucket grid over the xy plane, roughly one point per bucket.
#[derive(Clone, Debug)]
struct BucketGrid {
    res: usize,
    /// Start offsets into `items`, length `res*res + 1`.
    starts: Vec<u32>,
    items: Vec<u32>,
}

impl BucketGrid {
    /// None for point sets the ring search can't handle: fewer than two
    /// points, or every point in the same place.
    fn build(points: &[[f32; 3]]) -> Option<Self> {
        if points.len() < 2 {
            return None;
        }
        let first = points[0];
        if points.iter().all(|p| *p == first) {
            return None;
        }
        let res = ((points.len() as f32).sqrt().ceil() as usize).max(1);

        let bucket_of = |p: &[f32; 3]| {
            let bx = ((p[0] * res as f32) as usize).min(res - 1);
            let by = ((p[1] * res as f32) as usize).min(res - 1);
            by * res + bx
        };

        let mut counts = vec![0u32; res * res + 1];
        for p in points {
            counts[bucket_of(p) + 1] += 1;
        }
        for i in 1..counts.len() {
            counts[i] += counts[i - 1];
        }
        let starts = counts.clone();
        let mut fill = counts;
        let mut items = vec![0u32; points.len()];
        for (i, p) in points.iter().enumerate() {
            let b = bucket_of(p);
            items[fill[b] as usize] = i as u32;
            fill[b] += 1;
        }
        Some(Self { res, starts, items })
    }

    fn nearest_sq(&self, points: &[[f32; 3]], q: [f32; 3]) -> f32 {
        let res = self.res as i32;
        let cx = ((q[0] * res as f32) as i32).clamp(0, res - 1);
        let cy = ((q[1] * res as f32) as i32).clamp(0, res - 1);
        let cell = 1.0 / res as f32;
        let mut best = f32::MAX;

        // Rings past res/2 wrap onto buckets already visited.
        for r in 0..=(res / 2 + 1) {
            // Every point in ring r is at least (r-1) cells away in xy.
            let ring_min = (r - 1).max(0) as f32 * cell;
            if ring_min * ring_min > best {
                break;
            }
            for dy in -r..=r {
                for dx in -r..=r {
                    if dx.abs() != r && dy.abs() != r {
                        continue;
                    }
                    let bx = (cx + dx).rem_euclid(res) as usize;
                    let by = (cy + dy).rem_euclid(res) as usize;
                    let b = by * self.res + bx;
                    let (s, e) = (self.starts[b] as usize, self.starts[b + 1] as usize);
                    for &pi in &self.items[s..e] {
                        best = best.min(dist_sq(points[pi as usize], q));
                    }
                }
            }
        }
        best
    }
}

/// Seeded Worley sampler. Falls back to a linear scan when the bucket grid
/// can't be built.
#[derive(Clone, Debug)]
pub struct Cellular {
    points: Vec<[f32; 3]>,
    backend: Option<BucketGrid>,
    /// Mean spacing `N^(-1/dim)`, used to normalise distances.
    spacing: f32,
}

impl Cellular {
    /// `count` points in the unit square (`dimension == 2`) or cube (otherwise 3).
    pub fn new(count: usize, seed: u64, dimension: u8) -> Self {
        let mut rng = Rng::new(seed ^ SALT_POINTS);
        let points: Vec<[f32; 3]> = (0..count)
            .map(|_| {
                let x = rng.next_f32();
                let y = rng.next_f32();
                let z = if dimension == 3 { rng.next_f32() } else { SLICE_Z };
                [x, y, z]
            })
            .collect();
        Self::from_points(points, dimension)
    }

    pub(crate) fn from_points(points: Vec<[f32; 3]>, dimension: u8) -> Self {
        let backend = BucketGrid::build(&points);
        if backend.is_none() {
            debug!(points = points.len(), "cellular bucket grid unavailable, using linear scan");
        }
        let dim = if dimension == 3 { 3.0 } else { 2.0 };
        let spacing = (points.len().max(1) as f32).powf(-1.0 / dim);
        Self {
            points,
            backend,
            spacing,
        }
    }

    pub fn is_accelerated(&self) -> bool {
        self.backend.is_some()
    }

    fn brute_force_sq(&self, q: [f32; 3]) -> f32 {
        self.points.iter().fold(f32::MAX, |best, &p| best.min(dist_sq(p, q)))
    }

    /// Distance to the nearest point, torus-wrapped. Infinity for an empty set.
    pub fn nearest(&self, x: f32, y: f32) -> f32 {
        if self.points.is_empty() {
            return f32::INFINITY;
        }
        let q = [x.rem_euclid(1.0), y.rem_euclid(1.0), SLICE_Z];
        // rem_euclid can round up to exactly 1.0 for tiny negatives
        let q = [if q[0] >= 1.0 { 0.0 } else { q[0] }, if q[1] >= 1.0 { 0.0 } else { q[1] }, q[2]];
        let d2 = match &self.backend {
            Some(grid) => grid.nearest_sq(&self.points, q),
            None => self.brute_force_sq(q),
        };
        d2.sqrt()
    }

    /// Inverted, rescaled distance in [-1, 1].
    pub fn sample(&self, x: f32, y: f32) -> f32 {
        let d = self.nearest(x, y) / self.spacing;
        if !d.is_finite() {
            return -1.0;
        }
        1.0 - 2.0 * d.clamp(0.0, 1.0)
    }
}
