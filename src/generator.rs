use rayon::prelude::*;
use tracing::debug;

use crate::cellular::Cellular;
use crate::config::GenerationParams;
use crate::error::Result;
use crate::grid::{Grid, Heightfield};
use crate::noise::{fbm, gradient_noise, ridge, simplex_noise};
use crate::rng::seed_u32;

const SALT_GRADIENT: u64 = 0x6AD1_E570_0000_0001;
const SALT_SIMPLEX: u64 = 0x51B1_E800_0000_0002;
const SALT_WARP: u64 = 0xDA12_BEEF_0000_CAFE;
const SALT_MICRO: u64 = 0x0111_C120_DE7A_1100;

/// Micro-detail runs this many times faster than the octave it decorates.
const MICRO_FREQ: f32 = 8.0;

/// Per-octave seeds and the cellular sampler, built once per `generate`.
struct Sampler<'a> {
    params: &'a GenerationParams,
    cellular: Cellular,
    gradient_seed: u32,
    simplex_seed: u32,
    warp_seed: u32,
    micro_seed: u32,
    wind: (f32, f32),
}

impl<'a> Sampler<'a> {
    fn new(params: &'a GenerationParams) -> Self {
        let theta = params.wind_direction.to_radians();
        Self {
            params,
            cellular: Cellular::new(params.worley_points, params.worley_seed, params.worley_dimension),
            gradient_seed: seed_u32(params.seed, SALT_GRADIENT),
            simplex_seed: seed_u32(params.seed, SALT_SIMPLEX),
            warp_seed: seed_u32(params.seed, SALT_WARP),
            micro_seed: seed_u32(params.seed, SALT_MICRO),
            wind: (theta.cos(), theta.sin()),
        }
    }

    /// Unscaled height at noise-space coordinate (nx, ny).
    fn height(&self, nx: f32, ny: f32) -> f32 {
        let p = self.params;
        let mut amp = p.amplitude;
        let mut freq = 1.0f32;
        let mut total = 0.0f32;

        for octave in 0..p.octaves {
            // Warp along the wind; warp frequency tracks the octave frequency.
            let warp_freq = p.domain_warp_frequency * freq;
            let warp = fbm(
                nx * warp_freq,
                ny * warp_freq,
                self.warp_seed.wrapping_add(octave),
                2,
                1.0,
                2.0,
                0.5,
            ) * p.domain_warp_strength;
            let sx = (nx + warp * self.wind.0) * freq;
            let sy = (ny + warp * self.wind.1) * freq;

            let a = ridge(gradient_noise(sx, sy, self.gradient_seed.wrapping_add(octave)), p.ridge_offset);
            let b = ridge(simplex_noise(sx, sy, self.simplex_seed.wrapping_add(octave)), p.ridge_offset);
            let c = ridge(self.cellular.sample(sx, sy), p.ridge_offset);
            let micro = gradient_noise(
                sx * MICRO_FREQ,
                sy * MICRO_FREQ,
                self.micro_seed.wrapping_add(octave),
            ) * p.micro_detail;

            total += ((a + b + c) / 3.0 + micro) * amp;
            amp *= p.gain;
            freq *= p.lacunarity;
        }
        total
    }
}

/// Synthesize a `(resolution+1)²` heightfield. Bit-for-bit deterministic
/// for equal params: every cell is a pure function of its coordinate and
/// the post passes double-buffer.
pub fn generate(params: &GenerationParams) -> Result<Heightfield> {
    params.validate()?;

    let n = params.grid_size();
    let spacing = params.cell_spacing();
    let half = params.world_size * 0.5;
    let sampler = Sampler::new(params);
    debug!(
        size = n,
        octaves = params.octaves,
        accelerated = sampler.cellular.is_accelerated(),
        "generating heightfield"
    );

    let mut height = Grid::<f32>::new(n, n);
    height
        .data
        .par_chunks_mut(n)
        .enumerate()
        .for_each(|(y, row)| {
            let wy = y as f32 * spacing - half;
            for (x, out) in row.iter_mut().enumerate() {
                let wx = x as f32 * spacing - half;
                *out = sampler.height(wx * params.base_frequency, wy * params.base_frequency);
            }
        });

    if params.apply_smoothing {
        for _ in 0..params.smooth_iterations {
            smooth(&mut height, params.smooth_factor);
        }
    }
    edge_falloff(&mut height, params.edge_margin);

    Ok(height)
}

/// One pass of the 3×3 weighted-neighbour filter, blended with the input by
/// `factor`. Weights: self 1, orthogonal 1, diagonal 0.5; at the border only
/// the weights of cells that exist are counted.
pub fn smooth(height: &mut Heightfield, factor: f32) {
    let w = height.w;
    let h = height.h;
    let src = height.data.clone();

    height.data.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        for x in 0..w {
            let mut sum = 0.0f32;
            let mut weight = 0.0f32;
            for dy in -1i32..=1 {
                for dx in -1i32..=1 {
                    let nx = x as i32 + dx;
                    let ny = y as i32 + dy;
                    if nx < 0 || ny < 0 || nx >= w as i32 || ny >= h as i32 {
                        continue;
                    }
                    let k = if dx != 0 && dy != 0 { 0.5 } else { 1.0 };
                    sum += src[ny as usize * w + nx as usize] * k;
                    weight += k;
                }
            }
            let v = src[y * w + x];
            row[x] = v * (1.0 - factor) + (sum / weight) * factor;
        }
    });
}

/// Linear blend toward zero within `margin` cells of the border. With a
/// 1-cell margin the outer ring is zeroed and the interior is untouched.
pub fn edge_falloff(height: &mut Heightfield, margin: f32) {
    if margin <= 0.0 {
        return;
    }
    let w = height.w;
    let h = height.h;
    height.data.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        let dy = y.min(h - 1 - y);
        for (x, v) in row.iter_mut().enumerate() {
            let d = x.min(w - 1 - x).min(dy) as f32;
            if d < margin {
                *v *= d / margin;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TerrainError;

    fn small() -> GenerationParams {
        GenerationParams {
            resolution: 32,
            world_size: 64.0,
            octaves: 3,
            ..Default::default()
        }
    }

    #[test]
    fn dimensions_follow_resolution() {
        let hf = generate(&small()).unwrap();
        assert_eq!((hf.w, hf.h), (33, 33));
        assert_eq!(hf.data.len(), 33 * 33);
    }

    #[test]
    fn deterministic_bitwise() {
        let p = GenerationParams { apply_smoothing: true, ..small() };
        let a = generate(&p).unwrap();
        let b = generate(&p).unwrap();
        let bits = |g: &Heightfield| g.data.iter().map(|v| v.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&a), bits(&b));
    }

    #[test]
    fn seed_changes_output() {
        let a = generate(&small()).unwrap();
        let b = generate(&GenerationParams { seed: 43, ..small() }).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn border_is_zeroed_interior_finite() {
        let hf = generate(&small()).unwrap();
        hf.check_finite().unwrap();
        for i in 0..hf.w {
            assert_eq!(hf.get(i, 0), 0.0);
            assert_eq!(hf.get(i, hf.h - 1), 0.0);
            assert_eq!(hf.get(0, i), 0.0);
            assert_eq!(hf.get(hf.w - 1, i), 0.0);
        }
        assert!(hf.data.iter().any(|&v| v != 0.0));
    }

    #[test]
    fn wider_margin_ramps_linearly() {
        let mut g = Grid::from_vec(7, 7, vec![6.0; 49]).unwrap();
        edge_falloff(&mut g, 3.0);
        assert_eq!(g.get(0, 3), 0.0);
        assert!((g.get(1, 3) - 2.0).abs() < 1e-6);
        assert!((g.get(2, 3) - 4.0).abs() < 1e-6);
        assert_eq!(g.get(3, 3), 6.0);
    }

    #[test]
    fn smoothing_flattens_a_spike() {
        let mut g = Grid::<f32>::new(5, 5);
        g.set(2, 2, 9.0);
        smooth(&mut g, 1.0);
        // self 1 + 4 orthogonal + 4 * 0.5 diagonal = 7
        assert!((g.get(2, 2) - 9.0 / 7.0).abs() < 1e-6);
        assert!((g.get(2, 1) - 9.0 / 7.0).abs() < 1e-6);
        assert!((g.get(1, 1) - 4.5 / 7.0).abs() < 1e-6);
        let before = g.clone();
        smooth(&mut g, 0.0);
        assert_eq!(g, before);
    }

    #[test]
    fn flat_amplitude_is_uniform_zero() {
        let p = GenerationParams {
            resolution: 4,
            amplitude: 0.0,
            octaves: 1,
            ..Default::default()
        };
        let hf = generate(&p).unwrap();
        assert_eq!((hf.w, hf.h), (5, 5));
        assert!(hf.data.iter().all(|v| v.is_finite() && v.abs() < 1e-6));
    }

    #[test]
    fn bad_params_fail_before_work() {
        let p = GenerationParams { resolution: 0, ..Default::default() };
        assert!(matches!(generate(&p), Err(TerrainError::InvalidDimensions { .. })));
    }
}
