//! Particle-based hydraulic erosion.
//!
//! A pool of droplets walks the bilinear surface of the heightfield, picking
//! up sediment where it runs fast and downhill and dropping it where it slows
//! or climbs. Stepping is batched and resumable: `step_batch` moves each of
//! up to `batch_size` live droplets by one step, so a caller can interleave
//! batches with rendering, pausing or resetting.
//!
//! Droplets in a batch run one after another in pool order and see each
//! other's edits. That order is part of the result; running droplets in
//! parallel would need a separate delta buffer applied after the batch.

use rand::Rng;
use tracing::debug;

use crate::analysis::AuxMaps;
use crate::config::ErosionParams;
use crate::error::{Result, TerrainError};
use crate::grid::{Grid, Heightfield, bilinear_cells};

/// Below this speed a droplet counts as stalled.
const MIN_SPEED: f32 = 0.01;
/// Capacity floor for flat or uphill moves.
const MIN_SLOPE: f32 = 0.01;

#[derive(Clone, Debug, PartialEq)]
pub struct Droplet {
    pub x: f32,
    pub y: f32,
    pub dx: f32,
    pub dy: f32,
    pub speed: f32,
    pub water: f32,
    pub sediment: f32,
    pub lifetime: u32,
    pub alive: bool,
}

impl Droplet {
    fn spawn(x: f32, y: f32, params: &ErosionParams, w: usize, h: usize) -> Self {
        Self {
            x,
            y,
            dx: 0.0,
            dy: 0.0,
            speed: params.initial_speed,
            water: params.initial_volume,
            sediment: 0.0,
            lifetime: 0,
            alive: in_interior(x, y, w, h),
        }
    }
}

/// True when (x, y) is at least one cell away from every border.
#[inline]
fn in_interior(x: f32, y: f32, w: usize, h: usize) -> bool {
    x >= 1.0 && y >= 1.0 && x <= (w - 2) as f32 && y <= (h - 2) as f32
}

/// Extra multiplicative factor on sediment capacity at a droplet position.
pub trait CapacityModifier: Send + Sync {
    fn factor(&self, x: f32, y: f32) -> f32;
}

/// Capacity bias from slope, flow and curvature maps: steep, well-drained
/// cells carry more; hollows carry less.
#[derive(Clone, Debug)]
pub struct AuxCapacity {
    maps: AuxMaps,
    log_max_flow: f32,
    slope_weight: f32,
    flow_weight: f32,
    curvature_weight: f32,
}

impl AuxCapacity {
    pub fn new(maps: AuxMaps, params: &ErosionParams) -> Self {
        let max_flow = maps.flow.data.iter().copied().fold(1.0f32, f32::max);
        Self {
            maps,
            log_max_flow: max_flow.ln_1p(),
            slope_weight: params.slope_weight,
            flow_weight: params.flow_weight,
            curvature_weight: params.curvature_weight,
        }
    }
}

impl CapacityModifier for AuxCapacity {
    fn factor(&self, x: f32, y: f32) -> f32 {
        let w = self.maps.slope.w;
        let h = self.maps.slope.h;
        let cx = (x.round().max(0.0) as usize).min(w - 1);
        let cy = (y.round().max(0.0) as usize).min(h - 1);

        let slope = self.maps.slope.get(cx, cy);
        let flow = self.maps.flow.get(cx, cy);
        let curv = self.maps.curvature.get(cx, cy);

        let s = 1.0 + self.slope_weight * slope / (1.0 + slope);
        let f = 1.0 + self.flow_weight * flow.ln_1p() / self.log_max_flow.max(f32::EPSILON);
        let c = (1.0 - self.curvature_weight * curv.tanh()).clamp(0.1, 2.0);
        (s * f * c).max(0.0)
    }
}

/// Alive/total snapshot after a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct Progress {
    pub alive: usize,
    pub total: usize,
}

impl Progress {
    /// Share of droplets that have finished, 1.0 for an empty pool.
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            (self.total - self.alive) as f32 / self.total as f32
        }
    }
}

/// Owns the working heightfield, the pre-erosion original and the droplet pool.
pub struct ErosionEngine {
    heightfield: Heightfield,
    original: Heightfield,
    params: ErosionParams,
    droplets: Vec<Droplet>,
    alive: usize,
    cursor: usize,
    paused: bool,
    modifier: Option<Box<dyn CapacityModifier>>,
}

impl ErosionEngine {
    pub fn new(heightfield: Heightfield, params: ErosionParams) -> Result<Self> {
        params.validate()?;
        heightfield.check_dimensions()?;
        if heightfield.data.len() != heightfield.w * heightfield.h {
            return Err(TerrainError::SizeMismatch {
                expected: heightfield.w * heightfield.h,
                actual: heightfield.data.len(),
            });
        }
        heightfield.check_finite()?;
        Ok(Self {
            original: heightfield.clone(),
            heightfield,
            params,
            droplets: Vec::new(),
            alive: 0,
            cursor: 0,
            paused: false,
            modifier: None,
        })
    }

    pub fn params(&self) -> &ErosionParams {
        &self.params
    }

    /// The heightfield as handed to `new`.
    pub fn original(&self) -> &Heightfield {
        &self.original
    }

    pub fn droplets(&self) -> &[Droplet] {
        &self.droplets
    }

    /// Refill the pool with `num_droplets` fresh droplets at random interior
    /// positions. Any previous pool is discarded.
    pub fn start<R: Rng + ?Sized>(&mut self, num_droplets: usize, rng: &mut R) -> Result<()> {
        self.params.validate()?;
        let w = self.heightfield.w;
        let h = self.heightfield.h;
        let hi_x = (w - 2) as f32;
        let hi_y = (h - 2) as f32;

        self.droplets = (0..num_droplets)
            .map(|_| {
                let x = if hi_x > 1.0 { rng.gen_range(1.0..hi_x) } else { 1.0 };
                let y = if hi_y > 1.0 { rng.gen_range(1.0..hi_y) } else { 1.0 };
                Droplet::spawn(x, y, &self.params, w, h)
            })
            .collect();
        self.alive = self.droplets.iter().filter(|d| d.alive).count();
        self.cursor = 0;
        debug!(droplets = num_droplets, alive = self.alive, "erosion started");
        Ok(())
    }

    /// Advance up to `batch_size` live droplets by one step each, resuming
    /// the round-robin where the last batch stopped. Returns whether any
    /// droplet is still alive. Steps nothing while paused.
    pub fn step_batch(&mut self, batch_size: usize) -> bool {
        if self.paused || self.droplets.is_empty() {
            return self.alive > 0;
        }
        let n = self.droplets.len();
        let mut stepped = 0;
        let mut visited = 0;
        while stepped < batch_size && visited < n && self.alive > 0 {
            let i = self.cursor;
            self.cursor = (self.cursor + 1) % n;
            visited += 1;
            if !self.droplets[i].alive {
                continue;
            }
            let mut droplet = self.droplets[i].clone();
            self.step_droplet(&mut droplet);
            if !droplet.alive {
                self.alive -= 1;
            }
            self.droplets[i] = droplet;
            stepped += 1;
        }
        self.alive > 0
    }

    /// Step batches until every droplet is dead, reporting after each batch.
    /// Returns the number of batches. A paused engine runs zero batches.
    pub fn run_to_completion<F>(&mut self, batch_size: usize, mut on_batch: F) -> usize
    where
        F: FnMut(&Progress),
    {
        let mut batches = 0;
        while !self.paused && self.alive > 0 {
            self.step_batch(batch_size.max(1));
            batches += 1;
            on_batch(&self.progress());
        }
        batches
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Replace the working heightfield wholesale. Dimensions must match;
    /// droplets are left as they are and attached aux maps are dropped.
    pub fn reset_heightfield(&mut self, new_data: Heightfield) -> Result<()> {
        if !new_data.same_shape(&self.heightfield) || new_data.data.len() != self.heightfield.data.len() {
            return Err(TerrainError::SizeMismatch {
                expected: self.heightfield.data.len(),
                actual: new_data.data.len(),
            });
        }
        new_data.check_finite()?;
        self.heightfield = new_data;
        self.modifier = None;
        Ok(())
    }

    pub fn reset_to_original(&mut self) {
        self.heightfield = self.original.clone();
        self.modifier = None;
    }

    /// Independent copy of the current state.
    pub fn clone_heightfield(&self) -> Heightfield {
        self.heightfield.clone()
    }

    pub fn alive_count(&self) -> usize {
        self.alive
    }

    pub fn pool_size(&self) -> usize {
        self.droplets.len()
    }

    pub fn progress(&self) -> Progress {
        Progress {
            alive: self.alive,
            total: self.droplets.len(),
        }
    }

    pub fn set_capacity_modifier(&mut self, modifier: Option<Box<dyn CapacityModifier>>) {
        self.modifier = modifier;
    }

    /// Recompute slope/flow/curvature from the current heightfield and use
    /// them as the capacity modifier.
    pub fn refresh_aux_maps(&mut self, world_width: f32, world_height: f32) -> Result<()> {
        let maps = AuxMaps::compute(&self.heightfield, world_width, world_height)?;
        self.modifier = Some(Box::new(AuxCapacity::new(maps, &self.params)));
        Ok(())
    }

    fn step_droplet(&mut self, d: &mut Droplet) {
        let p = &self.params;
        let hf = &mut self.heightfield;
        let (w, h) = (hf.w, hf.h);

        let h0 = hf.sample_bilinear(d.x, d.y);
        let (gx, gy) = hf.gradient(d.x, d.y);

        d.dx = d.dx * p.inertia - gx * (1.0 - p.inertia);
        d.dy = d.dy * p.inertia - gy * (1.0 - p.inertia);
        let len = (d.dx * d.dx + d.dy * d.dy).sqrt();
        if len > 0.0 {
            d.dx /= len;
            d.dy /= len;
        }

        d.x += d.dx;
        d.y += d.dy;
        if !in_interior(d.x, d.y, w, h) {
            d.alive = false;
            return;
        }

        let h1 = hf.sample_bilinear(d.x, d.y);
        let delta_h = h1 - h0;

        d.speed = (d.speed * d.speed - delta_h * p.gravity).max(0.0).sqrt() * (1.0 - p.friction);

        let mut capacity = (-delta_h).max(MIN_SLOPE) * d.speed * d.water * p.sediment_capacity_factor;
        if p.aux_capacity {
            if let Some(m) = &self.modifier {
                capacity *= m.factor(d.x, d.y);
            }
        }

        if d.sediment > capacity {
            let amount = (d.sediment - capacity) * p.deposition_rate;
            deposit(hf, d.x, d.y, amount);
            d.sediment -= amount;
        } else {
            let amount = ((capacity - d.sediment) * p.deposition_rate).min(h1).max(0.0);
            d.sediment += erode(hf, d.x, d.y, amount);
        }

        d.water *= 1.0 - p.evaporation_rate;
        d.lifetime += 1;
        if d.water < p.min_volume || d.lifetime >= p.max_lifetime || d.speed < MIN_SPEED {
            d.alive = false;
        }
    }
}

/// Add `amount` to the 4 cells around (x, y), split by bilinear weight.
pub fn deposit(hf: &mut Grid<f32>, x: f32, y: f32, amount: f32) {
    if let Some(cells) = bilinear_cells(hf.w, hf.h, x, y) {
        for (i, wgt) in cells {
            hf.data[i] += amount * wgt;
        }
    }
}

/// Remove `amount` from the 4 cells around (x, y) by bilinear weight,
/// never taking a cell below zero. Returns what was actually removed.
pub fn erode(hf: &mut Grid<f32>, x: f32, y: f32, amount: f32) -> f32 {
    let Some(cells) = bilinear_cells(hf.w, hf.h, x, y) else {
        return 0.0;
    };
    let mut removed = 0.0;
    for (i, wgt) in cells {
        let before = hf.data[i];
        let after = (before - amount * wgt).max(0.0);
        hf.data[i] = after;
        removed += (before - after).max(0.0);
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::Rng as SplitMix;

    fn slope_field(n: usize) -> Heightfield {
        let data = (0..n * n).map(|i| 2.0 * (i % n) as f32 + 5.0).collect();
        Grid::from_vec(n, n, data).unwrap()
    }

    #[test]
    fn deposit_conserves_mass() {
        let mut g = slope_field(8);
        let before = g.total();
        deposit(&mut g, 3.3, 4.8, 0.75);
        assert!((g.total() - before - 0.75).abs() < 1e-4);
    }

    #[test]
    fn erode_conserves_mass_and_clamps() {
        let mut g = slope_field(8);
        let before = g.total();
        let removed = erode(&mut g, 2.5, 2.5, 0.4);
        assert!((removed - 0.4).abs() < 1e-5);
        assert!((before - g.total() - 0.4).abs() < 1e-4);

        let mut flat = Grid::from_vec(4, 4, vec![0.1; 16]).unwrap();
        let removed = erode(&mut flat, 1.5, 1.5, 10.0);
        assert!((removed - 0.4).abs() < 1e-5);
        assert!(flat.data.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn rejects_invalid_setup() {
        let small = Grid::<f32>::new(2, 2);
        assert!(matches!(
            ErosionEngine::new(small, ErosionParams::default()),
            Err(TerrainError::InvalidDimensions { .. })
        ));
        let bad = ErosionParams { evaporation_rate: 0.0, ..Default::default() };
        assert!(ErosionEngine::new(slope_field(5), bad).is_err());

        let mut g = slope_field(5);
        g.data[7] = f32::INFINITY;
        assert_eq!(
            ErosionEngine::new(g, ErosionParams::default()).err(),
            Some(TerrainError::NonFinite { index: 7 })
        );
    }

    #[test]
    fn start_spawns_in_interior() {
        let mut e = ErosionEngine::new(slope_field(16), ErosionParams::default()).unwrap();
        e.start(200, &mut SplitMix::new(4)).unwrap();
        assert_eq!(e.pool_size(), 200);
        assert_eq!(e.alive_count(), 200);
        for d in e.droplets() {
            assert!(d.x >= 1.0 && d.x <= 14.0 && d.y >= 1.0 && d.y <= 14.0);
            assert_eq!((d.dx, d.dy), (0.0, 0.0));
            assert_eq!(d.water, 1.0);
        }
    }

    #[test]
    fn droplets_run_downhill() {
        let params = ErosionParams { max_lifetime: 3, ..Default::default() };
        let mut e = ErosionEngine::new(slope_field(32), params).unwrap();
        e.start(10, &mut SplitMix::new(1)).unwrap();
        let start: Vec<f32> = e.droplets().iter().map(|d| d.x).collect();
        e.step_batch(10);
        for (d, x0) in e.droplets().iter().zip(start) {
            if d.alive {
                assert!(d.x < x0, "droplet moved uphill");
            }
        }
    }

    #[test]
    fn batch_size_limits_steps() {
        let mut e = ErosionEngine::new(slope_field(32), ErosionParams::default()).unwrap();
        e.start(10, &mut SplitMix::new(2)).unwrap();
        e.step_batch(4);
        let stepped = e.droplets().iter().filter(|d| d.lifetime > 0 || !d.alive).count();
        assert_eq!(stepped, 4);
        // next batch picks up where the last stopped
        e.step_batch(6);
        assert!(e.droplets().iter().all(|d| d.lifetime == 1 || !d.alive));
    }

    #[test]
    fn pause_blocks_stepping() {
        let mut e = ErosionEngine::new(slope_field(16), ErosionParams::default()).unwrap();
        e.start(20, &mut SplitMix::new(3)).unwrap();
        e.pause();
        let before = e.clone_heightfield();
        let pool = e.droplets().to_vec();
        assert!(e.step_batch(20));
        assert_eq!(e.run_to_completion(20, |_| {}), 0);
        assert_eq!(e.clone_heightfield(), before);
        assert_eq!(e.droplets(), pool.as_slice());
        e.resume();
        e.step_batch(20);
        assert_ne!(e.droplets(), pool.as_slice());
    }

    #[test]
    fn empty_pool_is_finished() {
        let mut e = ErosionEngine::new(slope_field(8), ErosionParams::default()).unwrap();
        e.start(0, &mut SplitMix::new(0)).unwrap();
        assert!(!e.step_batch(10));
        assert_eq!(e.progress().fraction(), 1.0);
    }

    #[test]
    fn tiny_grid_droplets_die_on_first_move() {
        let g = Grid::from_vec(3, 3, vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 1.0, 2.0, 3.0]).unwrap();
        let mut e = ErosionEngine::new(g, ErosionParams::default()).unwrap();
        e.start(5, &mut SplitMix::new(0)).unwrap();
        // the only interior position is the centre cell
        assert_eq!(e.alive_count(), 5);
        e.step_batch(5);
        assert_eq!(e.alive_count(), 0);
    }

    #[test]
    fn reset_requires_matching_shape() {
        let mut e = ErosionEngine::new(slope_field(8), ErosionParams::default()).unwrap();
        let err = e.reset_heightfield(slope_field(9)).unwrap_err();
        assert_eq!(err, TerrainError::SizeMismatch { expected: 64, actual: 81 });
    }

    #[test]
    fn aux_modifier_only_applies_when_enabled() {
        struct Zero;
        impl CapacityModifier for Zero {
            fn factor(&self, _: f32, _: f32) -> f32 {
                0.0
            }
        }
        let run = |enabled: bool| {
            let params = ErosionParams { aux_capacity: enabled, ..Default::default() };
            let mut e = ErosionEngine::new(slope_field(24), params).unwrap();
            e.set_capacity_modifier(Some(Box::new(Zero)));
            e.start(30, &mut SplitMix::new(6)).unwrap();
            e.run_to_completion(30, |_| {});
            e.clone_heightfield()
        };
        // zero capacity: nothing is ever picked up, so nothing changes
        assert_eq!(run(true), slope_field(24));
        assert_ne!(run(false), slope_field(24));
    }

    #[test]
    fn refresh_aux_maps_builds_modifier() {
        let params = ErosionParams { aux_capacity: true, ..Default::default() };
        let mut e = ErosionEngine::new(slope_field(16), params).unwrap();
        e.refresh_aux_maps(15.0, 15.0).unwrap();
        e.start(10, &mut SplitMix::new(8)).unwrap();
        e.run_to_completion(10, |_| {});
        e.clone_heightfield().check_finite().unwrap();
    }
}
