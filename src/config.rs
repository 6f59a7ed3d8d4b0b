use serde::{Deserialize, Serialize};

use crate::error::{Result, TerrainError};

/// Noise synthesis parameters. Missing JSON fields fall back to `Default`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParams {
    /// Side length of the square world, in world units.
    pub world_size: f32,
    /// Segments per axis; the grid is `(resolution+1)²` vertices.
    pub resolution: usize,
    pub seed: u64,
    pub octaves: u32,
    pub lacunarity: f32,
    pub gain: f32,
    pub amplitude: f32,
    pub ridge_offset: f32,
    /// World units → noise units.
    pub base_frequency: f32,
    pub domain_warp_strength: f32,
    pub domain_warp_frequency: f32,
    pub worley_points: usize,
    pub worley_seed: u64,
    /// 2 (plane) or 3 (cube, sampled on the z = 0.5 slice).
    pub worley_dimension: u8,
    /// Degrees, counter-clockwise from +x.
    pub wind_direction: f32,
    pub micro_detail: f32,
    /// Falloff width in cells.
    pub edge_margin: f32,
    pub apply_smoothing: bool,
    pub smooth_iterations: u32,
    pub smooth_factor: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            world_size: 100.0,
            resolution: 256,
            seed: 42,
            octaves: 6,
            lacunarity: 2.0,
            gain: 0.5,
            amplitude: 10.0,
            ridge_offset: 1.0,
            base_frequency: 0.02,
            domain_warp_strength: 0.5,
            domain_warp_frequency: 0.5,
            worley_points: 64,
            worley_seed: 7,
            worley_dimension: 2,
            wind_direction: 45.0,
            micro_detail: 0.05,
            edge_margin: 1.0,
            apply_smoothing: false,
            smooth_iterations: 2,
            smooth_factor: 0.5,
        }
    }
}

impl GenerationParams {
    /// Grid side length in vertices.
    pub fn grid_size(&self) -> usize {
        self.resolution + 1
    }

    /// World units between adjacent vertices.
    pub fn cell_spacing(&self) -> f32 {
        self.world_size / self.resolution as f32
    }

    pub fn validate(&self) -> Result<()> {
        if self.resolution < 2 {
            return Err(TerrainError::InvalidDimensions {
                width: self.grid_size(),
                height: self.grid_size(),
            });
        }
        positive("world_size", self.world_size)?;
        positive("base_frequency", self.base_frequency)?;
        positive("lacunarity", self.lacunarity)?;
        if self.octaves == 0 {
            return Err(TerrainError::param("octaves", "must be at least 1"));
        }
        finite("gain", self.gain)?;
        finite("amplitude", self.amplitude)?;
        finite("ridge_offset", self.ridge_offset)?;
        finite("domain_warp_strength", self.domain_warp_strength)?;
        finite("domain_warp_frequency", self.domain_warp_frequency)?;
        finite("wind_direction", self.wind_direction)?;
        finite("micro_detail", self.micro_detail)?;
        finite("edge_margin", self.edge_margin)?;
        if self.worley_points == 0 {
            return Err(TerrainError::param("worley_points", "must be at least 1"));
        }
        if !matches!(self.worley_dimension, 2 | 3) {
            return Err(TerrainError::param(
                "worley_dimension",
                format!("must be 2 or 3, got {}", self.worley_dimension),
            ));
        }
        unit_closed("smooth_factor", self.smooth_factor)?;
        Ok(())
    }
}

/// Droplet physics. Missing JSON fields fall back to `Default`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErosionParams {
    pub inertia: f32,
    pub friction: f32,
    pub sediment_capacity_factor: f32,
    pub deposition_rate: f32,
    pub evaporation_rate: f32,
    pub min_volume: f32,
    pub initial_volume: f32,
    pub initial_speed: f32,
    pub max_lifetime: u32,
    pub gravity: f32,
    /// Enables the auxiliary-map capacity modifier, when one is attached.
    pub aux_capacity: bool,
    pub slope_weight: f32,
    pub flow_weight: f32,
    pub curvature_weight: f32,
}

impl Default for ErosionParams {
    fn default() -> Self {
        Self {
            inertia: 0.05,
            friction: 0.05,
            sediment_capacity_factor: 4.0,
            deposition_rate: 0.3,
            evaporation_rate: 0.01,
            min_volume: 0.01,
            initial_volume: 1.0,
            initial_speed: 1.0,
            max_lifetime: 30,
            gravity: 9.81,
            aux_capacity: false,
            slope_weight: 0.5,
            flow_weight: 0.25,
            curvature_weight: 0.25,
        }
    }
}

impl ErosionParams {
    pub fn validate(&self) -> Result<()> {
        unit_closed("inertia", self.inertia)?;
        finite("friction", self.friction)?;
        if !(0.0..1.0).contains(&self.friction) {
            return Err(TerrainError::param("friction", "must be in [0, 1)"));
        }
        non_negative("sediment_capacity_factor", self.sediment_capacity_factor)?;
        if !(self.deposition_rate > 0.0 && self.deposition_rate <= 1.0) {
            return Err(TerrainError::param("deposition_rate", "must be in (0, 1]"));
        }
        if !(self.evaporation_rate > 0.0 && self.evaporation_rate < 1.0) {
            return Err(TerrainError::param("evaporation_rate", "must be in (0, 1)"));
        }
        non_negative("min_volume", self.min_volume)?;
        positive("initial_volume", self.initial_volume)?;
        non_negative("initial_speed", self.initial_speed)?;
        if self.max_lifetime == 0 {
            return Err(TerrainError::param("max_lifetime", "must be at least 1"));
        }
        non_negative("gravity", self.gravity)?;
        non_negative("slope_weight", self.slope_weight)?;
        non_negative("flow_weight", self.flow_weight)?;
        non_negative("curvature_weight", self.curvature_weight)?;
        Ok(())
    }
}

/// Everything one end-to-end run needs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineParams {
    pub generation: GenerationParams,
    pub erosion: ErosionParams,
    pub droplets: usize,
    pub batch_size: usize,
    pub erosion_seed: u64,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            generation: GenerationParams::default(),
            erosion: ErosionParams::default(),
            droplets: 50_000,
            batch_size: 5_000,
            erosion_seed: 1337,
        }
    }
}

impl PipelineParams {
    pub fn validate(&self) -> Result<()> {
        self.generation.validate()?;
        self.erosion.validate()?;
        if self.batch_size == 0 {
            return Err(TerrainError::param("batch_size", "must be at least 1"));
        }
        Ok(())
    }
}

fn finite(name: &'static str, v: f32) -> Result<()> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(TerrainError::param(name, format!("must be finite, got {v}")))
    }
}

fn positive(name: &'static str, v: f32) -> Result<()> {
    finite(name, v)?;
    if v > 0.0 {
        Ok(())
    } else {
        Err(TerrainError::param(name, format!("must be positive, got {v}")))
    }
}

fn non_negative(name: &'static str, v: f32) -> Result<()> {
    finite(name, v)?;
    if v >= 0.0 {
        Ok(())
    } else {
        Err(TerrainError::param(name, format!("must be non-negative, got {v}")))
    }
}

fn unit_closed(name: &'static str, v: f32) -> Result<()> {
    finite(name, v)?;
    if (0.0..=1.0).contains(&v) {
        Ok(())
    } else {
        Err(TerrainError::param(name, format!("must be in [0, 1], got {v}")))
    }
}
