pub mod analysis;
pub mod cellular;
pub mod config;
pub mod erosion;
pub mod error;
pub mod generator;
pub mod grid;
pub mod noise;
pub mod render;
pub mod rng;

use std::time::Instant;

use tracing::info;

pub use analysis::AuxMaps;
pub use config::{ErosionParams, GenerationParams, PipelineParams};
pub use erosion::{ErosionEngine, Progress};
pub use error::{Result, TerrainError};
pub use generator::generate;
pub use grid::{Grid, Heightfield};

pub struct Terrain {
    /// Generator output, before erosion.
    pub generated: Heightfield,
    /// Aux maps of `generated`.
    pub aux: AuxMaps,
    pub eroded: Heightfield,
    /// Alive counts after each erosion batch.
    pub progress: Vec<Progress>,
}

pub struct Timing {
    pub name: &'static str,
    pub ms: f64,
}

/// Generate, analyse, then erode. Erosion is skipped when `droplets` is 0.
pub fn run_pipeline(params: &PipelineParams) -> Result<(Terrain, Vec<Timing>)> {
    params.validate()?;
    let mut timings = Vec::new();
    let total_start = Instant::now();
    let world = params.generation.world_size;

    // 1. Heightfield
    let t = Instant::now();
    let generated = generator::generate(&params.generation)?;
    timings.push(Timing {
        name: "generate",
        ms: t.elapsed().as_secs_f64() * 1000.0,
    });

    // 2. Aux maps
    let t = Instant::now();
    let aux = AuxMaps::compute(&generated, world, world)?;
    timings.push(Timing {
        name: "analysis",
        ms: t.elapsed().as_secs_f64() * 1000.0,
    });

    // 3. Erosion
    let t = Instant::now();
    let mut engine = ErosionEngine::new(generated.clone(), params.erosion.clone())?;
    if params.erosion.aux_capacity {
        engine.set_capacity_modifier(Some(Box::new(erosion::AuxCapacity::new(
            aux.clone(),
            &params.erosion,
        ))));
    }
    engine.start(params.droplets, &mut rng::Rng::new(params.erosion_seed))?;
    let mut progress = Vec::new();
    let batches = engine.run_to_completion(params.batch_size, |p| progress.push(*p));
    timings.push(Timing {
        name: "erosion",
        ms: t.elapsed().as_secs_f64() * 1000.0,
    });

    let total_ms = total_start.elapsed().as_secs_f64() * 1000.0;
    timings.push(Timing {
        name: "TOTAL",
        ms: total_ms,
    });
    info!(
        size = generated.w,
        droplets = params.droplets,
        batches,
        total_ms,
        "pipeline finished"
    );

    let terrain = Terrain {
        generated,
        aux,
        eroded: engine.clone_heightfield(),
        progress,
    };

    Ok((terrain, timings))
}
