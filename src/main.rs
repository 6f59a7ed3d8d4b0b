use std::path::PathBuf;

use anyhow::Context;
use terrain::config::PipelineParams;
use terrain::render;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut params = match args.get(5) {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
            serde_json::from_str::<PipelineParams>(&text).with_context(|| format!("parsing {path}"))?
        }
        None => PipelineParams::default(),
    };
    if let Some(seed) = args.get(1).and_then(|s| s.parse().ok()) {
        params.generation.seed = seed;
    }
    if let Some(resolution) = args.get(2).and_then(|s| s.parse().ok()) {
        params.generation.resolution = resolution;
    }
    if let Some(droplets) = args.get(3).and_then(|s| s.parse().ok()) {
        params.droplets = droplets;
    }
    let out_dir: PathBuf = args
        .get(4)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("artifacts"));

    std::fs::create_dir_all(&out_dir).context("failed to create output directory")?;

    tracing::info!(
        seed = params.generation.seed,
        resolution = params.generation.resolution,
        droplets = params.droplets,
        "generating terrain"
    );

    let (terrain, timings) = terrain::run_pipeline(&params)?;

    tracing::info!("Timings:");
    for t in &timings {
        tracing::info!("  {:20} {:8.1} ms", t.name, t.ms);
    }

    let w = terrain.generated.w;
    let h = terrain.generated.h;
    let save = |name: &str, rgba: &[u8]| -> anyhow::Result<()> {
        let path = out_dir.join(name);
        image::save_buffer(&path, rgba, w as u32, h as u32, image::ColorType::Rgba8)
            .with_context(|| format!("saving {}", path.display()))?;
        tracing::info!("Saved {}", path.display());
        Ok(())
    };

    save("heightmap.png", &render::render_heightmap(&terrain.generated))?;
    save("slope.png", &render::render_slope(&terrain.aux.slope))?;
    save("flow.png", &render::render_flow(&terrain.aux.flow))?;
    save("eroded.png", &render::render_heightmap(&terrain.eroded))?;
    save(
        "erosion_delta.png",
        &render::render_delta(&terrain.generated, &terrain.eroded),
    )?;

    let before = terrain.generated.stats();
    let after = terrain.eroded.stats();
    tracing::info!(?before, ?after, "height stats");

    Ok(())
}
