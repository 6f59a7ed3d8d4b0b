use terrain::config::{ErosionParams, GenerationParams, PipelineParams};
use terrain::rng::Rng;
use terrain::{ErosionEngine, Grid, Heightfield, generate, run_pipeline};

const BOWL: usize = 64;
const CENTER: f32 = 32.0;

fn bowl() -> Heightfield {
    let mut data = Vec::with_capacity(BOWL * BOWL);
    for y in 0..BOWL {
        for x in 0..BOWL {
            let dx = x as f32 - CENTER;
            let dy = y as f32 - CENTER;
            data.push((dx * dx + dy * dy).sqrt());
        }
    }
    Grid::from_vec(BOWL, BOWL, data).unwrap()
}

fn mean_distance(engine: &ErosionEngine) -> f32 {
    let alive: Vec<_> = engine.droplets().iter().filter(|d| d.alive).collect();
    let sum: f32 = alive
        .iter()
        .map(|d| ((d.x - CENTER).powi(2) + (d.y - CENTER).powi(2)).sqrt())
        .sum();
    sum / alive.len() as f32
}

#[test]
fn generation_is_reproducible() {
    let params = GenerationParams {
        resolution: 48,
        seed: 9,
        ..Default::default()
    };
    let a = generate(&params).unwrap();
    let b = generate(&params).unwrap();
    assert_eq!(a.w, 49);
    assert_eq!(a.h, 49);
    assert!(a.data.iter().zip(&b.data).all(|(x, y)| x.to_bits() == y.to_bits()));
}

#[test]
fn flat_five_by_five_is_quiet() {
    let params = GenerationParams {
        resolution: 4,
        amplitude: 0.0,
        octaves: 1,
        ..Default::default()
    };
    let hf = generate(&params).unwrap();
    assert_eq!((hf.w, hf.h), (5, 5));
    for v in &hf.data {
        assert!(v.is_finite());
        assert!(v.abs() < 1e-3, "value {v}");
    }
}

#[test]
fn droplets_run_into_the_bowl() {
    let original = bowl();
    let mut engine = ErosionEngine::new(original.clone(), ErosionParams::default()).unwrap();
    engine.start(100, &mut Rng::new(5)).unwrap();

    let before = mean_distance(&engine);
    engine.step_batch(100);
    let after = mean_distance(&engine);
    assert!(after < before, "mean distance {before} -> {after}");

    let mut batches = 1;
    while engine.step_batch(100) {
        batches += 1;
        assert!(batches < 1_000, "erosion did not settle");
    }

    let eroded = engine.clone_heightfield();
    let (mut pit, mut rim) = (0.0f64, 0.0f64);
    for y in 0..BOWL {
        for x in 0..BOWL {
            let i = eroded.idx(x, y);
            let change = (eroded.data[i] - original.data[i]) as f64;
            let dx = x as f32 - CENTER;
            let dy = y as f32 - CENTER;
            if dx * dx + dy * dy <= 16.0 {
                pit += change;
            } else {
                rim += change;
            }
        }
    }
    assert!(pit > 0.0, "no net deposition near the centre: {pit}");
    assert!(rim < 0.0, "slopes were not eroded: {rim}");
    assert!(eroded.total() < original.total());
    assert!(eroded.data.iter().all(|v| *v >= 0.0 && v.is_finite()));
}

#[test]
fn every_droplet_dies_within_its_lifetime() {
    let params = ErosionParams::default();
    let max_lifetime = params.max_lifetime as usize;
    let mut engine = ErosionEngine::new(bowl(), params).unwrap();
    engine.start(250, &mut Rng::new(11)).unwrap();
    for _ in 0..max_lifetime {
        engine.step_batch(250);
    }
    assert_eq!(engine.alive_count(), 0);
    assert!(engine.droplets().iter().all(|d| d.lifetime as usize <= max_lifetime));
}

#[test]
fn reset_restores_the_original() {
    let original = bowl();
    let mut engine = ErosionEngine::new(original.clone(), ErosionParams::default()).unwrap();
    engine.start(200, &mut Rng::new(3)).unwrap();
    engine.run_to_completion(50, |_| {});
    assert_ne!(engine.clone_heightfield(), original);

    engine.reset_heightfield(original.clone()).unwrap();
    assert_eq!(engine.clone_heightfield(), original);
}

#[test]
fn reset_rejects_other_dimensions() {
    let mut engine = ErosionEngine::new(bowl(), ErosionParams::default()).unwrap();
    assert!(engine.reset_heightfield(Grid::new(8, 8)).is_err());
}

#[test]
fn pipeline_smoke() {
    let params = PipelineParams {
        generation: GenerationParams {
            resolution: 32,
            ..Default::default()
        },
        droplets: 400,
        batch_size: 100,
        ..Default::default()
    };
    let (terrain, timings) = run_pipeline(&params).unwrap();

    assert_eq!(terrain.eroded.w, 33);
    assert!(terrain.generated.same_shape(&terrain.eroded));
    assert!(terrain.aux.flow.same_shape(&terrain.generated));
    assert!(terrain.eroded.data.iter().all(|v| v.is_finite()));

    let last = terrain.progress.last().unwrap();
    assert_eq!(last.alive, 0);
    assert_eq!(last.total, 400);

    let names: Vec<_> = timings.iter().map(|t| t.name).collect();
    assert_eq!(names, ["generate", "analysis", "erosion", "TOTAL"]);
}

#[test]
fn pipeline_without_droplets_leaves_terrain_untouched() {
    let params = PipelineParams {
        generation: GenerationParams {
            resolution: 16,
            ..Default::default()
        },
        droplets: 0,
        ..Default::default()
    };
    let (terrain, _) = run_pipeline(&params).unwrap();
    assert_eq!(terrain.generated, terrain.eroded);
    assert!(terrain.progress.is_empty());
}

#[test]
fn pipeline_rejects_bad_params() {
    let params = PipelineParams {
        generation: GenerationParams {
            resolution: 0,
            ..Default::default()
        },
        ..Default::default()
    };
    assert!(run_pipeline(&params).is_err());
}
