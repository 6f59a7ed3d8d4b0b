use std::net::SocketAddr;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tracing::error;
use tracing_subscriber::EnvFilter;

use terrain::config::{ErosionParams, GenerationParams, PipelineParams};
use terrain::grid::GridStats;
use terrain::{AuxMaps, Heightfield, Progress, TerrainError, render};

#[derive(Debug, Error)]
enum ApiError {
    #[error(transparent)]
    Terrain(#[from] TerrainError),
    #[error("PNG encoding failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Terrain(_) => StatusCode::BAD_REQUEST,
            ApiError::Encode(e) => {
                error!("PNG encoding failed: {e}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Join(e) => {
                error!("worker task failed: {e}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Largest grid side a request may ask for, in cells.
const MAX_RESOLUTION: usize = 2048;
const MAX_DROPLETS: usize = 2_000_000;

/// Refuse requests whose grid or droplet pool would not fit a shared server.
fn check_limits(params: &PipelineParams) -> Result<(), TerrainError> {
    if params.generation.resolution > MAX_RESOLUTION {
        return Err(TerrainError::InvalidParameter {
            name: "resolution",
            reason: format!(
                "at most {MAX_RESOLUTION} allowed, got {}",
                params.generation.resolution
            ),
        });
    }
    if params.droplets > MAX_DROPLETS {
        return Err(TerrainError::InvalidParameter {
            name: "droplets",
            reason: format!("at most {MAX_DROPLETS} allowed, got {}", params.droplets),
        });
    }
    Ok(())
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct GenerateRequest {
    generation: GenerationParams,
}

#[derive(Serialize)]
struct GenerateResponse {
    layers: Vec<Layer>,
    timings: Vec<TimingEntry>,
    width: usize,
    height: usize,
    stats: GridStats,
}

#[derive(Serialize)]
struct ErodeResponse {
    layers: Vec<Layer>,
    timings: Vec<TimingEntry>,
    width: usize,
    height: usize,
    before: GridStats,
    after: GridStats,
    progress: Vec<Progress>,
}

#[derive(Serialize)]
struct Layer {
    name: String,
    data_url: String,
}

#[derive(Serialize)]
struct TimingEntry {
    name: String,
    ms: f64,
}

fn layer(name: &str, rgba: &[u8], w: usize, h: usize) -> Result<Layer, ApiError> {
    let png = render::encode_png(rgba, w, h)?;
    let b64 = base64::engine::general_purpose::STANDARD.encode(&png);
    Ok(Layer {
        name: name.into(),
        data_url: format!("data:image/png;base64,{}", b64),
    })
}

fn analysis_layers(hf: &Heightfield, aux: &AuxMaps) -> Result<Vec<Layer>, ApiError> {
    Ok(vec![
        layer("heightmap", &render::render_heightmap(hf), hf.w, hf.h)?,
        layer("slope", &render::render_slope(&aux.slope), hf.w, hf.h)?,
        layer("flow", &render::render_flow(&aux.flow), hf.w, hf.h)?,
    ])
}

fn timing_entries(timings: &[terrain::Timing]) -> Vec<TimingEntry> {
    timings
        .iter()
        .map(|t| TimingEntry {
            name: t.name.to_string(),
            ms: t.ms,
        })
        .collect()
}

async fn generate_handler(
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let params = PipelineParams {
        generation: req.generation,
        droplets: 0,
        ..Default::default()
    };
    check_limits(&params)?;
    let response = tokio::task::spawn_blocking(move || -> Result<GenerateResponse, ApiError> {
        let (terrain, timings) = terrain::run_pipeline(&params)?;
        let hf = &terrain.generated;
        Ok(GenerateResponse {
            layers: analysis_layers(hf, &terrain.aux)?,
            timings: timing_entries(&timings),
            width: hf.w,
            height: hf.h,
            stats: hf.stats(),
        })
    })
    .await??;

    Ok(Json(response))
}

#[derive(Deserialize)]
#[serde(default)]
struct ErodeRequest {
    generation: GenerationParams,
    erosion: ErosionParams,
    droplets: usize,
    batch_size: usize,
    erosion_seed: u64,
}

impl Default for ErodeRequest {
    fn default() -> Self {
        let defaults = PipelineParams::default();
        Self {
            generation: defaults.generation,
            erosion: defaults.erosion,
            droplets: defaults.droplets,
            batch_size: defaults.batch_size,
            erosion_seed: defaults.erosion_seed,
        }
    }
}

async fn erode_handler(Json(req): Json<ErodeRequest>) -> Result<Json<ErodeResponse>, ApiError> {
    let params = PipelineParams {
        generation: req.generation,
        erosion: req.erosion,
        droplets: req.droplets,
        batch_size: req.batch_size,
        erosion_seed: req.erosion_seed,
    };
    check_limits(&params)?;
    let response = tokio::task::spawn_blocking(move || -> Result<ErodeResponse, ApiError> {
        let (terrain, timings) = terrain::run_pipeline(&params)?;
        let (w, h) = (terrain.eroded.w, terrain.eroded.h);

        let mut layers = analysis_layers(&terrain.generated, &terrain.aux)?;
        layers.push(layer("eroded", &render::render_heightmap(&terrain.eroded), w, h)?);
        layers.push(layer(
            "erosion_delta",
            &render::render_delta(&terrain.generated, &terrain.eroded),
            w,
            h,
        )?);

        Ok(ErodeResponse {
            layers,
            timings: timing_entries(&timings),
            width: w,
            height: h,
            before: terrain.generated.stats(),
            after: terrain.eroded.stats(),
            progress: terrain.progress,
        })
    })
    .await??;

    Ok(Json(response))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let app = Router::new()
        .route("/api/generate", post(generate_handler))
        .route("/api/erode", post(erode_handler))
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    tracing::info!("terrain server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
