//! earshot server binary
//!
//! Loads configuration, seeds the in-memory store with a demonstration
//! document, and serves the HTTP surface until the process is terminated.

use anyhow::Context;
use earshot::{
    AudioWindow, EarshotApp, FeatureSet, FeatureSpec, MemoryFeatureStore, NdArray, Scope,
    ScriptValue, ServeConfig,
};
use std::env;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

const DEFAULT_CONFIG_PATH: &str = "earshot.yaml";

/// Main entry point for the earshot server
///
/// # Usage
/// ```bash
/// # Start with defaults (or earshot.yaml when present)
/// cargo run
///
/// # Start with a custom config
/// cargo run -- /path/to/config.yaml
/// ```
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    info!("Starting earshot");

    let config = match env::args().nth(1) {
        Some(path) => {
            info!("Loading configuration from: {}", path);
            ServeConfig::from_file(&path).with_context(|| format!("loading {}", path))?
        }
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            info!("Loading configuration from: {}", DEFAULT_CONFIG_PATH);
            ServeConfig::from_file(DEFAULT_CONFIG_PATH)
                .with_context(|| format!("loading {}", DEFAULT_CONFIG_PATH))?
        }
        None => {
            info!("No configuration file; using defaults");
            ServeConfig::default()
        }
    };

    info!("  - Listen address: {}", config.listen_address);
    info!("  - Base path: {}", config.base_path);
    info!("  - Preview store capacity: {}", config.temp_capacity);
    info!("  - Metrics enabled: {}", config.enable_metrics);

    let (store, features, scope) = demo_model()?;
    let app = EarshotApp::new(
        Arc::new(config),
        Arc::new(store),
        features,
        "loudness",
        "audio",
        scope,
    )?;

    earshot::server::run(Arc::new(app)).await?;
    Ok(())
}

/// Seed a document with synthesized features so the console has something to
/// look at out of the box
fn demo_model() -> anyhow::Result<(MemoryFeatureStore, FeatureSet, Scope)> {
    const SAMPLE_RATE: u32 = 11025;
    const SECONDS: usize = 4;
    const FRAME_PS: i64 = 250_000_000_000; // four frames per second
    const BINS: usize = 32;

    let store = MemoryFeatureStore::new();

    // A few seconds of a decaying two-tone chord.
    let samples: Vec<f32> = (0..SAMPLE_RATE as usize * SECONDS)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            let tone = (t * 220.0 * std::f32::consts::TAU).sin()
                + 0.5 * (t * 330.0 * std::f32::consts::TAU).sin();
            tone * 0.3 * (-t / 2.0).exp()
        })
        .collect();
    store.insert_audio("demo", "audio", AudioWindow::mono(samples.clone(), SAMPLE_RATE))?;

    // Per-frame RMS loudness of the same signal.
    let frame_len = samples.len() / (SECONDS * 4);
    let loudness: Vec<f64> = samples
        .chunks_exact(frame_len)
        .map(|frame| {
            let energy: f64 = frame.iter().map(|s| (*s as f64).powi(2)).sum();
            (energy / frame.len() as f64).sqrt()
        })
        .collect();
    store.insert_series("demo", "loudness", NdArray::vector(loudness), FRAME_PS);

    // A coarse synthetic spectrogram, one row per frame.
    let frames = SECONDS * 4;
    let spectrogram: Vec<f64> = (0..frames)
        .flat_map(|f| {
            (0..BINS).map(move |b| {
                let falloff = (-(b as f64) / 8.0).exp();
                let decay = (-(f as f64) / 8.0).exp();
                falloff * decay
            })
        })
        .collect();
    store.insert_series(
        "demo",
        "spectrogram",
        NdArray::matrix(frames, BINS, spectrogram)?,
        FRAME_PS,
    );

    let features: FeatureSet = [
        FeatureSpec::audio("audio"),
        FeatureSpec::series("loudness", 1),
        FeatureSpec::series("spectrogram", 2),
    ]
    .into_iter()
    .collect();

    let mut scope = Scope::new();
    scope.bind("doc", ScriptValue::Document("demo".to_string()));

    Ok((store, features, scope))
}
