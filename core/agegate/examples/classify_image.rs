//! Classify image files and print one decision per file.
//!
//! Usage:
//!   cargo run --example classify_image --features onnx -- photo.jpg [more.png ...]
//!
//! Reads `config/agegate.toml` (optional) and `AGEGATE__*` environment
//! overrides. Both model files must exist at the configured paths.

use agegate::{AgeGate, AgeGateConfig};
use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("agegate=info".parse()?),
        )
        .init();

    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        anyhow::bail!("usage: classify_image <image> [<image> ...]");
    }

    let config = AgeGateConfig::load().context("failed to load configuration")?;
    let gate = AgeGate::from_config(&config).context("failed to initialize models")?;

    for path in &paths {
        let bytes = std::fs::read(path).with_context(|| format!("failed to read {path}"))?;
        match gate.classify(&bytes) {
            Ok(decision) => println!("{path}: {}", serde_json::to_string(&decision)?),
            Err(e) => println!("{path}: rejected ({e})"),
        }
    }
    Ok(())
}
