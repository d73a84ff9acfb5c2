use anyhow::{Context, Result};
use std::path::Path;

use pose_accuracy::camera::OpenCvVideoDecoder;
use pose_accuracy::config::Config;
use pose_accuracy::error::BuildError;
use pose_accuracy::reference::BuildOutcome;
use pose_accuracy::{logging, Engine};

const CONFIG_PATH: &str = "pose_accuracy.toml";

/// 参照動画を解析して ReferenceMeta を JSON で出力
fn main() -> Result<()> {
    logging::init("build_reference")?;
    log::info!("Build Reference ({})", env!("GIT_VERSION"));

    let path = std::env::args()
        .nth(1)
        .context("usage: build_reference <reference video>")?;
    let config = Config::load_or_default(CONFIG_PATH);
    let engine = Engine::from_config(config)?;

    let decoder = OpenCvVideoDecoder::open(&path).map_err(|e| BuildError::Decode(format!("{:#}", e)))?;
    let file_name = Path::new(&path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.clone());

    match engine.load_reference(decoder, &file_name)? {
        BuildOutcome::Built(reference) => {
            println!("{}", serde_json::to_string_pretty(&reference.meta)?);
            Ok(())
        }
        BuildOutcome::Cancelled => anyhow::bail!("reference build cancelled"),
    }
}
