use anyhow::{Context, Result};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pose_accuracy::camera::{OpenCvCameraProvider, OpenCvVideoDecoder};
use pose_accuracy::config::Config;
use pose_accuracy::error::BuildError;
use pose_accuracy::live::{LiveState, SessionOptions, SinkFactory};
use pose_accuracy::reference::{BuildOutcome, BuildState};
use pose_accuracy::render::{FrameSink, MinifbRenderer};
use pose_accuracy::{logging, Engine};

const CONFIG_PATH: &str = "pose_accuracy.toml";
const WINDOW_WIDTH: usize = 1280;
const WINDOW_HEIGHT: usize = 720;
/// カメラ起動（リトライ込み）の待ち時間上限
const START_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn main() -> Result<()> {
    logging::init("pose-accuracy")?;
    log::info!("Pose Accuracy ({})", env!("GIT_VERSION"));

    let reference_path = std::env::args()
        .nth(1)
        .context("usage: pose-accuracy <reference video>")?;

    let config = Config::load_or_default(CONFIG_PATH);
    log::info!(
        "scoring: {:?}, inference {} Hz, window {} frames",
        config.scoring.method,
        config.live.inference_hz,
        config.live.window_size
    );
    let engine = Engine::from_config(config)?;

    // Ctrl-C / SIGTERM → 停止
    let interrupted = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&interrupted))?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&interrupted))?;

    if !build_reference(&engine, &reference_path, &interrupted)? {
        return Ok(());
    }

    run_live(&engine, &interrupted)
}

/// 参照動画を構築。キャンセルされたら false
fn build_reference(engine: &Engine, path: &str, interrupted: &AtomicBool) -> Result<bool> {
    let decoder = OpenCvVideoDecoder::open(path).map_err(|e| BuildError::Decode(format!("{:#}", e)))?;
    let file_name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string());

    let job = engine.spawn_reference(decoder, file_name);
    let mut last_state = BuildState::Idle;
    while !job.is_finished() {
        if interrupted.load(Ordering::Relaxed) {
            job.cancel();
        }
        let state = job.status();
        if state != last_state {
            if let BuildState::Decoding { progress } = state {
                eprint!("\rreference: {:3}%", progress);
            }
            last_state = state;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    eprintln!();

    match job.join()? {
        BuildOutcome::Built(reference) => {
            let meta = &reference.meta;
            log::info!(
                "reference ready: {} (knee {:.0}°, hip {:.0}°, trunk {:.0}°, {} reps)",
                meta.class_name,
                meta.knee_rom,
                meta.hip_rom,
                meta.trunk_rom,
                meta.peak_count
            );
            for cue in &meta.cues {
                log::info!("  cue: {}", cue);
            }
            Ok(true)
        }
        BuildOutcome::Cancelled => {
            log::info!("reference build cancelled");
            Ok(false)
        }
    }
}

fn run_live(engine: &Engine, interrupted: &AtomicBool) -> Result<()> {
    let live = &engine.config().live;
    let provider = Box::new(OpenCvCameraProvider {
        index: live.camera_index,
    });

    let target_fps = live.fallback_fps as usize;
    let sink_factory: SinkFactory = Box::new(move || {
        let mut renderer = MinifbRenderer::new("Pose Accuracy", WINDOW_WIDTH, WINDOW_HEIGHT)?;
        renderer.set_target_fps(target_fps);
        Ok(Box::new(renderer) as Box<dyn FrameSink>)
    });

    let mut options = SessionOptions::from_config(live);
    options.canvas_size = Some((WINDOW_WIDTH, WINDOW_HEIGHT));

    let mut session = engine.start_live_with(provider, sink_factory, options);
    session.wait_started(START_TIMEOUT)?;
    log::info!("live session running (Esc or Ctrl-C to quit)");

    let mut last_score = None;
    while !session.is_finished() {
        if interrupted.load(Ordering::Relaxed) {
            log::info!("interrupted, stopping live session");
            session.stop();
            break;
        }
        let score = session.status().score();
        if score != last_score {
            log::debug!("score: {:?}", score);
            last_score = score;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    session.join();

    match engine.live_status().state() {
        LiveState::Failed(reason) => anyhow::bail!("live session failed: {}", reason),
        _ => Ok(()),
    }
}
