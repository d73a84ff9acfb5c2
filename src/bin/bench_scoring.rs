use anyhow::Result;
use std::time::Instant;

use pose_accuracy::config::ScoringConfig;
use pose_accuracy::scoring::{ChannelWeights, DtwScorer, RmseScorer, ScoreInput, SimilarityScorer};
use pose_accuracy::signal::AngleTriple;

const LENGTH: usize = 100;
const ITERATIONS: u32 = 1000;

/// 正規化済みの屈伸カーブ。phase でずらしたライブ側を作る
fn signature(phase: f32) -> Vec<AngleTriple> {
    (0..LENGTH)
        .map(|i| {
            let t = i as f32 / LENGTH as f32 * std::f32::consts::TAU + phase;
            let knee = 0.5 + 0.5 * t.cos();
            [knee, 0.5 + 0.3 * t.cos(), 0.2 + 0.1 * t.sin()]
        })
        .collect()
}

fn bench(scorer: &dyn SimilarityScorer, input: &ScoreInput<'_>) {
    let mut score = 0;
    let start = Instant::now();
    for _ in 0..ITERATIONS {
        score = scorer.score(input);
    }
    let elapsed = start.elapsed();
    let avg_us = elapsed.as_micros() as f64 / ITERATIONS as f64;
    println!("{:>5}: {:8.1}us/score  (score = {})", scorer.name(), avg_us, score);
}

fn main() -> Result<()> {
    let config = ScoringConfig::default();
    let reference = signature(0.0);
    let live = signature(0.4);
    let weights = vec![1.0f32; LENGTH];
    let input = ScoreInput {
        live: &live,
        live_weights: &weights,
        reference: &reference,
        reference_weights: &weights,
        channels: ChannelWeights::EQUAL,
    };

    println!("{} x 3 signatures, {} iterations", LENGTH, ITERATIONS);
    bench(&RmseScorer::new(config.rmse_divisor), &input);
    bench(&DtwScorer::new(config.dtw_divisor, config.dtw_band_ratio), &input);
    Ok(())
}
