use super::{combine_weights, score_from_distance, ChannelWeights, ScoreInput, SimilarityScorer};
use crate::signal::{AngleTriple, Channel};

/// Weighted RMSE per channel, combined with the channel weights.
///
/// Frames with weight <= 0 are dropped from both the error sum and the
/// weight sum. Length mismatch, empty input or all-zero weights yield
/// `f32::INFINITY`.
pub fn weighted_rmse(
    a: &[AngleTriple],
    b: &[AngleTriple],
    weights: &[f32],
    channels: ChannelWeights,
) -> f32 {
    if a.is_empty() || a.len() != b.len() || weights.len() != a.len() {
        return f32::INFINITY;
    }

    let mut err = [0.0f64; Channel::COUNT];
    let mut weight_sum = 0.0f64;
    for ((fa, fb), &w) in a.iter().zip(b).zip(weights) {
        if !(w > 0.0) {
            continue;
        }
        let w = w as f64;
        weight_sum += w;
        for c in 0..Channel::COUNT {
            let d = (fa[c] - fb[c]) as f64;
            err[c] += w * d * d;
        }
    }
    if weight_sum <= 0.0 {
        return f32::INFINITY;
    }

    let cw = channels.as_array();
    let mut total = 0.0f64;
    for c in 0..Channel::COUNT {
        let rmse = (err[c] / weight_sum).sqrt();
        // 重み0のチャンネルは寄与0（NaNにしない）
        if cw[c] > 0.0 {
            total += cw[c] as f64 * rmse;
        }
    }
    total as f32
}

#[derive(Debug, Clone, Copy)]
pub struct RmseScorer {
    divisor: f32,
}

impl RmseScorer {
    pub const DEFAULT_DIVISOR: f32 = 0.5;

    pub fn new(divisor: f32) -> Self {
        Self { divisor }
    }
}

impl Default for RmseScorer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIVISOR)
    }
}

impl SimilarityScorer for RmseScorer {
    fn distance(&self, input: &ScoreInput<'_>) -> f32 {
        if input.live_weights.len() != input.reference_weights.len() {
            return f32::INFINITY;
        }
        let weights = combine_weights(input.live_weights, input.reference_weights);
        weighted_rmse(input.live, input.reference, &weights, input.channels)
    }

    fn score(&self, input: &ScoreInput<'_>) -> u8 {
        score_from_distance(self.distance(input), self.divisor)
    }

    fn name(&self) -> &'static str {
        "rmse"
    }
}
