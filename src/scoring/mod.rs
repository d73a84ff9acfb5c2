//! Similarity scoring between a live signature and the reference signature.

pub mod dtw;
pub mod rmse;
pub mod weights;

use serde::Deserialize;

use crate::config::ScoringConfig;
use crate::signal::AngleTriple;

pub use dtw::{dtw_distance, DtwScorer};
pub use rmse::{weighted_rmse, RmseScorer};
pub use weights::{ChannelWeights, WeightsHandle};

/// One scoring request. Both sequences are already normalised to [0, 1].
#[derive(Debug, Clone, Copy)]
pub struct ScoreInput<'a> {
    pub live: &'a [AngleTriple],
    pub live_weights: &'a [f32],
    pub reference: &'a [AngleTriple],
    pub reference_weights: &'a [f32],
    pub channels: ChannelWeights,
}

/// Pluggable distance/score strategy.
pub trait SimilarityScorer {
    /// `f32::INFINITY` when the inputs cannot be compared.
    fn distance(&self, input: &ScoreInput<'_>) -> f32;

    /// Distance → calibrated 0–100 score.
    fn score(&self, input: &ScoreInput<'_>) -> u8;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMethod {
    #[default]
    Rmse,
    Dtw,
}

/// Builds the configured scorer.
pub fn scorer_from_config(config: &ScoringConfig) -> Box<dyn SimilarityScorer + Send> {
    match config.method {
        ScoringMethod::Rmse => Box::new(RmseScorer::new(config.rmse_divisor)),
        ScoringMethod::Dtw => Box::new(DtwScorer::new(config.dtw_divisor, config.dtw_band_ratio)),
    }
}

/// Element-wise minimum of live and reference frame weights.
pub fn combine_weights(live: &[f32], reference: &[f32]) -> Vec<f32> {
    live.iter().zip(reference).map(|(a, b)| a.min(*b)).collect()
}

/// `round(100 * (1 - d / divisor))` clamped to [0, 100]; non-finite distance scores 0.
pub fn score_from_distance(distance: f32, divisor: f32) -> u8 {
    if !distance.is_finite() || !(divisor > 0.0) {
        return 0;
    }
    let raw = (100.0 * (1.0 - distance / divisor)).round();
    raw.clamp(0.0, 100.0) as u8
}
