//! エクササイズ分類と外部検索による自動マッチ

pub mod classifier;
pub mod http;
pub mod matcher;

pub use classifier::{classify, dominant_joint, Classification, MovementPattern};
pub use http::HttpExerciseSearch;
pub use matcher::{
    jaccard, joint_from_tag, ExerciseMatcher, ExerciseRecord, ExerciseSearch, JointsField, MatchPolicy,
    MatchSuggestion,
};

use anyhow::Result;

use crate::config::MatcherConfig;

/// 設定から HTTP マッチャーを作る。URL 未設定か `Off` なら None
pub fn matcher_from_config(config: &MatcherConfig) -> Result<Option<ExerciseMatcher>> {
    if config.policy == MatchPolicy::Off {
        return Ok(None);
    }
    let Some(base_url) = config.base_url.as_deref() else {
        return Ok(None);
    };
    let search = HttpExerciseSearch::new(base_url, config.token.clone())?;
    log::info!("exercise search enabled: {} ({:?})", base_url, config.policy);
    Ok(Some(ExerciseMatcher::new(Box::new(search), config)))
}
