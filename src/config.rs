use anyhow::Result;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::classify::MatchPolicy;
use crate::pose::SegmentationMode;
use crate::scoring::ScoringMethod;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub live: LiveConfig,
    #[serde(default)]
    pub reference: ReferenceConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// 姿勢推定モデル (MoveNet ONNX)
    #[serde(default = "default_pose_model")]
    pub pose_model: String,
    /// 人物セグメンテーションモデル (ONNX)
    #[serde(default = "default_segmentation_model")]
    pub segmentation_model: String,
    /// セグメンテーションモデルの入力サイズ
    #[serde(default = "default_segmentation_input")]
    pub segmentation_input: u32,
}

fn default_pose_model() -> String { "models/movenet_lightning.onnx".to_string() }
fn default_segmentation_model() -> String { "models/selfie_segmentation.onnx".to_string() }
fn default_segmentation_input() -> u32 { 256 }

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            pose_model: default_pose_model(),
            segmentation_model: default_segmentation_model(),
            segmentation_input: default_segmentation_input(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LiveConfig {
    #[serde(default)]
    pub camera_index: i32,
    /// リングバッファのフレーム数
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// 推論レート上限 (Hz)。描画レートとは独立
    #[serde(default = "default_inference_hz")]
    pub inference_hz: f32,
    /// セグメンテーションの最小実行間隔 (ms)
    #[serde(default = "default_segmentation_interval_ms")]
    pub segmentation_interval_ms: u64,
    /// 表示側がペーシングしない場合のフォールバックFPS
    #[serde(default = "default_fallback_fps")]
    pub fallback_fps: u32,
    /// カメラ取得の試行回数
    #[serde(default = "default_camera_attempts")]
    pub camera_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// セルフィーカメラ用の左右反転表示
    #[serde(default = "default_true")]
    pub mirror: bool,
    #[serde(default)]
    pub segmentation: SegmentationMode,
}

fn default_window_size() -> usize { 60 }
fn default_inference_hz() -> f32 { 20.0 }
fn default_segmentation_interval_ms() -> u64 { 80 }
fn default_fallback_fps() -> u32 { 60 }
fn default_camera_attempts() -> u32 { 4 }
fn default_retry_backoff_ms() -> u64 { 250 }
fn default_true() -> bool { true }

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            camera_index: 0,
            window_size: default_window_size(),
            inference_hz: default_inference_hz(),
            segmentation_interval_ms: default_segmentation_interval_ms(),
            fallback_fps: default_fallback_fps(),
            camera_attempts: default_camera_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            mirror: true,
            segmentation: SegmentationMode::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReferenceConfig {
    /// 参照動画のサンプリングレート (1/15秒間隔)
    #[serde(default = "default_sample_fps")]
    pub sample_fps: f32,
    /// リサンプル後のシグネチャ長
    #[serde(default = "default_reference_length")]
    pub length: usize,
    #[serde(default = "default_smoothing_alpha")]
    pub smoothing_alpha: f32,
    /// 観測レンジの片側パディング比率
    #[serde(default = "default_range_padding")]
    pub range_padding: f32,
    /// 進捗通知の最小ステップ (%)
    #[serde(default = "default_progress_step")]
    pub progress_step: u8,
    #[serde(default)]
    pub segmentation: SegmentationMode,
}

fn default_sample_fps() -> f32 { 15.0 }
fn default_reference_length() -> usize { 100 }
fn default_smoothing_alpha() -> f32 { 0.3 }
fn default_range_padding() -> f32 { 0.05 }
fn default_progress_step() -> u8 { 5 }

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            sample_fps: default_sample_fps(),
            length: default_reference_length(),
            smoothing_alpha: default_smoothing_alpha(),
            range_padding: default_range_padding(),
            progress_step: default_progress_step(),
            segmentation: SegmentationMode::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScoringConfig {
    #[serde(default)]
    pub method: ScoringMethod,
    /// RMSE → スコア変換の経験的スケール
    #[serde(default = "default_rmse_divisor")]
    pub rmse_divisor: f32,
    /// DTW → スコア変換の経験的スケール
    #[serde(default = "default_dtw_divisor")]
    pub dtw_divisor: f32,
    #[serde(default = "default_dtw_band_ratio")]
    pub dtw_band_ratio: f32,
    /// フォーカス関節の重み倍率
    #[serde(default = "default_focus_boost")]
    pub focus_boost: f32,
}

fn default_rmse_divisor() -> f32 { 0.5 }
fn default_dtw_divisor() -> f32 { 0.7 }
fn default_dtw_band_ratio() -> f32 { 0.12 }
fn default_focus_boost() -> f32 { 2.0 }

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            method: ScoringMethod::default(),
            rmse_divisor: default_rmse_divisor(),
            dtw_divisor: default_dtw_divisor(),
            dtw_band_ratio: default_dtw_band_ratio(),
            focus_boost: default_focus_boost(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MatcherConfig {
    #[serde(default)]
    pub policy: MatchPolicy,
    /// エクササイズ検索APIのベースURL。未設定なら検索しない
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,
    #[serde(default = "default_name_boost")]
    pub name_boost: f32,
}

fn default_min_similarity() -> f32 { 0.25 }
fn default_name_boost() -> f32 { 0.2 }

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            policy: MatchPolicy::default(),
            base_url: None,
            token: None,
            min_similarity: default_min_similarity(),
            name_boost: default_name_boost(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// 読み込みに失敗した場合はデフォルト設定を使う
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("config {} not loaded ({e:#}), using defaults", path.display());
                Self::default()
            }
        }
    }
}
