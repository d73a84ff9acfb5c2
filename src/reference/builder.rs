use std::time::Duration;

use crate::camera::VideoDecoder;
use crate::channels::{frame_channels, FrameChannels};
use crate::config::ReferenceConfig;
use crate::error::BuildError;
use crate::frame::Frame;
use crate::pose::{SegmentationMode, SharedPoseModel, SharedSegmenter};
use crate::signal::{normalize, prepare_signature, AngleRange, AngleTriple};

use super::meta::ReferenceMeta;
use super::state::{BuildState, BuildStatus, CancelToken};

/// マスク値がこれ未満の画素は背景として消す
const MASK_THRESHOLD: f32 = 0.5;

/// 比較用に正規化済みの参照シグネチャ
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceSignature {
    pub sequence: Vec<AngleTriple>,
    pub weights: Vec<f32>,
    pub range: AngleRange,
}

impl ReferenceSignature {
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }
}

/// 構築済みの参照（コミット後は不変）
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub signature: ReferenceSignature,
    pub meta: ReferenceMeta,
}

#[derive(Debug)]
pub enum BuildOutcome {
    Built(Reference),
    Cancelled,
}

/// 参照動画 → 参照シグネチャ
pub struct ReferenceBuilder {
    pose_model: SharedPoseModel,
    segmenter: Option<SharedSegmenter>,
    config: ReferenceConfig,
}

impl ReferenceBuilder {
    pub fn new(pose_model: SharedPoseModel, config: ReferenceConfig) -> Self {
        Self {
            pose_model,
            segmenter: None,
            config,
        }
    }

    pub fn with_segmenter(mut self, segmenter: SharedSegmenter) -> Self {
        self.segmenter = Some(segmenter);
        self
    }

    /// サンプリング時刻の列 (0, 1/fps, 2/fps, ... < duration)
    pub fn sample_times(&self, duration: Duration) -> Vec<Duration> {
        let fps = if self.config.sample_fps > 0.0 { self.config.sample_fps } else { 15.0 };
        let interval = 1.0 / fps as f64;
        let total = duration.as_secs_f64();
        let count = ((total / interval).ceil() as usize).max(1);
        (0..count)
            .map(|i| Duration::from_secs_f64(i as f64 * interval))
            .collect()
    }

    /// 動画を構築する。decoder はどの経路で戻っても drop される
    ///
    /// キャンセル時は `Ok(BuildOutcome::Cancelled)`。
    pub fn build<D: VideoDecoder>(
        &self,
        decoder: D,
        file_name: &str,
        mode: SegmentationMode,
        cancel: &CancelToken,
        status: &BuildStatus,
    ) -> Result<BuildOutcome, BuildError> {
        let result = self.decode(decoder, file_name, mode, cancel, status);
        if let Ok(BuildOutcome::Built(_)) = &result {
            status.set(BuildState::Built);
        }
        result
    }

    /// `build` と同じだが `Built` は呼び出し側がコミット後に立てる
    pub(crate) fn decode<D: VideoDecoder>(
        &self,
        decoder: D,
        file_name: &str,
        mode: SegmentationMode,
        cancel: &CancelToken,
        status: &BuildStatus,
    ) -> Result<BuildOutcome, BuildError> {
        status.begin();
        let result = self.run(decoder, file_name, mode, cancel, status);
        match &result {
            Ok(BuildOutcome::Built(_)) => {}
            Ok(BuildOutcome::Cancelled) => status.set(BuildState::Cancelled),
            Err(e) => status.set(BuildState::Failed(e.to_string())),
        }
        result
    }

    fn run<D: VideoDecoder>(
        &self,
        mut decoder: D,
        file_name: &str,
        mode: SegmentationMode,
        cancel: &CancelToken,
        status: &BuildStatus,
    ) -> Result<BuildOutcome, BuildError> {
        let duration = decoder.duration();
        if duration.is_zero() {
            return Err(BuildError::Decode(format!("{} has zero duration", file_name)));
        }

        let times = self.sample_times(duration);
        let total = times.len();
        log::info!("building reference {} from {} samples", file_name, total);

        let mut angles = Vec::with_capacity(total);
        let mut weights = Vec::with_capacity(total);

        for (i, t) in times.into_iter().enumerate() {
            if cancel.is_cancelled() {
                log::info!("reference build of {} cancelled at sample {}/{}", file_name, i, total);
                return Ok(BuildOutcome::Cancelled);
            }

            let channels = match decoder.frame_at(t) {
                Ok(frame) => self.analyze(&frame, mode)?,
                Err(e) => {
                    log::warn!("decode failed at {:?}: {:#}", t, e);
                    FrameChannels::excluded()
                }
            };
            angles.push(channels.angles);
            weights.push(channels.weight);

            status.progress((((i + 1) * 100) / total) as u8);
        }
        drop(decoder);

        let usable = weights.iter().filter(|w| **w > 0.0).count();
        if usable == 0 {
            return Err(BuildError::NoUsableFrames);
        }
        log::info!("reference {}: {}/{} usable frames", file_name, usable, total);

        let (resampled, resampled_weights) = prepare_signature(
            &angles,
            &weights,
            self.config.length,
            self.config.smoothing_alpha,
        );
        let range = AngleRange::from_sequence(&resampled, self.config.range_padding);
        let meta = ReferenceMeta::from_sequence(file_name, &resampled);

        Ok(BuildOutcome::Built(Reference {
            signature: ReferenceSignature {
                sequence: normalize(&resampled, &range),
                weights: resampled_weights,
                range,
            },
            meta,
        }))
    }

    /// 1フレーム分: マスク → 姿勢推定 → チャンネル
    ///
    /// 推論失敗は除外フレーム扱い。モデル自体が使えない場合のみエラー。
    fn analyze(&self, frame: &Frame, mode: SegmentationMode) -> Result<FrameChannels, BuildError> {
        let masked;
        let input = match (&self.segmenter, mode.is_enabled()) {
            (Some(segmenter), true) => match segmenter.with(|s| s.segment(frame)) {
                Ok(Ok(Some(mask))) => {
                    masked = frame.masked(&mask, MASK_THRESHOLD);
                    &masked
                }
                Ok(Ok(None)) => frame,
                Ok(Err(e)) => {
                    log::warn!("segmentation failed, using unmasked frame: {:#}", e);
                    frame
                }
                Err(e) => return Err(BuildError::Model(format!("{:#}", e))),
            },
            _ => frame,
        };

        let estimate = self
            .pose_model
            .with(|model| model.estimate(input))
            .map_err(|e| BuildError::Model(format!("{:#}", e)))?;

        Ok(match estimate {
            Ok(Some(pose)) => frame_channels(&pose.scaled(frame.width, frame.height)),
            Ok(None) => FrameChannels::excluded(),
            Err(e) => {
                log::warn!("pose estimation failed: {:#}", e);
                FrameChannels::excluded()
            }
        })
    }
}
