use std::time::{Duration, Instant};

use crate::channels::{frame_channels, FrameChannels};
use crate::config::{LiveConfig, ReferenceConfig};
use crate::frame::Frame;
use crate::pose::{Pose, SegmentationMode, SharedPoseModel, SharedSegmenter};
use crate::reference::{Reference, ReferenceSlot};
use crate::render::{draw_hud, draw_segmentation, draw_skeleton, Canvas};
use crate::scoring::{combine_weights, ChannelWeights, ScoreInput, SimilarityScorer, WeightsHandle};
use crate::signal::{normalize, prepare_signature, AngleTriple};

use super::gate::{RateGate, SegmentationGate};
use super::ring::AngleRing;

/// ライブ窓と参照シグネチャを比較してスコアを出す
///
/// 有効フレームが1つも無ければ None。
pub fn live_score(
    angles: &[AngleTriple],
    weights: &[f32],
    reference: &Reference,
    channels: ChannelWeights,
    scorer: &dyn SimilarityScorer,
    smoothing_alpha: f32,
) -> Option<u8> {
    if !weights.iter().any(|w| *w > 0.0) {
        return None;
    }
    let sig = &reference.signature;
    let (resampled, live_weights) = prepare_signature(angles, weights, sig.len(), smoothing_alpha);
    let live = normalize(&resampled, &sig.range);
    let combined = combine_weights(&live_weights, &sig.weights);
    let input = ScoreInput {
        live: &live,
        live_weights: &combined,
        reference: &sig.sequence,
        reference_weights: &sig.weights,
        channels,
    };
    Some(scorer.score(&input))
}

/// 描画1回分の処理を行うアナライザ
pub struct LiveAnalyzer {
    pose_model: SharedPoseModel,
    segmentation: Option<(SegmentationGate, SegmentationMode)>,
    inference_gate: RateGate,
    ring: AngleRing,
    scorer: Box<dyn SimilarityScorer + Send>,
    weights: WeightsHandle,
    reference: ReferenceSlot,
    smoothing_alpha: f32,
    mirror: bool,
    last_pose: Option<Pose>,
    score: Option<u8>,
}

impl LiveAnalyzer {
    pub fn new(
        pose_model: SharedPoseModel,
        scorer: Box<dyn SimilarityScorer + Send>,
        weights: WeightsHandle,
        reference: ReferenceSlot,
        live: &LiveConfig,
        reference_config: &ReferenceConfig,
    ) -> Self {
        Self {
            pose_model,
            segmentation: None,
            inference_gate: RateGate::from_hz(live.inference_hz),
            ring: AngleRing::new(live.window_size),
            scorer,
            weights,
            reference,
            smoothing_alpha: reference_config.smoothing_alpha,
            mirror: live.mirror,
            last_pose: None,
            score: None,
        }
    }

    /// セグメンテーション表示を有効にする（mode が Off なら何もしない）
    pub fn with_segmentation(mut self, model: SharedSegmenter, mode: SegmentationMode, interval: Duration) -> Self {
        if mode.is_enabled() {
            self.segmentation = Some((SegmentationGate::new(model, interval), mode));
        }
        self
    }

    pub fn score(&self) -> Option<u8> {
        self.score
    }

    pub fn has_reference(&self) -> bool {
        self.reference.is_loaded()
    }

    pub fn ring(&self) -> &AngleRing {
        &self.ring
    }

    /// 1 tick: フレーム描画 → セグメンテーション → 推論(間引き) → スコア → 骨格/HUD
    pub fn tick(&mut self, frame: &Frame, now: Instant, canvas: &mut Canvas) -> Option<u8> {
        canvas.draw_frame(frame, self.mirror);

        if let Some((gate, mode)) = self.segmentation.as_mut() {
            if let Some(mask) = gate.update(frame, now) {
                draw_segmentation(canvas, mask, *mode, self.mirror);
            }
        }

        if self.inference_gate.allow(now) {
            self.infer(frame);
        }

        self.score = match self.reference.current() {
            Some(reference) => {
                let (angles, weights) = self.ring.ordered();
                live_score(
                    &angles,
                    &weights,
                    &reference,
                    self.weights.snapshot(),
                    self.scorer.as_ref(),
                    self.smoothing_alpha,
                )
            }
            None => None,
        };

        if let Some(pose) = &self.last_pose {
            draw_skeleton(canvas, pose, self.mirror);
        }
        draw_hud(canvas, self.score);

        self.score
    }

    /// 推論して窓に追加。失敗はログのみ
    fn infer(&mut self, frame: &Frame) {
        let result = self.pose_model.try_with(|model| model.estimate(frame));
        match result {
            Ok(Some(Ok(Some(pose)))) => {
                let channels = frame_channels(&pose.scaled(frame.width, frame.height));
                self.ring.push(channels.angles, channels.weight);
                self.last_pose = Some(pose);
            }
            Ok(Some(Ok(None))) => {
                let excluded = FrameChannels::excluded();
                self.ring.push(excluded.angles, excluded.weight);
                self.last_pose = None;
            }
            Ok(Some(Err(e))) => log::warn!("pose estimation failed: {:#}", e),
            Ok(None) => log::debug!("pose model busy, skipping inference"),
            Err(e) => log::warn!("pose model unavailable: {:#}", e),
        }
    }

    /// 停止時: 窓・スコア・マスクを破棄
    pub fn reset(&mut self) {
        self.ring.clear();
        self.inference_gate.reset();
        if let Some((gate, _)) = self.segmentation.as_mut() {
            gate.reset();
        }
        self.last_pose = None;
        self.score = None;
    }
}
