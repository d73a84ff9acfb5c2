//! キーポイント → 角度チャンネル変換

use crate::geometry::{angle, chain_confidence, select_side, trunk_flexion, Side, MIN_CHAIN_CONFIDENCE};
use crate::pose::{KeypointIndex, NamedKeypoint, Pose};
use crate::signal::AngleTriple;

/// 1フレーム分のチャンネル値
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameChannels {
    /// [膝, 股関節, 体幹] (度)
    pub angles: AngleTriple,
    /// 0 はスコア計算から除外
    pub weight: f32,
    pub side: Side,
}

impl FrameChannels {
    /// 検出なしフレーム
    pub fn excluded() -> Self {
        Self {
            angles: [0.0; 3],
            weight: 0.0,
            side: Side::Left,
        }
    }

    pub fn is_usable(&self) -> bool {
        self.weight > 0.0
    }
}

/// Pose から膝・股関節・体幹の角度とフレーム重みを求める
///
/// 座標はピクセル空間であること（[`Pose::scaled`]）。
pub fn frame_channels(pose: &Pose) -> FrameChannels {
    let (side, chain) = select_side(pose);

    let knee = angle(&chain.hip, &chain.knee, &chain.ankle);
    let hip = angle(&chain.shoulder, &chain.hip, &chain.knee);

    let ls = pose.get(KeypointIndex::LeftShoulder);
    let rs = pose.get(KeypointIndex::RightShoulder);
    let lh = pose.get(KeypointIndex::LeftHip);
    let rh = pose.get(KeypointIndex::RightHip);
    let trunk = trunk_flexion(ls, rs, lh, rh);

    let chain_conf = chain.confidence();
    let weight = if chain_conf < MIN_CHAIN_CONFIDENCE {
        0.0
    } else {
        chain_conf.min(chain_confidence(&[ls, rs, lh, rh]))
    };

    FrameChannels {
        angles: [knee, hip, trunk],
        weight,
        side,
    }
}

/// 名前付きキーポイントから直接変換（欠損関節は信頼度0扱い）
pub fn frame_channels_from_named(keypoints: &[NamedKeypoint]) -> FrameChannels {
    frame_channels(&Pose::from_named(keypoints))
}
