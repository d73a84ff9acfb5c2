//! 関節角度の幾何計算

use nalgebra::Vector2;

use crate::pose::{Keypoint, KeypointIndex, Pose};

/// ゼロ長ベクトル対策の分母イプシロン
const EPSILON: f32 = 1e-6;

/// この信頼度未満の運動連鎖はフレームごと除外する
pub const MIN_CHAIN_CONFIDENCE: f32 = 0.2;

fn vec2(kp: &Keypoint) -> Vector2<f32> {
    Vector2::new(kp.x, kp.y)
}

/// 2ベクトルのなす角（度）
///
/// cos を [-1, 1] にクランプしてから acos するため NaN にならない。
pub fn angle_between(u: &Vector2<f32>, v: &Vector2<f32>) -> f32 {
    let denom = u.norm() * v.norm() + EPSILON;
    let cos = (u.dot(v) / denom).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

/// 頂点 b における角度 a-b-c（度, 0〜180）
pub fn angle(a: &Keypoint, b: &Keypoint, c: &Keypoint) -> f32 {
    let ba = vec2(a) - vec2(b);
    let bc = vec2(c) - vec2(b);
    angle_between(&ba, &bc)
}

/// 体幹の前傾角（度）
///
/// 腰中点→肩中点ベクトルと鉛直上向き (0, -1) のなす角。
/// 画像座標は y 下向きなので、直立で 0°、水平で 90°。
pub fn trunk_flexion(
    left_shoulder: &Keypoint,
    right_shoulder: &Keypoint,
    left_hip: &Keypoint,
    right_hip: &Keypoint,
) -> f32 {
    let shoulder_mid = (vec2(left_shoulder) + vec2(right_shoulder)) * 0.5;
    let hip_mid = (vec2(left_hip) + vec2(right_hip)) * 0.5;
    let trunk = shoulder_mid - hip_mid;
    let up = Vector2::new(0.0, -1.0);
    angle_between(&trunk, &up)
}

/// 運動連鎖の信頼度 = 連鎖中の最小信頼度
///
/// NaN などの非有限値は 0 とみなす。
pub fn chain_confidence(chain: &[&Keypoint]) -> f32 {
    chain
        .iter()
        .map(|kp| if kp.confidence.is_finite() { kp.confidence } else { 0.0 })
        .fold(f32::INFINITY, f32::min)
        .min(1.0)
        .max(0.0)
}

/// 体の左右
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// 片側の下肢連鎖（肩・腰・膝・足首）
#[derive(Debug, Clone, Copy)]
pub struct LimbChain {
    pub shoulder: Keypoint,
    pub hip: Keypoint,
    pub knee: Keypoint,
    pub ankle: Keypoint,
}

impl LimbChain {
    pub fn of(pose: &Pose, side: Side) -> Self {
        let (s, h, k, a) = match side {
            Side::Left => (
                KeypointIndex::LeftShoulder,
                KeypointIndex::LeftHip,
                KeypointIndex::LeftKnee,
                KeypointIndex::LeftAnkle,
            ),
            Side::Right => (
                KeypointIndex::RightShoulder,
                KeypointIndex::RightHip,
                KeypointIndex::RightKnee,
                KeypointIndex::RightAnkle,
            ),
        };
        Self {
            shoulder: *pose.get(s),
            hip: *pose.get(h),
            knee: *pose.get(k),
            ankle: *pose.get(a),
        }
    }

    pub fn confidence(&self) -> f32 {
        chain_confidence(&[&self.shoulder, &self.hip, &self.knee, &self.ankle])
    }
}

/// 信頼度の高い側の連鎖を選ぶ（同値なら左）
pub fn select_side(pose: &Pose) -> (Side, LimbChain) {
    let left = LimbChain::of(pose, Side::Left);
    let right = LimbChain::of(pose, Side::Right);
    if right.confidence() > left.confidence() {
        (Side::Right, right)
    } else {
        (Side::Left, left)
    }
}
