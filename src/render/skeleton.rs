use crate::pose::{KeypointIndex, Pose};

use super::canvas::Canvas;

/// 骨格の接続定義 (開始キーポイント, 終了キーポイント)
pub const SKELETON_CONNECTIONS: [(KeypointIndex, KeypointIndex); 12] = [
    // 上半身
    (KeypointIndex::LeftShoulder, KeypointIndex::RightShoulder),
    (KeypointIndex::LeftShoulder, KeypointIndex::LeftElbow),
    (KeypointIndex::LeftElbow, KeypointIndex::LeftWrist),
    (KeypointIndex::RightShoulder, KeypointIndex::RightElbow),
    (KeypointIndex::RightElbow, KeypointIndex::RightWrist),
    // 胴体
    (KeypointIndex::LeftShoulder, KeypointIndex::LeftHip),
    (KeypointIndex::RightShoulder, KeypointIndex::RightHip),
    (KeypointIndex::LeftHip, KeypointIndex::RightHip),
    // 下半身
    (KeypointIndex::LeftHip, KeypointIndex::LeftKnee),
    (KeypointIndex::LeftKnee, KeypointIndex::LeftAnkle),
    (KeypointIndex::RightHip, KeypointIndex::RightKnee),
    (KeypointIndex::RightKnee, KeypointIndex::RightAnkle),
];

/// キーポイントの色
pub const KEYPOINT_COLOR: u32 = 0x00FF00;

/// 骨格線の色
pub const SKELETON_COLOR: u32 = 0xFFFF00;

/// この信頼度未満の関節は描かない
pub const DRAW_CONFIDENCE: f32 = 0.3;

const LINE_THICKNESS: i32 = 3;
const JOINT_RADIUS: i32 = 4;

/// 正規化座標の姿勢をキャンバスに描く
///
/// フレームと同じく mirror なら左右反転する。
pub fn draw_skeleton(canvas: &mut Canvas, pose: &Pose, mirror: bool) {
    let (w, h) = (canvas.width() as f32, canvas.height() as f32);
    let to_canvas = |index: KeypointIndex| {
        let kp = pose.get(index);
        let x = if mirror { 1.0 - kp.x } else { kp.x };
        ((x * w) as i32, (kp.y * h) as i32)
    };

    for (start, end) in SKELETON_CONNECTIONS.iter() {
        if pose.get(*start).is_valid(DRAW_CONFIDENCE) && pose.get(*end).is_valid(DRAW_CONFIDENCE) {
            let (x1, y1) = to_canvas(*start);
            let (x2, y2) = to_canvas(*end);
            canvas.draw_thick_line(x1, y1, x2, y2, LINE_THICKNESS, SKELETON_COLOR);
        }
    }

    for index in KeypointIndex::ALL {
        if pose.get(index).is_valid(DRAW_CONFIDENCE) {
            let (x, y) = to_canvas(index);
            canvas.draw_circle(x, y, JOINT_RADIUS, KEYPOINT_COLOR);
        }
    }
}
