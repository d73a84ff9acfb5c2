//! テスト用のモデル・デバイス代替

use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::camera::{FrameStream, VideoDecoder};
use crate::error::StreamError;
use crate::frame::Frame;
use crate::pose::{Keypoint, KeypointIndex, Pose, PoseEstimator, SharedModel, SharedPoseModel};
use crate::render::{Canvas, FrameSink};

/// このピクセル値のフレームは推定失敗
pub const FAIL_CODE: u32 = 0xFFFFFF;
/// このピクセル値のフレームは人物なし
pub const EMPTY_CODE: u32 = 0;

/// 膝角度 (度) を持つ横向き姿勢（正規化座標）
///
/// 大腿は鉛直、体幹は直立。正方形フレーム前提。
pub fn side_pose(knee_deg: f32, confidence: f32) -> Pose {
    let mut keypoints = [Keypoint::default(); KeypointIndex::COUNT];
    let theta = knee_deg.to_radians();
    let (hip, knee) = ((0.5, 0.4), (0.5, 0.6));
    let ankle = (knee.0 + 0.2 * theta.sin(), knee.1 - 0.2 * theta.cos());
    let shoulder = (0.5, 0.15);
    let mut set = |index: KeypointIndex, (x, y): (f32, f32)| {
        keypoints[index as usize] = Keypoint::new(x, y, confidence);
    };
    set(KeypointIndex::LeftShoulder, shoulder);
    set(KeypointIndex::RightShoulder, shoulder);
    set(KeypointIndex::LeftHip, hip);
    set(KeypointIndex::RightHip, hip);
    set(KeypointIndex::LeftKnee, knee);
    set(KeypointIndex::RightKnee, knee);
    set(KeypointIndex::LeftAnkle, ankle);
    set(KeypointIndex::RightAnkle, ankle);
    Pose::new(keypoints)
}

/// 膝角度をピクセル値に埋め込んだ 32x32 フレーム
pub fn coded_frame(code: u32) -> Frame {
    Frame::filled(32, 32, code)
}

/// フレームのピクセル値を膝角度として読む推定器
pub struct ScriptedEstimator {
    pub calls: Arc<AtomicUsize>,
}

impl PoseEstimator for ScriptedEstimator {
    fn estimate(&mut self, frame: &Frame) -> Result<Option<Pose>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match frame.pixels.first().copied() {
            Some(FAIL_CODE) => Err(anyhow!("scripted inference failure")),
            Some(EMPTY_CODE) | None => Ok(None),
            Some(code) => Ok(Some(side_pose(code as f32, 0.9))),
        }
    }
}

pub fn scripted_model() -> (SharedPoseModel, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let estimator: Box<dyn PoseEstimator + Send> = Box::new(ScriptedEstimator { calls: calls.clone() });
    (SharedModel::ready(estimator), calls)
}

/// 膝の屈伸カーブ (度)。period 秒周期で 170°↔90°
pub fn squat_curve(t: Duration, period: f32) -> u32 {
    let phase = t.as_secs_f32() / period * std::f32::consts::TAU;
    (130.0 + 40.0 * phase.cos()).round() as u32
}

/// 時刻→ピクセル値の関数で動く動画デコーダ
pub struct FakeDecoder {
    pub duration: Duration,
    pub code_at: Box<dyn Fn(Duration) -> u32 + Send>,
    pub calls: Arc<AtomicUsize>,
    pub dropped: Arc<AtomicBool>,
    /// 呼び出し回数ごとのフック
    pub on_call: Option<Box<dyn FnMut(usize) + Send>>,
}

impl FakeDecoder {
    pub fn new(duration: Duration, code_at: impl Fn(Duration) -> u32 + Send + 'static) -> Self {
        Self {
            duration,
            code_at: Box::new(code_at),
            calls: Arc::new(AtomicUsize::new(0)),
            dropped: Arc::new(AtomicBool::new(false)),
            on_call: None,
        }
    }
}

impl VideoDecoder for FakeDecoder {
    fn duration(&self) -> Duration {
        self.duration
    }

    fn frame_at(&mut self, t: Duration) -> Result<Frame> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(hook) = self.on_call.as_mut() {
            hook(n);
        }
        Ok(coded_frame((self.code_at)(t)))
    }
}

impl Drop for FakeDecoder {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

/// 用意したフレームを流し、尽きたら `Ended`
pub struct ScriptedStream {
    pub frames: VecDeque<Frame>,
    pub released: Arc<AtomicBool>,
}

impl ScriptedStream {
    pub fn new(frames: impl IntoIterator<Item = Frame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            released: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl FrameStream for ScriptedStream {
    fn next_frame(&mut self) -> Result<Frame, StreamError> {
        self.frames.pop_front().ok_or(StreamError::Ended)
    }
}

impl Drop for ScriptedStream {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// 表示回数と最後のキャンバスを記録するシンク
#[derive(Clone, Default)]
pub struct MemorySink {
    pub presented: Arc<AtomicUsize>,
    pub last: Arc<Mutex<Option<Canvas>>>,
    pub paced: bool,
}

impl FrameSink for MemorySink {
    fn present(&mut self, canvas: &Canvas) -> Result<()> {
        self.presented.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last.lock() {
            *last = Some(canvas.clone());
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        true
    }

    fn paces_itself(&self) -> bool {
        self.paced
    }
}
