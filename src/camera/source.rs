use std::thread;
use std::time::Duration;

use crate::error::{CameraError, EngineError, StreamError};
use crate::frame::Frame;

/// カメラの向き
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Facing {
    /// 自撮り側
    #[default]
    User,
    Environment,
}

/// カメラ取得要求。解像度は best-effort
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraRequest {
    pub facing: Facing,
    pub ideal_resolution: Option<(u32, u32)>,
}

impl CameraRequest {
    /// 試行回数ごとに制約を緩めていく: 1280x720 → 640x480 → 向きのみ
    pub fn for_attempt(attempt: u32, facing: Facing) -> Self {
        let ideal_resolution = match attempt {
            0 => Some((1280, 720)),
            1 => Some((640, 480)),
            _ => None,
        };
        Self {
            facing,
            ideal_resolution,
        }
    }
}

/// ライブフレームの供給元
pub trait FrameStream {
    /// 次のフレームを待って返す。`Ended` を返したら以後は使えない
    fn next_frame(&mut self) -> Result<Frame, StreamError>;
}

impl<T: FrameStream + ?Sized> FrameStream for Box<T> {
    fn next_frame(&mut self) -> Result<Frame, StreamError> {
        (**self).next_frame()
    }
}

/// カメラデバイスを開く
pub trait CameraProvider {
    fn open(&mut self, request: &CameraRequest) -> Result<Box<dyn FrameStream + Send>, CameraError>;
}

impl<T: CameraProvider + ?Sized> CameraProvider for Box<T> {
    fn open(&mut self, request: &CameraRequest) -> Result<Box<dyn FrameStream + Send>, CameraError> {
        (**self).open(request)
    }
}

/// 取得リトライの設定
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    /// 初回の待ち時間。以後2倍ずつ伸ばす
    pub backoff: Duration,
    pub facing: Facing,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 4,
            backoff: Duration::from_millis(250),
            facing: Facing::User,
        }
    }
}

/// 制約を緩めながらカメラ取得を試行する
///
/// 全試行が失敗したら最後のエラーを添えて `CameraUnavailable`。
pub fn acquire_camera(
    provider: &mut dyn CameraProvider,
    policy: &RetryPolicy,
) -> Result<Box<dyn FrameStream + Send>, EngineError> {
    let attempts = policy.attempts.max(1);
    let mut last = CameraError::NotFound;

    for attempt in 0..attempts {
        let request = CameraRequest::for_attempt(attempt, policy.facing);
        match provider.open(&request) {
            Ok(stream) => {
                log::info!(
                    "camera acquired on attempt {} ({:?})",
                    attempt + 1,
                    request.ideal_resolution
                );
                return Ok(stream);
            }
            Err(e) => {
                log::warn!("camera attempt {}/{} failed: {}", attempt + 1, attempts, e);
                last = e;
            }
        }
        if attempt + 1 < attempts {
            thread::sleep(policy.backoff * 2u32.saturating_pow(attempt));
        }
    }

    Err(EngineError::CameraUnavailable { attempts, last })
}
