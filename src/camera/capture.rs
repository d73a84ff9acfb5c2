use anyhow::{Context, Result};
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureAPIs, VideoCaptureTrait},
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use super::source::{CameraProvider, CameraRequest, FrameStream};
use crate::error::{CameraError, StreamError};
use crate::frame::Frame;

/// この回数連続で読み込みに失敗したらストリーム終了とみなす
const MAX_CONSECUTIVE_FAILURES: u32 = 30;

/// BGR Mat → Frame
pub fn mat_to_frame(mat: &Mat) -> Result<Frame> {
    let mut rgb = Mat::default();
    imgproc::cvt_color_def(mat, &mut rgb, imgproc::COLOR_BGR2RGB)?;
    let data = rgb.data_bytes()?;
    Ok(Frame::from_rgb_bytes(rgb.cols() as u32, rgb.rows() as u32, data))
}

/// OpenCVを使用したカメラキャプチャ
pub struct OpenCvCamera {
    capture: VideoCapture,
    width: u32,
    height: u32,
}

impl OpenCvCamera {
    /// 解像度を指定してカメラを開く（未指定ならデバイス任せ）
    pub fn open(index: i32, resolution: Option<(u32, u32)>) -> Result<Self> {
        let mut capture =
            VideoCapture::new(index, VideoCaptureAPIs::CAP_ANY as i32).context("Failed to open camera")?;

        if !capture.is_opened()? {
            anyhow::bail!("Camera {} is not available", index);
        }

        if let Some((w, h)) = resolution {
            capture.set(videoio::CAP_PROP_FRAME_WIDTH, w as f64)?;
            capture.set(videoio::CAP_PROP_FRAME_HEIGHT, h as f64)?;
        }
        capture.set(videoio::CAP_PROP_BUFFERSIZE, 1.0)?;

        let width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32;
        let height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32;
        log::info!(
            "camera {} opened at {}x{} ({} fps)",
            index,
            width,
            height,
            capture.get(videoio::CAP_PROP_FPS)?
        );

        Ok(Self { capture, width, height })
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// フレームを読み込む（BGR形式）
    pub fn read_frame(&mut self) -> Result<Mat> {
        let mut frame = Mat::default();
        self.capture
            .read(&mut frame)
            .context("Failed to read frame")?;

        if frame.empty() {
            anyhow::bail!("Empty frame received");
        }

        Ok(frame)
    }
}

/// 別スレッドでカメラキャプチャを行い、最新フレームを提供する
///
/// Drop でキャプチャスレッドを止め、デバイスを解放する。
pub struct ThreadedCamera {
    latest: Arc<Mutex<Option<Frame>>>,
    frame_id: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    ended: Arc<AtomicBool>,
    last_seen: u64,
    handle: Option<thread::JoinHandle<()>>,
}

impl ThreadedCamera {
    pub fn start(mut camera: OpenCvCamera) -> Self {
        let latest = Arc::new(Mutex::new(None::<Frame>));
        let frame_id = Arc::new(AtomicU64::new(0));
        let running = Arc::new(AtomicBool::new(true));
        let ended = Arc::new(AtomicBool::new(false));

        let handle = {
            let latest = latest.clone();
            let frame_id = frame_id.clone();
            let running = running.clone();
            let ended = ended.clone();
            thread::spawn(move || {
                let mut failures = 0u32;
                while running.load(Ordering::Relaxed) {
                    match camera.read_frame().and_then(|mat| mat_to_frame(&mat)) {
                        Ok(frame) => {
                            failures = 0;
                            if let Ok(mut slot) = latest.lock() {
                                *slot = Some(frame);
                            }
                            frame_id.fetch_add(1, Ordering::Release);
                        }
                        Err(e) => {
                            failures += 1;
                            log::debug!("camera read failed ({}): {:#}", failures, e);
                            if failures >= MAX_CONSECUTIVE_FAILURES {
                                log::warn!("camera stream stopped delivering frames");
                                break;
                            }
                            thread::sleep(Duration::from_millis(10));
                        }
                    }
                }
                ended.store(true, Ordering::Release);
            })
        };

        Self {
            latest,
            frame_id,
            running,
            ended,
            last_seen: 0,
            handle: Some(handle),
        }
    }

    /// 現在のフレームID。新フレームが到着するたびにインクリメントされる
    pub fn frame_id(&self) -> u64 {
        self.frame_id.load(Ordering::Acquire)
    }
}

impl FrameStream for ThreadedCamera {
    /// 前回以降に届いた最新フレームを待つ
    fn next_frame(&mut self) -> Result<Frame, StreamError> {
        loop {
            let id = self.frame_id();
            if id != self.last_seen {
                self.last_seen = id;
                let guard = self
                    .latest
                    .lock()
                    .map_err(|_| StreamError::Transient("frame slot poisoned".into()))?;
                if let Some(frame) = guard.as_ref() {
                    return Ok(frame.clone());
                }
            }
            if self.ended.load(Ordering::Acquire) {
                return Err(StreamError::Ended);
            }
            thread::sleep(Duration::from_millis(1));
        }
    }
}

impl Drop for ThreadedCamera {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// デバイス index で開くカメラプロバイダ
pub struct OpenCvCameraProvider {
    pub index: i32,
}

impl CameraProvider for OpenCvCameraProvider {
    fn open(&mut self, request: &CameraRequest) -> Result<Box<dyn FrameStream + Send>, CameraError> {
        let camera = OpenCvCamera::open(self.index, request.ideal_resolution)
            .map_err(|e| CameraError::Other(format!("{:#}", e)))?;
        let (w, h) = camera.resolution();
        if w == 0 || h == 0 {
            return Err(CameraError::NotFound);
        }
        Ok(Box::new(ThreadedCamera::start(camera)))
    }
}
