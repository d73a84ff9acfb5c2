use anyhow::Result;
use std::time::Duration;

use crate::frame::Frame;

/// 参照動画のデコーダ
///
/// シーク + 1フレームデコード。Drop でファイル/デコーダ資源を解放すること。
pub trait VideoDecoder {
    fn duration(&self) -> Duration;

    /// 時刻 `t` のフレームを返す
    fn frame_at(&mut self, t: Duration) -> Result<Frame>;
}

impl<T: VideoDecoder + ?Sized> VideoDecoder for Box<T> {
    fn duration(&self) -> Duration {
        (**self).duration()
    }

    fn frame_at(&mut self, t: Duration) -> Result<Frame> {
        (**self).frame_at(t)
    }
}

#[cfg(feature = "desktop")]
pub use opencv_decoder::OpenCvVideoDecoder;

#[cfg(feature = "desktop")]
mod opencv_decoder {
    use anyhow::{Context, Result};
    use opencv::core::Mat;
    use opencv::prelude::*;
    use opencv::videoio::{self, VideoCapture, VideoCaptureAPIs};
    use std::path::Path;
    use std::time::Duration;

    use super::VideoDecoder;
    use crate::camera::capture::mat_to_frame;
    use crate::frame::Frame;

    /// OpenCV (FFmpeg backend) による動画ファイルデコーダ
    pub struct OpenCvVideoDecoder {
        capture: VideoCapture,
        duration: Duration,
    }

    impl OpenCvVideoDecoder {
        pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
            let path = path.as_ref();
            let path_str = path.to_str().context("video path is not valid UTF-8")?;
            let capture = VideoCapture::from_file(path_str, VideoCaptureAPIs::CAP_ANY as i32)
                .with_context(|| format!("Failed to open video {}", path.display()))?;
            if !capture.is_opened()? {
                anyhow::bail!("Video {} could not be opened", path.display());
            }

            let frames = capture.get(videoio::CAP_PROP_FRAME_COUNT)?;
            let fps = capture.get(videoio::CAP_PROP_FPS)?;
            let seconds = if fps > 0.0 && frames > 0.0 { frames / fps } else { 0.0 };
            log::debug!("video {}: {} frames @ {:.2} fps", path.display(), frames, fps);

            Ok(Self {
                capture,
                duration: Duration::from_secs_f64(seconds),
            })
        }
    }

    impl VideoDecoder for OpenCvVideoDecoder {
        fn duration(&self) -> Duration {
            self.duration
        }

        fn frame_at(&mut self, t: Duration) -> Result<Frame> {
            self.capture
                .set(videoio::CAP_PROP_POS_MSEC, t.as_secs_f64() * 1000.0)
                .context("Seek failed")?;
            let mut mat = Mat::default();
            self.capture.read(&mut mat).context("Failed to decode frame")?;
            if mat.empty() {
                anyhow::bail!("Empty frame at {:?}", t);
            }
            mat_to_frame(&mat)
        }
    }
}
