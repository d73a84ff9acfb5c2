pub mod canvas;
pub mod overlay;
pub mod skeleton;

#[cfg(feature = "desktop")]
pub mod window;

use anyhow::Result;

pub use canvas::Canvas;
pub use overlay::{draw_hud, draw_segmentation};
pub use skeleton::{draw_skeleton, SKELETON_CONNECTIONS};

#[cfg(feature = "desktop")]
pub use window::MinifbRenderer;

/// 描画済みキャンバスの出力先
pub trait FrameSink {
    fn present(&mut self, canvas: &Canvas) -> Result<()>;

    /// false になったらライブループを止める
    fn is_open(&self) -> bool;

    /// present が表示リフレッシュに同期して待つなら true
    fn paces_itself(&self) -> bool {
        false
    }
}

impl<T: FrameSink + ?Sized> FrameSink for Box<T> {
    fn present(&mut self, canvas: &Canvas) -> Result<()> {
        (**self).present(canvas)
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn paces_itself(&self) -> bool {
        (**self).paces_itself()
    }
}
