use anyhow::Result;
use minifb::{Key, Window, WindowOptions};

use super::canvas::Canvas;
use super::FrameSink;

/// minifbを使用したレンダラー
pub struct MinifbRenderer {
    window: Window,
    width: usize,
    height: usize,
    paced: bool,
}

impl MinifbRenderer {
    /// ウィンドウを作成
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self> {
        let window = Window::new(
            title,
            width,
            height,
            WindowOptions {
                resize: false,
                ..WindowOptions::default()
            },
        )?;

        Ok(Self {
            window,
            width,
            height,
            paced: false,
        })
    }

    /// 表示側で FPS を制限する。以後ループ側のペーサーは使わない
    pub fn set_target_fps(&mut self, fps: usize) {
        self.window.set_target_fps(fps);
        self.paced = fps > 0;
    }

    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }
}

impl FrameSink for MinifbRenderer {
    /// キャンバスをウィンドウに表示
    fn present(&mut self, canvas: &Canvas) -> Result<()> {
        self.window
            .update_with_buffer(canvas.buffer(), canvas.width(), canvas.height())?;
        Ok(())
    }

    /// ウィンドウが開いているか（Esc で閉じる）
    fn is_open(&self) -> bool {
        self.window.is_open() && !self.window.is_key_down(Key::Escape)
    }

    fn paces_itself(&self) -> bool {
        self.paced
    }
}
