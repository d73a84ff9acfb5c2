/// RGBフレーム (0x00RRGGBB, 行優先)
///
/// カメラ・動画デコーダ・描画の間で受け渡す共通フォーマット。
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u32>,
}

impl Frame {
    pub fn new(width: u32, height: u32, pixels: Vec<u32>) -> Self {
        debug_assert_eq!(pixels.len(), (width * height) as usize);
        Self { width, height, pixels }
    }

    /// 単色フレーム
    pub fn filled(width: u32, height: u32, color: u32) -> Self {
        Self::new(width, height, vec![color; (width * height) as usize])
    }

    /// RGB24 バイト列から作成
    pub fn from_rgb_bytes(width: u32, height: u32, rgb: &[u8]) -> Self {
        let pixels = rgb
            .chunks_exact(3)
            .map(|p| ((p[0] as u32) << 16) | ((p[1] as u32) << 8) | p[2] as u32)
            .collect();
        Self::new(width, height, pixels)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn pixel(&self, x: u32, y: u32) -> u32 {
        self.pixels[(y * self.width + x) as usize]
    }

    /// (r, g, b)
    pub fn rgb(&self, x: u32, y: u32) -> (u8, u8, u8) {
        split_rgb(self.pixel(x, y))
    }

    /// マスク外（背景）を黒で塗りつぶしたフレームを返す
    pub fn masked(&self, mask: &Mask, threshold: f32) -> Frame {
        let mut pixels = self.pixels.clone();
        for y in 0..self.height {
            for x in 0..self.width {
                if mask.sample(x, y, self.width, self.height) < threshold {
                    pixels[(y * self.width + x) as usize] = 0;
                }
            }
        }
        Frame::new(self.width, self.height, pixels)
    }
}

pub fn split_rgb(color: u32) -> (u8, u8, u8) {
    (((color >> 16) & 0xFF) as u8, ((color >> 8) & 0xFF) as u8, (color & 0xFF) as u8)
}

pub fn pack_rgb(r: u8, g: u8, b: u8) -> u32 {
    ((r as u32) << 16) | ((g as u32) << 8) | b as u32
}

/// 人物セグメンテーションマスク (0.0=背景, 1.0=人物)
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl Mask {
    pub fn new(width: u32, height: u32, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), (width * height) as usize);
        Self { width, height, data }
    }

    /// フレーム座標 (x, y) に対応するマスク値（最近傍）
    pub fn sample(&self, x: u32, y: u32, frame_w: u32, frame_h: u32) -> f32 {
        if self.width == 0 || self.height == 0 || frame_w == 0 || frame_h == 0 {
            return 0.0;
        }
        let mx = ((x as u64 * self.width as u64) / frame_w as u64).min(self.width as u64 - 1) as u32;
        let my = ((y as u64 * self.height as u64) / frame_h as u64).min(self.height as u64 - 1) as u32;
        self.data[(my * self.width + mx) as usize]
    }
}
