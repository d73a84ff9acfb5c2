use crate::frame::{pack_rgb, split_rgb, Frame};

/// 3x5 ドットの数字フォント（各行の下位3bit、MSBが左）
const DIGITS: [[u8; 5]; 10] = [
    [0b111, 0b101, 0b101, 0b101, 0b111],
    [0b010, 0b110, 0b010, 0b010, 0b111],
    [0b111, 0b001, 0b111, 0b100, 0b111],
    [0b111, 0b001, 0b111, 0b001, 0b111],
    [0b101, 0b101, 0b111, 0b001, 0b001],
    [0b111, 0b100, 0b111, 0b001, 0b111],
    [0b111, 0b100, 0b111, 0b101, 0b111],
    [0b111, 0b001, 0b010, 0b010, 0b010],
    [0b111, 0b101, 0b111, 0b101, 0b111],
    [0b111, 0b101, 0b111, 0b001, 0b111],
];
const DASH: [u8; 5] = [0b000, 0b000, 0b111, 0b000, 0b000];

pub const GLYPH_WIDTH: i32 = 3;
pub const GLYPH_HEIGHT: i32 = 5;

/// 描画先バッファ (0x00RRGGBB)
#[derive(Debug, Clone)]
pub struct Canvas {
    width: usize,
    height: usize,
    buffer: Vec<u32>,
}

impl Canvas {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            buffer: vec![0u32; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn buffer(&self) -> &[u32] {
        &self.buffer
    }

    pub fn pixel(&self, x: usize, y: usize) -> u32 {
        self.buffer[y * self.width + x]
    }

    pub fn clear(&mut self, color: u32) {
        self.buffer.fill(color);
    }

    /// フレームをキャンバス全体に最近傍で拡縮して描く。mirror で左右反転
    pub fn draw_frame(&mut self, frame: &Frame, mirror: bool) {
        if frame.is_empty() || self.width == 0 || self.height == 0 {
            return;
        }
        let (fw, fh) = (frame.width as usize, frame.height as usize);
        for y in 0..self.height {
            let sy = (y * fh / self.height).min(fh - 1);
            let row = &frame.pixels[sy * fw..(sy + 1) * fw];
            for x in 0..self.width {
                let sx = (x * fw / self.width).min(fw - 1);
                let sx = if mirror { fw - 1 - sx } else { sx };
                self.buffer[y * self.width + x] = row[sx];
            }
        }
    }

    /// ピクセルをセット（境界チェック付き）
    pub fn set_pixel(&mut self, x: i32, y: i32, color: u32) {
        if x >= 0 && x < self.width as i32 && y >= 0 && y < self.height as i32 {
            self.buffer[y as usize * self.width + x as usize] = color;
        }
    }

    /// アルファ合成 (alpha: 0.0-1.0)
    pub fn blend_pixel(&mut self, x: i32, y: i32, color: u32, alpha: f32) {
        if x < 0 || x >= self.width as i32 || y < 0 || y >= self.height as i32 {
            return;
        }
        let idx = y as usize * self.width + x as usize;
        self.buffer[idx] = blend(self.buffer[idx], color, alpha);
    }

    /// Bresenhamのアルゴリズムで線を描画
    pub fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: u32) {
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;

        let mut x = x0;
        let mut y = y0;

        loop {
            self.set_pixel(x, y, color);

            if x == x1 && y == y1 {
                break;
            }

            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    /// 太さ付きの線（端点に円を並べる簡易版）
    pub fn draw_thick_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, thickness: i32, color: u32) {
        if thickness <= 1 {
            self.draw_line(x0, y0, x1, y1, color);
            return;
        }
        let r = thickness / 2;
        let steps = (x1 - x0).abs().max((y1 - y0).abs()).max(1);
        for i in 0..=steps {
            let x = x0 + (x1 - x0) * i / steps;
            let y = y0 + (y1 - y0) * i / steps;
            self.draw_circle(x, y, r, color);
        }
    }

    /// 円を描画（塗りつぶし）
    pub fn draw_circle(&mut self, cx: i32, cy: i32, radius: i32, color: u32) {
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.set_pixel(cx + dx, cy + dy, color);
                }
            }
        }
    }

    /// 半透明の矩形
    pub fn fill_rect(&mut self, x: i32, y: i32, w: i32, h: i32, color: u32, alpha: f32) {
        for py in y..y + h {
            for px in x..x + w {
                self.blend_pixel(px, py, color, alpha);
            }
        }
    }

    /// 半透明の角丸矩形
    pub fn fill_rounded_rect(&mut self, x: i32, y: i32, w: i32, h: i32, radius: i32, color: u32, alpha: f32) {
        let r = radius.min(w / 2).min(h / 2).max(0);
        for py in y..y + h {
            for px in x..x + w {
                // 角の外側は描かない
                let cx = if px < x + r { x + r } else if px >= x + w - r { x + w - r - 1 } else { px };
                let cy = if py < y + r { y + r } else if py >= y + h - r { y + h - r - 1 } else { py };
                let (dx, dy) = (px - cx, py - cy);
                if dx * dx + dy * dy <= r * r {
                    self.blend_pixel(px, py, color, alpha);
                }
            }
        }
    }

    /// 数値を描く（scale 倍のドット）。戻り値は描いた幅
    pub fn draw_number(&mut self, x: i32, y: i32, value: u32, scale: i32, color: u32) -> i32 {
        let text = value.to_string();
        let glyphs: Vec<&[u8; 5]> = text
            .bytes()
            .map(|b| &DIGITS[(b - b'0') as usize])
            .collect();
        self.draw_glyphs(x, y, &glyphs, scale, color)
    }

    /// 値なし表示 "--"
    pub fn draw_placeholder(&mut self, x: i32, y: i32, scale: i32, color: u32) -> i32 {
        self.draw_glyphs(x, y, &[&DASH, &DASH], scale, color)
    }

    fn draw_glyphs(&mut self, x: i32, y: i32, glyphs: &[&[u8; 5]], scale: i32, color: u32) -> i32 {
        let scale = scale.max(1);
        let advance = (GLYPH_WIDTH + 1) * scale;
        for (i, glyph) in glyphs.iter().enumerate() {
            let gx = x + i as i32 * advance;
            for (row, bits) in glyph.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if bits & (1 << (GLYPH_WIDTH - 1 - col)) != 0 {
                        self.fill_rect(gx + col * scale, y + row as i32 * scale, scale, scale, color, 1.0);
                    }
                }
            }
        }
        (glyphs.len() as i32 * advance - scale).max(0)
    }
}

/// dst に src を alpha で重ねる
pub fn blend(dst: u32, src: u32, alpha: f32) -> u32 {
    let a = alpha.clamp(0.0, 1.0);
    let (dr, dg, db) = split_rgb(dst);
    let (sr, sg, sb) = split_rgb(src);
    let mix = |d: u8, s: u8| (d as f32 + (s as f32 - d as f32) * a).round() as u8;
    pack_rgb(mix(dr, sr), mix(dg, sg), mix(db, sb))
}
