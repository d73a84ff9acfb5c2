use crate::frame::Mask;
use crate::pose::SegmentationMode;

use super::canvas::{Canvas, GLYPH_HEIGHT};

/// 人物領域の着色
pub const SEGMENT_TINT: u32 = 0x00C8FF;
const SEGMENT_TINT_ALPHA: f32 = 0.35;
const MASK_THRESHOLD: f32 = 0.5;

const HUD_X: i32 = 12;
const HUD_Y: i32 = 12;
const HUD_WIDTH: i32 = 200;
const HUD_HEIGHT: i32 = 48;
const HUD_PADDING: i32 = 10;
const HUD_BAR_HEIGHT: i32 = 10;
const HUD_BACKGROUND: u32 = 0x101010;
const HUD_TRACK: u32 = 0x404040;
const HUD_TEXT: u32 = 0xFFFFFF;
const FONT_SCALE: i32 = 3;

/// スコアに応じたバーの色
pub fn score_color(score: u8) -> u32 {
    match score {
        80..=100 => 0x30D158,
        50..=79 => 0xFFD60A,
        _ => 0xFF453A,
    }
}

/// セグメンテーション結果を重ねる
///
/// - Person: 背景を黒で塗りつぶす
/// - Overlay: 人物領域を半透明で着色
pub fn draw_segmentation(canvas: &mut Canvas, mask: &Mask, mode: SegmentationMode, mirror: bool) {
    let (w, h) = (canvas.width() as u32, canvas.height() as u32);
    for y in 0..h {
        for x in 0..w {
            let mx = if mirror { w - 1 - x } else { x };
            let person = mask.sample(mx, y, w, h) >= MASK_THRESHOLD;
            match mode {
                SegmentationMode::Off => return,
                SegmentationMode::Person if !person => canvas.set_pixel(x as i32, y as i32, 0),
                SegmentationMode::Overlay if person => {
                    canvas.blend_pixel(x as i32, y as i32, SEGMENT_TINT, SEGMENT_TINT_ALPHA)
                }
                _ => {}
            }
        }
    }
}

/// 左上にスコアゲージを描く
///
/// 半透明の角丸矩形、score/100 に比例したバー、数値ラベル。
/// スコアなしは空バーと "--"。
pub fn draw_hud(canvas: &mut Canvas, score: Option<u8>) {
    canvas.fill_rounded_rect(HUD_X, HUD_Y, HUD_WIDTH, HUD_HEIGHT, 10, HUD_BACKGROUND, 0.6);

    let label_y = HUD_Y + (HUD_HEIGHT - GLYPH_HEIGHT * FONT_SCALE) / 2;
    let label_x = HUD_X + HUD_PADDING;
    match score {
        Some(s) => canvas.draw_number(label_x, label_y, s as u32, FONT_SCALE, HUD_TEXT),
        None => canvas.draw_placeholder(label_x, label_y, FONT_SCALE, HUD_TEXT),
    };

    // バー位置はラベル3桁分の幅で固定
    let bar_x = label_x + 12 * FONT_SCALE + HUD_PADDING;
    let bar_width = HUD_X + HUD_WIDTH - HUD_PADDING - bar_x;
    let bar_y = HUD_Y + (HUD_HEIGHT - HUD_BAR_HEIGHT) / 2;
    canvas.fill_rect(bar_x, bar_y, bar_width, HUD_BAR_HEIGHT, HUD_TRACK, 1.0);

    if let Some(s) = score {
        let filled = bar_fill_width(bar_width, s);
        canvas.fill_rect(bar_x, bar_y, filled, HUD_BAR_HEIGHT, score_color(s), 1.0);
    }
}

fn bar_fill_width(bar_width: i32, score: u8) -> i32 {
    bar_width * score.min(100) as i32 / 100
}
