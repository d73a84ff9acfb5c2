use ndarray::Array4;

use crate::frame::{split_rgb, Frame};

/// MoveNet用の入力サイズ
pub const MOVENET_INPUT_SIZE: usize = 192;

/// Frame を size x size に最近傍リサイズして NHWC テンソルに詰める
fn frame_to_nhwc(frame: &Frame, size: usize, scale: f32) -> Array4<f32> {
    let mut tensor = Array4::<f32>::zeros((1, size, size, 3));
    if frame.is_empty() {
        return tensor;
    }
    let (fw, fh) = (frame.width as usize, frame.height as usize);
    for y in 0..size {
        let sy = ((y * fh) / size).min(fh - 1);
        for x in 0..size {
            let sx = ((x * fw) / size).min(fw - 1);
            let (r, g, b) = split_rgb(frame.pixels[sy * fw + sx]);
            tensor[[0, y, x, 0]] = r as f32 * scale;
            tensor[[0, y, x, 1]] = g as f32 * scale;
            tensor[[0, y, x, 2]] = b as f32 * scale;
        }
    }
    tensor
}

/// Frame を MoveNet用の入力テンソルに変換
///
/// - 192x192 にリサイズ
/// - [1, 192, 192, 3] の f32 テンソル (0.0-255.0, RGB)
pub fn preprocess_for_movenet(frame: &Frame) -> Array4<f32> {
    frame_to_nhwc(frame, MOVENET_INPUT_SIZE, 1.0)
}

/// セグメンテーション用: [1, size, size, 3] (0.0-1.0, RGB)
pub fn preprocess_for_segmentation(frame: &Frame, size: usize) -> Array4<f32> {
    frame_to_nhwc(frame, size, 1.0 / 255.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_movenet_tensor_shape_and_values() {
        let frame = Frame::filled(640, 480, 0xFF8000);
        let tensor = preprocess_for_movenet(&frame);
        assert_eq!(tensor.shape(), &[1, 192, 192, 3]);
        assert_eq!(tensor[[0, 10, 10, 0]], 255.0);
        assert_eq!(tensor[[0, 10, 10, 1]], 128.0);
        assert_eq!(tensor[[0, 10, 10, 2]], 0.0);
    }

    #[test]
    fn test_segmentation_tensor_scaled() {
        let frame = Frame::filled(4, 4, 0xFFFFFF);
        let tensor = preprocess_for_segmentation(&frame, 8);
        assert_eq!(tensor.shape(), &[1, 8, 8, 3]);
        assert!((tensor[[0, 7, 7, 2]] - 1.0).abs() < 1e-6);
    }
}
