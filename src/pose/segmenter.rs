use anyhow::Result;
use serde::Deserialize;

use crate::frame::{Frame, Mask};

/// 人物セグメンテーションの使い方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentationMode {
    #[default]
    Off,
    /// 人物以外を切り抜く（フルアルファ）
    Person,
    /// 人物領域に色を重ねる
    Overlay,
}

impl SegmentationMode {
    pub fn is_enabled(self) -> bool {
        self != SegmentationMode::Off
    }
}

/// 人物セグメンテーションモデル
pub trait Segmenter {
    fn segment(&mut self, frame: &Frame) -> Result<Option<Mask>>;
}

impl<T: Segmenter + ?Sized> Segmenter for Box<T> {
    fn segment(&mut self, frame: &Frame) -> Result<Option<Mask>> {
        (**self).segment(frame)
    }
}

#[cfg(feature = "desktop")]
pub use onnx::OnnxSegmenter;

#[cfg(feature = "desktop")]
mod onnx {
    use anyhow::{Context, Result};
    use ort::session::builder::GraphOptimizationLevel;
    use ort::session::Session;
    use ort::value::Tensor;

    use super::Segmenter;
    use crate::frame::{Frame, Mask};
    use crate::pose::preprocess::preprocess_for_segmentation;

    /// Selfie segmentation 系 ONNX モデル
    ///
    /// 入力 [1, S, S, 3] (0.0-1.0)、出力 [1, S, S, 1] の人物確率。
    pub struct OnnxSegmenter {
        session: Session,
        input_size: usize,
    }

    impl OnnxSegmenter {
        pub fn new(model_path: &str, input_size: usize) -> Result<Self> {
            let session = Session::builder()?
                .with_optimization_level(GraphOptimizationLevel::Level3)?
                .commit_from_file(model_path)
                .context("Failed to load segmentation ONNX model")?;
            Ok(Self { session, input_size })
        }
    }

    impl Segmenter for OnnxSegmenter {
        fn segment(&mut self, frame: &Frame) -> Result<Option<Mask>> {
            if frame.is_empty() {
                return Ok(None);
            }
            let input = preprocess_for_segmentation(frame, self.input_size);
            let input_tensor = Tensor::from_array(input)?;
            let outputs = self
                .session
                .run(ort::inputs![input_tensor])
                .context("Segmentation inference failed")?;

            let output: ndarray::ArrayViewD<f32> = outputs[0]
                .try_extract_array()
                .context("Failed to extract segmentation output")?;

            let s = self.input_size;
            let mut data = Vec::with_capacity(s * s);
            for y in 0..s {
                for x in 0..s {
                    data.push(output[[0, y, x, 0]].clamp(0.0, 1.0));
                }
            }
            Ok(Some(Mask::new(s as u32, s as u32, data)))
        }
    }
}
