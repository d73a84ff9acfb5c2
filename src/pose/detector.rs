use anyhow::Result;

use crate::frame::Frame;

use super::keypoint::Pose;

/// 姿勢推定器
///
/// 1フレームから0〜1人分の姿勢を返す。座標はフレームに対する正規化座標 (0.0〜1.0)。
pub trait PoseEstimator {
    fn estimate(&mut self, frame: &Frame) -> Result<Option<Pose>>;
}

impl<T: PoseEstimator + ?Sized> PoseEstimator for Box<T> {
    fn estimate(&mut self, frame: &Frame) -> Result<Option<Pose>> {
        (**self).estimate(frame)
    }
}

#[cfg(feature = "desktop")]
pub use movenet::MoveNetDetector;

#[cfg(feature = "desktop")]
mod movenet {
    use anyhow::{Context, Result};
    use ndarray::Array4;
    use ort::session::builder::GraphOptimizationLevel;
    use ort::session::Session;
    use ort::value::Tensor;
    use std::path::Path;

    use super::PoseEstimator;
    use crate::frame::Frame;
    use crate::pose::keypoint::{Keypoint, KeypointIndex, Pose};
    use crate::pose::preprocess::preprocess_for_movenet;

    /// 全キーポイントがこれ未満なら人物なしとみなす
    const MIN_POSE_CONFIDENCE: f32 = 0.05;

    /// MoveNet を使用した姿勢検出器
    pub struct MoveNetDetector {
        session: Session,
    }

    impl MoveNetDetector {
        /// ONNXモデルを読み込んで初期化
        pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
            let builder = Session::builder()?
                .with_optimization_level(GraphOptimizationLevel::Level3)?;

            #[cfg(feature = "cuda")]
            let builder = {
                log::info!("[ort] Attempting CUDA execution provider...");
                builder.with_execution_providers([
                    ort::execution_providers::CUDAExecutionProvider::default().build(),
                ])?
            };

            let session = builder
                .commit_from_file(model_path.as_ref())
                .with_context(|| format!("Failed to load ONNX model {}", model_path.as_ref().display()))?;

            Ok(Self { session })
        }

        /// 前処理済みテンソルから姿勢を検出
        ///
        /// 入力: [1, 192, 192, 3] の f32 テンソル
        /// 出力: Pose (17キーポイント)
        pub fn detect(&mut self, input: Array4<f32>) -> Result<Pose> {
            let input_tensor = Tensor::from_array(input)?;
            let outputs = self
                .session
                .run(ort::inputs!["serving_default_input_0" => input_tensor])
                .context("Inference failed")?;

            // MoveNet の出力は [1, 1, 17, 3] (y, x, confidence)
            let output: ndarray::ArrayViewD<f32> = outputs["StatefulPartitionedCall_0"]
                .try_extract_array()
                .context("Failed to extract output tensor")?;

            let mut keypoints = [Keypoint::default(); KeypointIndex::COUNT];
            for (i, kp) in keypoints.iter_mut().enumerate() {
                let y = output[[0, 0, i, 0]];
                let x = output[[0, 0, i, 1]];
                let confidence = output[[0, 0, i, 2]];
                *kp = Keypoint::new(x, y, confidence);
            }

            Ok(Pose::new(keypoints))
        }
    }

    impl PoseEstimator for MoveNetDetector {
        fn estimate(&mut self, frame: &Frame) -> Result<Option<Pose>> {
            let input = preprocess_for_movenet(frame);
            let pose = self.detect(input)?;
            let best = pose.keypoints.iter().map(|k| k.confidence).fold(0.0f32, f32::max);
            if best < MIN_POSE_CONFIDENCE {
                return Ok(None);
            }
            Ok(Some(pose))
        }
    }
}
