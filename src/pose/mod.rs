pub mod detector;
pub mod keypoint;
#[cfg(feature = "desktop")]
pub mod preprocess;
pub mod segmenter;
pub mod shared;

pub use detector::PoseEstimator;
#[cfg(feature = "desktop")]
pub use detector::MoveNetDetector;
pub use keypoint::{Keypoint, KeypointIndex, NamedKeypoint, Pose};
#[cfg(feature = "desktop")]
pub use preprocess::{preprocess_for_movenet, preprocess_for_segmentation};
#[cfg(feature = "desktop")]
pub use segmenter::OnnxSegmenter;
pub use segmenter::{SegmentationMode, Segmenter};
pub use shared::{SharedModel, SharedPoseModel, SharedSegmenter};
