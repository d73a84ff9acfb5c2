//! カメラ映像のリアルタイム解析ループ

pub mod analyzer;
pub mod gate;
pub mod ring;
pub mod session;

pub use analyzer::{live_score, LiveAnalyzer};
pub use gate::{FramePacer, RateGate, SegmentationGate};
pub use ring::AngleRing;
pub use session::{LiveSession, LiveSnapshot, LiveState, LiveStatus, SessionOptions, SinkFactory};
