pub mod source;
pub mod video;

#[cfg(feature = "desktop")]
pub mod capture;

pub use source::{acquire_camera, CameraProvider, CameraRequest, Facing, FrameStream, RetryPolicy};
pub use video::VideoDecoder;

#[cfg(feature = "desktop")]
pub use capture::{OpenCvCamera, OpenCvCameraProvider, ThreadedCamera};
#[cfg(feature = "desktop")]
pub use video::OpenCvVideoDecoder;
