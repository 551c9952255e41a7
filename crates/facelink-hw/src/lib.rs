//! facelink-hw: V4L2 capture source with grayscale frames,
//! background streaming and JPEG encoding for uploads.

pub mod camera;
pub mod capture;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use capture::{CaptureHandle, FrameReceiver};
pub use frame::{Frame, FrameError};
