//! cardgate-hw — Camera capture for the face check.
//!
//! Opens a V4L2 device, reads grayscale frames, and writes snapshots of them
//! to disk as registration, access or evidence photos.

pub mod camera;
pub mod frame;
pub mod source;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::{Frame, FrameError};
pub use source::{FrameSource, OnDemandCamera};
