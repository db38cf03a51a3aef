use crate::camera::{Camera, CameraError};
use crate::frame::Frame;

/// Anything that can hand over one frame on request.
pub trait FrameSource {
    fn grab(&mut self) -> Result<Frame, CameraError>;
}

/// Opens the camera for each grab and releases it straight after, so the
/// device is only held while a picture is being taken.
#[derive(Debug, Clone)]
pub struct OnDemandCamera {
    pub device: String,
    pub warmup_frames: usize,
}

impl OnDemandCamera {
    pub fn new(device: impl Into<String>, warmup_frames: usize) -> Self {
        Self {
            device: device.into(),
            warmup_frames,
        }
    }
}

impl FrameSource for OnDemandCamera {
    fn grab(&mut self) -> Result<Frame, CameraError> {
        let camera = Camera::open(&self.device)?;
        let frame = camera.capture_after_warmup(self.warmup_frames)?;
        tracing::debug!(
            device = %self.device,
            seq = frame.sequence,
            brightness = frame.avg_brightness(),
            "grabbed frame"
        );
        Ok(frame)
    }
}
