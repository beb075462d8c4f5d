//! V4L2 camera capture through rscam, decoding MJPG frames to RGB.
use rscam::{Camera, Config};
use sorter_traits::{BoxError, Frame, FrameSource};
use tracing::{debug, warn};

use crate::error::{HwError, Result};

pub struct V4l2Camera {
    device: String,
    width: u32,
    height: u32,
    fps: u32,
    cap: Option<Camera>,
}

impl V4l2Camera {
    /// Open `/dev/video{index}` and start streaming MJPG.
    pub fn open(index: u32, width: u32, height: u32, fps: u32) -> Result<Self> {
        let mut cam = Self {
            device: format!("/dev/video{index}"),
            width,
            height,
            fps: fps.max(1),
            cap: None,
        };
        cam.start()?;
        Ok(cam)
    }

    fn start(&mut self) -> Result<()> {
        let mut cap = Camera::new(&self.device)
            .map_err(|e| HwError::Camera(format!("open {}: {e}", self.device)))?;
        cap.start(&Config {
            interval: (1, self.fps),
            resolution: (self.width, self.height),
            format: b"MJPG",
            nbuffers: 1,
            ..Default::default()
        })
        .map_err(|e| HwError::Camera(format!("start {}: {e}", self.device)))?;
        debug!(device = %self.device, width = self.width, height = self.height, "camera streaming");
        self.cap = Some(cap);
        Ok(())
    }
}

impl FrameSource for V4l2Camera {
    fn grab(&mut self) -> std::result::Result<Frame, BoxError> {
        let cap = self.cap.as_ref().ok_or(HwError::NoFrame)?;
        let raw = cap.capture().map_err(HwError::Io)?;
        let img = image::load_from_memory_with_format(&raw[..], image::ImageFormat::Jpeg)
            .map_err(|e| HwError::Camera(format!("decode frame: {e}")))?
            .to_rgb8();
        Ok(Frame::new(img.width(), img.height(), img.into_raw()))
    }

    fn reopen(&mut self) -> std::result::Result<(), BoxError> {
        if self.cap.take().is_some() {
            warn!(device = %self.device, "reopening camera");
        }
        self.start()?;
        Ok(())
    }
}
