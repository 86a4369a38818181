//! Live camera feed via nokhwa.

use crate::frame::{Frame, FrameSource};
use anyhow::anyhow;
use nokhwa::{
    pixel_format::RgbFormat,
    utils::{CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType},
    Camera,
};
use std::sync::Arc;
use tracing::debug;

pub struct CameraSource {
    cam: Camera,
    seq: u64,
}

impl CameraSource {
    /// Opens the device, preferring 720p then 480p, then whatever it offers.
    pub fn open(index: u32) -> anyhow::Result<Self> {
        let mut cam = None;
        'outer: for (w, h) in [(1280, 720), (640, 480)] {
            for fmt in [FrameFormat::RAWRGB, FrameFormat::MJPEG, FrameFormat::YUYV] {
                let req = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
                    CameraFormat::new_from(w, h, fmt, 30),
                ));
                if let Ok(c) = Camera::new(CameraIndex::Index(index), req) {
                    cam = Some(c);
                    break 'outer;
                }
            }
        }
        let mut cam = match cam {
            Some(c) => c,
            None => Camera::new(
                CameraIndex::Index(index),
                RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
            )
            .map_err(|e| anyhow!("failed to open camera {index}: {e}"))?,
        };
        cam.open_stream()
            .map_err(|e| anyhow!("failed to open camera stream: {e}"))?;
        debug!(format = ?cam.camera_format(), "camera stream opened");
        Ok(Self { cam, seq: 0 })
    }
}

impl FrameSource for CameraSource {
    fn next_frame(&mut self) -> anyhow::Result<Option<Frame>> {
        let buffer = self
            .cam
            .frame()
            .map_err(|e| anyhow!("failed to capture frame: {e}"))?;
        let image = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| anyhow!("failed to decode frame: {e}"))?;
        self.seq += 1;
        Ok(Some(Frame {
            seq: self.seq,
            image: Arc::new(image),
        }))
    }
}
