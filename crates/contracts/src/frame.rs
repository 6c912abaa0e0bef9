//! Frame - FrameIngest output
//!
//! Raw camera frame handed from the capture loop to the inference worker.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Captured camera frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    /// Monotonic capture sequence number
    pub frame_id: u64,

    /// Capture wall-clock time (unix seconds)
    pub timestamp: f64,

    /// Image width in pixels
    pub width: u32,

    /// Image height in pixels
    pub height: u32,

    /// Pixel format
    pub format: PixelFormat,

    /// Raw pixel data (zero-copy)
    pub data: Bytes,
}

/// Pixel format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    #[default]
    Bgr8,
    Rgb8,
    Gray8,
}

impl PixelFormat {
    /// Bytes per pixel
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Bgr8 | Self::Rgb8 => 3,
            Self::Gray8 => 1,
        }
    }
}

impl Frame {
    /// Build a frame, checking the payload length against the geometry
    pub fn new(
        frame_id: u64,
        timestamp: f64,
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Bytes,
    ) -> Option<Self> {
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        (data.len() == expected).then_some(Self {
            frame_id,
            timestamp,
            width,
            height,
            format,
            data,
        })
    }

    /// Frame with a zeroed payload of the right size
    pub fn blank(frame_id: u64, timestamp: f64, width: u32, height: u32) -> Self {
        let format = PixelFormat::default();
        let len = width as usize * height as usize * format.bytes_per_pixel();
        Self {
            frame_id,
            timestamp,
            width,
            height,
            format,
            data: Bytes::from(vec![0u8; len]),
        }
    }
}
