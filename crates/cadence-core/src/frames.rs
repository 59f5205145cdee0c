//! Camera frames as delivered by video rooms.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Pixel format of a frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    /// Packed 8-bit RGB, three bytes per pixel.
    Rgb24,
    /// Anything else; not usable for inference.
    Other(String),
}

impl FrameFormat {
    /// Parse the format tag carried in frame metadata.
    pub fn parse(tag: &str) -> Self {
        if tag.eq_ignore_ascii_case("rgb24") {
            Self::Rgb24
        } else {
            Self::Other(tag.to_owned())
        }
    }
}

/// Reasons a frame is rejected before reaching the cache.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Only `rgb24` frames are accepted.
    #[error("unsupported frame format: {0}")]
    UnsupportedFormat(String),
    /// Width or height is zero.
    #[error("empty frame dimensions {width}x{height}")]
    EmptyDimensions {
        /// Reported width.
        width: u32,
        /// Reported height.
        height: u32,
    },
    /// Payload length does not match the dimensions.
    #[error("frame size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// `width * height * 3`.
        expected: usize,
        /// Received byte count.
        actual: usize,
    },
}

/// A single camera image.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageFrame {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel format.
    pub format: FrameFormat,
    /// Raw pixel bytes (cheap to clone).
    pub data: Bytes,
    /// Capture time reported by the producer.
    pub captured_at: DateTime<Utc>,
}

impl ImageFrame {
    /// Build an `rgb24` frame stamped with the current time.
    pub fn rgb24(width: u32, height: u32, data: impl Into<Bytes>) -> Self {
        Self {
            width,
            height,
            format: FrameFormat::Rgb24,
            data: data.into(),
            captured_at: Utc::now(),
        }
    }

    /// Check the frame is an `rgb24` image whose payload matches its size.
    pub fn validate(&self) -> Result<(), FrameError> {
        if let FrameFormat::Other(tag) = &self.format {
            return Err(FrameError::UnsupportedFormat(tag.clone()));
        }
        if self.width == 0 || self.height == 0 {
            return Err(FrameError::EmptyDimensions {
                width: self.width,
                height: self.height,
            });
        }
        let expected = self.width as usize * self.height as usize * 3;
        if self.data.len() != expected {
            return Err(FrameError::SizeMismatch {
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }
}
