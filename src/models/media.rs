// src/models/media.rs

use serde::{Deserialize, Serialize};
use validator::Validate;

/// The two recorded streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Webcam,
    Screen,
}

impl StreamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::Webcam => "webcam",
            StreamKind::Screen => "screen",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "webcam" => Some(StreamKind::Webcam),
            "screen" => Some(StreamKind::Screen),
            _ => None,
        }
    }
}

/// One sampled video frame, tightly packed RGBA8.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl Frame {
    /// Returns `None` when the buffer does not hold `width * height` pixels.
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Option<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(4)?;
        if width == 0 || height == 0 || rgba.len() != expected {
            return None;
        }
        Some(Self { width, height, rgba })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// The subset of facial landmarks used for head orientation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Landmarks {
    pub nose: Point,

    /// Jaw outline, any order. Only the horizontal extremes are used.
    #[validate(length(min = 2, max = 64))]
    pub jaw: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct FaceDetection {
    pub bounding_box: BoundingBox,
    #[validate(nested)]
    pub landmarks: Option<Landmarks>,
}
