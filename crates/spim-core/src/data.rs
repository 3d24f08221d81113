//! Camera frames and regions of interest.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

// =============================================================================
// Pixel Storage
// =============================================================================

/// Typed pixel storage, row-major.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelBuffer {
    /// 8-bit unsigned integer pixels
    U8(Vec<u8>),
    /// 16-bit unsigned integer pixels
    U16(Vec<u16>),
    /// 64-bit floating point pixels
    F64(Vec<f64>),
}

impl PixelBuffer {
    /// Pixel data as f64, borrowed for the F64 variant.
    pub fn as_f64(&self) -> Cow<'_, [f64]> {
        match self {
            PixelBuffer::U8(data) => Cow::Owned(data.iter().map(|&v| f64::from(v)).collect()),
            PixelBuffer::U16(data) => Cow::Owned(data.iter().map(|&v| f64::from(v)).collect()),
            PixelBuffer::F64(data) => Cow::Borrowed(data.as_slice()),
        }
    }

    /// Number of pixels.
    pub fn len(&self) -> usize {
        match self {
            PixelBuffer::U8(data) => data.len(),
            PixelBuffer::U16(data) => data.len(),
            PixelBuffer::F64(data) => data.len(),
        }
    }

    /// True if the buffer holds no pixels.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, index: usize) -> Option<f64> {
        match self {
            PixelBuffer::U8(data) => data.get(index).map(|&v| f64::from(v)),
            PixelBuffer::U16(data) => data.get(index).map(|&v| f64::from(v)),
            PixelBuffer::F64(data) => data.get(index).copied(),
        }
    }
}

// =============================================================================
// Region of Interest
// =============================================================================

/// Rectangular region of a sensor, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Roi {
    /// X-coordinate of top-left corner
    pub x: u32,
    /// Y-coordinate of top-left corner
    pub y: u32,
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
}

impl Roi {
    /// Create a region.
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Full-sensor region.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Region of the same size as `self`, centred on the given sensor.
    pub fn centered_in(&self, sensor_width: u32, sensor_height: u32) -> Self {
        let width = self.width.min(sensor_width);
        let height = self.height.min(sensor_height);
        Self::new(
            (sensor_width - width) / 2,
            (sensor_height - height) / 2,
            width,
            height,
        )
    }

    /// Intersection with a `width` × `height` sensor.
    pub fn clipped(&self, width: u32, height: u32) -> Self {
        let x = self.x.min(width);
        let y = self.y.min(height);
        Self::new(
            x,
            y,
            self.width.min(width - x),
            self.height.min(height - y),
        )
    }

    /// Number of pixels.
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

// =============================================================================
// Frame
// =============================================================================

/// A single camera image.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel data, `width * height` entries
    pub pixels: PixelBuffer,
}

impl Frame {
    /// Frame from 16-bit pixels.
    pub fn from_u16(width: u32, height: u32, pixels: Vec<u16>) -> Self {
        Self {
            width,
            height,
            pixels: PixelBuffer::U16(pixels),
        }
    }

    /// Frame from floating point pixels.
    pub fn from_f64(width: u32, height: u32, pixels: Vec<f64>) -> Self {
        Self {
            width,
            height,
            pixels: PixelBuffer::F64(pixels),
        }
    }

    /// Intensity at column `x`, row `y`; `None` outside the frame.
    pub fn value(&self, x: u32, y: u32) -> Option<f64> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get(y as usize * self.width as usize + x as usize)
    }

    /// Copy of the pixels inside `roi` (clipped to the frame), as f64.
    pub fn crop(&self, roi: &Roi) -> Frame {
        let roi = roi.clipped(self.width, self.height);
        let source = self.pixels.as_f64();
        let stride = self.width as usize;
        let mut data = Vec::with_capacity(roi.area() as usize);
        for row in roi.y..roi.y + roi.height {
            let begin = row as usize * stride + roi.x as usize;
            if let Some(line) = source.get(begin..begin + roi.width as usize) {
                data.extend_from_slice(line);
            }
        }
        let height = data.len().checked_div(roi.width as usize).unwrap_or(0) as u32;
        Frame::from_f64(roi.width, height, data)
    }

    /// Number of pixels.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}
