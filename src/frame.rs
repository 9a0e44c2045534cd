//! Captured video frames.
//!
//! A `Frame` is owned by the detection loop for exactly one iteration. It is
//! never shared with the publisher loop and is dropped once the count for it
//! has been written.

use std::time::{Duration, Instant};

/// One still image sampled from a video stream, stored as packed RGB24.
pub struct Frame {
    data: Vec<u8>,

    pub width: u32,
    pub height: u32,

    /// Position of this frame in its source, starting at 1.
    pub sequence: u64,

    capture_instant: Instant,
}

impl Frame {
    /// Create a frame. Called by frame sources.
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        Self {
            data,
            width,
            height,
            sequence,
            capture_instant: Instant::now(),
        }
    }

    /// Packed RGB24 pixel data, row-major.
    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Time since capture.
    pub fn age(&self) -> Duration {
        self.capture_instant.elapsed()
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Number of bytes a packed RGB24 frame of the given size must hold.
    pub fn expected_rgb_len(width: u32, height: u32) -> Option<usize> {
        (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.sequence)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}
