//! Frame sources.
//!
//! This module provides the sources the detection loop pulls frames from:
//! - Synthetic source (`stub://` URIs, demos and tests)
//! - USB/V4L2 webcams (`/dev/videoN`, feature: ingest-v4l2)
//!
//! A source signals end of stream with `Ok(None)` and a device error with
//! `Err`. The detection loop treats both as fatal and does not retry.

pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::{anyhow, Result};

pub use synthetic::SyntheticSource;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

use crate::frame::Frame;

/// Frame source trait.
pub trait FrameSource: Send {
    /// Open the underlying device or stream.
    fn connect(&mut self) -> Result<()>;

    /// Capture the next frame. `Ok(None)` means the stream has ended.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Check if the source is healthy.
    fn is_healthy(&self) -> bool {
        true
    }

    /// Get frame statistics.
    fn stats(&self) -> SourceStats;
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub uri: String,
}

/// Configuration for a frame source.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// `stub://<name>` or a V4L2 device path such as `/dev/video0`.
    pub uri: String,
    /// Target frame rate. 0 disables pacing and lets the source run as fast as
    /// it can produce frames.
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
    /// End the stream after this many frames.
    pub max_frames: Option<u64>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            uri: "stub://camera".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
            max_frames: None,
        }
    }
}

/// Open the source named by `config.uri`.
pub fn open_source(config: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    if config.uri.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(config.clone())));
    }
    if config.uri.starts_with("/dev/video") {
        #[cfg(feature = "ingest-v4l2")]
        {
            return Ok(Box::new(V4l2Source::new(config.clone())));
        }
        #[cfg(not(feature = "ingest-v4l2"))]
        {
            return Err(anyhow!(
                "webcam capture from {} requires the ingest-v4l2 feature",
                config.uri
            ));
        }
    }
    Err(anyhow!(
        "unsupported frame source '{}': expected stub://<name> or /dev/videoN",
        config.uri
    ))
}
