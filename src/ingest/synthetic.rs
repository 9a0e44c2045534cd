//! Synthetic frame source.
//!
//! Generates a moving RGB test pattern for `stub://` URIs. With `max_frames`
//! set, the source reports end of stream once that many frames were produced,
//! which is how finite runs are exercised without a camera.

use anyhow::Result;
use std::time::{Duration, Instant};

use super::{FrameSource, SourceConfig, SourceStats};
use crate::frame::Frame;

pub struct SyntheticSource {
    config: SourceConfig,
    frame_count: u64,
    /// Simulated scene state; bumps every 50 frames.
    scene_state: u8,
    connected: bool,
    last_frame_at: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            config,
            frame_count: 0,
            scene_state: 0,
            connected: false,
            last_frame_at: None,
        }
    }

    fn generate_pixels(&mut self) -> Vec<u8> {
        let pixel_count = (self.config.width as usize) * (self.config.height as usize) * 3;

        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }

        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }
        pixels
    }

    fn pace(&mut self) {
        if self.config.target_fps == 0 {
            return;
        }
        let interval = Duration::from_millis(1000 / self.config.target_fps.max(1) as u64);
        if let Some(last) = self.last_frame_at {
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        self.last_frame_at = Some(Instant::now());
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        if self.config.width == 0 || self.config.height == 0 {
            anyhow::bail!(
                "synthetic source {} has an empty frame size {}x{}",
                self.config.uri,
                self.config.width,
                self.config.height
            );
        }
        self.connected = true;
        log::info!("SyntheticSource: connected to {}", self.config.uri);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.connected {
            anyhow::bail!("synthetic source {} not connected", self.config.uri);
        }
        if self
            .config
            .max_frames
            .is_some_and(|max| self.frame_count >= max)
        {
            return Ok(None);
        }

        self.pace();
        self.frame_count += 1;
        let pixels = self.generate_pixels();
        Ok(Some(Frame::new(
            pixels,
            self.config.width,
            self.config.height,
            self.frame_count,
        )))
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            uri: self.config.uri.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config(max_frames: Option<u64>) -> SourceConfig {
        SourceConfig {
            uri: "stub://test".to_string(),
            target_fps: 0,
            width: 16,
            height: 8,
            max_frames,
        }
    }

    #[test]
    fn synthetic_source_produces_frames() -> Result<()> {
        let mut source = SyntheticSource::new(stub_config(None));
        source.connect()?;

        let frame = source.next_frame()?.expect("frame");
        assert_eq!(frame.width, 16);
        assert_eq!(frame.height, 8);
        assert_eq!(frame.byte_len(), 16 * 8 * 3);
        assert_eq!(frame.sequence, 1);

        Ok(())
    }

    #[test]
    fn synthetic_frames_change_between_captures() -> Result<()> {
        let mut source = SyntheticSource::new(stub_config(None));
        source.connect()?;

        let a = source.next_frame()?.expect("frame");
        let b = source.next_frame()?.expect("frame");
        assert_ne!(a.pixels(), b.pixels());

        Ok(())
    }

    #[test]
    fn max_frames_ends_the_stream() -> Result<()> {
        let mut source = SyntheticSource::new(stub_config(Some(3)));
        source.connect()?;

        for _ in 0..3 {
            assert!(source.next_frame()?.is_some());
        }
        assert!(source.next_frame()?.is_none());
        assert!(source.next_frame()?.is_none());
        assert_eq!(source.stats().frames_captured, 3);

        Ok(())
    }

    #[test]
    fn empty_frame_size_fails_to_connect() {
        let mut config = stub_config(None);
        config.width = 0;
        assert!(SyntheticSource::new(config).connect().is_err());
    }

    #[test]
    fn capture_before_connect_fails() {
        let mut source = SyntheticSource::new(stub_config(None));
        assert!(source.next_frame().is_err());
    }

    #[test]
    fn pacing_spaces_frames() -> Result<()> {
        let mut config = stub_config(Some(3));
        config.target_fps = 50;
        let mut source = SyntheticSource::new(config);
        source.connect()?;

        let start = Instant::now();
        while source.next_frame()?.is_some() {}
        assert!(start.elapsed() >= Duration::from_millis(35));

        Ok(())
    }
}
