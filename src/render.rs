//! Rendering collaborators.
//!
//! A renderer observes each processed frame together with the detections that
//! passed the count policy. It cannot influence the count: the detection loop
//! writes the cell before rendering and only logs renderer errors.

use anyhow::Result;

use crate::cell::Count;
use crate::detect::{DetectionSet, ObjectClass};
use crate::frame::Frame;

pub trait Renderer: Send {
    fn render(&mut self, frame: &Frame, filtered: &DetectionSet, count: Count) -> Result<()>;
}

/// Overlay caption drawn in the corner of annotated frames, e.g. `Persons: 3`.
pub fn overlay_text(label: ObjectClass, count: Count) -> String {
    format!("{}: {}", label.display_plural(), count)
}

/// Renderer that reports counts on the console through the log facade.
pub struct ConsoleRenderer {
    label: ObjectClass,
    frames: u64,
}

impl ConsoleRenderer {
    pub fn new(label: ObjectClass) -> Self {
        Self { label, frames: 0 }
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }
}

impl Renderer for ConsoleRenderer {
    fn render(&mut self, frame: &Frame, filtered: &DetectionSet, count: Count) -> Result<()> {
        self.frames += 1;
        log::info!(
            "Number of {} detected: {}",
            self.label.display_plural().to_lowercase(),
            count
        );
        for det in filtered {
            log::debug!(
                "frame #{} {} conf={:.2} box=({:.3},{:.3},{:.3},{:.3})",
                frame.sequence,
                det.class,
                det.confidence,
                det.bbox.x,
                det.bbox.y,
                det.bbox.w,
                det.bbox.h
            );
        }
        log::debug!("overlay: {}", overlay_text(self.label, count));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Detection;

    #[test]
    fn overlay_uses_plural_label() {
        assert_eq!(overlay_text(ObjectClass::Person, 3), "Persons: 3");
        assert_eq!(overlay_text(ObjectClass::Vehicle, 0), "Vehicles: 0");
    }

    #[test]
    fn console_renderer_counts_frames() -> Result<()> {
        let mut renderer = ConsoleRenderer::new(ObjectClass::Person);
        let frame = Frame::new(vec![0; 3], 1, 1, 1);
        let set = DetectionSet::new(vec![Detection::labelled(ObjectClass::Person, 0.8)]);
        renderer.render(&frame, &set, 1)?;
        renderer.render(&frame, &DetectionSet::empty(), 0)?;
        assert_eq!(renderer.frames_rendered(), 2);
        Ok(())
    }
}
