use anyhow::Result;

use crate::detect::result::{DetectionSet, ObjectClass};
use crate::frame::Frame;

/// Detector backend trait.
///
/// The detection loop treats a backend as a black-box classifier: one frame in,
/// one `DetectionSet` out. Backends own their model state, which is why
/// `detect` takes `&mut self`; the loop never shares a backend across threads.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Categories this backend can emit. Used to warn about count policies
    /// that can never match.
    fn classes(&self) -> &[ObjectClass];

    /// Run detection on a frame.
    ///
    /// An error is fatal to the current run; the loop does not retry and does
    /// not fall back to a previous result.
    fn detect(&mut self, frame: &Frame) -> Result<DetectionSet>;

    /// Optional warm-up hook, called once before the first frame.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
