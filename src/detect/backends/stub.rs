use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection, DetectionSet, ObjectClass};
use crate::frame::Frame;

const STUB_CLASSES: [ObjectClass; 3] =
    [ObjectClass::Person, ObjectClass::Vehicle, ObjectClass::Animal];

/// Stub backend for demos and tests without a model file.
///
/// Seeds a PRNG from the SHA-256 of the frame pixels and draws a handful of
/// plausible detections. Identical pixels always yield identical detections.
pub struct StubBackend {
    max_objects: usize,
}

impl StubBackend {
    pub fn new() -> Self {
        Self { max_objects: 4 }
    }

    /// Upper bound on detections per frame.
    pub fn with_max_objects(mut self, max_objects: usize) -> Self {
        self.max_objects = max_objects;
        self
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn classes(&self) -> &[ObjectClass] {
        &STUB_CLASSES
    }

    fn detect(&mut self, frame: &Frame) -> Result<DetectionSet> {
        let digest: [u8; 32] = Sha256::digest(frame.pixels()).into();
        let mut rng = StdRng::from_seed(digest);

        let n = rng.gen_range(0..=self.max_objects);
        let detections: DetectionSet = (0..n)
            .map(|_| {
                let class = STUB_CLASSES[rng.gen_range(0..STUB_CLASSES.len())];
                let w = rng.gen_range(0.05f32..0.3);
                let h = rng.gen_range(0.1f32..0.6);
                let x = rng.gen_range(0.0f32..(1.0 - w));
                let y = rng.gen_range(0.0f32..(1.0 - h));
                Detection::new(class, rng.gen::<f32>(), BoundingBox::new(x, y, w, h))
            })
            .collect();
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_backend_is_deterministic_per_frame() {
        let mut backend = StubBackend::default();
        let a = Frame::new(vec![1, 2, 3, 4, 5, 6], 2, 1, 1);
        let b = Frame::new(vec![1, 2, 3, 4, 5, 6], 2, 1, 2);

        let first = backend.detect(&a).unwrap();
        let second = backend.detect(&b).unwrap();
        assert_eq!(first, second);
        assert!(first.len() <= 4);
    }

    #[test]
    fn stub_backend_respects_object_cap() {
        let mut backend = StubBackend::new().with_max_objects(0);
        let frame = Frame::new(vec![9; 12], 2, 2, 1);
        assert!(backend.detect(&frame).unwrap().is_empty());
    }

    #[test]
    fn stub_detections_stay_in_frame() {
        let mut backend = StubBackend::new().with_max_objects(16);
        for seq in 0..20u8 {
            let frame = Frame::new(vec![seq; 48], 4, 4, seq as u64);
            for det in backend.detect(&frame).unwrap().iter() {
                assert!((0.0..=1.0).contains(&det.confidence));
                assert!(det.bbox.x + det.bbox.w <= 1.0 + 1e-6);
                assert!(det.bbox.y + det.bbox.h <= 1.0 + 1e-6);
            }
        }
    }
}
