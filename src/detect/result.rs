use std::str::FromStr;

use anyhow::{anyhow, Result};

/// Axis-aligned box in normalized (0..1) frame coordinates, top-left origin.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    pub fn area(&self) -> f32 {
        self.w.max(0.0) * self.h.max(0.0)
    }

    /// Intersection over union with another box. Zero when either box is empty.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = (self.x + self.w).min(other.x + other.w);
        let bottom = (self.y + self.h).min(other.y + other.h);
        let intersection = (right - left).max(0.0) * (bottom - top).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

/// One object instance found in a frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub class: ObjectClass,
    /// Detector confidence in [0, 1].
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(class: ObjectClass, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            class,
            confidence,
            bbox,
        }
    }

    /// Detection without spatial extent, for callers that only care about labels.
    pub fn labelled(class: ObjectClass, confidence: f32) -> Self {
        Self::new(class, confidence, BoundingBox::default())
    }
}

/// All detections produced for a single frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionSet {
    pub detections: Vec<Detection>,
}

impl DetectionSet {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.detections.iter()
    }
}

impl From<Vec<Detection>> for DetectionSet {
    fn from(detections: Vec<Detection>) -> Self {
        Self::new(detections)
    }
}

impl FromIterator<Detection> for DetectionSet {
    fn from_iter<I: IntoIterator<Item = Detection>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a DetectionSet {
    type Item = &'a Detection;
    type IntoIter = std::slice::Iter<'a, Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.detections.iter()
    }
}

/// Coarse object categories the relay understands.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectClass {
    Person,
    Vehicle,
    Animal,
    Package,
    Unknown,
}

impl ObjectClass {
    /// Map a COCO-80 class index to a category.
    pub fn from_coco(class_id: usize) -> Self {
        match class_id {
            0 => Self::Person,
            1..=8 => Self::Vehicle,
            14..=23 => Self::Animal,
            24 | 26 | 28 => Self::Package,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Vehicle => "vehicle",
            Self::Animal => "animal",
            Self::Package => "package",
            Self::Unknown => "unknown",
        }
    }

    /// Plural, capitalised label used for on-screen overlays.
    pub fn display_plural(&self) -> &'static str {
        match self {
            Self::Person => "Persons",
            Self::Vehicle => "Vehicles",
            Self::Animal => "Animals",
            Self::Package => "Packages",
            Self::Unknown => "Objects",
        }
    }
}

impl FromStr for ObjectClass {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "person" | "people" | "human" => Ok(Self::Person),
            "vehicle" | "car" => Ok(Self::Vehicle),
            "animal" => Ok(Self::Animal),
            "package" => Ok(Self::Package),
            "unknown" => Ok(Self::Unknown),
            other => Err(anyhow!(
                "unknown object class '{}': expected person, vehicle, animal, package or unknown",
                other
            )),
        }
    }
}

impl std::fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
