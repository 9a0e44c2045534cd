use std::collections::VecDeque;

use anyhow::{anyhow, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{DetectionSet, ObjectClass};
use crate::frame::Frame;

const ALL_CLASSES: [ObjectClass; 5] = [
    ObjectClass::Person,
    ObjectClass::Vehicle,
    ObjectClass::Animal,
    ObjectClass::Package,
    ObjectClass::Unknown,
];

/// One scripted detector response.
#[derive(Clone, Debug)]
pub enum ScriptStep {
    Detections(DetectionSet),
    Fail(String),
}

/// Backend that replays a fixed script, one step per frame.
///
/// Once the script runs out the backend either starts over (`cycling`) or
/// returns empty sets.
pub struct ScriptedBackend {
    script: VecDeque<ScriptStep>,
    played: Vec<ScriptStep>,
    cycle: bool,
    calls: u64,
}

impl ScriptedBackend {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            script: steps.into(),
            played: Vec::new(),
            cycle: false,
            calls: 0,
        }
    }

    /// Replay the same detection set for every frame.
    pub fn constant(set: DetectionSet) -> Self {
        Self::new(vec![ScriptStep::Detections(set)]).cycling()
    }

    /// Build from detection sets only.
    pub fn from_sets(sets: Vec<DetectionSet>) -> Self {
        Self::new(sets.into_iter().map(ScriptStep::Detections).collect())
    }

    pub fn cycling(mut self) -> Self {
        self.cycle = true;
        self
    }

    pub fn push_failure(&mut self, message: impl Into<String>) {
        self.script.push_back(ScriptStep::Fail(message.into()));
    }

    /// Number of frames seen so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn classes(&self) -> &[ObjectClass] {
        &ALL_CLASSES
    }

    fn detect(&mut self, _frame: &Frame) -> Result<DetectionSet> {
        self.calls += 1;
        if self.script.is_empty() && self.cycle {
            self.script = std::mem::take(&mut self.played).into();
        }
        let Some(step) = self.script.pop_front() else {
            return Ok(DetectionSet::empty());
        };
        if self.cycle {
            self.played.push(step.clone());
        }
        match step {
            ScriptStep::Detections(set) => Ok(set),
            ScriptStep::Fail(message) => Err(anyhow!("scripted failure: {}", message)),
        }
    }
}
