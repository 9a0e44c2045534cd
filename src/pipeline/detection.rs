//! Detection loop.
//!
//! One iteration walks `AcquiringFrame -> Detecting -> Extracting ->
//! PublishingLocal` and returns to `AcquiringFrame`. Any source or detector
//! failure moves the loop to `Stopped`, which is terminal.

use std::time::{Duration, Instant};

use crate::cell::{Count, CountCell};
use crate::count::CountPolicy;
use crate::detect::{DetectionSet, DetectorBackend};
use crate::error::PipelineError;
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::render::Renderer;

use super::StopSignal;

const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectionState {
    AcquiringFrame,
    Detecting,
    Extracting,
    PublishingLocal,
    Stopped,
}

pub struct DetectionLoop {
    source: Box<dyn FrameSource>,
    detector: Box<dyn DetectorBackend>,
    policy: CountPolicy,
    cell: CountCell,
    renderer: Option<Box<dyn Renderer>>,
    state: DetectionState,
    frame: Option<Frame>,
    detections: Option<DetectionSet>,
    filtered: Option<DetectionSet>,
    count: Count,
    frames_processed: u64,
    health_interval: Duration,
}

impl DetectionLoop {
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Box<dyn DetectorBackend>,
        policy: CountPolicy,
        cell: CountCell,
    ) -> Self {
        Self {
            source,
            detector,
            policy,
            cell,
            renderer: None,
            state: DetectionState::AcquiringFrame,
            frame: None,
            detections: None,
            filtered: None,
            count: 0,
            frames_processed: 0,
            health_interval: DEFAULT_HEALTH_INTERVAL,
        }
    }

    pub fn with_renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn with_health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = interval;
        self
    }

    pub fn state(&self) -> DetectionState {
        self.state
    }

    /// Full detect-extract-write cycles completed.
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Connect the source and warm up the detector.
    pub fn prepare(&mut self) -> Result<(), PipelineError> {
        if let Err(e) = self.source.connect() {
            self.state = DetectionState::Stopped;
            return Err(PipelineError::FrameSourceFailed(e));
        }
        if let Err(e) = self.detector.warm_up() {
            self.state = DetectionState::Stopped;
            return Err(PipelineError::DetectorFailure(e));
        }
        if !self.detector.classes().contains(&self.policy.label) {
            log::warn!(
                "detector '{}' never emits class '{}'; count will stay at 0",
                self.detector.name(),
                self.policy.label
            );
        }
        log::info!(
            "detection ready: detector={} label={} min_confidence={:.2}",
            self.detector.name(),
            self.policy.label,
            self.policy.min_confidence
        );
        Ok(())
    }

    /// Perform one state transition and return the new state.
    pub fn step(&mut self) -> Result<DetectionState, PipelineError> {
        match self.state {
            DetectionState::AcquiringFrame => match self.source.next_frame() {
                Ok(Some(frame)) => {
                    self.frame = Some(frame);
                    self.state = DetectionState::Detecting;
                }
                Ok(None) => return Err(self.halt(PipelineError::FrameSourceExhausted)),
                Err(e) => return Err(self.halt(PipelineError::FrameSourceFailed(e))),
            },
            DetectionState::Detecting => {
                let Some(frame) = self.frame.as_ref() else {
                    self.state = DetectionState::AcquiringFrame;
                    return Ok(self.state);
                };
                match self.detector.detect(frame) {
                    Ok(detections) => {
                        self.detections = Some(detections);
                        self.state = DetectionState::Extracting;
                    }
                    Err(e) => {
                        let e = e.context(format!("frame #{}", frame.sequence));
                        return Err(self.halt(PipelineError::DetectorFailure(e)));
                    }
                }
            }
            DetectionState::Extracting => {
                let detections = self.detections.take().unwrap_or_default();
                let (filtered, count) = self.policy.filter_and_count(&detections);
                self.filtered = Some(filtered);
                self.count = count;
                self.state = DetectionState::PublishingLocal;
            }
            DetectionState::PublishingLocal => {
                self.cell.write(self.count);
                self.frames_processed += 1;
                if let Some(frame) = self.frame.as_ref() {
                    log::debug!(
                        "frame #{} count={} latency={}ms",
                        frame.sequence,
                        self.count,
                        frame.age().as_millis()
                    );
                }
                self.render();
                self.state = DetectionState::AcquiringFrame;
            }
            DetectionState::Stopped => {}
        }
        Ok(self.state)
    }

    /// Run one full iteration. Returns the count written, or `None` once stopped.
    pub fn run_cycle(&mut self) -> Result<Option<Count>, PipelineError> {
        if self.state == DetectionState::Stopped {
            return Ok(None);
        }
        loop {
            let previous = self.state;
            let next = self.step()?;
            if previous == DetectionState::PublishingLocal {
                return Ok(Some(self.count));
            }
            if next == DetectionState::Stopped {
                return Ok(None);
            }
        }
    }

    /// Run until the stop signal fires or a fatal error occurs.
    ///
    /// The stop signal is triggered on every exit path so the publisher loop
    /// learns that the run has ended.
    pub fn run(&mut self, stop: &StopSignal) -> Result<(), PipelineError> {
        log::info!("detection loop started");
        let mut last_health_log = Instant::now();

        let result = loop {
            if stop.is_triggered() {
                self.state = DetectionState::Stopped;
                break Ok(());
            }
            match self.run_cycle() {
                Ok(Some(_)) => {}
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }

            if last_health_log.elapsed() >= self.health_interval {
                let stats = self.source.stats();
                log::info!(
                    "source health={} frames={} processed={} uri={}",
                    self.source.is_healthy(),
                    stats.frames_captured,
                    self.frames_processed,
                    stats.uri
                );
                last_health_log = Instant::now();
            }
        };

        stop.trigger();
        match &result {
            Ok(()) => log::info!(
                "detection loop stopped after {} frames",
                self.frames_processed
            ),
            Err(e) => log::error!(
                "detection loop halted after {} frames: {}",
                self.frames_processed,
                e
            ),
        }
        result
    }

    fn halt(&mut self, err: PipelineError) -> PipelineError {
        self.state = DetectionState::Stopped;
        self.frame = None;
        self.detections = None;
        self.filtered = None;
        err
    }

    fn render(&mut self) {
        let frame = self.frame.take();
        let filtered = self.filtered.take().unwrap_or_default();
        let (Some(renderer), Some(frame)) = (self.renderer.as_mut(), frame) else {
            return;
        };
        if let Err(e) = renderer.render(&frame, &filtered, self.count) {
            log::warn!("renderer failed on frame #{}: {:#}", frame.sequence, e);
        }
    }
}
