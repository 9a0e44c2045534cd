//! Detection and publication loops.
//!
//! `Pipeline::run` owns the whole lifecycle:
//! 1. Connect the frame source and warm up the detector
//! 2. Spawn the publisher thread
//! 3. Run the detection loop on the calling thread
//! 4. Trigger the stop signal and join the publisher, however detection ended
//!
//! The loops share nothing but the `CountCell` and the `StopSignal`.

mod detection;
mod publisher;
mod stop;

use anyhow::Result;
use std::time::Duration;

pub use detection::{DetectionLoop, DetectionState};
pub use publisher::{Publisher, PublisherHandle, PublisherStats, TickOutcome};
pub use stop::StopSignal;

use crate::cell::CountCell;
use crate::count::CountPolicy;
use crate::detect::DetectorBackend;
use crate::error::PipelineError;
use crate::ingest::FrameSource;
use crate::render::Renderer;
use crate::sink::RemoteSink;

/// Default publish period.
pub const DEFAULT_PUBLISH_PERIOD: Duration = Duration::from_millis(500);

#[derive(Clone, Debug)]
pub struct PipelineSettings {
    pub policy: CountPolicy,
    pub publish_period: Duration,
    /// Key the count is stored under in the remote sink.
    pub sink_path: String,
    pub health_interval: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            policy: CountPolicy::people(),
            publish_period: DEFAULT_PUBLISH_PERIOD,
            sink_path: "fire_alarm/detectedHumans".to_string(),
            health_interval: Duration::from_secs(5),
        }
    }
}

/// What happened during a run.
#[derive(Debug)]
pub struct RunReport {
    pub frames_processed: u64,
    pub publisher: PublisherStats,
    /// `Ok` when the run ended on a stop request.
    pub outcome: Result<(), PipelineError>,
}

pub struct Pipeline {
    source: Box<dyn FrameSource>,
    detector: Box<dyn DetectorBackend>,
    sink: Box<dyn RemoteSink>,
    renderer: Option<Box<dyn Renderer>>,
    settings: PipelineSettings,
    cell: CountCell,
}

impl Pipeline {
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Box<dyn DetectorBackend>,
        sink: Box<dyn RemoteSink>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            source,
            detector,
            sink,
            renderer: None,
            settings,
            cell: CountCell::new(),
        }
    }

    pub fn with_renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Handle to the shared count, for observers outside the two loops.
    pub fn cell(&self) -> CountCell {
        self.cell.clone()
    }

    /// Run both loops until the stop signal fires or detection fails.
    ///
    /// Errors only when the publisher thread cannot be started; detection
    /// failures are reported in `RunReport::outcome`.
    pub fn run(self, stop: StopSignal) -> Result<RunReport> {
        let Pipeline {
            source,
            detector,
            mut sink,
            renderer,
            settings,
            cell,
        } = self;

        let mut detection = DetectionLoop::new(source, detector, settings.policy, cell.clone())
            .with_health_interval(settings.health_interval);
        if let Some(renderer) = renderer {
            detection = detection.with_renderer(renderer);
        }

        if let Err(e) = detection.prepare() {
            log::error!("pipeline failed to start: {}", e);
            stop.trigger();
            if let Err(close_err) = sink.close() {
                log::warn!("failed to close sink '{}': {:#}", sink.name(), close_err);
            }
            return Ok(RunReport {
                frames_processed: 0,
                publisher: PublisherStats::default(),
                outcome: Err(e),
            });
        }

        let publisher = Publisher::new(cell, sink, settings.sink_path.clone())
            .spawn(settings.publish_period, stop.clone())?;

        let outcome = detection.run(&stop);

        let publisher = publisher.stop().unwrap_or_else(|e| {
            log::error!("{:#}", e);
            PublisherStats::default()
        });

        Ok(RunReport {
            frames_processed: detection.frames_processed(),
            publisher,
            outcome,
        })
    }
}
