//! Headcount relay.
//!
//! Counts the people visible in a live video feed and republishes the latest
//! count to a remote key-value store at a fixed cadence.
//!
//! Two loops run on separate threads and meet only at the [`CountCell`]:
//! - The detection loop pulls frames, runs a detector backend, applies the
//!   [`CountPolicy`] and writes the result into the cell at whatever rate the
//!   source and detector allow.
//! - The publisher loop reads the cell once per tick and pushes the value to a
//!   [`RemoteSink`]. Sink failures are logged and dropped; they never reach the
//!   detection loop.
//!
//! [`Pipeline::run`] wires both loops together and joins the publisher before
//! returning, so shutdown ordering is explicit.

pub mod cell;
pub mod config;
pub mod count;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod render;
pub mod sink;

pub use cell::{Count, CountCell};
pub use config::HeadcountConfig;
pub use count::{count_matching, filter_matching, CountPolicy};
pub use detect::{
    BoundingBox, Detection, DetectionSet, DetectorBackend, ObjectClass, ScriptStep,
    ScriptedBackend, StubBackend,
};
pub use error::PipelineError;
pub use frame::Frame;
pub use ingest::{open_source, FrameSource, SourceConfig, SourceStats, SyntheticSource};
pub use pipeline::{
    DetectionLoop, DetectionState, Pipeline, PipelineSettings, Publisher, PublisherHandle,
    PublisherStats, RunReport, StopSignal, TickOutcome,
};
pub use render::{overlay_text, ConsoleRenderer, Renderer};
pub use sink::{LogSink, RemoteSink, SinkError};
