//! headcountd - count people in a video feed and relay the count.
//!
//! This daemon:
//! 1. Opens the configured frame source (synthetic or V4L2 webcam)
//! 2. Runs a detector backend on every frame and keeps the latest count
//! 3. Publishes that count to a remote sink (REST database, MQTT or log)
//!    at a fixed period until Ctrl-C or the source runs dry

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use headcount::{
    config::HeadcountConfig, detect::build_detector, open_source, sink::build_sink,
    ConsoleRenderer, Pipeline, StopSignal,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Count people in a video feed and relay the count to a remote store"
)]
struct Args {
    /// JSON configuration file.
    #[arg(long, env = "HEADCOUNT_CONFIG")]
    config: Option<PathBuf>,

    /// Frame source URI (stub://name or /dev/videoN).
    #[arg(long)]
    source: Option<String>,

    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,

    /// Remote sink kind (rest|mqtt|log).
    #[arg(long)]
    sink: Option<String>,

    /// Publish period in milliseconds.
    #[arg(long)]
    period_ms: Option<u64>,

    /// Do not print per-frame counts.
    #[arg(long)]
    no_render: bool,

    /// UI mode for stderr progress (auto|plain|pretty).
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let cfg = {
        let stage = ui.stage("Load configuration");
        let cfg = load_config(&args)?;
        stage.done();
        cfg
    };
    log::info!(
        "headcountd {} source={} detector={} sink={} path={} period={}ms",
        env!("CARGO_PKG_VERSION"),
        cfg.source.uri,
        cfg.detector.backend,
        cfg.sink.kind,
        cfg.sink.path,
        cfg.publish_period.as_millis()
    );

    let source = {
        let stage = ui.stage("Open frame source");
        let source = open_source(&cfg.source)?;
        stage.done();
        source
    };
    let detector = {
        let stage = ui.stage("Load detector");
        let detector = build_detector(&cfg.detector)?;
        stage.done();
        detector
    };
    let sink = {
        let stage = ui.stage("Connect remote sink");
        let sink = build_sink(&cfg.sink)?;
        stage.done();
        sink
    };

    let mut pipeline = Pipeline::new(source, detector, sink, cfg.pipeline_settings());
    if cfg.render {
        pipeline = pipeline.with_renderer(Box::new(ConsoleRenderer::new(cfg.policy.label)));
    }

    let stop = StopSignal::new();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || {
        log::info!("shutdown signal received, stopping loops...");
        handler_stop.trigger();
    })
    .context("error setting Ctrl-C handler")?;

    let report = pipeline.run(stop)?;
    log::info!(
        "run finished: frames={} ticks={} published={} failed={} skipped_deadlines={} last={:?}",
        report.frames_processed,
        report.publisher.ticks,
        report.publisher.published,
        report.publisher.failed,
        report.publisher.skipped_deadlines,
        report.publisher.last_published
    );

    match report.outcome {
        Ok(()) => Ok(()),
        Err(e) => Err(anyhow!("pipeline halted [{}]: {}", e.code(), e)),
    }
}

fn load_config(args: &Args) -> Result<HeadcountConfig> {
    let mut cfg = HeadcountConfig::resolve(args.config.as_deref())?;
    if let Some(source) = &args.source {
        cfg.set_source_uri(source.clone());
    }
    if let Some(max_frames) = args.max_frames {
        cfg.source.max_frames = Some(max_frames);
    }
    if let Some(sink) = &args.sink {
        cfg.sink.kind = sink.clone();
    }
    if let Some(period_ms) = args.period_ms {
        cfg.publish_period = Duration::from_millis(period_ms);
    }
    if args.no_render {
        cfg.render = false;
    }
    cfg.validate().context("invalid configuration")?;
    Ok(cfg)
}
