use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::count::CountPolicy;
use crate::detect::ObjectClass;
use crate::ingest::SourceConfig;
use crate::pipeline::PipelineSettings;
use crate::sink::{parse_mqtt_endpoint, rest::load_credential};

const DEFAULT_SOURCE_URI: &str = "stub://camera";
/// Pacing for synthetic sources. Devices run at their natural rate (0).
const DEFAULT_SYNTHETIC_FPS: u32 = 10;
const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;
const DEFAULT_DETECTOR: &str = "stub";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_LABEL: &str = "person";
const DEFAULT_SINK_KIND: &str = "rest";
const DEFAULT_SINK_PATH: &str = "fire_alarm/detectedHumans";
const DEFAULT_SINK_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_PUBLISH_PERIOD_MS: u64 = 500;

/// Realtime-database keys may not contain `. $ # [ ]`; MQTT publish topics may
/// not contain `+` or `#`.
const SINK_PATH_PATTERN: &str = r"^[^.$#\[\]+/\s]+(/[^.$#\[\]+/\s]+)*$";

#[derive(Debug, Deserialize, Default)]
struct HeadcountConfigFile {
    source: Option<SourceConfigFile>,
    detector: Option<DetectorConfigFile>,
    count: Option<CountConfigFile>,
    sink: Option<SinkConfigFile>,
    publish: Option<PublishConfigFile>,
    render: Option<RenderConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    uri: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    max_frames: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct CountConfigFile {
    label: Option<String>,
    min_confidence: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct SinkConfigFile {
    kind: Option<String>,
    url: Option<String>,
    path: Option<String>,
    credential_path: Option<PathBuf>,
    timeout_ms: Option<u64>,
    username: Option<String>,
    password: Option<String>,
    client_id: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct PublishConfigFile {
    period_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct RenderConfigFile {
    enabled: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    /// `stub` or `tract`.
    pub backend: String,
    pub model_path: Option<PathBuf>,
    /// Square model input edge in pixels.
    pub input_size: u32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            backend: DEFAULT_DETECTOR.to_string(),
            model_path: None,
            input_size: DEFAULT_INPUT_SIZE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SinkSettings {
    /// `rest`, `mqtt` or `log`.
    pub kind: String,
    /// Database base URL (rest) or broker address (mqtt).
    pub url: Option<String>,
    pub path: String,
    pub credential: Option<String>,
    pub credential_path: Option<PathBuf>,
    pub timeout: Duration,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            kind: DEFAULT_SINK_KIND.to_string(),
            url: None,
            path: DEFAULT_SINK_PATH.to_string(),
            credential: None,
            credential_path: None,
            timeout: Duration::from_millis(DEFAULT_SINK_TIMEOUT_MS),
            username: None,
            password: None,
            client_id: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HeadcountConfig {
    pub source: SourceConfig,
    pub detector: DetectorSettings,
    pub policy: CountPolicy,
    pub sink: SinkSettings,
    pub publish_period: Duration,
    pub render: bool,
    /// Whether `source.target_fps` came from the file rather than the
    /// per-URI default.
    explicit_fps: bool,
}

impl HeadcountConfig {
    /// Load from the file named by `HEADCOUNT_CONFIG` (if set), apply
    /// environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("HEADCOUNT_CONFIG").ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut cfg = Self::resolve(path)?;
        cfg.validate().context("invalid configuration")?;
        Ok(cfg)
    }

    /// File and environment layers without validation, for callers that
    /// apply further overrides before calling [`HeadcountConfig::validate`].
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => HeadcountConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        Ok(cfg)
    }

    fn from_file(file: HeadcountConfigFile) -> Result<Self> {
        let source_file = file.source.unwrap_or_default();
        let uri = source_file
            .uri
            .unwrap_or_else(|| DEFAULT_SOURCE_URI.to_string());
        let explicit_fps = source_file.target_fps.is_some();
        let source = SourceConfig {
            target_fps: source_file
                .target_fps
                .unwrap_or_else(|| default_fps_for(&uri)),
            uri,
            width: source_file.width.unwrap_or(DEFAULT_SOURCE_WIDTH),
            height: source_file.height.unwrap_or(DEFAULT_SOURCE_HEIGHT),
            max_frames: source_file.max_frames,
        };

        let detector_file = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            backend: detector_file
                .backend
                .unwrap_or_else(|| DEFAULT_DETECTOR.to_string()),
            model_path: detector_file.model_path,
            input_size: detector_file.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
        };

        let count_file = file.count.unwrap_or_default();
        let label: ObjectClass = count_file
            .label
            .as_deref()
            .unwrap_or(DEFAULT_LABEL)
            .parse()?;
        let policy = CountPolicy::new(
            label,
            count_file
                .min_confidence
                .unwrap_or(CountPolicy::DEFAULT_MIN_CONFIDENCE),
        );

        let sink_file = file.sink.unwrap_or_default();
        let sink = SinkSettings {
            kind: sink_file
                .kind
                .unwrap_or_else(|| DEFAULT_SINK_KIND.to_string()),
            url: sink_file.url,
            path: sink_file
                .path
                .unwrap_or_else(|| DEFAULT_SINK_PATH.to_string()),
            credential: None,
            credential_path: sink_file.credential_path,
            timeout: Duration::from_millis(
                sink_file.timeout_ms.unwrap_or(DEFAULT_SINK_TIMEOUT_MS),
            ),
            username: sink_file.username,
            password: sink_file.password,
            client_id: sink_file.client_id,
        };

        let publish_period = Duration::from_millis(
            file.publish
                .and_then(|publish| publish.period_ms)
                .unwrap_or(DEFAULT_PUBLISH_PERIOD_MS),
        );
        let render = file
            .render
            .and_then(|render| render.enabled)
            .unwrap_or(true);

        Ok(Self {
            source,
            detector,
            policy,
            sink,
            publish_period,
            render,
            explicit_fps,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(uri) = non_empty_env("HEADCOUNT_SOURCE") {
            self.set_source_uri(uri);
        }
        if let Some(max) = non_empty_env("HEADCOUNT_MAX_FRAMES") {
            let frames: u64 = max
                .parse()
                .map_err(|_| anyhow!("HEADCOUNT_MAX_FRAMES must be a non-negative integer"))?;
            self.source.max_frames = Some(frames);
        }
        if let Some(backend) = non_empty_env("HEADCOUNT_DETECTOR") {
            self.detector.backend = backend;
        }
        if let Some(path) = non_empty_env("HEADCOUNT_MODEL_PATH") {
            self.detector.model_path = Some(PathBuf::from(path));
        }
        if let Some(label) = non_empty_env("HEADCOUNT_LABEL") {
            self.policy.label = label.parse()?;
        }
        if let Some(threshold) = non_empty_env("HEADCOUNT_MIN_CONFIDENCE") {
            self.policy.min_confidence = threshold
                .parse()
                .map_err(|_| anyhow!("HEADCOUNT_MIN_CONFIDENCE must be a number"))?;
        }
        if let Some(kind) = non_empty_env("HEADCOUNT_SINK") {
            self.sink.kind = kind;
        }
        if let Some(url) = non_empty_env("HEADCOUNT_SINK_URL") {
            self.sink.url = Some(url);
        }
        if let Some(path) = non_empty_env("HEADCOUNT_SINK_PATH") {
            self.sink.path = path;
        }
        if let Some(path) = non_empty_env("HEADCOUNT_CREDENTIAL_PATH") {
            self.sink.credential_path = Some(PathBuf::from(path));
        }
        if let Ok(credential) = std::env::var("HEADCOUNT_CREDENTIAL") {
            self.sink.credential = Some(credential);
        }
        if let Some(period) = non_empty_env("HEADCOUNT_PUBLISH_PERIOD_MS") {
            let millis: u64 = period.parse().map_err(|_| {
                anyhow!("HEADCOUNT_PUBLISH_PERIOD_MS must be an integer number of milliseconds")
            })?;
            self.publish_period = Duration::from_millis(millis);
        }
        Ok(())
    }

    /// Check every setting a run depends on. Call again after CLI overrides.
    ///
    /// For the REST sink the credential is resolved here, so a missing or
    /// empty credential file fails before any loop starts.
    pub fn validate(&mut self) -> Result<()> {
        if self.source.uri.trim().is_empty() {
            return Err(anyhow!("source uri must not be empty"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source width and height must be greater than zero"));
        }

        match self.detector.backend.as_str() {
            "stub" => {}
            "tract" => {
                if self.detector.model_path.is_none() {
                    return Err(anyhow!("tract detector requires detector.model_path"));
                }
            }
            other => {
                return Err(anyhow!(
                    "unknown detector backend '{}': expected 'stub' or 'tract'",
                    other
                ))
            }
        }
        if self.detector.input_size == 0 || self.detector.input_size % 32 != 0 {
            return Err(anyhow!("detector input_size must be a positive multiple of 32"));
        }

        let threshold = self.policy.min_confidence;
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(anyhow!("min_confidence must be within [0, 1], got {}", threshold));
        }

        if self.publish_period.is_zero() {
            return Err(anyhow!("publish period must be greater than zero"));
        }

        let path_pattern = Regex::new(SINK_PATH_PATTERN).context("compile sink path pattern")?;
        self.sink.path = self.sink.path.trim().trim_matches('/').to_string();
        if !path_pattern.is_match(&self.sink.path) {
            return Err(anyhow!(
                "invalid sink path '{}': use '/'-separated segments without . $ # [ ] + or spaces",
                self.sink.path
            ));
        }
        if self.sink.timeout.is_zero() {
            return Err(anyhow!("sink timeout must be greater than zero"));
        }

        match self.sink.kind.as_str() {
            "rest" => {
                let raw = self
                    .sink
                    .url
                    .as_deref()
                    .ok_or_else(|| anyhow!("rest sink requires sink.url (HEADCOUNT_SINK_URL)"))?;
                let url = Url::parse(raw).with_context(|| format!("invalid sink url {}", raw))?;
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(anyhow!("sink url must use http or https: {}", raw));
                }
                let credential = load_credential(
                    self.sink.credential.as_deref(),
                    self.sink.credential_path.as_deref(),
                )?;
                self.sink.credential = Some(credential);
            }
            "mqtt" => {
                let raw = self.sink.url.as_deref().ok_or_else(|| {
                    anyhow!("mqtt sink requires a broker address in sink.url (HEADCOUNT_SINK_URL)")
                })?;
                parse_mqtt_endpoint(raw)?;
                if self.sink.password.is_some() && self.sink.username.is_none() {
                    return Err(anyhow!("mqtt password given without a username"));
                }
            }
            "log" => {}
            other => {
                return Err(anyhow!(
                    "unknown sink kind '{}': expected 'rest', 'mqtt' or 'log'",
                    other
                ))
            }
        }
        Ok(())
    }

    /// Switch the frame source. Unless the file pinned `target_fps`, the
    /// pacing follows the new URI: synthetic sources are paced, devices are not.
    pub fn set_source_uri(&mut self, uri: String) {
        if !self.explicit_fps {
            self.source.target_fps = default_fps_for(&uri);
        }
        self.source.uri = uri;
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            policy: self.policy,
            publish_period: self.publish_period,
            sink_path: self.sink.path.clone(),
            ..PipelineSettings::default()
        }
    }
}

fn read_config_file(path: &Path) -> Result<HeadcountConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn default_fps_for(uri: &str) -> u32 {
    if uri.starts_with("stub://") {
        DEFAULT_SYNTHETIC_FPS
    } else {
        0
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
