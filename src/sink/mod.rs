//! Remote sinks.
//!
//! A sink is a key-value store with a single `set(path, value)` operation. It
//! may be slow or unreachable; implementations MUST bound every call (request
//! timeout or non-blocking enqueue) so the publisher loop keeps its cadence.
//!
//! Available sinks:
//! - REST realtime database (`PUT {url}/{path}.json`)
//! - MQTT broker (retained publish to topic `path`)
//! - Log sink (dry runs)

mod log_sink;
pub mod mqtt;
pub mod rest;

use anyhow::{anyhow, Result};
use std::time::Duration;

pub use log_sink::LogSink;
pub use mqtt::{parse_mqtt_endpoint, MqttEndpoint, MqttSink};
pub use rest::RestSink;

use crate::cell::Count;
use crate::config::SinkSettings;

/// Why a single `set` did not complete.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkError {
    /// The store rejected the write or could not be reached.
    Unavailable(String),
    /// The write did not complete within the sink's deadline.
    Timeout(Duration),
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(reason) => write!(f, "sink unavailable: {}", reason),
            Self::Timeout(after) => write!(f, "sink timed out after {}ms", after.as_millis()),
        }
    }
}

impl std::error::Error for SinkError {}

/// Remote key-value sink.
pub trait RemoteSink: Send {
    /// Sink identifier for log lines.
    fn name(&self) -> &'static str;

    /// Store `value` under `path`. Must return within a bounded time.
    fn set(&mut self, path: &str, value: Count) -> std::result::Result<(), SinkError>;

    /// Release connections. Called once when the publisher loop exits.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Build the sink named in the configuration.
pub fn build_sink(settings: &SinkSettings) -> Result<Box<dyn RemoteSink>> {
    match settings.kind.as_str() {
        "rest" => Ok(Box::new(RestSink::from_settings(settings)?)),
        "mqtt" => Ok(Box::new(MqttSink::from_settings(settings)?)),
        "log" => Ok(Box::new(LogSink::new())),
        other => Err(anyhow!(
            "unknown sink kind '{}': expected 'rest', 'mqtt' or 'log'",
            other
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_error_messages_name_the_cause() {
        assert_eq!(
            SinkError::Unavailable("status 503".into()).to_string(),
            "sink unavailable: status 503"
        );
        assert_eq!(
            SinkError::Timeout(Duration::from_millis(1500)).to_string(),
            "sink timed out after 1500ms"
        );
    }

    #[test]
    fn unknown_sink_kind_is_rejected() {
        let settings = SinkSettings {
            kind: "carrier-pigeon".to_string(),
            ..SinkSettings::default()
        };
        let err = build_sink(&settings).err().unwrap();
        assert!(err.to_string().contains("unknown sink kind"));
    }

    #[test]
    fn log_sink_builds_without_credentials() -> Result<()> {
        let settings = SinkSettings {
            kind: "log".to_string(),
            ..SinkSettings::default()
        };
        let mut sink = build_sink(&settings)?;
        assert_eq!(sink.name(), "log");
        assert!(sink.set("fire_alarm/detectedHumans", 2).is_ok());
        Ok(())
    }
}
