//! MQTT sink.
//!
//! Publishes each count as a retained QoS 1 message on topic `path`. Publishing
//! goes through `try_publish`, which only enqueues: a stalled broker fills the
//! request queue and surfaces as `SinkError::Unavailable` instead of blocking
//! the publisher loop. A background thread drives the connection and keeps
//! reconnecting until the sink is closed.

use anyhow::{anyhow, Context, Result};
use rumqttc::v5::{mqttbytes::QoS, Client, Connection, Event, MqttOptions};
use rumqttc::Transport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{RemoteSink, SinkError};
use crate::cell::Count;
use crate::config::SinkSettings;

const DEFAULT_CLIENT_ID: &str = "headcountd";
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);
const REQUEST_QUEUE_CAPACITY: usize = 10;

/// Broker address split into parts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MqttEndpoint {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
}

/// Parse `mqtt://host:port`, `mqtts://host:port` or bare `host:port`.
pub fn parse_mqtt_endpoint(addr: &str) -> Result<MqttEndpoint> {
    let mut use_tls = false;
    let mut remainder = addr.trim();

    if let Some((scheme, rest)) = remainder.split_once("://") {
        match scheme {
            "mqtt" | "tcp" => {}
            "mqtts" | "ssl" => use_tls = true,
            other => return Err(anyhow!("unsupported MQTT scheme: {}", other)),
        }
        remainder = rest;
    }

    let (host, port) = split_host_port(remainder)?;
    Ok(MqttEndpoint {
        host,
        port,
        use_tls,
    })
}

fn split_host_port(addr: &str) -> Result<(String, u16)> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("invalid MQTT address: {}", addr))?;
        let port = rest
            .strip_prefix(':')
            .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
        let port: u16 = port.parse().context("invalid MQTT port")?;
        return Ok((host.to_string(), port));
    }

    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
    if host.is_empty() {
        return Err(anyhow!("missing MQTT host in {}", addr));
    }
    let port: u16 = port.parse().context("invalid MQTT port")?;
    Ok((host.to_string(), port))
}

pub struct MqttSink {
    client: Client,
    closing: Arc<AtomicBool>,
    connection_handle: Option<std::thread::JoinHandle<()>>,
}

impl MqttSink {
    pub fn connect(
        endpoint: &MqttEndpoint,
        client_id: &str,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<Self> {
        let mut options = MqttOptions::new(client_id, &endpoint.host, endpoint.port);
        options.set_keep_alive(Duration::from_secs(30));
        options.set_clean_start(true);
        if let Some(user) = username {
            options.set_credentials(user, password.unwrap_or_default());
        }
        if endpoint.use_tls {
            options.set_transport(Transport::tls_with_default_config());
        }

        let (client, connection) = Client::new(options, REQUEST_QUEUE_CAPACITY);
        let closing = Arc::new(AtomicBool::new(false));
        let handle = spawn_connection_driver(connection, closing.clone())?;
        log::info!(
            "MqttSink: connecting to {}:{} (TLS: {}, auth: {})",
            endpoint.host,
            endpoint.port,
            endpoint.use_tls,
            username.is_some()
        );

        Ok(Self {
            client,
            closing,
            connection_handle: Some(handle),
        })
    }

    pub fn from_settings(settings: &SinkSettings) -> Result<Self> {
        let addr = settings
            .url
            .as_deref()
            .ok_or_else(|| anyhow!("mqtt sink requires a broker address"))?;
        let endpoint = parse_mqtt_endpoint(addr)?;
        Self::connect(
            &endpoint,
            settings.client_id.as_deref().unwrap_or(DEFAULT_CLIENT_ID),
            settings.username.as_deref(),
            settings.password.as_deref(),
        )
    }
}

fn spawn_connection_driver(
    mut connection: Connection,
    closing: Arc<AtomicBool>,
) -> Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("headcount-mqtt".into())
        .spawn(move || {
            for event in connection.iter() {
                match event {
                    Ok(Event::Outgoing(_)) if closing.load(Ordering::SeqCst) => break,
                    Ok(Event::Incoming(_)) | Ok(Event::Outgoing(_)) => {}
                    Err(e) => {
                        if closing.load(Ordering::SeqCst) {
                            break;
                        }
                        log::warn!("MQTT connection error: {}", e);
                        std::thread::sleep(RECONNECT_BACKOFF);
                    }
                }
            }
        })
        .context("spawn mqtt connection thread")
}

impl RemoteSink for MqttSink {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    fn set(&mut self, path: &str, value: Count) -> Result<(), SinkError> {
        self.client
            .try_publish(path, QoS::AtLeastOnce, true, value.to_string().into_bytes())
            .map_err(|e| SinkError::Unavailable(e.to_string()))
    }

    fn close(&mut self) -> Result<()> {
        self.closing.store(true, Ordering::SeqCst);
        let handle = self.connection_handle.take();
        if let Err(e) = self.client.try_disconnect() {
            // Queue is full, so the driver may never see the disconnect; leave it detached.
            log::debug!("MQTT disconnect request failed: {}", e);
            return Ok(());
        }
        if let Some(handle) = handle {
            let _ = handle.join();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_tls_endpoints() -> Result<()> {
        assert_eq!(
            parse_mqtt_endpoint("127.0.0.1:1883")?,
            MqttEndpoint {
                host: "127.0.0.1".into(),
                port: 1883,
                use_tls: false
            }
        );
        let tls = parse_mqtt_endpoint("mqtts://broker.local:8883")?;
        assert!(tls.use_tls);
        assert_eq!(tls.host, "broker.local");
        let v6 = parse_mqtt_endpoint("[::1]:1883")?;
        assert_eq!(v6.host, "::1");
        Ok(())
    }

    #[test]
    fn rejects_malformed_endpoints() {
        assert!(parse_mqtt_endpoint("broker.local").is_err());
        assert!(parse_mqtt_endpoint("http://broker:80").is_err());
        assert!(parse_mqtt_endpoint(":1883").is_err());
        assert!(parse_mqtt_endpoint("broker:notaport").is_err());
    }

    #[test]
    fn publish_without_broker_fails_fast_once_queue_fills() -> Result<()> {
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
            listener.local_addr()?
        };
        let endpoint = parse_mqtt_endpoint(&addr.to_string())?;
        let mut sink = MqttSink::connect(&endpoint, "headcount-test", None, None)?;

        let started = std::time::Instant::now();
        let mut failures = 0;
        for i in 0..(REQUEST_QUEUE_CAPACITY as u32 * 3) {
            if sink.set("fire_alarm/detectedHumans", i).is_err() {
                failures += 1;
            }
        }
        assert!(failures > 0);
        assert!(started.elapsed() < Duration::from_secs(1));
        sink.close()?;
        Ok(())
    }
}
