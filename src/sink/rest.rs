//! REST realtime-database sink.
//!
//! Writes the count as a bare JSON integer with
//! `PUT {base_url}/{path}.json?auth={credential}`, the wire format of
//! Firebase-style realtime databases. Every request runs under the agent's
//! overall timeout so a dead endpoint costs at most one timeout per tick.

use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::time::Duration;
use url::Url;

use super::{RemoteSink, SinkError};
use crate::cell::Count;
use crate::config::SinkSettings;

pub struct RestSink {
    agent: ureq::Agent,
    base_url: Url,
    credential: String,
    timeout: Duration,
}

impl RestSink {
    pub fn new(base_url: &str, credential: String, timeout: Duration) -> Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("invalid sink url {}", base_url))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "sink url must use http or https, got {}",
                base_url.scheme()
            ));
        }
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Ok(Self {
            agent,
            base_url,
            credential,
            timeout,
        })
    }

    pub fn from_settings(settings: &SinkSettings) -> Result<Self> {
        let url = settings
            .url
            .as_deref()
            .ok_or_else(|| anyhow!("rest sink requires a url"))?;
        let credential = load_credential(
            settings.credential.as_deref(),
            settings.credential_path.as_deref(),
        )?;
        Self::new(url, credential, settings.timeout)
    }

    /// Target URL for `path`, without the credential.
    pub fn endpoint_for(&self, path: &str) -> String {
        let mut url = self.base_url.clone();
        let prefix = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{}/{}.json", prefix, path.trim_matches('/')));
        url.set_query(None);
        url.to_string()
    }

    fn classify(&self, err: ureq::Error) -> SinkError {
        match err {
            ureq::Error::Status(code, response) => {
                SinkError::Unavailable(format!("status {} {}", code, response.status_text()))
            }
            ureq::Error::Transport(transport) => {
                if is_timeout(&transport) {
                    SinkError::Timeout(self.timeout)
                } else {
                    SinkError::Unavailable(self.redact(&transport.to_string()))
                }
            }
        }
    }

    fn redact(&self, message: &str) -> String {
        if self.credential.is_empty() {
            message.to_string()
        } else {
            message.replace(&self.credential, "***")
        }
    }
}

impl RemoteSink for RestSink {
    fn name(&self) -> &'static str {
        "rest"
    }

    fn set(&mut self, path: &str, value: Count) -> Result<(), SinkError> {
        let endpoint = self.endpoint_for(path);
        let mut request = self
            .agent
            .put(&endpoint)
            .set("Content-Type", "application/json");
        if !self.credential.is_empty() {
            request = request.query("auth", &self.credential);
        }
        request
            .send_string(&value.to_string())
            .map(|_| ())
            .map_err(|e| self.classify(e))
    }
}

fn is_timeout(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            ) {
                return true;
            }
        }
        current = e.source();
    }
    false
}

/// Resolve the sink credential: inline value first, then file contents.
pub fn load_credential(inline: Option<&str>, path: Option<&Path>) -> Result<String> {
    if let Some(token) = inline {
        let trimmed = token.trim().to_string();
        if trimmed.is_empty() {
            return Err(anyhow!("HEADCOUNT_CREDENTIAL is empty"));
        }
        return Ok(trimmed);
    }
    let path = path
        .ok_or_else(|| anyhow!("HEADCOUNT_CREDENTIAL_PATH or HEADCOUNT_CREDENTIAL is required"))?;
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read credential file {}", path.display()))?;
    let token = contents.trim().to_string();
    if token.is_empty() {
        return Err(anyhow!("credential file {} is empty", path.display()));
    }
    Ok(token)
}
