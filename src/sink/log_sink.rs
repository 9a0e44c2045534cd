use crate::cell::Count;

use super::{RemoteSink, SinkError};

/// Sink that only logs. Useful for dry runs without a database.
#[derive(Debug, Default)]
pub struct LogSink {
    writes: u64,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RemoteSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn set(&mut self, path: &str, value: Count) -> Result<(), SinkError> {
        self.writes += 1;
        log::info!("sink[log] #{} {} = {}", self.writes, path, value);
        Ok(())
    }
}
