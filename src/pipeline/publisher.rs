//! Publisher loop.
//!
//! Reads the count cell on a fixed period and pushes the value to the remote
//! sink. Delivery is best effort: a failed tick is logged and dropped, never
//! retried, and the next tick fires on its own schedule.

use anyhow::{anyhow, Context, Result};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::cell::{Count, CountCell};
use crate::sink::{RemoteSink, SinkError};

use super::StopSignal;

const HEALTH_INTERVAL: Duration = Duration::from_secs(5);

/// Counters reported when the publisher exits.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PublisherStats {
    pub ticks: u64,
    pub published: u64,
    pub failed: u64,
    /// Deadlines skipped because a publish overran the period.
    pub skipped_deadlines: u64,
    pub last_published: Option<Count>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Published(Count),
    Failed(SinkError),
}

pub struct Publisher {
    cell: CountCell,
    sink: Box<dyn RemoteSink>,
    path: String,
    stats: PublisherStats,
}

impl Publisher {
    pub fn new(cell: CountCell, sink: Box<dyn RemoteSink>, path: impl Into<String>) -> Self {
        Self {
            cell,
            sink,
            path: path.into(),
            stats: PublisherStats::default(),
        }
    }

    pub fn stats(&self) -> &PublisherStats {
        &self.stats
    }

    /// Publish the current count once.
    pub fn tick(&mut self) -> TickOutcome {
        self.stats.ticks += 1;
        let count = self.cell.read();
        match self.sink.set(&self.path, count) {
            Ok(()) => {
                self.stats.published += 1;
                self.stats.last_published = Some(count);
                log::debug!("tick {}: {} = {}", self.stats.ticks, self.path, count);
                TickOutcome::Published(count)
            }
            Err(e) => {
                self.stats.failed += 1;
                log::warn!(
                    "tick {}: publish to sink '{}' failed, dropping value {}: {}",
                    self.stats.ticks,
                    self.sink.name(),
                    count,
                    e
                );
                TickOutcome::Failed(e)
            }
        }
    }

    /// Tick every `period` until `stop` fires. The first tick is immediate and
    /// unconditional, so a run that stops before this thread is scheduled still
    /// publishes the latest count once.
    ///
    /// Tick k is due at `start + (k - 1) * period`. When a publish overruns,
    /// the deadlines it swallowed are skipped rather than fired back to back.
    /// On stop, one more tick runs if the cell changed since the last
    /// successful publish.
    pub fn run(&mut self, period: Duration, stop: &StopSignal) -> PublisherStats {
        log::info!(
            "publisher started: sink={} path={} period={}ms",
            self.sink.name(),
            self.path,
            period.as_millis()
        );

        let mut next_due = Instant::now();
        let mut last_health_log = next_due;
        loop {
            self.tick();

            if last_health_log.elapsed() >= HEALTH_INTERVAL {
                log::info!(
                    "publisher health ticks={} published={} failed={} skipped_deadlines={}",
                    self.stats.ticks,
                    self.stats.published,
                    self.stats.failed,
                    self.stats.skipped_deadlines
                );
                last_health_log = Instant::now();
            }

            next_due += period;
            let now = Instant::now();
            if next_due <= now {
                let behind = now.duration_since(next_due).as_nanos();
                let skipped = (behind / period.as_nanos().max(1)) as u64 + 1;
                self.stats.skipped_deadlines += skipped;
                next_due += period.saturating_mul(u32::try_from(skipped).unwrap_or(u32::MAX));
                log::debug!("publisher overran its period, skipped {} deadline(s)", skipped);
            }

            if stop.wait_timeout(next_due.saturating_duration_since(Instant::now())) {
                break;
            }
        }

        // Final flush: the detection loop may have written after the last tick.
        if self.stats.last_published != Some(self.cell.read()) {
            self.tick();
        }

        if let Err(e) = self.sink.close() {
            log::warn!("failed to close sink '{}': {:#}", self.sink.name(), e);
        }
        log::info!(
            "publisher stopped: ticks={} published={} failed={}",
            self.stats.ticks,
            self.stats.published,
            self.stats.failed
        );
        self.stats.clone()
    }

    /// Run on a dedicated thread.
    pub fn spawn(mut self, period: Duration, stop: StopSignal) -> Result<PublisherHandle> {
        if period.is_zero() {
            return Err(anyhow!("publish period must be greater than zero"));
        }
        let thread_stop = stop.clone();
        let handle = std::thread::Builder::new()
            .name("headcount-publisher".into())
            .spawn(move || self.run(period, &thread_stop))
            .context("spawn publisher thread")?;
        Ok(PublisherHandle { handle, stop })
    }
}

/// Owned handle to a running publisher thread.
pub struct PublisherHandle {
    handle: JoinHandle<PublisherStats>,
    stop: StopSignal,
}

impl PublisherHandle {
    /// Trigger the stop signal and wait for the thread to exit.
    pub fn stop(self) -> Result<PublisherStats> {
        self.stop.trigger();
        self.join()
    }

    /// Wait for the thread to exit on its own.
    pub fn join(self) -> Result<PublisherStats> {
        self.handle
            .join()
            .map_err(|_| anyhow!("publisher thread panicked"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<(String, Count)>>>,
    }

    struct RecordingSink {
        recorder: Recorder,
        fail_on: Vec<usize>,
    }

    impl RemoteSink for RecordingSink {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn set(&mut self, path: &str, value: Count) -> Result<(), SinkError> {
            let mut calls = self.recorder.calls.lock().unwrap();
            calls.push((path.to_string(), value));
            if self.fail_on.contains(&calls.len()) {
                return Err(SinkError::Unavailable("injected".into()));
            }
            Ok(())
        }
    }

    fn publisher(fail_on: Vec<usize>) -> (Publisher, CountCell, Recorder) {
        let cell = CountCell::new();
        let recorder = Recorder::default();
        let sink = RecordingSink {
            recorder: recorder.clone(),
            fail_on,
        };
        (
            Publisher::new(cell.clone(), Box::new(sink), "fire_alarm/detectedHumans"),
            cell,
            recorder,
        )
    }

    #[test]
    fn tick_publishes_current_cell_value() {
        let (mut publisher, cell, recorder) = publisher(vec![]);
        assert_eq!(publisher.tick(), TickOutcome::Published(0));
        cell.write(4);
        assert_eq!(publisher.tick(), TickOutcome::Published(4));
        assert_eq!(
            *recorder.calls.lock().unwrap(),
            vec![
                ("fire_alarm/detectedHumans".to_string(), 0),
                ("fire_alarm/detectedHumans".to_string(), 4)
            ]
        );
    }

    #[test]
    fn failed_tick_is_counted_not_retried() {
        let (mut publisher, cell, recorder) = publisher(vec![2]);
        cell.write(1);
        publisher.tick();
        assert!(matches!(publisher.tick(), TickOutcome::Failed(_)));
        publisher.tick();
        assert_eq!(recorder.calls.lock().unwrap().len(), 3);
        let stats = publisher.stats();
        assert_eq!((stats.ticks, stats.published, stats.failed), (3, 2, 1));
        assert_eq!(stats.last_published, Some(1));
    }

    #[test]
    fn spawned_publisher_stops_promptly() -> Result<()> {
        let (publisher, _cell, recorder) = publisher(vec![]);
        let handle = publisher.spawn(Duration::from_secs(30), StopSignal::new())?;
        std::thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        let stats = handle.stop()?;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(stats.ticks, 1);
        assert_eq!(recorder.calls.lock().unwrap().len(), 1);
        Ok(())
    }

    #[test]
    fn zero_period_is_rejected() {
        let (publisher, _, _) = publisher(vec![]);
        assert!(publisher.spawn(Duration::ZERO, StopSignal::new()).is_err());
    }

    #[test]
    fn pre_triggered_stop_still_publishes_once() {
        let (mut publisher, cell, recorder) = publisher(vec![]);
        cell.write(7);
        let stop = StopSignal::new();
        stop.trigger();

        let stats = publisher.run(Duration::from_secs(30), &stop);

        assert_eq!(stats.ticks, 1);
        assert_eq!(stats.last_published, Some(7));
        assert_eq!(recorder.calls.lock().unwrap().len(), 1);
    }

    /// Simulates the detection loop writing a final count and stopping while
    /// the first publish is in flight.
    struct LateWriteSink {
        cell: CountCell,
        stop: StopSignal,
        seen: Arc<Mutex<Vec<Count>>>,
    }

    impl RemoteSink for LateWriteSink {
        fn name(&self) -> &'static str {
            "late-write"
        }

        fn set(&mut self, _: &str, value: Count) -> Result<(), SinkError> {
            self.seen.lock().unwrap().push(value);
            self.cell.write(6);
            self.stop.trigger();
            Ok(())
        }
    }

    #[test]
    fn stop_flushes_count_written_after_last_tick() {
        let cell = CountCell::new();
        let stop = StopSignal::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = LateWriteSink {
            cell: cell.clone(),
            stop: stop.clone(),
            seen: seen.clone(),
        };
        let mut publisher = Publisher::new(cell, Box::new(sink), "count");

        let stats = publisher.run(Duration::from_secs(30), &stop);

        assert_eq!(*seen.lock().unwrap(), vec![0, 6]);
        assert_eq!(stats.ticks, 2);
        assert_eq!(stats.last_published, Some(6));
    }

    struct SlowSink {
        delay: Duration,
    }

    impl RemoteSink for SlowSink {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn set(&mut self, _: &str, _: Count) -> Result<(), SinkError> {
            std::thread::sleep(self.delay);
            Ok(())
        }
    }

    #[test]
    fn overrun_skips_deadlines_instead_of_bursting() {
        let mut publisher = Publisher::new(
            CountCell::new(),
            Box::new(SlowSink {
                delay: Duration::from_millis(35),
            }),
            "count",
        );
        let stop = StopSignal::new();
        let remote = stop.clone();
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            remote.trigger();
        });
        let stats = publisher.run(Duration::from_millis(10), &stop);
        stopper.join().unwrap();

        // Back-to-back catch-up would allow ~20 ticks in 200ms at a 10ms period.
        assert!(stats.ticks <= 8, "ticks = {}", stats.ticks);
        assert!(stats.skipped_deadlines > 0);
    }
}
