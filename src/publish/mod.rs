//! Periodic emission of computed complement sets.
//!
//! Complement sets are computed once and handed to a [`Publisher`] as
//! immutable snapshots. The publisher re-emits every snapshot on its channel
//! each cycle; a [`Ticker`] paces the cycles and a shared running flag stops
//! the loop.
//!
//! Sinks:
//! - [`DirectorySink`]: one point cloud file per channel, rewritten each cycle
//! - [`LogSink`]: logs channel name and point count

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::core::loaders::PointCloud;
use crate::core::writers::{write_cloud, WriteError};
use crate::processors::complement::AlgorithmComplement;

/// Errors that can occur while emitting.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("failed to write channel '{channel}': {source}")]
    Write {
        channel: String,
        #[source]
        source: WriteError,
    },
}

/// Result type for publish operations.
pub type Result<T> = std::result::Result<T, PublishError>;

/// Destination for emitted point sets.
pub trait PublishSink {
    fn publish(&mut self, channel: &str, cloud: &PointCloud) -> Result<()>;
}

impl<S: PublishSink + ?Sized> PublishSink for Box<S> {
    fn publish(&mut self, channel: &str, cloud: &PointCloud) -> Result<()> {
        (**self).publish(channel, cloud)
    }
}

/// Every sink receives every emission, in order.
impl<S: PublishSink> PublishSink for Vec<S> {
    fn publish(&mut self, channel: &str, cloud: &PointCloud) -> Result<()> {
        for sink in self.iter_mut() {
            sink.publish(channel, cloud)?;
        }
        Ok(())
    }
}

/// Paces publish cycles.
pub trait Ticker {
    /// Block until the next cycle is due.
    fn wait(&mut self);
}

/// Fixed-rate ticker driven by the monotonic clock.
///
/// Deadlines advance by one period per tick. A tick that is already late
/// returns immediately and the schedule restarts from now, so a slow sink
/// never causes a burst of catch-up cycles.
pub struct IntervalTicker {
    period: Duration,
    next: Instant,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next: Instant::now() + period,
        }
    }

    pub fn from_hz(rate_hz: f64) -> Self {
        Self::new(Duration::from_secs_f64(1.0 / rate_hz))
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Ticker for IntervalTicker {
    fn wait(&mut self) {
        let now = Instant::now();
        if self.next > now {
            thread::sleep(self.next - now);
            self.next += self.period;
        } else {
            self.next = now + self.period;
        }
    }
}

/// Writes each channel to `<dir>/<channel>.<extension>`, with `/` in the
/// channel name replaced by `_`.
pub struct DirectorySink {
    dir: PathBuf,
    extension: String,
}

impl DirectorySink {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self::with_extension(dir, "pcd")
    }

    pub fn with_extension<P: AsRef<Path>>(dir: P, extension: &str) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    /// File a channel is written to.
    pub fn channel_path(&self, channel: &str) -> PathBuf {
        let stem = channel.trim_matches('/').replace('/', "_");
        self.dir.join(format!("{}.{}", stem, self.extension))
    }
}

impl PublishSink for DirectorySink {
    fn publish(&mut self, channel: &str, cloud: &PointCloud) -> Result<()> {
        let path = self.channel_path(channel);
        write_cloud(&path, cloud).map_err(|source| PublishError::Write {
            channel: channel.to_string(),
            source,
        })
    }
}

/// Logs each emission at debug level.
#[derive(Debug, Default)]
pub struct LogSink;

impl PublishSink for LogSink {
    fn publish(&mut self, channel: &str, cloud: &PointCloud) -> Result<()> {
        log::debug!("{}: {} points", channel, cloud.len());
        Ok(())
    }
}

/// A named, immutable point set to re-emit every cycle.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub channel: String,
    pub cloud: PointCloud,
}

/// Re-emits a fixed set of snapshots on a schedule.
#[derive(Debug, Clone)]
pub struct Publisher {
    snapshots: Vec<Snapshot>,
    log_every: u64,
}

impl Publisher {
    pub fn new(snapshots: Vec<Snapshot>) -> Self {
        Self {
            snapshots,
            log_every: 0,
        }
    }

    /// One snapshot per algorithm, on its `<name>/static` channel.
    pub fn from_results(results: &[AlgorithmComplement]) -> Self {
        Self::new(
            results
                .iter()
                .map(|r| Snapshot {
                    channel: r.channel.clone(),
                    cloud: r.complement.clone(),
                })
                .collect(),
        )
    }

    /// Log a progress line every `n` cycles (0 disables).
    pub fn with_log_every(mut self, n: u64) -> Self {
        self.log_every = n;
        self
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    /// Emit every snapshot once, in order.
    pub fn emit_once<S: PublishSink + ?Sized>(&self, sink: &mut S) -> Result<()> {
        for snapshot in &self.snapshots {
            sink.publish(&snapshot.channel, &snapshot.cloud)?;
        }
        Ok(())
    }

    /// Emit until `running` is cleared or `max_cycles` cycles have run.
    ///
    /// Returns the number of completed cycles. The first error from the sink
    /// stops the loop.
    pub fn run<S, T>(
        &self,
        sink: &mut S,
        ticker: &mut T,
        running: &AtomicBool,
        max_cycles: Option<u64>,
    ) -> Result<u64>
    where
        S: PublishSink + ?Sized,
        T: Ticker + ?Sized,
    {
        let mut cycles = 0u64;

        while running.load(Ordering::Relaxed) {
            self.emit_once(sink)?;
            cycles += 1;

            if self.log_every > 0 && cycles % self.log_every == 0 {
                log::info!("On {}th publish", cycles);
            }
            if max_cycles.is_some_and(|max| cycles >= max) {
                break;
            }

            ticker.wait();
        }

        log::info!("Publisher stopped after {} cycles", cycles);
        Ok(cycles)
    }
}
