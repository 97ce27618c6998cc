use chrono::{DateTime, TimeDelta, Utc};

use crate::chunk::time::ChunkWindow;
use crate::error::{Error, Result};

/// A request to publish the archive between `start` and `end` as a virtual channel named
/// `name`.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Seconds the Origin stays behind the live edge (`--time_shift`).
    pub delay: u64,
    /// Duration of a single archive chunk.
    pub interval: TimeDelta,
}

impl Event {
    pub fn new(
        name: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        delay: u64,
        interval: TimeDelta,
    ) -> Result<Self> {
        let name = name.into();

        if name.is_empty() {
            return Err(Error::InvalidEvent("name must not be empty".to_string()));
        }
        if name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(Error::InvalidEvent(format!(
                "name {name:?} must be a plain file name"
            )));
        }
        if start >= end {
            return Err(Error::InvalidEvent(format!(
                "start time {start} must be before end time {end}"
            )));
        }
        if interval <= TimeDelta::zero() {
            return Err(Error::InvalidEvent(
                "archive interval must be positive".to_string(),
            ));
        }

        if vod2live_start(start, interval).is_none() {
            return Err(Error::InvalidEvent(format!(
                "archive interval {interval} is too large for start time {start}"
            )));
        }
        if ChunkWindow::new("", start, end, interval).expected() == 0 {
            return Err(Error::InvalidEvent(format!(
                "window {start} to {end} does not cover a single archive chunk of {interval}"
            )));
        }

        Ok(Self {
            name,
            start,
            end,
            delay,
            interval,
        })
    }

    /// Where the vod2live timeline of the Origin begins: two chunks after the event start.
    /// Saturates for events built by hand with an interval [Event::new] would reject.
    pub fn vod2live_start_time(&self) -> DateTime<Utc> {
        vod2live_start(self.start, self.interval).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn window(&self, channel: &str) -> ChunkWindow {
        ChunkWindow::new(channel, self.start, self.end, self.interval)
    }

    pub fn expected_chunks(&self) -> usize {
        self.window("").expected()
    }
}

fn vod2live_start(start: DateTime<Utc>, interval: TimeDelta) -> Option<DateTime<Utc>> {
    start.checked_add_signed(interval.checked_mul(2)?)
}
