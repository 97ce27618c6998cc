use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

pub mod time;

/// A single fixed-duration archive chunk, as written to the object store by nPVR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveChunk {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Object key relative to the bucket root.
    pub path: String,
}

impl ArchiveChunk {
    pub fn new(channel: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let path = format!(
            "{}/{}/{}--{}.ismv",
            channel,
            start.format("%Y-%m-%d"),
            timestamp(&start),
            timestamp(&end),
        );

        Self { start, end, path }
    }
}

/// UTC timestamp as used in archive keys and tool arguments: `2021-01-01T10:00:00Z`.
/// Fractional seconds only appear when they are non-zero, and then always with microsecond
/// precision (`2021-01-01T10:00:02.500000Z`), matching the keys nPVR writes.
pub fn timestamp(ts: &DateTime<Utc>) -> String {
    let format = if ts.timestamp_subsec_nanos() == 0 {
        SecondsFormat::Secs
    } else {
        SecondsFormat::Micros
    };

    ts.to_rfc3339_opts(format, true)
}

/// Base name shared by the SMIL and remixed mp4 of one publication:
/// `{event}-{first chunk start}--{last chunk end}`.
pub fn period_name(event_name: &str, chunks: &[ArchiveChunk]) -> Option<String> {
    let first = chunks.first()?;
    let last = chunks.last()?;

    Some(format!(
        "{}-{}--{}",
        event_name,
        timestamp(&first.start),
        timestamp(&last.end)
    ))
}
