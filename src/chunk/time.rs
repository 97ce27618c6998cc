use std::collections::BTreeSet;

use chrono::{DateTime, TimeDelta, Utc};

use crate::chunk::ArchiveChunk;

/// The slots of the archive chunk grid that fall inside an event window.
///
/// The archive is cut on a fixed grid anchored at the Unix epoch: chunk `i` covers
/// `[EPOCH + i * interval, EPOCH + (i + 1) * interval)`. A window selects every slot from
/// the one containing `start` up to, but not including, the one containing `end`.
/// A partially covered final slot is therefore left out.
#[derive(Debug, Clone)]
pub struct ChunkWindow {
    channel: String,
    interval_ms: i64,
    first: i64,
    last: i64,
}

impl ChunkWindow {
    /// `interval` must be positive, which [crate::interval::parse_duration] guarantees.
    pub fn new(
        channel: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: TimeDelta,
    ) -> Self {
        let interval_ms = interval.num_milliseconds().max(1);

        Self {
            channel: channel.into(),
            interval_ms,
            first: start.timestamp_millis().div_euclid(interval_ms),
            last: end.timestamp_millis().div_euclid(interval_ms),
        }
    }

    /// Number of grid slots inside the window.
    pub fn expected(&self) -> usize {
        (self.last - self.first).max(0) as usize
    }

    /// Every slot of the window, in order, whether archived or not.
    pub fn slots(&self) -> impl Iterator<Item = ArchiveChunk> + '_ {
        (self.first..self.last).filter_map(move |i| {
            let start_ms = i.checked_mul(self.interval_ms)?;
            let start = DateTime::<Utc>::from_timestamp_millis(start_ms)?;
            let end = DateTime::<Utc>::from_timestamp_millis(start_ms + self.interval_ms)?;
            Some(ArchiveChunk::new(&self.channel, start, end))
        })
    }

    /// The window's slots that are present among `archived` object keys, ordered by start.
    /// Gaps in the archive are skipped.
    pub fn select(&self, archived: &BTreeSet<String>) -> Vec<ArchiveChunk> {
        self.slots()
            .filter(|chunk| archived.contains(&chunk.path))
            .collect()
    }

    /// Whether `selected` covers every slot of the window.
    pub fn is_complete(&self, selected: &[ArchiveChunk]) -> bool {
        self.expected() > 0 && selected.len() == self.expected()
    }

    /// The UTC dates (`YYYY-MM-DD`) under which the window's chunks are archived.
    pub fn dates(&self) -> BTreeSet<String> {
        self.slots()
            .map(|chunk| chunk.start.format("%Y-%m-%d").to_string())
            .collect()
    }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeSet;
    use std::str::FromStr;

    use chrono::{DateTime, TimeDelta, Utc};

    use crate::chunk::time::ChunkWindow;
    use crate::chunk::ArchiveChunk;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::<Utc>::from_str(s).unwrap()
    }

    fn archive(window: &ChunkWindow) -> BTreeSet<String> {
        window.slots().map(|chunk| chunk.path).collect()
    }

    #[test]
    pub fn test_aligned_window() {
        let window = ChunkWindow::new(
            "ch",
            ts("2021-03-04T10:00:00Z"),
            ts("2021-03-04T11:00:00Z"),
            TimeDelta::minutes(10),
        );

        assert_eq!(window.expected(), 6);
        let slots: Vec<ArchiveChunk> = window.slots().collect();
        assert_eq!(slots.first().unwrap().start, ts("2021-03-04T10:00:00Z"));
        assert_eq!(slots.last().unwrap().end, ts("2021-03-04T11:00:00Z"));
    }

    #[test]
    pub fn test_unaligned_window() {
        let window = ChunkWindow::new(
            "ch",
            ts("2021-03-04T10:05:00Z"),
            ts("2021-03-04T10:35:00Z"),
            TimeDelta::minutes(10),
        );

        let slots: Vec<ArchiveChunk> = window.slots().collect();
        assert_eq!(slots.len(), 3);
        // The chunk containing the start is included, the one containing the end is not.
        assert_eq!(slots[0].start, ts("2021-03-04T10:00:00Z"));
        assert_eq!(slots[2].end, ts("2021-03-04T10:30:00Z"));
    }

    #[test]
    pub fn test_select_skips_gaps_and_foreign_keys() {
        let window = ChunkWindow::new(
            "ch",
            ts("2021-03-04T10:00:00Z"),
            ts("2021-03-04T10:40:00Z"),
            TimeDelta::minutes(10),
        );
        let mut archived = archive(&window);
        archived.remove("ch/2021-03-04/2021-03-04T10:10:00Z--2021-03-04T10:20:00Z.ismv");
        archived.insert("ch/2021-03-04/2021-03-04T09:50:00Z--2021-03-04T10:00:00Z.ismv".into());
        archived.insert("ch/2021-03-04/notes.txt".into());

        let selected = window.select(&archived);
        let starts: Vec<String> = selected
            .iter()
            .map(|chunk| crate::chunk::timestamp(&chunk.start))
            .collect();

        assert_eq!(
            starts,
            vec![
                "2021-03-04T10:00:00Z",
                "2021-03-04T10:20:00Z",
                "2021-03-04T10:30:00Z"
            ]
        );
        assert!(!window.is_complete(&selected));
        assert!(window.is_complete(&window.select(&archive(&window))));
    }

    #[test]
    pub fn test_empty_window() {
        let window = ChunkWindow::new(
            "ch",
            ts("2021-03-04T10:01:00Z"),
            ts("2021-03-04T10:09:00Z"),
            TimeDelta::minutes(10),
        );

        assert_eq!(window.expected(), 0);
        assert!(window.select(&BTreeSet::new()).is_empty());
        assert!(!window.is_complete(&[]));
    }

    #[test]
    pub fn test_sub_second_interval_keys() {
        let window = ChunkWindow::new(
            "ch",
            ts("2021-03-04T10:00:00Z"),
            ts("2021-03-04T10:00:05Z"),
            TimeDelta::milliseconds(2500),
        );

        let paths: Vec<String> = window.slots().map(|chunk| chunk.path).collect();
        assert_eq!(
            paths,
            vec![
                "ch/2021-03-04/2021-03-04T10:00:00Z--2021-03-04T10:00:02.500000Z.ismv",
                "ch/2021-03-04/2021-03-04T10:00:02.500000Z--2021-03-04T10:00:05Z.ismv",
            ]
        );

        let mut archived = BTreeSet::new();
        archived.insert(
            "ch/2021-03-04/2021-03-04T10:00:00Z--2021-03-04T10:00:02.500000Z.ismv".to_string(),
        );
        assert_eq!(window.select(&archived).len(), 1);
    }

    #[test]
    pub fn test_dates_span_midnight() {
        let window = ChunkWindow::new(
            "ch",
            ts("2021-03-04T23:40:00Z"),
            ts("2021-03-05T00:20:00Z"),
            TimeDelta::minutes(10),
        );

        let dates: Vec<String> = window.dates().into_iter().collect();
        assert_eq!(dates, vec!["2021-03-04", "2021-03-05"]);

        let slots: Vec<ArchiveChunk> = window.slots().collect();
        assert_eq!(
            slots[1].path,
            "ch/2021-03-04/2021-03-04T23:50:00Z--2021-03-05T00:00:00Z.ismv"
        );
        assert!(slots[2].path.starts_with("ch/2021-03-05/"));
    }
}
