use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::archive::Archive;
use crate::chunk::time::ChunkWindow;
use crate::chunk::ArchiveChunk;
use crate::error::Result;
use crate::event::Event;
use crate::remix::{DescriptorWriter, Descriptors};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Result of a single pass over the archive.
#[derive(Debug, Clone, PartialEq)]
pub enum PassOutcome {
    /// The selection changed and new descriptors were written.
    Published(Descriptors),
    /// The selection is the one already published.
    Unchanged,
    /// No chunk of the window is archived yet.
    Empty,
}

/// Keeps the descriptors of one event in step with the archive. Each pass lists the
/// archive, selects the chunks of the event window, and republishes when the selection
/// changed since the last successful publication.
pub struct EventRunner<A> {
    archive: A,
    event: Event,
    window: ChunkWindow,
    dates: BTreeSet<String>,
    channel: String,
    writer: DescriptorWriter,
    poll_interval: Duration,
    once: bool,
    published: Vec<ArchiveChunk>,
}

impl<A: Archive> EventRunner<A> {
    pub fn new(
        archive: A,
        channel: impl Into<String>,
        event: Event,
        writer: DescriptorWriter,
    ) -> Self {
        let channel = channel.into();
        let window = event.window(&channel);
        let dates = window.dates();

        Self {
            archive,
            event,
            window,
            dates,
            channel,
            writer,
            poll_interval: DEFAULT_POLL_INTERVAL,
            once: false,
            published: Vec::new(),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;

        self
    }

    /// Stop after a single pass instead of following the archive.
    pub fn with_once(mut self, once: bool) -> Self {
        self.once = once;

        self
    }

    pub fn window(&self) -> &ChunkWindow {
        &self.window
    }

    /// The archived chunks of the event window, ordered by start time.
    pub async fn select(&self) -> Result<Vec<ArchiveChunk>> {
        let keys = self
            .archive
            .list_chunk_keys(&self.channel, &self.dates)
            .await?;

        Ok(self.window.select(&keys))
    }

    #[instrument(skip_all, fields(event = %self.event.name))]
    pub async fn poll(&mut self) -> Result<PassOutcome> {
        let chunks = self.select().await?;

        if chunks.is_empty() {
            warn!(
                channel = self.channel.as_str(),
                expected = self.window.expected(),
                "No archive chunks found for event window"
            );
            return Ok(PassOutcome::Empty);
        }

        if chunks == self.published {
            info!(chunks = chunks.len(), "No new chunks found");
            return Ok(PassOutcome::Unchanged);
        }

        info!(
            chunks = chunks.len(),
            expected = self.window.expected(),
            "New chunks found in archive, updating remix mp4 and isml"
        );
        let descriptors = self.writer.write(&self.event, &chunks).await?;
        self.published = chunks;

        Ok(PassOutcome::Published(descriptors))
    }

    /// Poll until the whole window is published, `shutdown` resolves, or after one pass in
    /// `once` mode. Failed passes are retried on the next poll, except in `once` mode where
    /// the error is returned.
    pub async fn run<F: Future<Output = ()>>(&mut self, shutdown: F) -> Result<()> {
        tokio::pin!(shutdown);

        loop {
            match self.poll().await {
                Ok(_) => {}
                Err(e) if self.once => return Err(e),
                Err(e) => warn!(error = %e, "Archive pass failed, retrying on next poll"),
            }

            if self.once {
                return Ok(());
            }
            if self.window.is_complete(&self.published) {
                info!(event = self.event.name.as_str(), "Event window fully published");
                return Ok(());
            }

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}

/// Resolves when `signal` fires. If listening for the signal fails, the error is logged
/// and the future never resolves, so the runner keeps going until the window completes.
pub async fn interrupted<S>(signal: S)
where
    S: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        warn!(error = %e, "Unable to listen for Ctrl-C, running until the window completes");
        std::future::pending::<()>().await;
    }
}
