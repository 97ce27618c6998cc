use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use clap::Parser;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vchannel::archive::s3::{new_s3_archive, S3ArchiveConfig};
use vchannel::chunk::ArchiveChunk;
use vchannel::event::Event;
use vchannel::interval::{format_duration, parse_duration};
use vchannel::remix::{DescriptorWriter, Toolchain};
use vchannel::runner::{interrupted, EventRunner};

/// Publish a window of the nPVR archive as a vod2live virtual channel.
#[derive(Parser)]
#[command(name = "vchannel", version, about)]
pub struct Cli {
    /// Name of the mp4 and isml files to create
    pub name: String,

    /// Start time of the event, defaults to the start of the current hour
    #[arg(long, env = "VCHANNEL_START_TIME", value_parser = parse_time)]
    pub start_time: Option<DateTime<Utc>>,

    /// End time of the event, defaults to one hour from now
    #[arg(long, env = "VCHANNEL_END_TIME", value_parser = parse_time)]
    pub end_time: Option<DateTime<Utc>>,

    /// Endpoint for S3 compatible storage
    #[arg(long, env = "S3_ENDPOINT", default_value = "localhost:9000")]
    pub s3_endpoint: String,

    /// S3 bucket where the archive is stored
    #[arg(long, env = "S3_BUCKET")]
    pub s3_bucket: String,

    #[arg(long, env = "S3_ACCESS_KEY", default_value = "minioadmin")]
    pub s3_access_key: String,

    #[arg(
        long,
        env = "S3_SECRET_KEY",
        default_value = "minioadmin",
        hide_env_values = true
    )]
    pub s3_secret_key: String,

    #[arg(long, env = "S3_REGION", default_value = "default")]
    pub s3_region: String,

    /// Interval used for archive chunks, expressed as an ISO 8601 duration
    #[arg(long, env = "ARCHIVE_INTERVAL", value_parser = parse_duration)]
    pub archive_interval: TimeDelta,

    /// Archive channel name
    #[arg(long, env = "ARCHIVE_CHANNEL")]
    pub archive_channel: String,

    /// Delay behind the live edge, in seconds
    #[arg(long, env = "VCHANNEL_DELAY", default_value_t = 600)]
    pub delay: u64,

    /// Seconds between archive scans
    #[arg(long, default_value_t = 60)]
    pub poll_interval: u64,

    /// Scan the archive once and exit
    #[arg(long)]
    pub once: bool,

    /// Print the selected archive chunks as JSON without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Directory the smil, mp4 and isml files are written to
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// unified_remix binary, or image with --docker
    #[arg(long)]
    pub remix_bin: Option<String>,

    /// mp4split binary, or image with --docker
    #[arg(long)]
    pub mp4split_bin: Option<String>,

    /// Run the tools through `docker run` instead of from the host
    #[arg(long)]
    pub docker: bool,

    /// Log as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%z"))
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| format!("{value:?} is not a timestamp like 2021-03-04T10:00:00Z"))
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[derive(Serialize)]
struct Plan<'a> {
    event: &'a str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    interval: String,
    vod2live_start_time: DateTime<Utc>,
    expected_chunks: usize,
    chunks: &'a [ArchiveChunk],
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let now = Utc::now();
    let start = cli
        .start_time
        .unwrap_or_else(|| now.duration_trunc(TimeDelta::hours(1)).unwrap_or(now));
    let end = cli.end_time.unwrap_or(now + TimeDelta::hours(1));

    let event = Event::new(cli.name, start, end, cli.delay, cli.archive_interval)
        .context("invalid event")?;
    info!(
        name = event.name.as_str(),
        start = %event.start,
        end = %event.end,
        interval = %format_duration(event.interval),
        "Preparing event"
    );

    let store = S3ArchiveConfig {
        endpoint: cli.s3_endpoint,
        bucket: cli.s3_bucket,
        access_key_id: cli.s3_access_key,
        secret_access_key: cli.s3_secret_key,
        region: cli.s3_region,
    };
    let archive = new_s3_archive(&store).context("failed to configure archive store")?;

    let output_dir = if cli.dry_run {
        cli.output_dir.clone()
    } else {
        std::fs::create_dir_all(&cli.output_dir)
            .with_context(|| format!("failed to create {}", cli.output_dir.display()))?;
        std::fs::canonicalize(&cli.output_dir)
            .with_context(|| format!("failed to resolve {}", cli.output_dir.display()))?
    };

    let mut toolchain = if cli.docker {
        Toolchain::docker(&output_dir)
    } else {
        Toolchain::default()
    };
    if let Some(remix) = cli.remix_bin {
        toolchain.remix = remix;
    }
    if let Some(mp4split) = cli.mp4split_bin {
        toolchain.mp4split = mp4split;
    }

    let writer = DescriptorWriter::new(&output_dir, store, toolchain);
    let mut runner = EventRunner::new(archive, cli.archive_channel, event.clone(), writer)
        .with_poll_interval(Duration::from_secs(cli.poll_interval))
        .with_once(cli.once);

    if cli.dry_run {
        let chunks = runner.select().await.context("failed to list archive")?;
        let plan = Plan {
            event: &event.name,
            start: event.start,
            end: event.end,
            interval: format_duration(event.interval),
            vod2live_start_time: event.vod2live_start_time(),
            expected_chunks: runner.window().expected(),
            chunks: &chunks,
        };
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    runner
        .run(interrupted(tokio::signal::ctrl_c()))
        .await
        .context("event failed")?;

    Ok(())
}
