//! The `geostamp feed` command: annotate photos as a capture process reports
//! them.
//!
//! Input is one JSON object per line:
//!
//! ```json
//! {"path": "frame-0001.jpg", "lat": 37.7749, "lon": -122.4194, "elevation": 16.0, "timestamp": 1700000000000}
//! ```
//!
//! `elevation` and `timestamp` are optional. Relative paths resolve against
//! the configured session directory. End of input ends the stream.

use clap::Args;
use geostamp_core::{Config, Position};
use serde::Deserialize;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use super::{start_pipeline, wait_for_pipeline, RunSummary};

/// Arguments for the `feed` command.
#[derive(Args, Debug)]
pub struct FeedArgs {
    /// Read records from this file instead of stdin
    #[arg(short, long)]
    pub manifest: Option<PathBuf>,
}

/// One captured photo.
#[derive(Debug, Deserialize)]
struct FeedRecord {
    path: PathBuf,
    #[serde(alias = "latitude")]
    lat: f64,
    #[serde(alias = "longitude")]
    lon: f64,
    #[serde(default, alias = "elevation_m")]
    elevation: f64,
    #[serde(default, alias = "timestamp_ms")]
    timestamp: Option<i64>,
}

impl FeedRecord {
    fn parse(line: &str, now_ms: i64) -> Result<(PathBuf, Position), serde_json::Error> {
        let record: FeedRecord = serde_json::from_str(line)?;
        let position = Position::new(
            record.lat,
            record.lon,
            record.elevation,
            record.timestamp.unwrap_or(now_ms),
        );
        Ok((record.path, position))
    }
}

/// Execute the feed command.
pub async fn execute(args: FeedArgs, config: Config) -> anyhow::Result<()> {
    let input: Box<dyn AsyncRead + Unpin + Send> = match &args.manifest {
        Some(path) => Box::new(tokio::fs::File::open(path).await.map_err(|e| {
            anyhow::anyhow!("Cannot open manifest {}: {e}", path.display())
        })?),
        None => Box::new(tokio::io::stdin()),
    };
    let mut lines = BufReader::new(input).lines();

    let mut pipeline = start_pipeline(&config).await?;
    let mut summary = RunSummary::default();
    let mut ctrl_c = std::pin::pin!(tokio::signal::ctrl_c());
    let mut line_number = 0usize;

    loop {
        let line = tokio::select! {
            _ = &mut ctrl_c => {
                summary.interrupted = true;
                break;
            }
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Failed to read input: {}", e);
                break;
            }
        };
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }

        match FeedRecord::parse(&line, chrono::Utc::now().timestamp_millis()) {
            Ok((path, position)) => summary.record_submit(pipeline.submit(path, position)),
            Err(e) => {
                tracing::warn!(line = line_number, "Skipping malformed record: {}", e);
                summary.skipped += 1;
            }
        }
        if !pipeline.is_accepting() {
            tracing::warn!("Pipeline stopped, no longer reading input");
            break;
        }
    }

    if summary.interrupted {
        tracing::warn!("Interrupted, finishing the photo in progress");
        pipeline.interrupt();
        pipeline.join().await;
    } else {
        pipeline.submit_end_of_stream();
        summary.interrupted = wait_for_pipeline(&mut pipeline).await;
    }
    summary.conclude()
}
