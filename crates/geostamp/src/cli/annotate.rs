//! The `geostamp annotate` command for photos already on disk.

use chrono::DateTime;
use clap::Args;
use geostamp_core::capture::DiscoveredFile;
use geostamp_core::{Config, ExifPosition, FileDiscovery, Position};
use std::path::PathBuf;

use super::{start_pipeline, wait_for_pipeline, RunSummary};

/// Arguments for the `annotate` command.
#[derive(Args, Debug)]
pub struct AnnotateArgs {
    /// Photo file or directory to annotate
    #[arg(required = true)]
    pub input: PathBuf,

    /// Latitude in decimal degrees, instead of the EXIF GPS position
    #[arg(long, allow_hyphen_values = true, requires = "lon")]
    pub lat: Option<f64>,

    /// Longitude in decimal degrees, instead of the EXIF GPS position
    #[arg(long, allow_hyphen_values = true, requires = "lat")]
    pub lon: Option<f64>,

    /// Elevation in meters (used with --lat/--lon)
    #[arg(long, allow_hyphen_values = true, default_value = "0")]
    pub elevation: f64,

    /// Fix time as RFC 3339 or Unix milliseconds (used with --lat/--lon;
    /// defaults to now)
    #[arg(long, value_parser = parse_timestamp)]
    pub timestamp: Option<i64>,
}

impl AnnotateArgs {
    /// The position given on the command line, if any.
    fn explicit_position(&self) -> Option<Position> {
        let (lat, lon) = (self.lat?, self.lon?);
        let timestamp = self
            .timestamp
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
        Some(Position::new(lat, lon, self.elevation, timestamp))
    }
}

/// Parse `--timestamp`: Unix milliseconds or an RFC 3339 date-time.
pub fn parse_timestamp(value: &str) -> Result<i64, String> {
    if let Ok(millis) = value.parse::<i64>() {
        return Ok(millis);
    }
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.timestamp_millis())
        .map_err(|e| format!("expected RFC 3339 or Unix milliseconds: {e}"))
}

/// Execute the annotate command.
pub async fn execute(args: AnnotateArgs, config: Config) -> anyhow::Result<()> {
    if !args.input.exists() {
        anyhow::bail!(
            "Input path does not exist: {:?}\n\n  Hint: Check the file path and try again.",
            args.input
        );
    }
    if let (Some(lat), Some(lon)) = (args.lat, args.lon) {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            anyhow::bail!("Position out of range: {lat}, {lon}");
        }
    }

    // Absolute paths keep photos independent of the configured session directory.
    let input = std::fs::canonicalize(&args.input)?;
    let files = FileDiscovery::new(config.capture.clone()).discover(&input);
    if files.is_empty() {
        tracing::warn!("No supported photos found at {:?}", args.input);
        return RunSummary::default().report();
    }
    tracing::info!(
        photos = files.len(),
        bytes = FileDiscovery::total_size(&files),
        "Discovered photos"
    );

    let explicit = args.explicit_position();
    let mut pipeline = start_pipeline(&config).await?;
    let mut summary = RunSummary::default();

    for DiscoveredFile { path, .. } in files {
        let position = match explicit {
            Some(position) => Some(position),
            None => {
                let exif_path = path.clone();
                tokio::task::spawn_blocking(move || ExifPosition::extract(&exif_path)).await?
            }
        };
        let Some(position) = position else {
            tracing::warn!(path = %path.display(), "No GPS position in EXIF, skipping");
            summary.skipped += 1;
            continue;
        };
        summary.record_submit(pipeline.submit(path, position));
        if !pipeline.is_accepting() {
            tracing::warn!("Pipeline stopped, skipping remaining photos");
            break;
        }
    }

    pipeline.submit_end_of_stream();
    summary.interrupted = wait_for_pipeline(&mut pipeline).await;
    summary.conclude()
}
