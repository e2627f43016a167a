//! Command handlers and the pieces they share.

pub mod annotate;
pub mod config;
pub mod feed;

use geostamp_core::{Config, Geostamp, Pipeline};
use std::path::Path;

/// Load the config from `--config`, or from the default location.
///
/// An explicit file must load. A broken default file only warns, so the
/// `config` subcommands stay usable for fixing it.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    if let Some(path) = path {
        return Config::load_from(path).map_err(|e| {
            anyhow::anyhow!("Failed to load config from {}: {e}", path.display())
        });
    }

    match Config::load() {
        Ok(config) => Ok(config),
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `geostamp config path`."
            );
            Ok(Config::default())
        }
    }
}

/// Build and start the annotation pipeline.
pub async fn start_pipeline(config: &Config) -> anyhow::Result<Pipeline> {
    let pipeline = Geostamp::new(config.clone()).start().await?;
    tracing::info!(
        pipeline = %pipeline.name(),
        geocoder = %config.geocoder.provider,
        session = %config.session_dir().display(),
        "Pipeline running"
    );
    Ok(pipeline)
}

/// Wait for the pipeline to drain. A Ctrl-C while waiting interrupts it.
///
/// Returns `true` if the run was interrupted.
pub async fn wait_for_pipeline(pipeline: &mut Pipeline) -> bool {
    let interrupted = tokio::select! {
        _ = pipeline.join() => false,
        _ = tokio::signal::ctrl_c() => true,
    };
    if interrupted {
        tracing::warn!("Interrupted, finishing the photo in progress");
        pipeline.interrupt();
        pipeline.join().await;
    }
    interrupted
}

/// Counts reported when a run ends.
#[derive(Debug, Default, serde::Serialize)]
pub struct RunSummary {
    pub submitted: usize,
    pub rejected: usize,
    pub skipped: usize,
    pub interrupted: bool,
}

impl RunSummary {
    pub fn record_submit(&mut self, accepted: bool) {
        if accepted {
            self.submitted += 1;
        } else {
            self.rejected += 1;
        }
    }

    /// Log the summary and print it to stdout as one JSON object.
    pub fn report(&self) -> anyhow::Result<()> {
        tracing::info!(
            submitted = self.submitted,
            rejected = self.rejected,
            skipped = self.skipped,
            interrupted = self.interrupted,
            "Run finished"
        );
        println!("{}", serde_json::to_string(self)?);
        Ok(())
    }

    /// Report, then exit with status 130 if the run was interrupted. Exiting
    /// here also abandons a stdin read still parked on a blocking thread.
    pub fn conclude(&self) -> anyhow::Result<()> {
        self.report()?;
        if self.interrupted {
            std::process::exit(130);
        }
        Ok(())
    }
}
