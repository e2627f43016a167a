//! Geostamp Core - photo stream annotation pipeline.
//!
//! Photos captured on the move are pushed, with the position fix taken at
//! capture time, into a chain of stages. The annotation stage resolves each
//! position to a street address and stamps the photo in place with its
//! coordinates, fix time and address.
//!
//! # Architecture
//!
//! Each stage runs on its own task and reads its own FIFO queue, so photos
//! leave the pipeline in the order they were submitted:
//!
//! ```text
//! submit → intake → [annotate] → ... → done
//!                       │
//!              reverse geocode (retry) → draw captions → rewrite JPEG
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use geostamp_core::{Config, Geostamp, Position};
//!
//! #[tokio::main]
//! async fn main() -> geostamp_core::Result<()> {
//!     let geostamp = Geostamp::new(Config::load()?);
//!     let mut pipeline = geostamp.start().await?;
//!
//!     pipeline.submit("frame-0001.jpg", Position::new(37.7749, -122.4194, 16.0, 1_700_000_000_000));
//!     pipeline.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod annotate;
pub mod capture;
pub mod config;
pub mod error;
pub mod geocode;
pub mod pipeline;
pub mod types;
pub mod work;

pub use annotate::AnnotationStage;
pub use capture::{ExifPosition, FileDiscovery};
pub use config::Config;
pub use error::{ConfigError, GeostampError, PipelineError, PipelineResult, Result};
pub use geocode::{Geocoder, GeocoderFactory};
pub use pipeline::{Pipeline, PipelineIntake, Stage, StageContext, StageState};
pub use types::{Address, Position, Session};
pub use work::{Photo, WorkUnit};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Builds the standard annotation pipeline from a configuration.
pub struct Geostamp {
    config: Config,
}

impl Geostamp {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Create an instance from the config file at the default location.
    pub fn with_defaults() -> Result<Self> {
        Ok(Self::new(Config::load()?))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Assemble the pipeline without starting it.
    pub fn build_pipeline(&self) -> Result<Pipeline> {
        let mut pipeline = Pipeline::new(&self.config.pipeline.name);
        pipeline.add_stage(Box::new(AnnotationStage::from_config(&self.config)?))?;
        Ok(pipeline)
    }

    /// Assemble and start the pipeline in the configured session directory.
    pub async fn start(&self) -> Result<Pipeline> {
        tracing::debug!("Starting geostamp v{}", VERSION);
        let mut pipeline = self.build_pipeline()?;
        pipeline.start(Session::new(self.config.session_dir())).await?;
        Ok(pipeline)
    }
}
