//! The annotation stage: reverse-geocode a photo's position, draw the
//! caption overlay, and rewrite the photo in place.

use ab_glyph::FontVec;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::caption::{format_coordinates, CoordinateStyle, TimestampFormat};
use super::codec;
use super::overlay::{self, Caption, OverlayState, OverlayStyle, Painter};
use crate::config::{AnnotationConfig, Config};
use crate::error::PipelineError;
use crate::geocode::{lookup_with_retry, Geocoder, GeocoderFactory, Lookup, RetryPolicy};
use crate::pipeline::{Stage, StageContext};
use crate::types::{Address, Session};
use crate::work::{keys, Photo, WorkUnit};

/// Value of [`keys::ANNOTATION_STATUS`] after the photo was rewritten.
pub const STATUS_WRITTEN: &str = "written";

/// Value of [`keys::ANNOTATION_STATUS`] when the photo could not be rewritten.
pub const STATUS_FAILED: &str = "failed";

/// Stamps each photo with its coordinates, fix time and street address.
///
/// Lookups retry transient failures with a fixed backoff until they succeed,
/// give up, or the stage is interrupted. The photo is written either way;
/// without an address it carries an "unknown location" caption instead.
pub struct AnnotationStage {
    name: String,
    config: Arc<AnnotationConfig>,
    geocoder: Arc<dyn Geocoder>,
    retry: RetryPolicy,
    coordinates: CoordinateStyle,
    clock: TimestampFormat,
    font: Option<Arc<FontVec>>,
    overlay: OverlayState,
}

impl AnnotationStage {
    pub fn new(config: AnnotationConfig, geocoder: Arc<dyn Geocoder>, retry: RetryPolicy) -> Self {
        Self {
            name: "annotate".to_string(),
            coordinates: CoordinateStyle::from_config(&config),
            clock: TimestampFormat::from_config(&config),
            config: Arc::new(config),
            geocoder,
            retry,
            font: None,
            overlay: OverlayState::Unconfigured,
        }
    }

    /// Build the stage from a full config, creating the configured geocoder.
    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let geocoder = GeocoderFactory::create(&config.geocoder)?;
        let mut annotation = config.annotation.clone();
        annotation.font_path = config.font_path();
        Ok(Self::new(
            annotation,
            geocoder,
            RetryPolicy::from_config(&config.geocoder),
        ))
    }

    /// Rename the stage, e.g. to run two annotation stages in one pipeline.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The overlay sizing in effect, once the first photo has been drawn.
    pub fn overlay_style(&self) -> Option<OverlayStyle> {
        self.overlay.style()
    }

    /// Address lines left by an earlier stage, if any.
    fn known_address(photo: &Photo) -> Option<Address> {
        let metadata = photo.metadata();
        let line1 = metadata.get(keys::ADDRESS_LINE1)?;
        let lines = std::iter::once(line1.clone())
            .chain(metadata.get(keys::ADDRESS_LINE2).cloned())
            .filter(|line| !line.trim().is_empty());
        Some(Address::from_lines(lines))
    }

    fn record_address(photo: &mut Photo, address: &Address) {
        let metadata = photo.metadata_mut();
        if let Some(line) = address.line(0) {
            metadata.insert(keys::ADDRESS_LINE1.to_string(), line.to_string());
        }
        if let Some(line) = address.line(1) {
            metadata.insert(keys::ADDRESS_LINE2.to_string(), line.to_string());
        }
    }

    fn captions(&self, photo: &Photo, address: Option<&Address>) -> Vec<Caption> {
        let position = photo.position();
        overlay::captions(
            format_coordinates(position, self.coordinates),
            self.clock.format(position.timestamp_ms),
            address,
            &self.config.unknown_location_text,
        )
    }
}

/// Everything the blocking half of an annotation needs.
struct RenderJob {
    path: PathBuf,
    captions: Vec<Caption>,
    style: Option<OverlayStyle>,
    config: Arc<AnnotationConfig>,
    font: Option<Arc<FontVec>>,
}

impl RenderJob {
    /// Decode, draw, encode and write. Returns the overlay style used.
    fn run(self) -> Result<OverlayStyle, PipelineError> {
        let decoded = codec::decode_file(&self.path)?;
        if decoded.format != image::ImageFormat::Jpeg {
            debug!(
                path = %self.path.display(),
                format = %codec::format_to_string(decoded.format),
                "Rewriting non-JPEG photo as JPEG"
            );
        }

        // The decoded original is consumed here; only the working copy lives on.
        let working = codec::working_copy(decoded, self.config.output_scale);
        let (width, height) = working.dimensions();
        let style = self
            .style
            .unwrap_or_else(|| OverlayStyle::for_height(&self.config, height));

        let painter = Painter::new(self.font, &self.config);
        let boxes = overlay::layout(&self.captions, &style, width, height, |text| {
            painter.measure(text, style.font_size)
        });
        let annotated = painter.paint(working, &boxes, &style);

        let bytes = codec::encode_jpeg(annotated, self.config.jpeg_quality, &self.path)?;
        codec::write_file(&self.path, &bytes)?;
        Ok(style)
    }
}

#[async_trait]
impl Stage for AnnotationStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&mut self, _session: &Session) -> Result<(), PipelineError> {
        self.overlay = OverlayState::Unconfigured;

        self.font = match &self.config.font_path {
            Some(path) => {
                let font = overlay::load_font(path)?;
                info!(stage = %self.name, font = %path.display(), "Loaded caption font");
                Some(Arc::new(font))
            }
            None => match self.font.take() {
                Some(font) => Some(font),
                None => tokio::task::spawn_blocking(overlay::system_font)
                    .await
                    .ok()
                    .flatten()
                    .map(Arc::new),
            },
        };
        if self.font.is_none() {
            warn!(
                stage = %self.name,
                "No caption font available, drawing caption boxes without text"
            );
        }

        debug!(
            stage = %self.name,
            geocoder = self.geocoder.name(),
            retry_delay = ?self.retry.delay,
            "Annotation stage ready"
        );
        Ok(())
    }

    async fn process_order(&mut self, unit: WorkUnit, ctx: &mut StageContext) -> bool {
        let mut photo = match unit {
            WorkUnit::Photo(photo) => photo,
            WorkUnit::EndOfStream => {
                ctx.finish_order(WorkUnit::EndOfStream);
                return false;
            }
        };
        let start = Instant::now();

        let (address, interrupted) = match Self::known_address(&photo) {
            Some(address) => (Some(address), false),
            None => {
                let lookup = lookup_with_retry(
                    self.geocoder.as_ref(),
                    photo.position(),
                    &self.retry,
                    ctx.cancellation(),
                )
                .await;
                let interrupted = lookup == Lookup::Interrupted;
                (lookup.best().cloned(), interrupted)
            }
        };
        if let Some(address) = &address {
            Self::record_address(&mut photo, address);
        }

        let job = RenderJob {
            path: photo.resolve_path(ctx.session()),
            captions: self.captions(&photo, address.as_ref()),
            style: self.overlay.style(),
            config: self.config.clone(),
            font: self.font.clone(),
        };
        let path = job.path.clone();

        let status = match tokio::task::spawn_blocking(move || job.run()).await {
            Ok(Ok(style)) => {
                self.overlay = OverlayState::Configured(style);
                info!(
                    stage = %self.name,
                    path = %path.display(),
                    address = address.is_some(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Annotated photo"
                );
                STATUS_WRITTEN
            }
            Ok(Err(e)) => {
                warn!(
                    stage = %self.name,
                    path = %path.display(),
                    "Failed to annotate photo: {}",
                    e
                );
                STATUS_FAILED
            }
            Err(e) => {
                warn!(stage = %self.name, path = %path.display(), "Annotation task failed: {}", e);
                STATUS_FAILED
            }
        };
        photo
            .metadata_mut()
            .insert(keys::ANNOTATION_STATUS.to_string(), status.to_string());

        ctx.finish_order(WorkUnit::Photo(photo));
        !(interrupted || ctx.is_interrupted())
    }

    async fn finish(&mut self) {
        debug!(stage = %self.name, "Annotation stage finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocode::testing::StubGeocoder;
    use crate::pipeline::testing::CollectingStage;
    use crate::pipeline::Pipeline;
    use crate::types::Position;
    use image::{Rgb, RgbImage};
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    const WIDTH: u32 = 384;
    const HEIGHT: u32 = 288;

    fn position() -> Position {
        Position::new(37.7749, -122.4194, 16.0, 1_700_000_000_000)
    }

    fn write_photo(path: &Path) {
        RgbImage::from_pixel(WIDTH, HEIGHT, Rgb([250, 250, 250]))
            .save_with_format(path, image::ImageFormat::Jpeg)
            .unwrap();
    }

    fn config() -> AnnotationConfig {
        AnnotationConfig {
            utc_offset_minutes: Some(0),
            ..Default::default()
        }
    }

    fn stage(geocoder: StubGeocoder) -> AnnotationStage {
        AnnotationStage::new(
            config(),
            Arc::new(geocoder),
            RetryPolicy {
                delay: Duration::from_secs(10),
                max_attempts: None,
            },
        )
    }

    /// Run photos through `[stage, collect]` and return what reached the end.
    async fn run(
        stage: AnnotationStage,
        dir: &Path,
        photos: &[&str],
    ) -> Vec<WorkUnit> {
        let (collect, collected) = CollectingStage::new("collect");
        let mut pipeline = Pipeline::new("test");
        pipeline.add_stage(Box::new(stage)).unwrap();
        pipeline.add_stage(Box::new(collect)).unwrap();
        pipeline.start(Session::new(dir)).await.unwrap();

        for name in photos {
            assert!(pipeline.submit(*name, position()));
        }
        assert!(pipeline.submit_end_of_stream());
        pipeline.join().await;
        take(&collected)
    }

    fn take(collected: &Arc<Mutex<Vec<WorkUnit>>>) -> Vec<WorkUnit> {
        std::mem::take(&mut *collected.lock().unwrap())
    }

    fn metadata<'a>(unit: &'a WorkUnit, key: &str) -> Option<&'a str> {
        unit.as_photo()?.metadata().get(key).map(String::as_str)
    }

    /// Mean brightness of the two lowest left-hand caption rows.
    fn corner_brightness(path: &Path) -> f64 {
        let image = image::open(path).unwrap().into_luma8();
        let style = OverlayStyle::for_height(&config(), HEIGHT);
        let bottom = HEIGHT - style.margin;
        let top = bottom - 2 * style.box_height;
        let left = style.margin + 2;

        let mut sum = 0u64;
        let mut count = 0u64;
        for y in top..bottom {
            for x in left..left + 24 {
                sum += image.get_pixel(x, y)[0] as u64;
                count += 1;
            }
        }
        sum as f64 / count as f64
    }

    #[test]
    fn test_captions_for_resolved_address() {
        let stage = stage(StubGeocoder::empty());
        let photo = Photo::new("a.jpg", position());
        let address = Address::from_lines(["123 Main St", "Springfield, IL"]);

        let captions = stage.captions(&photo, Some(&address));
        let texts: Vec<&str> = captions.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "37.77490°N 122.41940°W",
                "November 14, 2023 10:13:20 PM",
                "123 Main St",
                "Springfield, IL",
            ]
        );
    }

    #[test]
    fn test_captions_degraded_without_address() {
        let stage = stage(StubGeocoder::empty());
        let photo = Photo::new("a.jpg", position());

        let captions = stage.captions(&photo, None);
        let texts: Vec<&str> = captions.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "37.77490°N 122.41940°W",
                "November 14, 2023 10:13:20 PM",
                "Location unknown",
            ]
        );
    }

    #[tokio::test]
    async fn test_annotates_in_place_and_records_address() {
        let dir = tempfile::tempdir().unwrap();
        write_photo(&dir.path().join("a.jpg"));
        let before = std::fs::read(dir.path().join("a.jpg")).unwrap();

        let done = run(
            stage(StubGeocoder::returning(&["123 Main St", "Springfield, IL"])),
            dir.path(),
            &["a.jpg"],
        )
        .await;

        assert_eq!(done.len(), 1);
        assert_eq!(metadata(&done[0], keys::ADDRESS_LINE1), Some("123 Main St"));
        assert_eq!(metadata(&done[0], keys::ADDRESS_LINE2), Some("Springfield, IL"));
        assert_eq!(metadata(&done[0], keys::ANNOTATION_STATUS), Some(STATUS_WRITTEN));

        let path = dir.path().join("a.jpg");
        let after = std::fs::read(&path).unwrap();
        assert_ne!(before, after);
        assert_eq!(image::image_dimensions(&path).unwrap(), (WIDTH, HEIGHT));
        assert!(corner_brightness(&path) < 200.0);
    }

    #[tokio::test]
    async fn test_degraded_output_when_lookup_gives_up() {
        let dir = tempfile::tempdir().unwrap();
        write_photo(&dir.path().join("a.jpg"));
        let geocoder = StubGeocoder::rejecting();

        let done = run(stage(geocoder), dir.path(), &["a.jpg"]).await;

        assert_eq!(metadata(&done[0], keys::ADDRESS_LINE1), None);
        assert_eq!(metadata(&done[0], keys::ANNOTATION_STATUS), Some(STATUS_WRITTEN));
        assert!(corner_brightness(&dir.path().join("a.jpg")) < 200.0);
    }

    #[tokio::test]
    async fn test_annotating_twice_draws_twice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.jpg");
        write_photo(&path);

        run(stage(StubGeocoder::empty()), dir.path(), &["a.jpg"]).await;
        let once = corner_brightness(&path);
        run(stage(StubGeocoder::empty()), dir.path(), &["a.jpg"]).await;
        let twice = corner_brightness(&path);

        assert!(twice < once - 20.0, "once={once} twice={twice}");
    }

    #[tokio::test]
    async fn test_unreadable_photo_does_not_stop_stage() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.jpg"), b"not a jpeg").unwrap();
        write_photo(&dir.path().join("good.jpg"));

        let done = run(
            stage(StubGeocoder::empty()),
            dir.path(),
            &["missing.jpg", "broken.jpg", "good.jpg"],
        )
        .await;

        let statuses: Vec<_> = done
            .iter()
            .map(|u| metadata(u, keys::ANNOTATION_STATUS).unwrap())
            .collect();
        assert_eq!(statuses, vec![STATUS_FAILED, STATUS_FAILED, STATUS_WRITTEN]);
        assert_eq!(
            std::fs::read(dir.path().join("broken.jpg")).unwrap(),
            b"not a jpeg"
        );
    }

    #[tokio::test]
    async fn test_address_from_earlier_stage_skips_lookup() {
        let dir = tempfile::tempdir().unwrap();
        write_photo(&dir.path().join("a.jpg"));
        let geocoder = Arc::new(StubGeocoder::always_failing());
        let stage = AnnotationStage::new(config(), geocoder.clone(), RetryPolicy::default());

        let (collect, collected) = CollectingStage::new("collect");
        let mut pipeline = Pipeline::new("test");
        pipeline.add_stage(Box::new(stage)).unwrap();
        pipeline.add_stage(Box::new(collect)).unwrap();
        pipeline.start(Session::new(dir.path())).await.unwrap();

        let mut unit = WorkUnit::photo("a.jpg", position());
        unit.as_photo_mut()
            .unwrap()
            .metadata_mut()
            .insert(keys::ADDRESS_LINE1.to_string(), "1 Known Rd".to_string());
        assert!(pipeline.submit_unit(unit));
        assert!(pipeline.submit_end_of_stream());
        pipeline.join().await;

        assert_eq!(geocoder.calls(), 0);
        let done = take(&collected);
        assert_eq!(metadata(&done[0], keys::ADDRESS_LINE1), Some("1 Known Rd"));
        assert_eq!(metadata(&done[0], keys::ANNOTATION_STATUS), Some(STATUS_WRITTEN));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_during_backoff_still_writes_photo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.jpg");
        write_photo(&path);
        let geocoder = Arc::new(StubGeocoder::always_failing());
        let stage = AnnotationStage::new(
            config(),
            geocoder.clone(),
            RetryPolicy {
                delay: Duration::from_secs(10),
                max_attempts: None,
            },
        );

        let mut pipeline = Pipeline::new("test");
        pipeline.add_stage(Box::new(stage)).unwrap();
        pipeline.start(Session::new(dir.path())).await.unwrap();

        assert!(pipeline.submit("a.jpg", position()));
        assert!(pipeline.submit("b.jpg", position()));

        // Second attempt happens at t=10s; interrupt during the next backoff.
        tokio::time::sleep(Duration::from_secs(15)).await;
        let interrupted_at = tokio::time::Instant::now();
        pipeline.interrupt();
        pipeline.join().await;

        assert!(interrupted_at.elapsed() < Duration::from_secs(10));
        // No third attempt, and b.jpg was never looked up.
        assert_eq!(geocoder.calls(), 2);
        assert!(!pipeline.is_alive());

        // a.jpg still got its degraded captions.
        assert!(corner_brightness(&path) < 200.0);
    }

    #[tokio::test]
    async fn test_missing_configured_font_fails_init() {
        let config = AnnotationConfig {
            font_path: Some(PathBuf::from("/nonexistent/caption.ttf")),
            ..Default::default()
        };
        let stage = AnnotationStage::new(
            config,
            Arc::new(StubGeocoder::empty()),
            RetryPolicy::default(),
        );

        let mut pipeline = Pipeline::new("test");
        pipeline.add_stage(Box::new(stage)).unwrap();
        let err = pipeline.start(Session::default()).await.unwrap_err();
        assert!(matches!(err, PipelineError::StageInit { ref stage, .. } if stage == "annotate"));
    }

    #[tokio::test]
    async fn test_overlay_style_from_first_photo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.jpg");
        write_photo(&path);

        let mut stage = stage(StubGeocoder::empty());
        stage.init(&Session::new(dir.path())).await.unwrap();
        assert_eq!(stage.overlay_style(), None);

        let job = RenderJob {
            path: path.clone(),
            captions: stage.captions(&Photo::new("a.jpg", position()), None),
            style: stage.overlay_style(),
            config: stage.config.clone(),
            font: stage.font.clone(),
        };
        let style = tokio::task::spawn_blocking(move || job.run())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(style, OverlayStyle::for_height(&config(), HEIGHT));
    }
}
