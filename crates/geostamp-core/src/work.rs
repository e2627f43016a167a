//! Units of work flowing through the pipeline.
//!
//! A [`WorkUnit`] is moved, never shared: the producer hands it to the
//! pipeline intake, the intake hands it to the first stage, and each stage
//! hands it on through [`crate::pipeline::StageContext::finish_order`]. Only
//! the current owner can touch the metadata map.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::types::{Position, Session};

/// Well-known metadata keys written by the built-in stages.
pub mod keys {
    /// First resolved address line (street)
    pub const ADDRESS_LINE1: &str = "address.line1";
    /// Second resolved address line (locality, region)
    pub const ADDRESS_LINE2: &str = "address.line2";
    /// Outcome of the annotation write: `written` or `failed`
    pub const ANNOTATION_STATUS: &str = "annotation.status";
}

/// One item of work, or the end-of-stream sentinel.
#[derive(Debug)]
pub enum WorkUnit {
    /// A photo on disk together with its position fix
    Photo(Photo),
    /// No more units will arrive
    EndOfStream,
}

impl WorkUnit {
    /// Create a photo unit with an empty metadata map.
    pub fn photo(file_location: impl Into<PathBuf>, position: Position) -> Self {
        WorkUnit::Photo(Photo::new(file_location, position))
    }

    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, WorkUnit::EndOfStream)
    }

    pub fn as_photo(&self) -> Option<&Photo> {
        match self {
            WorkUnit::Photo(photo) => Some(photo),
            WorkUnit::EndOfStream => None,
        }
    }

    pub fn as_photo_mut(&mut self) -> Option<&mut Photo> {
        match self {
            WorkUnit::Photo(photo) => Some(photo),
            WorkUnit::EndOfStream => None,
        }
    }

    /// Short description for log lines.
    pub fn describe(&self) -> String {
        match self {
            WorkUnit::Photo(photo) => photo.file_location.display().to_string(),
            WorkUnit::EndOfStream => "<end of stream>".to_string(),
        }
    }
}

/// A photo to be processed: where it lives, where it was taken, and
/// whatever earlier stages learned about it.
#[derive(Debug, Clone)]
pub struct Photo {
    file_location: PathBuf,
    position: Position,
    metadata: HashMap<String, String>,
}

impl Photo {
    pub fn new(file_location: impl Into<PathBuf>, position: Position) -> Self {
        Self {
            file_location: file_location.into(),
            position,
            metadata: HashMap::new(),
        }
    }

    /// Location of the image file. Processed output is written back here.
    pub fn file_location(&self) -> &Path {
        &self.file_location
    }

    /// The position fix recorded when the photo was taken.
    pub fn position(&self) -> &Position {
        &self.position
    }

    /// Data derived by earlier stages.
    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut HashMap<String, String> {
        &mut self.metadata
    }

    /// Absolute path of the image, resolved against the session directory.
    pub fn resolve_path(&self, session: &Session) -> PathBuf {
        session.resolve(&self.file_location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position() -> Position {
        Position::new(37.7749, -122.4194, 16.0, 1_700_000_000_000)
    }

    #[test]
    fn test_photo_starts_with_empty_metadata() {
        let unit = WorkUnit::photo("/tmp/a.jpg", position());
        let photo = unit.as_photo().unwrap();
        assert!(photo.metadata().is_empty());
        assert_eq!(photo.file_location(), Path::new("/tmp/a.jpg"));
        assert_eq!(photo.position().latitude, 37.7749);
    }

    #[test]
    fn test_end_of_stream_has_no_photo() {
        let mut unit = WorkUnit::EndOfStream;
        assert!(unit.is_end_of_stream());
        assert!(unit.as_photo().is_none());
        assert!(unit.as_photo_mut().is_none());
        assert_eq!(unit.describe(), "<end of stream>");
    }

    #[test]
    fn test_metadata_mutation_by_owner() {
        let mut unit = WorkUnit::photo("a.jpg", position());
        unit.as_photo_mut()
            .unwrap()
            .metadata_mut()
            .insert(keys::ADDRESS_LINE1.to_string(), "123 Main St".to_string());
        assert_eq!(
            unit.as_photo().unwrap().metadata().get(keys::ADDRESS_LINE1),
            Some(&"123 Main St".to_string())
        );
    }

    #[test]
    fn test_resolve_relative_against_session() {
        let unit = WorkUnit::photo("img_0001.jpg", position());
        let session = Session::new("/sdcard/geostamp/2024-05-01");
        assert_eq!(
            unit.as_photo().unwrap().resolve_path(&session),
            PathBuf::from("/sdcard/geostamp/2024-05-01/img_0001.jpg")
        );
    }
}
