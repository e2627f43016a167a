//! Photo annotation.
//!
//! - **caption**: coordinate and timestamp text
//! - **overlay**: caption layout, sizing and drawing
//! - **codec**: decode from disk, re-encode as JPEG
//! - **stage**: the [`AnnotationStage`] pipeline stage

pub mod caption;
pub mod codec;
pub mod overlay;
pub mod stage;

pub use caption::{
    format_coordinates, format_latitude, format_longitude, meters_to_feet, CoordinateStyle,
    TimestampFormat, FEET_PER_METER,
};
pub use overlay::{OverlayState, OverlayStyle};
pub use stage::{AnnotationStage, STATUS_FAILED, STATUS_WRITTEN};
