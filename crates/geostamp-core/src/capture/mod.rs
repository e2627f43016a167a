//! Producer-side helpers: finding photos and reading their GPS fixes.

pub mod discovery;
pub mod gps;

pub use discovery::{DiscoveredFile, FileDiscovery};
pub use gps::ExifPosition;
