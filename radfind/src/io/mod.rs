//! File formats: FITS images, catalog tables and the text listing.

pub mod catalog;
pub mod fits;
pub mod output;

pub use catalog::{CatalogError, CatalogMeta, CatalogSink, TableFormat, TableWriter};
pub use fits::{FitsError, FitsHeaderReader, HeaderSource, HeaderValue};
pub use output::OutputDestination;
