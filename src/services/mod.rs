//! Services module - Conversion, export, and file intake logic.
//!
//! The services are **framework-agnostic**: nothing here knows how images
//! reach the program or where finished files go. The store
//! ([`crate::state::StateManager`]) owns all record state; services either
//! compute pure results or write back through the store.
//!
//! # Components
//!
//! - [`Codec`] / [`ImageCodec`]: decode, resize, and re-encode one image,
//!   reporting progress along the way
//! - [`ConversionRunner`]: runs one conversion per record on the blocking
//!   pool and commits results guarded by generation tokens
//! - [`ExportCoordinator`]: builds a zip archive of converted images with
//!   two-phase progress
//! - [`SaveSink`] / [`DirectorySaveSink`]: where archives and single
//!   downloads are written
//! - [`load_sources`]: reads image files from disk for the CLI
//!
//! # Usage Example
//!
//! ```ignore
//! use imgbatch::services::{ExportCoordinator, ImageCodec};
//!
//! let codec = ImageCodec::new();
//! let output = codec.convert(&bytes, &settings, &|p| println!("{p}%"))?;
//!
//! let exporter = ExportCoordinator::new("converted-images.zip", false);
//! let blob = exporter.build_archive(entries, &|p| println!("{p}%"))?;
//! ```

pub mod codec;
pub mod conversion;
pub mod export;
pub mod intake;

pub use codec::{Codec, CodecError, ImageCodec};
pub use conversion::{ConversionOutcome, ConversionRunner, ConversionTask};
pub use export::{
    ArchiveBlob, DirectorySaveSink, Download, ExportCoordinator, ExportEntry, ExportError,
    ExportJob, SaveSink, download_name, entry_name,
};
pub use intake::{Rejected, SUPPORTED_EXTENSIONS, SourceImage, is_supported, load_sources};
