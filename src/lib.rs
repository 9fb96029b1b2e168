//! Mach-O Inspector - Structural Decoding of Mach-O Images
//!
//! This library decodes the structure of Mach-O thin images and universal
//! (fat) containers without executing anything: header fields, the ordered
//! load-command stream, segments and sections, dynamic library references
//! and the resolved process entry point.
//!
//! # Features
//!
//! - **Both widths and byte orders**: 32/64-bit images, little- or big-endian
//! - **Universal containers**: 32- and 64-bit architecture tables, slice
//!   selection by index or CPU type, listing without decoding
//! - **Bounded decoding**: every length, offset and count is checked before
//!   use; malformed input becomes an [`InspectError`], never a panic
//! - **Entry point resolution**: `LC_MAIN` offsets mapped through the segment
//!   table, or thread-state program counters taken directly
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use macho_inspect::{inspect_file, InspectOptions};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let report = inspect_file("/bin/ls", &InspectOptions::new())?;
//!     println!("CPU: {}", report.header.cpu_name());
//!     println!("Entry: {}", report.entry_point);
//!     for dylib in report.dylibs() {
//!         println!("  {}", dylib.path);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Universal containers
//!
//! By default the first ARM64 slice is decoded, falling back to slice 0.
//! Use [`InspectOptions::with_index`] or [`InspectOptions::with_cpu_type`] to
//! pick another one, or [`list_slices`] to see the table.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::similar_names)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]

pub mod error;
pub mod formatter;
pub mod macho;
pub mod types;

pub use error::{InspectError, Result};
pub use macho::cpu::{cpu_type_name, parse_cpu_type};
pub use types::{
    ArchitectureSlice, CommandPayload, Diagnostic, DylibKind, DylibReference, EntryPoint,
    ImageHeader, InspectOptions, LoadCommand, ParseReport, PathKind, PathReference,
    SectionRecord, SegmentRecord, SliceSelector, UniversalInfo, Uuid,
};

use std::path::Path;

/// Inspect a Mach-O file by path.
///
/// The whole file is read into memory before decoding starts.
///
/// # Example
///
/// ```rust,no_run
/// use macho_inspect::{inspect_file, InspectOptions};
///
/// let report = inspect_file("/usr/lib/dyld", &InspectOptions::with_index(0))?;
/// println!("{} load commands", report.commands.len());
/// # Ok::<(), macho_inspect::InspectError>(())
/// ```
pub fn inspect_file<P: AsRef<Path>>(path: P, options: &InspectOptions) -> Result<ParseReport> {
    let data = std::fs::read(path)?;
    inspect_bytes_with_options(&data, options)
}

/// Inspect an in-memory container with default options.
pub fn inspect_bytes(data: &[u8]) -> Result<ParseReport> {
    inspect_bytes_with_options(data, &InspectOptions::new())
}

/// Inspect an in-memory container.
///
/// Thin images are decoded directly. For universal containers the slice
/// named by `options.selector` is decoded and the whole architecture table
/// is returned in [`ParseReport::universal`].
pub fn inspect_bytes_with_options(data: &[u8], options: &InspectOptions) -> Result<ParseReport> {
    macho::decode(data, options)
}

/// List the slices of a universal container.
///
/// Returns `Ok(None)` for anything that is not a universal container. Only
/// the architecture table is read, so a damaged slice never makes listing
/// fail.
pub fn list_slices(data: &[u8]) -> Result<Option<Vec<ArchitectureSlice>>> {
    macho::list_slices(data)
}

/// Get version information for this library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
