//! Mach-O container decoding.
//!
//! [`decode`] is the single entry point: it classifies the container,
//! narrows a universal container to one slice, then reads the header, walks
//! the load commands and resolves the entry point of that image.

pub mod commands;
pub mod cpu;
pub mod decoders;
pub mod endian;
pub mod entry;
pub mod fat;
pub mod header;
pub mod view;
pub mod width;

#[cfg(test)]
pub(crate) mod fixtures;

use tracing::debug;

use crate::error::{InspectError, Result};
use crate::types::{ArchitectureSlice, InspectOptions, ParseReport, UniversalInfo};
use endian::Magic;
use view::ByteView;

/// Decode a container according to `options`.
pub fn decode(data: &[u8], options: &InspectOptions) -> Result<ParseReport> {
    let view = ByteView::new(data);
    let Some(magic) = universal_magic(&view)? else {
        return decode_image(&view);
    };

    let table = fat::read_table(&view, magic)?;
    let selected = fat::select(&table.slices, options.selector)?;
    let slice = &table.slices[selected];
    let image = fat::slice_view(&view, slice)?;

    let alignment = fat::check_alignment(slice);
    let mut report = decode_image(&image)?;
    if let Some(diagnostic) = alignment {
        report.diagnostics.insert(0, diagnostic);
    }
    report.universal = Some(UniversalInfo {
        is_64bit: table.is_64bit,
        swapped: table.swapped,
        slices: table.slices,
        selected,
    });
    Ok(report)
}

/// Decode one thin image occupying all of `view`.
pub fn decode_image(view: &ByteView<'_>) -> Result<ParseReport> {
    let (header, endian) = header::read(view)?;
    let walk = commands::walk(view, &header, endian)?;

    let mut diagnostics = walk.diagnostics;
    let entry_point = entry::resolve(
        &walk.segments,
        walk.main_entry,
        walk.thread_pc,
        &mut diagnostics,
    );

    debug!(
        offset = view.base(),
        cpu = header.cpu_name(),
        commands = walk.commands.len(),
        entry = %entry_point,
        "decoded image"
    );

    Ok(ParseReport {
        universal: None,
        header,
        commands: walk.commands,
        segments: walk.segments,
        entry_point,
        diagnostics,
    })
}

/// Architecture table of a universal container, or `None` for a thin image.
///
/// No slice is decoded or even range-checked.
pub fn list_slices(data: &[u8]) -> Result<Option<Vec<ArchitectureSlice>>> {
    let view = ByteView::new(data);
    match universal_magic(&view)? {
        Some(magic) => Ok(Some(fat::read_table(&view, magic)?.slices)),
        None => Ok(None),
    }
}

/// Universal magic at the start of the container, if any.
///
/// Anything else, including an unrecognized magic, is left to the thin
/// header reader to reject.
fn universal_magic(view: &ByteView<'_>) -> Result<Option<Magic>> {
    let raw = view.magic_at(0).ok_or(InspectError::TruncatedHeader {
        offset: 0,
        expected: header::MACH_HEADER_SIZE,
        actual: view.len(),
    })?;
    Ok(Magic::classify(raw).filter(|m| m.is_universal()))
}
