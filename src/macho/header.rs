//! Thin-image header reader.

use bitflags::bitflags;
use tracing::debug;

use crate::error::{InspectError, Result};
use crate::macho::endian::{Endian, Magic};
use crate::macho::view::ByteView;
use crate::macho::width::{Bits32, Bits64, Width};
use crate::types::ImageHeader;

/// Size of `mach_header`.
pub const MACH_HEADER_SIZE: usize = Bits32::HEADER_SIZE;

/// Size of `mach_header_64`.
pub const MACH_HEADER_64_SIZE: usize = Bits64::HEADER_SIZE;

/// Mach-O file types (`mach_header.filetype`).
pub mod file_type {
    #![allow(missing_docs)]

    pub const MH_OBJECT: u32 = 0x1;
    pub const MH_EXECUTE: u32 = 0x2;
    pub const MH_FVMLIB: u32 = 0x3;
    pub const MH_CORE: u32 = 0x4;
    pub const MH_PRELOAD: u32 = 0x5;
    pub const MH_DYLIB: u32 = 0x6;
    pub const MH_DYLINKER: u32 = 0x7;
    pub const MH_BUNDLE: u32 = 0x8;
    pub const MH_DYLIB_STUB: u32 = 0x9;
    pub const MH_DSYM: u32 = 0xA;
    pub const MH_KEXT_BUNDLE: u32 = 0xB;
    pub const MH_FILESET: u32 = 0xC;
}

/// Name of a file type, `MH_UNKNOWN` if not listed.
pub fn file_type_name(file_type: u32) -> &'static str {
    match file_type {
        file_type::MH_OBJECT => "MH_OBJECT",
        file_type::MH_EXECUTE => "MH_EXECUTE",
        file_type::MH_FVMLIB => "MH_FVMLIB",
        file_type::MH_CORE => "MH_CORE",
        file_type::MH_PRELOAD => "MH_PRELOAD",
        file_type::MH_DYLIB => "MH_DYLIB",
        file_type::MH_DYLINKER => "MH_DYLINKER",
        file_type::MH_BUNDLE => "MH_BUNDLE",
        file_type::MH_DYLIB_STUB => "MH_DYLIB_STUB",
        file_type::MH_DSYM => "MH_DSYM",
        file_type::MH_KEXT_BUNDLE => "MH_KEXT_BUNDLE",
        file_type::MH_FILESET => "MH_FILESET",
        _ => "MH_UNKNOWN",
    }
}

bitflags! {
    /// `mach_header.flags` bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HeaderFlags: u32 {
        const NOUNDEFS = 0x1;
        const INCRLINK = 0x2;
        const DYLDLINK = 0x4;
        const BINDATLOAD = 0x8;
        const PREBOUND = 0x10;
        const SPLIT_SEGS = 0x20;
        const TWOLEVEL = 0x80;
        const FORCE_FLAT = 0x100;
        const NOMULTIDEFS = 0x200;
        const WEAK_DEFINES = 0x8000;
        const BINDS_TO_WEAK = 0x1_0000;
        const ALLOW_STACK_EXECUTION = 0x2_0000;
        const ROOT_SAFE = 0x4_0000;
        const SETUID_SAFE = 0x8_0000;
        const NO_REEXPORTED_DYLIBS = 0x10_0000;
        const PIE = 0x20_0000;
        const DEAD_STRIPPABLE_DYLIB = 0x40_0000;
        const HAS_TLV_DESCRIPTORS = 0x80_0000;
        const NO_HEAP_EXECUTION = 0x100_0000;
        const APP_EXTENSION_SAFE = 0x200_0000;
        const SIM_SUPPORT = 0x800_0000;
        const DYLIB_IN_CACHE = 0x8000_0000;
    }
}

impl HeaderFlags {
    /// `MH_*` names of the known bits that are set.
    pub fn names(self) -> Vec<String> {
        self.iter_names()
            .map(|(name, _)| format!("MH_{name}"))
            .collect()
    }
}

/// Read and validate the fixed header at the start of `view`.
///
/// Length is checked against the smaller header before the magic is looked
/// at, so any buffer under 28 bytes is a truncated header.
pub(crate) fn read(view: &ByteView<'_>) -> Result<(ImageHeader, Endian)> {
    if view.len() < MACH_HEADER_SIZE {
        return Err(truncated(view, MACH_HEADER_SIZE));
    }

    let raw = view
        .magic_at(0)
        .ok_or_else(|| truncated(view, MACH_HEADER_SIZE))?;
    let magic = Magic::classify(raw)
        .filter(|m| !m.is_universal())
        .ok_or(InspectError::UnrecognizedMagic {
            offset: view.base(),
            magic: raw,
        })?;

    let header = if magic.is_64bit() {
        read_fields::<Bits64>(view, magic)?
    } else {
        read_fields::<Bits32>(view, magic)?
    };

    debug!(
        offset = view.base(),
        bits = if header.is_64bit { 64 } else { 32 },
        swapped = header.swapped,
        cpu_type = header.cpu_type,
        ncmds = header.command_count,
        sizeofcmds = header.commands_total_size,
        "decoded image header"
    );

    Ok((header, magic.endian()))
}

fn read_fields<W: Width>(view: &ByteView<'_>, magic: Magic) -> Result<ImageHeader> {
    let raw = view
        .bytes(0, W::HEADER_SIZE)
        .ok_or_else(|| truncated(view, W::HEADER_SIZE))?;
    let endian = magic.endian();
    let field = |at: usize| endian.u32(&raw[at..at + 4]);

    Ok(ImageHeader {
        is_64bit: W::BITS == 64,
        swapped: magic.swapped,
        cpu_type: endian.i32(&raw[4..8]),
        cpu_subtype: endian.i32(&raw[8..12]),
        file_type: field(12),
        command_count: field(16),
        commands_total_size: field(20),
        flags: field(24),
        // Only mach_header_64 carries the reserved word.
        reserved: if W::HEADER_SIZE > MACH_HEADER_SIZE {
            field(28)
        } else {
            0
        },
    })
}

fn truncated(view: &ByteView<'_>, expected: usize) -> InspectError {
    InspectError::TruncatedHeader {
        offset: view.base(),
        expected,
        actual: view.len(),
    }
}
