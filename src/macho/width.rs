//! 32-bit vs 64-bit record layouts.
//!
//! Headers, segments and sections differ between the two widths only in the
//! size of their address-sized fields, so one generic decoder serves both.

use crate::macho::endian::Endian;

/// Layout constants and word reader for one record width.
pub trait Width {
    /// Pointer width in bits.
    const BITS: u8;
    /// Size of an address-sized field.
    const WORD: usize;
    /// `mach_header` / `mach_header_64`
    const HEADER_SIZE: usize;
    /// `segment_command` / `segment_command_64`
    const SEGMENT_COMMAND_SIZE: usize;
    /// `section` / `section_64`
    const SECTION_SIZE: usize;

    /// Read an address-sized field of exactly `WORD` bytes, widened to `u64`.
    fn word(endian: Endian, bytes: &[u8]) -> u64;
}

/// 32-bit layouts.
pub struct Bits32;

/// 64-bit layouts.
pub struct Bits64;

impl Width for Bits32 {
    const BITS: u8 = 32;
    const WORD: usize = 4;
    const HEADER_SIZE: usize = 28;
    const SEGMENT_COMMAND_SIZE: usize = 56;
    const SECTION_SIZE: usize = 68;

    fn word(endian: Endian, bytes: &[u8]) -> u64 {
        u64::from(endian.u32(bytes))
    }
}

impl Width for Bits64 {
    const BITS: u8 = 64;
    const WORD: usize = 8;
    const HEADER_SIZE: usize = 32;
    const SEGMENT_COMMAND_SIZE: usize = 72;
    const SECTION_SIZE: usize = 80;

    fn word(endian: Endian, bytes: &[u8]) -> u64 {
        endian.u64(bytes)
    }
}
