//! Magic classification and conditional byte swapping.
//!
//! Canonical byte order is little-endian. A "swapped" magic means every
//! multi-byte field of that image or table is stored big-endian.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::types::Endianness;

/// Magic values as read little-endian from the first four bytes.
pub mod magic {
    /// 32-bit image, little-endian fields
    pub const MH_MAGIC: u32 = 0xFEED_FACE;
    /// 32-bit image, big-endian fields
    pub const MH_CIGAM: u32 = 0xCEFA_EDFE;
    /// 64-bit image, little-endian fields
    pub const MH_MAGIC_64: u32 = 0xFEED_FACF;
    /// 64-bit image, big-endian fields
    pub const MH_CIGAM_64: u32 = 0xCFFA_EDFE;
    /// Universal container with 32-bit table, little-endian fields
    pub const FAT_MAGIC: u32 = 0xCAFE_BABE;
    /// Universal container with 32-bit table, big-endian fields (the usual layout)
    pub const FAT_CIGAM: u32 = 0xBEBA_FECA;
    /// Universal container with 64-bit table, little-endian fields
    pub const FAT_MAGIC_64: u32 = 0xCAFE_BABF;
    /// Universal container with 64-bit table, big-endian fields
    pub const FAT_CIGAM_64: u32 = 0xBFBA_FECA;
}

/// Structural family a magic value announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MagicKind {
    /// `mach_header`
    Image32,
    /// `mach_header_64`
    Image64,
    /// `fat_header` followed by `fat_arch` entries
    Universal32,
    /// `fat_header` followed by `fat_arch_64` entries
    Universal64,
}

/// A recognized magic value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Magic {
    /// Structure the magic announces
    pub kind: MagicKind,
    /// Fields are stored big-endian
    pub swapped: bool,
}

impl Magic {
    /// Build from parts.
    pub fn new(kind: MagicKind, swapped: bool) -> Self {
        Self { kind, swapped }
    }

    /// Classify a raw little-endian magic; `None` if unrecognized.
    pub fn classify(raw: u32) -> Option<Self> {
        let (kind, swapped) = match raw {
            magic::MH_MAGIC => (MagicKind::Image32, false),
            magic::MH_CIGAM => (MagicKind::Image32, true),
            magic::MH_MAGIC_64 => (MagicKind::Image64, false),
            magic::MH_CIGAM_64 => (MagicKind::Image64, true),
            magic::FAT_MAGIC => (MagicKind::Universal32, false),
            magic::FAT_CIGAM => (MagicKind::Universal32, true),
            magic::FAT_MAGIC_64 => (MagicKind::Universal64, false),
            magic::FAT_CIGAM_64 => (MagicKind::Universal64, true),
            _ => return None,
        };
        Some(Self { kind, swapped })
    }

    /// Raw little-endian value of this magic.
    pub fn value(self) -> u32 {
        match (self.kind, self.swapped) {
            (MagicKind::Image32, false) => magic::MH_MAGIC,
            (MagicKind::Image32, true) => magic::MH_CIGAM,
            (MagicKind::Image64, false) => magic::MH_MAGIC_64,
            (MagicKind::Image64, true) => magic::MH_CIGAM_64,
            (MagicKind::Universal32, false) => magic::FAT_MAGIC,
            (MagicKind::Universal32, true) => magic::FAT_CIGAM,
            (MagicKind::Universal64, false) => magic::FAT_MAGIC_64,
            (MagicKind::Universal64, true) => magic::FAT_CIGAM_64,
        }
    }

    /// Universal (fat) container.
    pub fn is_universal(self) -> bool {
        matches!(self.kind, MagicKind::Universal32 | MagicKind::Universal64)
    }

    /// 64-bit image or 64-bit architecture table.
    pub fn is_64bit(self) -> bool {
        matches!(self.kind, MagicKind::Image64 | MagicKind::Universal64)
    }

    /// Field reader for data behind this magic.
    pub fn endian(self) -> Endian {
        Endian::new(self.swapped)
    }
}

/// Conditional byte swapper for one image or table.
///
/// Callers hand in slices of exactly the field width; the view layer does
/// all bounds checking beforehand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endian {
    swapped: bool,
}

impl Endian {
    /// Create an adapter; `swapped` selects big-endian fields.
    pub fn new(swapped: bool) -> Self {
        Self { swapped }
    }

    /// Fields are stored big-endian.
    pub fn is_swapped(self) -> bool {
        self.swapped
    }

    /// Byte order of the underlying fields.
    pub fn byte_order(self) -> Endianness {
        if self.swapped {
            Endianness::Big
        } else {
            Endianness::Little
        }
    }

    /// Read a 16-bit field.
    pub fn u16(self, bytes: &[u8]) -> u16 {
        if self.swapped {
            BigEndian::read_u16(bytes)
        } else {
            LittleEndian::read_u16(bytes)
        }
    }

    /// Read a 32-bit field.
    pub fn u32(self, bytes: &[u8]) -> u32 {
        if self.swapped {
            BigEndian::read_u32(bytes)
        } else {
            LittleEndian::read_u32(bytes)
        }
    }

    /// Read a signed 32-bit field (`cpu_type_t`, `cpu_subtype_t`).
    pub fn i32(self, bytes: &[u8]) -> i32 {
        if self.swapped {
            BigEndian::read_i32(bytes)
        } else {
            LittleEndian::read_i32(bytes)
        }
    }

    /// Read a 64-bit field.
    pub fn u64(self, bytes: &[u8]) -> u64 {
        if self.swapped {
            BigEndian::read_u64(bytes)
        } else {
            LittleEndian::read_u64(bytes)
        }
    }
}
