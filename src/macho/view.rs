//! Bounds-checked view over container bytes.

use crate::macho::endian::Endian;

/// Immutable view over a byte range of the container.
///
/// `base` is the absolute offset of the view's first byte, so offsets
/// reported for a universal slice point into the original file.
#[derive(Debug, Clone, Copy)]
pub struct ByteView<'a> {
    data: &'a [u8],
    base: u64,
}

impl<'a> ByteView<'a> {
    /// View over the whole container.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, base: 0 }
    }

    /// Number of bytes in the view.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the view is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Absolute offset of the view's first byte.
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Absolute offset of a position inside the view.
    pub fn absolute(&self, offset: usize) -> u64 {
        self.base + offset as u64
    }

    /// Whether `[offset, offset + len)` lies inside the view.
    pub fn fits(&self, offset: usize, len: usize) -> bool {
        offset.checked_add(len).is_some_and(|end| end <= self.data.len())
    }

    /// Bytes in `[offset, offset + len)`.
    pub fn bytes(&self, offset: usize, len: usize) -> Option<&'a [u8]> {
        let end = offset.checked_add(len)?;
        self.data.get(offset..end)
    }

    /// Narrow to `[offset, offset + len)`.
    pub fn sub_view(&self, offset: usize, len: usize) -> Option<ByteView<'a>> {
        let data = self.bytes(offset, len)?;
        Some(ByteView {
            data,
            base: self.absolute(offset),
        })
    }

    /// 32-bit field through the endianness adapter.
    pub fn u32(&self, offset: usize, endian: Endian) -> Option<u32> {
        self.bytes(offset, 4).map(|b| endian.u32(b))
    }

    /// Raw little-endian magic at `offset`.
    pub fn magic_at(&self, offset: usize) -> Option<u32> {
        self.u32(offset, Endian::new(false))
    }
}
