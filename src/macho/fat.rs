//! Universal (fat) container table and slice selection.

use tracing::debug;

use crate::error::{InspectError, Result};
use crate::macho::cpu::{cpu_type, cpu_type_name};
use crate::macho::endian::Magic;
use crate::macho::view::ByteView;
use crate::types::{ArchitectureSlice, Diagnostic, SliceSelector};

/// `fat_header`: magic, nfat_arch.
pub const FAT_HEADER_SIZE: usize = 8;
/// `fat_arch`
pub const FAT_ARCH_SIZE: usize = 20;
/// `fat_arch_64`
pub const FAT_ARCH_64_SIZE: usize = 32;

/// Parsed architecture table.
#[derive(Debug, Clone)]
pub struct UniversalTable {
    /// `fat_arch_64` entries
    pub is_64bit: bool,
    /// Big-endian fields
    pub swapped: bool,
    /// Entries in table order
    pub slices: Vec<ArchitectureSlice>,
}

/// Read the architecture table of a universal container.
///
/// Only the table is validated here. Slice ranges are checked when a slice
/// is selected, so listing never fails on a slice nobody asked for.
pub(crate) fn read_table(view: &ByteView<'_>, magic: Magic) -> Result<UniversalTable> {
    let endian = magic.endian();
    let count = view
        .u32(4, endian)
        .ok_or(InspectError::TruncatedHeader {
            offset: view.base(),
            expected: FAT_HEADER_SIZE,
            actual: view.len(),
        })?;

    let entry_size = if magic.is_64bit() {
        FAT_ARCH_64_SIZE
    } else {
        FAT_ARCH_SIZE
    };
    let required = FAT_HEADER_SIZE as u64 + u64::from(count) * entry_size as u64;
    if required > view.len() as u64 {
        return Err(InspectError::TruncatedTable {
            count,
            required,
            actual: view.len(),
        });
    }

    let mut slices = Vec::with_capacity(count as usize);
    for index in 0..count as usize {
        let at = FAT_HEADER_SIZE + index * entry_size;
        let entry = view
            .bytes(at, entry_size)
            .ok_or(InspectError::TruncatedTable {
                count,
                required,
                actual: view.len(),
            })?;
        let (file_offset, size, align) = if magic.is_64bit() {
            (
                endian.u64(&entry[8..16]),
                endian.u64(&entry[16..24]),
                endian.u32(&entry[24..28]),
            )
        } else {
            (
                u64::from(endian.u32(&entry[8..12])),
                u64::from(endian.u32(&entry[12..16])),
                endian.u32(&entry[16..20]),
            )
        };
        slices.push(ArchitectureSlice {
            index,
            cpu_type: endian.i32(&entry[0..4]),
            cpu_subtype: endian.i32(&entry[4..8]),
            file_offset,
            size,
            align,
        });
    }

    debug!(
        count,
        is_64bit = magic.is_64bit(),
        swapped = magic.swapped,
        "read universal table"
    );

    Ok(UniversalTable {
        is_64bit: magic.is_64bit(),
        swapped: magic.swapped,
        slices,
    })
}

/// Pick a slice by the selection policy; returns its table index.
pub(crate) fn select(slices: &[ArchitectureSlice], selector: SliceSelector) -> Result<usize> {
    let count = slices.len() as u32;
    let chosen = match selector {
        SliceSelector::Index(index) => {
            if index >= slices.len() {
                return Err(InspectError::IndexOutOfRange { index, count });
            }
            index
        }
        SliceSelector::CpuType(cpu) => slices
            .iter()
            .position(|s| s.cpu_type == cpu)
            .ok_or(InspectError::ArchitectureNotFound { cpu_type: cpu })?,
        SliceSelector::Default => {
            if slices.is_empty() {
                return Err(InspectError::IndexOutOfRange { index: 0, count });
            }
            slices
                .iter()
                .position(|s| s.cpu_type == cpu_type::ARM64)
                .unwrap_or(0)
        }
    };

    debug!(
        index = chosen,
        cpu = cpu_type_name(slices[chosen].cpu_type),
        ?selector,
        "selected universal slice"
    );
    Ok(chosen)
}

/// Narrow the container to one slice, checking its range first.
pub(crate) fn slice_view<'a>(
    view: &ByteView<'a>,
    slice: &ArchitectureSlice,
) -> Result<ByteView<'a>> {
    let out_of_bounds = || InspectError::SliceOutOfBounds {
        index: slice.index,
        offset: slice.file_offset,
        size: slice.size,
        container_len: view.len(),
    };

    let end = slice
        .file_offset
        .checked_add(slice.size)
        .ok_or_else(out_of_bounds)?;
    if end > view.len() as u64 {
        return Err(out_of_bounds());
    }
    view.sub_view(slice.file_offset as usize, slice.size as usize)
        .ok_or_else(out_of_bounds)
}

/// Non-fatal checks on the selected slice's table entry.
pub(crate) fn check_alignment(slice: &ArchitectureSlice) -> Option<Diagnostic> {
    let aligned = 1u64
        .checked_shl(slice.align)
        .is_some_and(|unit| slice.file_offset % unit == 0);
    (!aligned).then(|| {
        Diagnostic::slice(
            slice.index,
            format!(
                "offset 0x{:x} is not aligned to 2^{}",
                slice.file_offset, slice.align
            ),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macho::endian::magic;
    use crate::macho::fixtures::{fat32, fat64, fat_little_endian, patch_be_u32, ImageBuilder};

    fn table(data: &[u8]) -> Result<UniversalTable> {
        let view = ByteView::new(data);
        let raw = view.magic_at(0).unwrap();
        read_table(&view, Magic::classify(raw).unwrap())
    }

    fn two_slice_fat() -> Vec<u8> {
        fat32(&[
            (
                cpu_type::X86_64,
                3,
                ImageBuilder::new64(cpu_type::X86_64).build(),
            ),
            (cpu_type::ARM64, 0, ImageBuilder::new64(cpu_type::ARM64).build()),
        ])
    }

    #[test]
    fn test_read_table() {
        let data = two_slice_fat();
        let table = table(&data).unwrap();
        assert!(!table.is_64bit);
        assert!(table.swapped);
        assert_eq!(table.slices.len(), 2);
        assert_eq!(table.slices[0].cpu_type, cpu_type::X86_64);
        assert_eq!(table.slices[0].cpu_subtype, 3);
        assert_eq!(table.slices[0].file_offset, 48);
        assert_eq!(table.slices[0].size, 32);
        assert_eq!(table.slices[1].file_offset, 80);
        assert_eq!(table.slices[1].index, 1);
        assert_eq!(table.slices[1].cpu_name(), "ARM64");
    }

    #[test]
    fn test_read_table_64() {
        let data = fat64(&[(cpu_type::ARM64, 2, ImageBuilder::new64(cpu_type::ARM64).build())]);
        assert_eq!(
            u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            magic::FAT_CIGAM_64
        );
        let table = table(&data).unwrap();
        assert!(table.is_64bit);
        assert_eq!(table.slices[0].file_offset, 48);
        assert_eq!(table.slices[0].align, 4);
    }

    #[test]
    fn test_little_endian_tables() {
        for (is_64bit, expected_magic, first_offset) in [
            (false, magic::FAT_MAGIC, 48),
            (true, magic::FAT_MAGIC_64, 80),
        ] {
            let data = fat_little_endian(
                is_64bit,
                &[
                    (cpu_type::X86_64, 3, ImageBuilder::new64(cpu_type::X86_64).build()),
                    (cpu_type::ARM64, 0, ImageBuilder::new64(cpu_type::ARM64).build()),
                ],
            );
            assert_eq!(
                u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
                expected_magic
            );

            let table = table(&data).unwrap();
            assert_eq!(table.is_64bit, is_64bit);
            assert!(!table.swapped);
            assert_eq!(table.slices.len(), 2);
            assert_eq!(table.slices[0].cpu_type, cpu_type::X86_64);
            assert_eq!(table.slices[0].cpu_subtype, 3);
            assert_eq!(table.slices[0].file_offset, first_offset);
            assert_eq!(table.slices[0].size, 32);
            assert_eq!(table.slices[1].cpu_type, cpu_type::ARM64);
            assert_eq!(table.slices[1].align, 4);

            let chosen = select(&table.slices, SliceSelector::Default).unwrap();
            assert_eq!(chosen, 1);
            let sub = slice_view(&ByteView::new(&data), &table.slices[chosen]).unwrap();
            assert_eq!(sub.base(), table.slices[1].file_offset);
        }
    }

    #[test]
    fn test_truncated_table() {
        let mut data = two_slice_fat();
        patch_be_u32(&mut data, 4, 1000);
        match table(&data) {
            Err(InspectError::TruncatedTable {
                count,
                required,
                actual,
            }) => {
                assert_eq!(count, 1000);
                assert_eq!(required, 8 + 1000 * 20);
                assert_eq!(actual, data.len());
            }
            other => panic!("expected TruncatedTable, got {other:?}"),
        }

        // Header cut short.
        assert!(matches!(
            table(&data[..6]),
            Err(InspectError::TruncatedHeader { expected: 8, actual: 6, .. })
        ));
    }

    #[test]
    fn test_select_policies() {
        let slices = table(&two_slice_fat()).unwrap().slices;
        assert_eq!(select(&slices, SliceSelector::Default).unwrap(), 1);
        assert_eq!(select(&slices, SliceSelector::Index(0)).unwrap(), 0);
        assert_eq!(
            select(&slices, SliceSelector::CpuType(cpu_type::X86_64)).unwrap(),
            0
        );
        assert!(matches!(
            select(&slices, SliceSelector::Index(2)),
            Err(InspectError::IndexOutOfRange { index: 2, count: 2 })
        ));
        assert!(matches!(
            select(&slices, SliceSelector::CpuType(cpu_type::POWERPC)),
            Err(InspectError::ArchitectureNotFound { cpu_type: cpu_type::POWERPC })
        ));
    }

    #[test]
    fn test_default_without_arm64_is_first() {
        let data = fat32(&[
            (cpu_type::X86, 3, ImageBuilder::new32(cpu_type::X86).build()),
            (cpu_type::X86_64, 3, ImageBuilder::new64(cpu_type::X86_64).build()),
        ]);
        let slices = table(&data).unwrap().slices;
        assert_eq!(select(&slices, SliceSelector::Default).unwrap(), 0);
    }

    #[test]
    fn test_empty_table() {
        let data = fat32(&[]);
        let slices = table(&data).unwrap().slices;
        assert!(slices.is_empty());
        assert!(matches!(
            select(&slices, SliceSelector::Default),
            Err(InspectError::IndexOutOfRange { index: 0, count: 0 })
        ));
    }

    #[test]
    fn test_slice_view_bounds() {
        let mut data = two_slice_fat();
        let view = ByteView::new(&data);
        let slices = table(&data).unwrap().slices;
        let sub = slice_view(&view, &slices[1]).unwrap();
        assert_eq!(sub.base(), 80);
        assert_eq!(sub.len(), 32);

        // Second entry's size now runs past the end of the container.
        patch_be_u32(&mut data, 8 + 20 + 12, 0x1000);
        let view = ByteView::new(&data);
        let slices = table(&data).unwrap().slices;
        assert!(matches!(
            slice_view(&view, &slices[1]),
            Err(InspectError::SliceOutOfBounds { index: 1, size: 0x1000, .. })
        ));
        assert!(slice_view(&view, &slices[0]).is_ok());
    }

    #[test]
    fn test_slice_offset_overflow() {
        let slice = ArchitectureSlice {
            index: 0,
            cpu_type: cpu_type::ARM64,
            cpu_subtype: 0,
            file_offset: u64::MAX,
            size: 2,
            align: 0,
        };
        let data = [0u8; 16];
        assert!(matches!(
            slice_view(&ByteView::new(&data), &slice),
            Err(InspectError::SliceOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_alignment_check() {
        let mut slice = ArchitectureSlice {
            index: 3,
            cpu_type: cpu_type::ARM64,
            cpu_subtype: 0,
            file_offset: 0x4000,
            size: 0,
            align: 14,
        };
        assert!(check_alignment(&slice).is_none());
        slice.file_offset = 0x4010;
        let diag = check_alignment(&slice).unwrap();
        assert_eq!(diag.to_string(), "slice 3: offset 0x4010 is not aligned to 2^14");
        slice.align = 200;
        assert!(check_alignment(&slice).is_some());
    }
}
