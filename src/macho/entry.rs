//! Entry point resolution.

use tracing::debug;

use crate::macho::commands::{MainEntrySite, ThreadPcSite};
use crate::types::{Diagnostic, EntryPoint, SegmentRecord};

/// Resolve the entry point once every command has been seen.
///
/// A thread-state PC is already a virtual address and wins over `LC_MAIN`.
/// An `LC_MAIN` offset is mapped through the first segment whose file range
/// contains it.
pub(crate) fn resolve(
    segments: &[SegmentRecord],
    main: Option<MainEntrySite>,
    thread: Option<ThreadPcSite>,
    diagnostics: &mut Vec<Diagnostic>,
) -> EntryPoint {
    if let Some(thread) = thread {
        if let Some(main) = main {
            diagnostics.push(Diagnostic::command(
                main.command_index,
                format!(
                    "LC_MAIN entryoff 0x{:x} ignored; thread state in command {} sets pc 0x{:x}",
                    main.file_offset, thread.command_index, thread.pc
                ),
            ));
        }
        debug!(pc = thread.pc, "entry point from thread state");
        return EntryPoint::FromUnixThread { pc: thread.pc };
    }

    let Some(main) = main else {
        return EntryPoint::Unresolved { file_offset: None };
    };

    let Some(segment) = segments
        .iter()
        .find(|s| s.contains_file_offset(main.file_offset))
    else {
        diagnostics.push(Diagnostic::command(
            main.command_index,
            format!(
                "LC_MAIN entryoff 0x{:x} is not inside any segment",
                main.file_offset
            ),
        ));
        return EntryPoint::Unresolved {
            file_offset: Some(main.file_offset),
        };
    };

    match segment
        .vm_addr
        .checked_add(main.file_offset - segment.file_offset)
    {
        Some(address) => {
            debug!(address, segment = %segment.name, "entry point from LC_MAIN");
            EntryPoint::FromMainCommand {
                file_offset: main.file_offset,
                address,
                segment: segment.name.clone(),
            }
        }
        None => {
            diagnostics.push(Diagnostic::command(
                main.command_index,
                format!(
                    "LC_MAIN entryoff 0x{:x} overflows the address space of {}",
                    main.file_offset, segment.name
                ),
            ));
            EntryPoint::Unresolved {
                file_offset: Some(main.file_offset),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VmProt;

    fn segment(name: &str, vm_addr: u64, file_offset: u64, file_size: u64) -> SegmentRecord {
        SegmentRecord {
            name: name.to_string(),
            vm_addr,
            vm_size: file_size,
            file_offset,
            file_size,
            max_prot: VmProt::READ,
            init_prot: VmProt::READ,
            flags: 0,
            sections: Vec::new(),
        }
    }

    fn main_at(file_offset: u64) -> Option<MainEntrySite> {
        Some(MainEntrySite {
            command_index: 4,
            file_offset,
        })
    }

    #[test]
    fn test_main_mapped_through_segment() {
        let segments = vec![
            segment("__PAGEZERO", 0, 0, 0),
            segment("__TEXT", 0x1_0000_0000, 0, 0x4000),
            segment("__DATA", 0x1_0000_4000, 0x4000, 0x4000),
        ];
        let mut diags = Vec::new();

        let entry = resolve(&segments, main_at(0x100), None, &mut diags);
        assert_eq!(
            entry,
            EntryPoint::FromMainCommand {
                file_offset: 0x100,
                address: 0x1_0000_0100,
                segment: "__TEXT".to_string(),
            }
        );

        let entry = resolve(&segments, main_at(0x4008), None, &mut diags);
        assert_eq!(entry.address(), Some(0x1_0000_4008));
        assert!(diags.is_empty());
    }

    #[test]
    fn test_first_containing_segment_wins() {
        let segments = vec![
            segment("__A", 0x1000, 0, 0x2000),
            segment("__B", 0x9000, 0x1000, 0x1000),
        ];
        let mut diags = Vec::new();
        let entry = resolve(&segments, main_at(0x1800), None, &mut diags);
        assert_eq!(entry.address(), Some(0x2800));
    }

    #[test]
    fn test_unmapped_main() {
        let segments = vec![segment("__TEXT", 0x1000, 0, 0x1000)];
        let mut diags = Vec::new();
        let entry = resolve(&segments, main_at(0x1000), None, &mut diags);
        assert_eq!(
            entry,
            EntryPoint::Unresolved {
                file_offset: Some(0x1000)
            }
        );
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn test_thread_pc_overrides_main() {
        let segments = vec![segment("__TEXT", 0x1_0000_0000, 0, 0x1000)];
        let mut diags = Vec::new();
        let thread = Some(ThreadPcSite {
            command_index: 5,
            pc: 0x1_0000_0200,
        });
        let entry = resolve(&segments, main_at(0x100), thread, &mut diags);
        assert_eq!(entry, EntryPoint::FromUnixThread { pc: 0x1_0000_0200 });
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn test_nothing_to_resolve() {
        let mut diags = Vec::new();
        assert_eq!(
            resolve(&[], None, None, &mut diags),
            EntryPoint::Unresolved { file_offset: None }
        );
        assert!(diags.is_empty());
    }

    #[test]
    fn test_address_overflow() {
        let segments = vec![segment("__TEXT", u64::MAX - 4, 0, 0x100)];
        let mut diags = Vec::new();
        let entry = resolve(&segments, main_at(0x10), None, &mut diags);
        assert_eq!(entry.address(), None);
        assert_eq!(diags.len(), 1);
    }
}
