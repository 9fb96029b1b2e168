//! Load-command stream walker.
//!
//! Each command is bounds-checked against the image before any of its fields
//! are touched, then handed to the decoder registered for its kind.

use tracing::{debug, trace};

use crate::error::{InspectError, Result};
use crate::macho::decoders;
use crate::macho::endian::Endian;
use crate::macho::view::ByteView;
use crate::types::{CommandPayload, Diagnostic, ImageHeader, LoadCommand, SegmentRecord};

/// Size of the `(cmd, cmdsize)` prefix every command starts with.
pub const LOAD_COMMAND_SIZE: usize = 8;

/// Load command kinds, `LC_` prefix dropped.
pub mod lc {
    #![allow(missing_docs)]

    /// Set on kinds the dynamic linker must understand.
    pub const REQ_DYLD: u32 = 0x8000_0000;

    pub const SEGMENT: u32 = 0x1;
    pub const SYMTAB: u32 = 0x2;
    pub const THREAD: u32 = 0x4;
    pub const UNIXTHREAD: u32 = 0x5;
    pub const DYSYMTAB: u32 = 0xB;
    pub const LOAD_DYLIB: u32 = 0xC;
    pub const ID_DYLIB: u32 = 0xD;
    pub const LOAD_DYLINKER: u32 = 0xE;
    pub const ID_DYLINKER: u32 = 0xF;
    pub const LOAD_WEAK_DYLIB: u32 = 0x18 | REQ_DYLD;
    pub const SEGMENT_64: u32 = 0x19;
    pub const UUID: u32 = 0x1B;
    pub const RPATH: u32 = 0x1C | REQ_DYLD;
    pub const CODE_SIGNATURE: u32 = 0x1D;
    pub const SEGMENT_SPLIT_INFO: u32 = 0x1E;
    pub const REEXPORT_DYLIB: u32 = 0x1F | REQ_DYLD;
    pub const ENCRYPTION_INFO: u32 = 0x21;
    pub const DYLD_INFO: u32 = 0x22;
    pub const DYLD_INFO_ONLY: u32 = 0x22 | REQ_DYLD;
    pub const LOAD_UPWARD_DYLIB: u32 = 0x23 | REQ_DYLD;
    pub const VERSION_MIN_MACOSX: u32 = 0x24;
    pub const VERSION_MIN_IPHONEOS: u32 = 0x25;
    pub const FUNCTION_STARTS: u32 = 0x26;
    pub const DYLD_ENVIRONMENT: u32 = 0x27;
    pub const MAIN: u32 = 0x28 | REQ_DYLD;
    pub const DATA_IN_CODE: u32 = 0x29;
    pub const SOURCE_VERSION: u32 = 0x2A;
    pub const ENCRYPTION_INFO_64: u32 = 0x2C;
    pub const BUILD_VERSION: u32 = 0x32;
    pub const DYLD_EXPORTS_TRIE: u32 = 0x33 | REQ_DYLD;
    pub const DYLD_CHAINED_FIXUPS: u32 = 0x34 | REQ_DYLD;
}

/// `LC_*` name of a command kind, `LC_OTHER` if not listed.
pub fn command_name(kind: u32) -> &'static str {
    match kind {
        lc::SEGMENT => "LC_SEGMENT",
        lc::SYMTAB => "LC_SYMTAB",
        lc::THREAD => "LC_THREAD",
        lc::UNIXTHREAD => "LC_UNIXTHREAD",
        lc::DYSYMTAB => "LC_DYSYMTAB",
        lc::LOAD_DYLIB => "LC_LOAD_DYLIB",
        lc::ID_DYLIB => "LC_ID_DYLIB",
        lc::LOAD_DYLINKER => "LC_LOAD_DYLINKER",
        lc::ID_DYLINKER => "LC_ID_DYLINKER",
        lc::LOAD_WEAK_DYLIB => "LC_LOAD_WEAK_DYLIB",
        lc::SEGMENT_64 => "LC_SEGMENT_64",
        lc::UUID => "LC_UUID",
        lc::RPATH => "LC_RPATH",
        lc::CODE_SIGNATURE => "LC_CODE_SIGNATURE",
        lc::SEGMENT_SPLIT_INFO => "LC_SEGMENT_SPLIT_INFO",
        lc::REEXPORT_DYLIB => "LC_REEXPORT_DYLIB",
        lc::ENCRYPTION_INFO => "LC_ENCRYPTION_INFO",
        lc::DYLD_INFO => "LC_DYLD_INFO",
        lc::DYLD_INFO_ONLY => "LC_DYLD_INFO_ONLY",
        lc::LOAD_UPWARD_DYLIB => "LC_LOAD_UPWARD_DYLIB",
        lc::VERSION_MIN_MACOSX => "LC_VERSION_MIN_MACOSX",
        lc::VERSION_MIN_IPHONEOS => "LC_VERSION_MIN_IPHONEOS",
        lc::FUNCTION_STARTS => "LC_FUNCTION_STARTS",
        lc::DYLD_ENVIRONMENT => "LC_DYLD_ENVIRONMENT",
        lc::MAIN => "LC_MAIN",
        lc::DATA_IN_CODE => "LC_DATA_IN_CODE",
        lc::SOURCE_VERSION => "LC_SOURCE_VERSION",
        lc::ENCRYPTION_INFO_64 => "LC_ENCRYPTION_INFO_64",
        lc::BUILD_VERSION => "LC_BUILD_VERSION",
        lc::DYLD_EXPORTS_TRIE => "LC_DYLD_EXPORTS_TRIE",
        lc::DYLD_CHAINED_FIXUPS => "LC_DYLD_CHAINED_FIXUPS",
        _ => "LC_OTHER",
    }
}

/// One load command's bytes, already validated against the image.
///
/// `data` is exactly `cmdsize` bytes long; field reads past it fail with
/// [`InspectError::CommandTooSmall`] instead of panicking.
#[derive(Debug, Clone, Copy)]
pub struct RawCommand<'a> {
    /// Position in the command stream
    pub index: u32,
    /// `cmd` field
    pub kind: u32,
    /// The whole command, prefix included
    pub data: &'a [u8],
    /// Absolute container offset of the command
    pub offset: u64,
    /// Byte order of the enclosing image
    pub endian: Endian,
}

impl<'a> RawCommand<'a> {
    /// Declared `cmdsize`.
    pub fn size(&self) -> u32 {
        // data was sliced from a u32 cmdsize
        u32::try_from(self.data.len()).unwrap_or(u32::MAX)
    }

    /// Fail unless the command holds at least `required` bytes.
    pub fn require(&self, required: usize) -> Result<()> {
        if self.data.len() < required {
            return Err(self.too_small(required));
        }
        Ok(())
    }

    /// Bytes in `[at, at + len)` of the command.
    pub fn bytes(&self, at: usize, len: usize) -> Result<&'a [u8]> {
        at.checked_add(len)
            .and_then(|end| self.data.get(at..end))
            .ok_or_else(|| self.too_small(at.saturating_add(len)))
    }

    /// 32-bit field at `at`.
    pub fn u32(&self, at: usize) -> Result<u32> {
        self.bytes(at, 4).map(|b| self.endian.u32(b))
    }

    /// 64-bit field at `at`.
    pub fn u64(&self, at: usize) -> Result<u64> {
        self.bytes(at, 8).map(|b| self.endian.u64(b))
    }

    fn too_small(&self, required: usize) -> InspectError {
        InspectError::CommandTooSmall {
            index: self.index,
            command: command_name(self.kind),
            size: self.size(),
            required,
        }
    }
}

/// Where an `LC_MAIN` was seen and what it held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MainEntrySite {
    /// Index of the `LC_MAIN` command
    pub command_index: u32,
    /// `entryoff`, relative to the image start
    pub file_offset: u64,
}

/// Where a thread-state program counter was seen and its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadPcSite {
    /// Index of the thread command
    pub command_index: u32,
    /// Program counter from the register state
    pub pc: u64,
}

/// Everything the walk accumulates for one image.
#[derive(Debug, Default)]
pub struct CommandWalk {
    /// Decoded commands in stream order
    pub commands: Vec<LoadCommand>,
    /// Segment table in discovery order
    pub segments: Vec<SegmentRecord>,
    /// Last `LC_MAIN` seen
    pub main_entry: Option<MainEntrySite>,
    /// Last thread-state program counter seen
    pub thread_pc: Option<ThreadPcSite>,
    /// Non-fatal findings
    pub diagnostics: Vec<Diagnostic>,
    /// Bytes covered by the commands that were walked
    pub consumed: u64,
}

impl CommandWalk {
    fn record(&mut self, raw: &RawCommand<'_>, payload: CommandPayload) {
        match &payload {
            CommandPayload::Segment(segment) => self.segments.push(segment.clone()),
            CommandPayload::Main(main) => {
                if let Some(previous) = self.main_entry {
                    self.diagnostics.push(Diagnostic::command(
                        raw.index,
                        format!(
                            "LC_MAIN repeated; replaces entryoff from command {}",
                            previous.command_index
                        ),
                    ));
                }
                self.main_entry = Some(MainEntrySite {
                    command_index: raw.index,
                    file_offset: main.entry_offset,
                });
            }
            CommandPayload::Thread(thread) => {
                if thread.truncated {
                    self.diagnostics.push(Diagnostic::command(
                        raw.index,
                        "thread state records run past cmdsize; scan stopped",
                    ));
                }
                if let Some(pc) = thread.program_counter() {
                    self.thread_pc = Some(ThreadPcSite {
                        command_index: raw.index,
                        pc,
                    });
                }
            }
            CommandPayload::Unrecognized if command_name(raw.kind) == "LC_OTHER" => {
                self.diagnostics.push(Diagnostic::command(
                    raw.index,
                    format!("unrecognized load command kind 0x{:x}", raw.kind),
                ));
            }
            _ => {}
        }

        self.commands.push(LoadCommand {
            index: raw.index,
            kind: raw.kind,
            declared_size: raw.size(),
            byte_range: raw.offset..raw.offset + raw.data.len() as u64,
            payload,
        });
    }
}

/// Walk the `command_count` commands that follow the header.
///
/// The hard bound is the end of `view`; `commands_total_size` only feeds a
/// diagnostic when it disagrees with what was walked.
pub(crate) fn walk(view: &ByteView<'_>, header: &ImageHeader, endian: Endian) -> Result<CommandWalk> {
    let start = header.size();
    let mut cursor = start;
    let mut walk = CommandWalk::default();

    for index in 0..header.command_count {
        let prefix = view
            .bytes(cursor, LOAD_COMMAND_SIZE)
            .ok_or(InspectError::TruncatedCommand {
                index,
                offset: view.absolute(cursor),
            })?;
        let kind = endian.u32(&prefix[0..4]);
        let size = endian.u32(&prefix[4..8]);

        if (size as usize) < LOAD_COMMAND_SIZE {
            return Err(InspectError::InvalidCommandSize {
                index,
                offset: view.absolute(cursor),
                size,
            });
        }

        let data = view
            .bytes(cursor, size as usize)
            .ok_or(InspectError::CommandExceedsFile {
                index,
                offset: view.absolute(cursor),
                size,
                available: (view.len() - cursor) as u64,
            })?;

        let raw = RawCommand {
            index,
            kind,
            data,
            offset: view.absolute(cursor),
            endian,
        };

        trace!(index, kind = command_name(kind), size, offset = raw.offset, "load command");

        let payload = decoders::decode(&raw)?;
        walk.record(&raw, payload);

        cursor += size as usize;
    }

    walk.consumed = (cursor - start) as u64;
    if walk.consumed != u64::from(header.commands_total_size) {
        walk.diagnostics.push(Diagnostic::image(format!(
            "load commands occupy {} bytes but sizeofcmds is {}",
            walk.consumed, header.commands_total_size
        )));
    }

    debug!(
        commands = walk.commands.len(),
        segments = walk.segments.len(),
        diagnostics = walk.diagnostics.len(),
        "walked load commands"
    );

    Ok(walk)
}
