//! Per-kind load command decoders.
//!
//! Every read goes through [`RawCommand`], which is already cut to the
//! declared `cmdsize`, so a decoder can never look past its own command.

use memchr::memchr;

use crate::error::{InspectError, Result};
use crate::macho::commands::{lc, RawCommand};
use crate::macho::width::{Bits32, Bits64, Width};
use crate::types::{
    CommandPayload, DylibKind, DylibReference, MainEntry, PathKind, PathReference, SectionRecord,
    SegmentRecord, ThreadCommand, ThreadStateEntry, Uuid, VmProt,
};

/// `dylib_command`: cmd, cmdsize, name offset, timestamp, two versions.
pub const DYLIB_COMMAND_SIZE: usize = 24;
/// `rpath_command` / `dylinker_command`: cmd, cmdsize, path offset.
pub const PATH_COMMAND_SIZE: usize = 12;
/// `uuid_command`
pub const UUID_COMMAND_SIZE: usize = 24;
/// `entry_point_command`
pub const ENTRY_POINT_COMMAND_SIZE: usize = 24;

/// `ARM_THREAD_STATE64`
pub const ARM_THREAD_STATE64: u32 = 6;
/// Words in `arm_thread_state64_t`: x0-x28, fp, lr, sp, pc, cpsr, pad.
pub const ARM_THREAD_STATE64_COUNT: u32 = 68;
/// Byte offset of `pc` inside `arm_thread_state64_t`.
const ARM_THREAD_STATE64_PC: usize = 32 * 8;

/// Command families with a structured decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// `LC_SEGMENT`
    Segment32,
    /// `LC_SEGMENT_64`
    Segment64,
    /// Commands carrying a `dylib` record
    Dylib(DylibKind),
    /// Commands carrying one path string
    Path(PathKind),
    /// `LC_UUID`
    Uuid,
    /// `LC_MAIN`
    Main,
    /// `LC_THREAD` or `LC_UNIXTHREAD`
    Thread {
        /// `LC_UNIXTHREAD`
        unix: bool,
    },
}

const FAMILIES: &[(u32, Family)] = &[
    (lc::SEGMENT, Family::Segment32),
    (lc::SEGMENT_64, Family::Segment64),
    (lc::LOAD_DYLIB, Family::Dylib(DylibKind::Load)),
    (lc::LOAD_WEAK_DYLIB, Family::Dylib(DylibKind::WeakLoad)),
    (lc::REEXPORT_DYLIB, Family::Dylib(DylibKind::Reexport)),
    (lc::LOAD_UPWARD_DYLIB, Family::Dylib(DylibKind::LoadUpward)),
    (lc::ID_DYLIB, Family::Dylib(DylibKind::Id)),
    (lc::RPATH, Family::Path(PathKind::RunPath)),
    (lc::LOAD_DYLINKER, Family::Path(PathKind::LoadDylinker)),
    (lc::ID_DYLINKER, Family::Path(PathKind::IdDylinker)),
    (lc::DYLD_ENVIRONMENT, Family::Path(PathKind::DyldEnvironment)),
    (lc::UUID, Family::Uuid),
    (lc::MAIN, Family::Main),
    (lc::THREAD, Family::Thread { unix: false }),
    (lc::UNIXTHREAD, Family::Thread { unix: true }),
];

/// Decoder family registered for `kind`.
pub fn family(kind: u32) -> Option<Family> {
    FAMILIES
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, family)| *family)
}

/// Decode one command; kinds without a family come back `Unrecognized`.
pub(crate) fn decode(raw: &RawCommand<'_>) -> Result<CommandPayload> {
    let Some(family) = family(raw.kind) else {
        return Ok(CommandPayload::Unrecognized);
    };

    let payload = match family {
        Family::Segment32 => CommandPayload::Segment(decode_segment::<Bits32>(raw)?),
        Family::Segment64 => CommandPayload::Segment(decode_segment::<Bits64>(raw)?),
        Family::Dylib(kind) => CommandPayload::Dylib(decode_dylib(raw, kind)?),
        Family::Path(kind) => CommandPayload::Path(decode_path(raw, kind)?),
        Family::Uuid => CommandPayload::Uuid(decode_uuid(raw)?),
        Family::Main => CommandPayload::Main(decode_main(raw)?),
        Family::Thread { unix } => CommandPayload::Thread(decode_thread(raw, unix)),
    };
    Ok(payload)
}

fn decode_segment<W: Width>(raw: &RawCommand<'_>) -> Result<SegmentRecord> {
    raw.require(W::SEGMENT_COMMAND_SIZE)?;

    let word = |at: usize| raw.bytes(at, W::WORD).map(|b| W::word(raw.endian, b));
    let words = 24;
    let tail = words + 4 * W::WORD;

    let nsects = raw.u32(tail + 8)?;
    let required = W::SEGMENT_COMMAND_SIZE as u64 + u64::from(nsects) * W::SECTION_SIZE as u64;
    if required > u64::from(raw.size()) {
        return Err(InspectError::SectionsTruncated {
            index: raw.index,
            nsects,
            size: raw.size(),
            required,
        });
    }

    let sections = (0..nsects as usize)
        .map(|i| decode_section::<W>(raw, W::SEGMENT_COMMAND_SIZE + i * W::SECTION_SIZE))
        .collect::<Result<Vec<_>>>()?;

    Ok(SegmentRecord {
        name: fixed_name(raw.bytes(8, 16)?),
        vm_addr: word(words)?,
        vm_size: word(words + W::WORD)?,
        file_offset: word(words + 2 * W::WORD)?,
        file_size: word(words + 3 * W::WORD)?,
        max_prot: VmProt::from_bits_retain(raw.u32(tail)?),
        init_prot: VmProt::from_bits_retain(raw.u32(tail + 4)?),
        flags: raw.u32(tail + 12)?,
        sections,
    })
}

fn decode_section<W: Width>(raw: &RawCommand<'_>, base: usize) -> Result<SectionRecord> {
    let word = |at: usize| raw.bytes(at, W::WORD).map(|b| W::word(raw.endian, b));
    // offset, align, reloff, nreloc, flags
    let fields = base + 32 + 2 * W::WORD;

    Ok(SectionRecord {
        name: fixed_name(raw.bytes(base, 16)?),
        segment_name: fixed_name(raw.bytes(base + 16, 16)?),
        addr: word(base + 32)?,
        size: word(base + 32 + W::WORD)?,
        file_offset: raw.u32(fields)?,
        align: raw.u32(fields + 4)?,
        flags: raw.u32(fields + 16)?,
    })
}

fn decode_dylib(raw: &RawCommand<'_>, kind: DylibKind) -> Result<DylibReference> {
    raw.require(DYLIB_COMMAND_SIZE)?;
    Ok(DylibReference {
        kind,
        path: string_at(raw, raw.u32(8)?)?,
        timestamp: raw.u32(12)?,
        current_version: raw.u32(16)?,
        compatibility_version: raw.u32(20)?,
    })
}

fn decode_path(raw: &RawCommand<'_>, kind: PathKind) -> Result<PathReference> {
    raw.require(PATH_COMMAND_SIZE)?;
    Ok(PathReference {
        kind,
        path: string_at(raw, raw.u32(8)?)?,
    })
}

fn decode_uuid(raw: &RawCommand<'_>) -> Result<Uuid> {
    raw.require(UUID_COMMAND_SIZE)?;
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(raw.bytes(8, 16)?);
    Ok(Uuid(bytes))
}

fn decode_main(raw: &RawCommand<'_>) -> Result<MainEntry> {
    raw.require(ENTRY_POINT_COMMAND_SIZE)?;
    Ok(MainEntry {
        entry_offset: raw.u64(8)?,
        stack_size: raw.u64(16)?,
    })
}

/// Scan `(flavor, count)` records until one would run past the command.
fn decode_thread(raw: &RawCommand<'_>, unix: bool) -> ThreadCommand {
    let len = raw.data.len();
    let mut states = Vec::new();
    let mut at = 8;
    let mut truncated = false;

    while at + 8 <= len {
        let flavor = raw.endian.u32(&raw.data[at..at + 4]);
        let count = raw.endian.u32(&raw.data[at + 4..at + 8]);
        let state = at + 8;
        let span = u64::from(count) * 4;

        if state as u64 + span > len as u64 {
            truncated = true;
            break;
        }

        let program_counter = (flavor == ARM_THREAD_STATE64 && count >= ARM_THREAD_STATE64_COUNT)
            .then(|| {
                let pc = state + ARM_THREAD_STATE64_PC;
                raw.endian.u64(&raw.data[pc..pc + 8])
            });

        states.push(ThreadStateEntry {
            flavor,
            register_count: count,
            program_counter,
        });
        at = state + span as usize;
    }

    ThreadCommand {
        unix,
        states,
        truncated: truncated || at < len,
    }
}

/// NUL-terminated string at `offset` from the command start.
///
/// The scan never leaves the command: an offset at or past `cmdsize` is a
/// bad offset, and a string that reaches the end without a NUL is
/// unterminated. Invalid UTF-8 is replaced rather than rejected.
pub fn string_at(raw: &RawCommand<'_>, offset: u32) -> Result<String> {
    let start = offset as usize;
    if start >= raw.data.len() {
        return Err(InspectError::BadStringOffset {
            index: raw.index,
            offset,
            size: raw.size(),
        });
    }

    let tail = &raw.data[start..];
    let end = memchr(0, tail).ok_or(InspectError::UnterminatedString {
        index: raw.index,
        offset,
    })?;
    Ok(String::from_utf8_lossy(&tail[..end]).into_owned())
}

/// 16-byte name field, cut at the first NUL if there is one.
pub fn fixed_name(bytes: &[u8]) -> String {
    let end = memchr(0, bytes).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
