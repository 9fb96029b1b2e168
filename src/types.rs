//! Core types for the Mach-O inspector.
//!
//! Everything here is an owned value: a [`ParseReport`] never borrows from
//! the container it was decoded from.

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::Range;

use crate::macho::cpu;
use crate::macho::endian::{Endian, Magic, MagicKind};
use crate::macho::header::{file_type_name, HeaderFlags};

/// Byte ordering (endianness).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    /// Little-endian byte order.
    #[default]
    Little,
    /// Big-endian byte order.
    Big,
}

impl fmt::Display for Endianness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endianness::Little => write!(f, "little"),
            Endianness::Big => write!(f, "big"),
        }
    }
}

/// How to pick one slice out of a universal container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SliceSelector {
    /// First ARM64 slice, else slice 0.
    #[default]
    Default,
    /// Explicit position in the architecture table.
    Index(usize),
    /// First slice with this CPU type.
    CpuType(i32),
}

/// Options for decoding a container.
#[derive(Debug, Clone, Default)]
pub struct InspectOptions {
    /// Slice selection policy for universal containers
    pub selector: SliceSelector,
}

impl InspectOptions {
    /// Create options with the default selection policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the slice at `index`.
    pub fn with_index(index: usize) -> Self {
        Self {
            selector: SliceSelector::Index(index),
        }
    }

    /// Select the first slice carrying `cpu_type`.
    pub fn with_cpu_type(cpu_type: i32) -> Self {
        Self {
            selector: SliceSelector::CpuType(cpu_type),
        }
    }
}

/// One entry of a universal container's architecture table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchitectureSlice {
    /// Position in the architecture table
    pub index: usize,
    /// CPU type
    pub cpu_type: i32,
    /// CPU subtype
    pub cpu_subtype: i32,
    /// Offset of the thin image in the container
    pub file_offset: u64,
    /// Size of the thin image in bytes
    pub size: u64,
    /// Alignment as a power of two
    pub align: u32,
}

impl ArchitectureSlice {
    /// Short CPU name (`ARM64`, `X86_64`, ...).
    pub fn cpu_name(&self) -> &'static str {
        cpu::cpu_type_name(self.cpu_type)
    }
}

/// Universal-container context of a decoded slice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniversalInfo {
    /// Architecture table uses 64-bit offsets and sizes
    pub is_64bit: bool,
    /// Table fields are stored big-endian
    pub swapped: bool,
    /// Every entry of the architecture table
    pub slices: Vec<ArchitectureSlice>,
    /// Index of the slice that was decoded
    pub selected: usize,
}

impl UniversalInfo {
    /// The decoded slice's table entry.
    pub fn selected_slice(&self) -> Option<&ArchitectureSlice> {
        self.slices.get(self.selected)
    }
}

/// Fixed header of a thin image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageHeader {
    /// 64-bit layout (`mach_header_64`)
    pub is_64bit: bool,
    /// Fields are stored big-endian
    pub swapped: bool,
    /// CPU type
    pub cpu_type: i32,
    /// CPU subtype
    pub cpu_subtype: i32,
    /// File type (`MH_EXECUTE`, `MH_DYLIB`, ...)
    pub file_type: u32,
    /// Number of load commands (`ncmds`)
    pub command_count: u32,
    /// Declared size of the command stream (`sizeofcmds`)
    pub commands_total_size: u32,
    /// Header flags
    pub flags: u32,
    /// Reserved word of the 64-bit header, zero for 32-bit
    pub reserved: u32,
}

impl ImageHeader {
    /// The magic value this header was decoded from.
    pub fn magic(&self) -> u32 {
        let kind = if self.is_64bit {
            MagicKind::Image64
        } else {
            MagicKind::Image32
        };
        Magic::new(kind, self.swapped).value()
    }

    /// Size of the fixed header in bytes.
    pub fn size(&self) -> usize {
        if self.is_64bit {
            crate::macho::header::MACH_HEADER_64_SIZE
        } else {
            crate::macho::header::MACH_HEADER_SIZE
        }
    }

    /// Byte order of every multi-byte field in the image.
    pub fn byte_order(&self) -> Endianness {
        Endian::new(self.swapped).byte_order()
    }

    /// Short CPU name.
    pub fn cpu_name(&self) -> &'static str {
        cpu::cpu_type_name(self.cpu_type)
    }

    /// File type name (`MH_EXECUTE`, ...).
    pub fn file_type_name(&self) -> &'static str {
        file_type_name(self.file_type)
    }

    /// Decoded header flags; unknown bits are retained.
    pub fn header_flags(&self) -> HeaderFlags {
        HeaderFlags::from_bits_retain(self.flags)
    }
}

bitflags! {
    /// Virtual memory protection of a segment.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct VmProt: u32 {
        const READ = 0x1;
        const WRITE = 0x2;
        const EXECUTE = 0x4;
    }
}

impl VmProt {
    /// `rwx`-style rendering.
    pub fn to_rwx(self) -> String {
        let mut s = String::with_capacity(3);
        s.push(if self.contains(VmProt::READ) { 'r' } else { '-' });
        s.push(if self.contains(VmProt::WRITE) { 'w' } else { '-' });
        s.push(if self.contains(VmProt::EXECUTE) { 'x' } else { '-' });
        s
    }
}

/// A segment and its sections, widened to 64-bit fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentRecord {
    /// Segment name (at most 16 bytes)
    pub name: String,
    /// Virtual address
    pub vm_addr: u64,
    /// Virtual size
    pub vm_size: u64,
    /// File offset, relative to the image start
    pub file_offset: u64,
    /// Bytes mapped from the file
    pub file_size: u64,
    /// Maximum protection
    pub max_prot: VmProt,
    /// Initial protection
    pub init_prot: VmProt,
    /// Segment flags
    pub flags: u32,
    /// Sections, in command order
    pub sections: Vec<SectionRecord>,
}

impl SegmentRecord {
    /// Whether `file_offset` lies inside the file range this segment maps.
    pub fn contains_file_offset(&self, offset: u64) -> bool {
        offset >= self.file_offset && offset - self.file_offset < self.file_size
    }
}

/// A section inside a segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionRecord {
    /// Section name (at most 16 bytes)
    pub name: String,
    /// Owning segment's name as recorded in the section
    pub segment_name: String,
    /// Virtual address
    pub addr: u64,
    /// Size in bytes
    pub size: u64,
    /// File offset
    pub file_offset: u32,
    /// Alignment as a power of two
    pub align: u32,
    /// Type and attribute flags
    pub flags: u32,
}

/// Which dylib command a reference came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DylibKind {
    /// `LC_LOAD_DYLIB`
    Load,
    /// `LC_LOAD_WEAK_DYLIB`
    WeakLoad,
    /// `LC_REEXPORT_DYLIB`
    Reexport,
    /// `LC_LOAD_UPWARD_DYLIB`
    LoadUpward,
    /// `LC_ID_DYLIB`
    Id,
}

/// A dynamic library dependency (or the image's own install name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DylibReference {
    /// Command the reference came from
    pub kind: DylibKind,
    /// Install name
    pub path: String,
    /// Build timestamp, usually 2
    pub timestamp: u32,
    /// Packed `xxxx.yy.zz`
    pub current_version: u32,
    /// Packed `xxxx.yy.zz`
    pub compatibility_version: u32,
}

impl DylibReference {
    /// Current version as `X.Y.Z`.
    pub fn current_version_string(&self) -> String {
        format_version(self.current_version)
    }

    /// Compatibility version as `X.Y.Z`.
    pub fn compatibility_version_string(&self) -> String {
        format_version(self.compatibility_version)
    }
}

/// Render a packed `xxxx.yy.zz` version number.
pub fn format_version(version: u32) -> String {
    format!(
        "{}.{}.{}",
        version >> 16,
        (version >> 8) & 0xFF,
        version & 0xFF
    )
}

/// Which path command a reference came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathKind {
    /// `LC_RPATH`
    RunPath,
    /// `LC_LOAD_DYLINKER`
    LoadDylinker,
    /// `LC_ID_DYLINKER`
    IdDylinker,
    /// `LC_DYLD_ENVIRONMENT`
    DyldEnvironment,
}

/// A single-path load command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathReference {
    /// Command the path came from
    pub kind: PathKind,
    /// Path or environment string
    pub path: String,
}

/// Image UUID from `LC_UUID`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Uuid(pub [u8; 16]);

impl Uuid {
    /// Parse the hyphenated (or bare) hex form.
    pub fn parse_str(s: &str) -> Option<Self> {
        let digits: String = s.chars().filter(|c| *c != '-').collect();
        let bytes = hex::decode(digits).ok()?;
        let bytes: [u8; 16] = bytes.try_into().ok()?;
        Some(Self(bytes))
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{}-{}-{}-{}-{}",
            hex::encode(&b[0..4]),
            hex::encode(&b[4..6]),
            hex::encode(&b[6..8]),
            hex::encode(&b[8..10]),
            hex::encode(&b[10..16])
        )
    }
}

impl Serialize for Uuid {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Uuid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Uuid::parse_str(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid uuid '{s}'")))
    }
}

/// `LC_MAIN` contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MainEntry {
    /// Entry point as a file offset relative to the image start
    pub entry_offset: u64,
    /// Initial stack size, zero for the default
    pub stack_size: u64,
}

/// One `(flavor, count)` record of a thread command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadStateEntry {
    /// Register-state flavor
    pub flavor: u32,
    /// State size in 32-bit words
    pub register_count: u32,
    /// Program counter, for 64-bit ARM general register state only
    pub program_counter: Option<u64>,
}

/// `LC_THREAD` / `LC_UNIXTHREAD` contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadCommand {
    /// Whether the command seeds a Unix process (`LC_UNIXTHREAD`)
    pub unix: bool,
    /// State records in command order
    pub states: Vec<ThreadStateEntry>,
    /// Scanning stopped at a record that did not fit the command
    pub truncated: bool,
}

impl ThreadCommand {
    /// Last program counter found in the command's state records.
    pub fn program_counter(&self) -> Option<u64> {
        self.states.iter().rev().find_map(|s| s.program_counter)
    }
}

/// Decoded payload of a load command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum CommandPayload {
    /// `LC_SEGMENT` / `LC_SEGMENT_64`
    Segment(SegmentRecord),
    /// Dylib family
    Dylib(DylibReference),
    /// Path family
    Path(PathReference),
    /// `LC_UUID`
    Uuid(Uuid),
    /// `LC_MAIN`
    Main(MainEntry),
    /// `LC_THREAD` / `LC_UNIXTHREAD`
    Thread(ThreadCommand),
    /// Kind without a structured decoder
    Unrecognized,
}

/// One load command in stream order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadCommand {
    /// Position in the command stream
    pub index: u32,
    /// Raw `cmd` value
    pub kind: u32,
    /// Raw `cmdsize` value
    pub declared_size: u32,
    /// Absolute container offsets covered by the command
    pub byte_range: Range<u64>,
    /// Decoded contents
    pub payload: CommandPayload,
}

impl LoadCommand {
    /// `LC_*` name of the command kind.
    pub fn name(&self) -> &'static str {
        crate::macho::commands::command_name(self.kind)
    }
}

/// Resolved process entry point and where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum EntryPoint {
    /// `LC_MAIN` file offset mapped through the segment table
    FromMainCommand {
        /// `entryoff` as stored
        file_offset: u64,
        /// Mapped virtual address
        address: u64,
        /// Containing segment
        segment: String,
    },
    /// Program counter of a thread-state record
    FromUnixThread {
        /// Program counter
        pc: u64,
    },
    /// No usable entry information; carries an unmapped `LC_MAIN` offset if any
    Unresolved {
        /// Unmapped `entryoff`
        file_offset: Option<u64>,
    },
}

impl EntryPoint {
    /// Virtual address, when resolved.
    pub fn address(&self) -> Option<u64> {
        match self {
            EntryPoint::FromMainCommand { address, .. } => Some(*address),
            EntryPoint::FromUnixThread { pc } => Some(*pc),
            EntryPoint::Unresolved { .. } => None,
        }
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryPoint::FromMainCommand {
                file_offset,
                address,
                segment,
            } => write!(
                f,
                "0x{address:x} (LC_MAIN entryoff=0x{file_offset:x}, segment {segment})"
            ),
            EntryPoint::FromUnixThread { pc } => write!(f, "0x{pc:x} (thread state pc)"),
            EntryPoint::Unresolved { file_offset: Some(off) } => {
                write!(f, "<not mapped> (LC_MAIN entryoff=0x{off:x})")
            }
            EntryPoint::Unresolved { file_offset: None } => write!(f, "<none>"),
        }
    }
}

/// Where a diagnostic applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticLocation {
    /// The image as a whole
    Image,
    /// A load command, by index
    Command(u32),
    /// A universal-container slice, by index
    Slice(usize),
}

impl fmt::Display for DiagnosticLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticLocation::Image => write!(f, "image"),
            DiagnosticLocation::Command(i) => write!(f, "command {i}"),
            DiagnosticLocation::Slice(i) => write!(f, "slice {i}"),
        }
    }
}

/// A non-fatal anomaly found while decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Where the anomaly was found
    pub location: DiagnosticLocation,
    /// Human-readable description
    pub message: String,
}

impl Diagnostic {
    /// Diagnostic about the whole image.
    pub fn image(message: impl Into<String>) -> Self {
        Self {
            location: DiagnosticLocation::Image,
            message: message.into(),
        }
    }

    /// Diagnostic about one load command.
    pub fn command(index: u32, message: impl Into<String>) -> Self {
        Self {
            location: DiagnosticLocation::Command(index),
            message: message.into(),
        }
    }

    /// Diagnostic about one universal slice.
    pub fn slice(index: usize, message: impl Into<String>) -> Self {
        Self {
            location: DiagnosticLocation::Slice(index),
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

/// Complete decode result for one thin image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseReport {
    /// Universal-container context, if the image came from a slice
    pub universal: Option<UniversalInfo>,
    /// Fixed header
    pub header: ImageHeader,
    /// Load commands in stream order
    pub commands: Vec<LoadCommand>,
    /// Segment table in discovery order
    pub segments: Vec<SegmentRecord>,
    /// Resolved entry point
    pub entry_point: EntryPoint,
    /// Non-fatal anomalies in discovery order
    pub diagnostics: Vec<Diagnostic>,
}

impl ParseReport {
    /// Dylib references in command order.
    pub fn dylibs(&self) -> impl Iterator<Item = &DylibReference> {
        self.commands.iter().filter_map(|c| match &c.payload {
            CommandPayload::Dylib(d) => Some(d),
            _ => None,
        })
    }

    /// Path references in command order.
    pub fn paths(&self) -> impl Iterator<Item = &PathReference> {
        self.commands.iter().filter_map(|c| match &c.payload {
            CommandPayload::Path(p) => Some(p),
            _ => None,
        })
    }

    /// `LC_RPATH` entries in command order.
    pub fn rpaths(&self) -> impl Iterator<Item = &str> {
        self.paths()
            .filter(|p| p.kind == PathKind::RunPath)
            .map(|p| p.path.as_str())
    }

    /// The image UUID, if present.
    pub fn uuid(&self) -> Option<&Uuid> {
        self.commands.iter().find_map(|c| match &c.payload {
            CommandPayload::Uuid(u) => Some(u),
            _ => None,
        })
    }

    /// First segment with the given name.
    pub fn segment(&self, name: &str) -> Option<&SegmentRecord> {
        self.segments.iter().find(|s| s.name == name)
    }
}
