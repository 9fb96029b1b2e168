//! Error types for the Mach-O inspector.
//!
//! Every fatal decode error names what was malformed and where: an absolute
//! byte offset into the container, a load-command index, or a slice index.

use thiserror::Error;

/// Primary error type for the inspector.
#[derive(Debug, Error)]
pub enum InspectError {
    /// IO error while reading the container.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The buffer is shorter than the fixed header it must hold.
    #[error("Truncated header at offset 0x{offset:X}: expected {expected} bytes, got {actual}")]
    TruncatedHeader {
        /// Absolute offset
        offset: u64,
        /// Bytes needed
        expected: usize,
        /// Bytes available
        actual: usize,
    },

    /// The 4-byte magic is not one of the recognized values.
    #[error("Unrecognized magic 0x{magic:08X} at offset 0x{offset:X}")]
    UnrecognizedMagic {
        /// Absolute offset
        offset: u64,
        /// Raw magic value
        magic: u32,
    },

    /// The universal architecture table runs past the end of the container.
    #[error("Truncated architecture table: {count} entries need {required} bytes, container has {actual}")]
    TruncatedTable {
        /// Entries in the table
        count: u32,
        /// Bytes needed
        required: u64,
        /// Bytes available
        actual: usize,
    },

    /// An explicit slice index is past the end of the architecture table.
    #[error("Slice index {index} out of range ({count} slices)")]
    IndexOutOfRange {
        /// Slice index
        index: usize,
        /// Entries in the table
        count: u32,
    },

    /// No slice in the architecture table carries the requested CPU type.
    #[error("Architecture {cpu_type} (0x{cpu_type:08X}) not found in universal container")]
    ArchitectureNotFound {
        /// Requested CPU type
        cpu_type: i32,
    },

    /// The selected slice extends past the end of the container.
    #[error("Slice {index} out of bounds: offset 0x{offset:X} + size 0x{size:X} exceeds container length 0x{container_len:X}")]
    SliceOutOfBounds {
        /// Slice index
        index: usize,
        /// Absolute offset
        offset: u64,
        /// Declared size
        size: u64,
        /// Container length
        container_len: usize,
    },

    /// Not enough bytes left for a load command's 8-byte header.
    #[error("Truncated load command {index} at offset 0x{offset:X}")]
    TruncatedCommand {
        /// Load command index
        index: u32,
        /// Absolute offset
        offset: u64,
    },

    /// A load command declares a size below the 8-byte minimum.
    #[error("Invalid cmdsize {size} for load command {index} at offset 0x{offset:X}")]
    InvalidCommandSize {
        /// Load command index
        index: u32,
        /// Absolute offset
        offset: u64,
        /// Declared size
        size: u32,
    },

    /// A load command declares more bytes than remain in the image.
    #[error("Load command {index} at offset 0x{offset:X} extends beyond file: cmdsize {size}, {available} bytes available")]
    CommandExceedsFile {
        /// Load command index
        index: u32,
        /// Absolute offset
        offset: u64,
        /// Declared size
        size: u32,
        /// Bytes left in the image
        available: u64,
    },

    /// A load command is smaller than the fixed layout of its kind.
    #[error("{command} (load command {index}) too small: cmdsize {size}, need {required}")]
    CommandTooSmall {
        /// Load command index
        index: u32,
        /// `LC_*` name
        command: &'static str,
        /// Declared size
        size: u32,
        /// Bytes needed
        required: usize,
    },

    /// A segment command cannot hold the sections it declares.
    #[error("Segment sections truncated in load command {index}: {nsects} sections need {required} bytes, cmdsize is {size}")]
    SectionsTruncated {
        /// Load command index
        index: u32,
        /// Declared section count
        nsects: u32,
        /// Declared size
        size: u32,
        /// Bytes needed
        required: u64,
    },

    /// An embedded string offset points at or past the end of its command.
    #[error("Bad string offset {offset} in load command {index} (cmdsize {size})")]
    BadStringOffset {
        /// Load command index
        index: u32,
        /// String offset within the command
        offset: u32,
        /// Declared size
        size: u32,
    },

    /// An embedded string has no NUL terminator inside its command.
    #[error("Unterminated string at offset {offset} in load command {index}")]
    UnterminatedString {
        /// Load command index
        index: u32,
        /// String offset within the command
        offset: u32,
    },

    /// A CPU-type selection token could not be interpreted.
    #[error("Unknown architecture '{token}'")]
    UnknownArchitecture {
        /// Token as given
        token: String,
    },
}

/// Result type alias for inspector operations.
pub type Result<T> = std::result::Result<T, InspectError>;
