//! Synthetic Mach-O images and universal containers for tests.

use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};

use crate::macho::commands::lc;
use crate::macho::decoders::{ARM_THREAD_STATE64, ARM_THREAD_STATE64_COUNT};
use crate::macho::endian::{Endian, Magic, MagicKind};
use crate::macho::header::file_type;

/// Byte-level builder for one load command.
pub struct CommandBuf {
    endian: Endian,
    kind: u32,
    body: Vec<u8>,
}

impl CommandBuf {
    pub fn new(endian: Endian, kind: u32) -> Self {
        Self {
            endian,
            kind,
            body: Vec::new(),
        }
    }

    pub fn u32(mut self, value: u32) -> Self {
        let result = if self.endian.is_swapped() {
            self.body.write_u32::<BigEndian>(value)
        } else {
            self.body.write_u32::<LittleEndian>(value)
        };
        result.expect("writing to a Vec cannot fail");
        self
    }

    pub fn u64(mut self, value: u64) -> Self {
        let result = if self.endian.is_swapped() {
            self.body.write_u64::<BigEndian>(value)
        } else {
            self.body.write_u64::<LittleEndian>(value)
        };
        result.expect("writing to a Vec cannot fail");
        self
    }

    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(bytes);
        self
    }

    /// 16-byte zero-padded name field.
    pub fn name(self, name: &str) -> Self {
        let mut field = [0u8; 16];
        field[..name.len()].copy_from_slice(name.as_bytes());
        self.raw(&field)
    }

    /// Command bytes with `cmdsize` equal to their length.
    pub fn finish(self) -> Vec<u8> {
        let size = (self.body.len() + 8) as u32;
        self.finish_with_size(size)
    }

    /// Command bytes with an arbitrary `cmdsize`.
    pub fn finish_with_size(self, size: u32) -> Vec<u8> {
        let mut out = CommandBuf::new(self.endian, 0).u32(self.kind).u32(size).body;
        out.extend_from_slice(&self.body);
        out
    }

    /// `LC_SEGMENT_64` with r-x protection and one entry per section name.
    pub fn segment64(
        endian: Endian,
        name: &str,
        vm_addr: u64,
        vm_size: u64,
        file_offset: u64,
        file_size: u64,
        sections: &[&str],
    ) -> Vec<u8> {
        let mut cmd = CommandBuf::new(endian, lc::SEGMENT_64)
            .name(name)
            .u64(vm_addr)
            .u64(vm_size)
            .u64(file_offset)
            .u64(file_size)
            .u32(5)
            .u32(5)
            .u32(sections.len() as u32)
            .u32(0);
        for (i, sect) in sections.iter().enumerate() {
            cmd = cmd
                .name(sect)
                .name(name)
                .u64(vm_addr + 0x10 * i as u64)
                .u64(0x10)
                .u32(file_offset as u32 + 0x10 * i as u32)
                .u32(2)
                .u32(0)
                .u32(0)
                .u32(0)
                .u32(0)
                .u32(0)
                .u32(0);
        }
        cmd.finish()
    }

    /// `LC_SEGMENT` with r-x protection and one entry per section name.
    pub fn segment32(
        endian: Endian,
        name: &str,
        vm_addr: u32,
        vm_size: u32,
        file_offset: u32,
        file_size: u32,
        sections: &[&str],
    ) -> Vec<u8> {
        let mut cmd = CommandBuf::new(endian, lc::SEGMENT)
            .name(name)
            .u32(vm_addr)
            .u32(vm_size)
            .u32(file_offset)
            .u32(file_size)
            .u32(5)
            .u32(5)
            .u32(sections.len() as u32)
            .u32(0);
        for (i, sect) in sections.iter().enumerate() {
            cmd = cmd
                .name(sect)
                .name(name)
                .u32(vm_addr + 0x10 * i as u32)
                .u32(0x10)
                .u32(file_offset + 0x10 * i as u32)
                .u32(2)
                .u32(0)
                .u32(0)
                .u32(0)
                .u32(0)
                .u32(0);
        }
        cmd.finish()
    }

    /// `LC_UNIXTHREAD` with one ARM64 general register state.
    pub fn arm64_thread(endian: Endian, pc: u64) -> Vec<u8> {
        let mut cmd = CommandBuf::new(endian, lc::UNIXTHREAD)
            .u32(ARM_THREAD_STATE64)
            .u32(ARM_THREAD_STATE64_COUNT);
        // x0-x28, fp, lr, sp
        for reg in 0..32u64 {
            cmd = cmd.u64(reg);
        }
        cmd.u64(pc).u32(0).u32(0).finish()
    }
}

/// Builder for a thin image: header plus commands.
pub struct ImageBuilder {
    is_64bit: bool,
    endian: Endian,
    cpu_type: i32,
    cpu_subtype: i32,
    file_type: u32,
    flags: u32,
    commands: Vec<Vec<u8>>,
    ncmds: Option<u32>,
    sizeofcmds: Option<u32>,
    trailing: usize,
}

impl ImageBuilder {
    fn new(is_64bit: bool, cpu_type: i32) -> Self {
        Self {
            is_64bit,
            endian: Endian::new(false),
            cpu_type,
            cpu_subtype: 0,
            file_type: file_type::MH_EXECUTE,
            flags: 0,
            commands: Vec::new(),
            ncmds: None,
            sizeofcmds: None,
            trailing: 0,
        }
    }

    pub fn new64(cpu_type: i32) -> Self {
        Self::new(true, cpu_type)
    }

    pub fn new32(cpu_type: i32) -> Self {
        Self::new(false, cpu_type)
    }

    pub fn big_endian(mut self) -> Self {
        self.endian = Endian::new(true);
        self
    }

    pub fn enc(&self) -> Endian {
        self.endian
    }

    pub fn subtype(mut self, cpu_subtype: i32) -> Self {
        self.cpu_subtype = cpu_subtype;
        self
    }

    pub fn file_type(mut self, file_type: u32) -> Self {
        self.file_type = file_type;
        self
    }

    pub fn flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    pub fn ncmds(mut self, ncmds: u32) -> Self {
        self.ncmds = Some(ncmds);
        self
    }

    pub fn sizeofcmds(mut self, sizeofcmds: u32) -> Self {
        self.sizeofcmds = Some(sizeofcmds);
        self
    }

    /// Zero bytes appended after the command stream.
    pub fn trailing(mut self, len: usize) -> Self {
        self.trailing = len;
        self
    }

    pub fn command(mut self, bytes: Vec<u8>) -> Self {
        self.commands.push(bytes);
        self
    }

    pub fn segment64(
        self,
        name: &str,
        vm_addr: u64,
        vm_size: u64,
        file_offset: u64,
        file_size: u64,
        sections: &[&str],
    ) -> Self {
        let cmd = CommandBuf::segment64(
            self.endian,
            name,
            vm_addr,
            vm_size,
            file_offset,
            file_size,
            sections,
        );
        self.command(cmd)
    }

    pub fn segment32(
        self,
        name: &str,
        vm_addr: u32,
        vm_size: u32,
        file_offset: u32,
        file_size: u32,
        sections: &[&str],
    ) -> Self {
        let cmd = CommandBuf::segment32(
            self.endian,
            name,
            vm_addr,
            vm_size,
            file_offset,
            file_size,
            sections,
        );
        self.command(cmd)
    }

    pub fn main_entry(self, entry_offset: u64, stack_size: u64) -> Self {
        let cmd = CommandBuf::new(self.endian, lc::MAIN)
            .u64(entry_offset)
            .u64(stack_size)
            .finish();
        self.command(cmd)
    }

    /// Dylib command with the name stored right after the fixed fields.
    pub fn dylib(self, kind: u32, path: &str, current: u32, compat: u32) -> Self {
        let cmd = CommandBuf::new(self.endian, kind)
            .u32(24)
            .u32(2)
            .u32(current)
            .u32(compat)
            .raw(&padded_string(path))
            .finish();
        self.command(cmd)
    }

    /// Single-path command with the path stored at offset 12.
    pub fn path_command(self, kind: u32, path: &str) -> Self {
        let cmd = CommandBuf::new(self.endian, kind)
            .u32(12)
            .raw(&padded_string(path))
            .finish();
        self.command(cmd)
    }

    pub fn uuid(self, uuid: [u8; 16]) -> Self {
        let cmd = CommandBuf::new(self.endian, lc::UUID).raw(&uuid).finish();
        self.command(cmd)
    }

    pub fn arm64_thread(self, pc: u64) -> Self {
        let cmd = CommandBuf::arm64_thread(self.endian, pc);
        self.command(cmd)
    }

    pub fn build(self) -> Vec<u8> {
        let kind = if self.is_64bit {
            MagicKind::Image64
        } else {
            MagicKind::Image32
        };
        let magic = Magic::new(kind, self.endian.is_swapped()).value();
        let stream: usize = self.commands.iter().map(Vec::len).sum();

        let mut header = CommandBuf::new(self.endian, 0)
            .u32(i32_bits(self.cpu_type))
            .u32(i32_bits(self.cpu_subtype))
            .u32(self.file_type)
            .u32(self.ncmds.unwrap_or(self.commands.len() as u32))
            .u32(self.sizeofcmds.unwrap_or(stream as u32))
            .u32(self.flags);
        if self.is_64bit {
            header = header.u32(0);
        }

        let mut out = magic.to_le_bytes().to_vec();
        out.extend_from_slice(&header.body);
        for cmd in &self.commands {
            out.extend_from_slice(cmd);
        }
        out.resize(out.len() + self.trailing, 0);
        out
    }
}

/// NUL-terminated, zero-padded to a multiple of 8.
fn padded_string(s: &str) -> Vec<u8> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    bytes.resize(align_up(bytes.len(), 8), 0);
    bytes
}

fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) / align * align
}

fn i32_bits(value: i32) -> u32 {
    u32::from_ne_bytes(value.to_ne_bytes())
}

/// Slice alignment used by the universal builders (2^4).
pub const FAT_ALIGN: u32 = 4;

/// Big-endian universal container with a 32-bit architecture table.
pub fn fat32(slices: &[(i32, i32, Vec<u8>)]) -> Vec<u8> {
    fat(false, Endian::new(true), slices)
}

/// Big-endian universal container with a 64-bit architecture table.
pub fn fat64(slices: &[(i32, i32, Vec<u8>)]) -> Vec<u8> {
    fat(true, Endian::new(true), slices)
}

/// Universal container whose table is stored little-endian
/// (`FAT_MAGIC` / `FAT_MAGIC_64`).
pub fn fat_little_endian(is_64bit: bool, slices: &[(i32, i32, Vec<u8>)]) -> Vec<u8> {
    fat(is_64bit, Endian::new(false), slices)
}

fn fat(is_64bit: bool, endian: Endian, slices: &[(i32, i32, Vec<u8>)]) -> Vec<u8> {
    let entry_size = if is_64bit { 32 } else { 20 };
    let align = 1usize << FAT_ALIGN;
    let table_end = 8 + slices.len() * entry_size;

    let mut offsets = Vec::with_capacity(slices.len());
    let mut cursor = align_up(table_end, align);
    for (_, _, image) in slices {
        offsets.push(cursor);
        cursor = align_up(cursor + image.len(), align);
    }

    let kind = if is_64bit {
        MagicKind::Universal64
    } else {
        MagicKind::Universal32
    };
    let raw_magic = Magic::new(kind, endian.is_swapped()).value();
    let mut table = CommandBuf::new(endian, 0).u32(slices.len() as u32);

    for ((cpu, subtype, image), offset) in slices.iter().zip(&offsets) {
        table = table.u32(i32_bits(*cpu)).u32(i32_bits(*subtype));
        table = if is_64bit {
            table
                .u64(*offset as u64)
                .u64(image.len() as u64)
                .u32(FAT_ALIGN)
                .u32(0)
        } else {
            table
                .u32(*offset as u32)
                .u32(image.len() as u32)
                .u32(FAT_ALIGN)
        };
    }

    let mut out = raw_magic.to_le_bytes().to_vec();
    out.extend_from_slice(&table.body);
    for ((_, _, image), offset) in slices.iter().zip(&offsets) {
        out.resize(*offset, 0);
        out.extend_from_slice(image);
    }
    out
}

/// Overwrite a big-endian u32 in a built container.
pub fn patch_be_u32(data: &mut [u8], at: usize, value: u32) {
    BigEndian::write_u32(&mut data[at..at + 4], value);
}
